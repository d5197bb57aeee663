use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tokio::time;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::infrastructure::rpc::{InboundFrame, RpcNotification, RpcRequest};

use super::error::TransportError;

/// How long a provider gets to exit on its own after stdin closes before it
/// is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type NotificationSink = mpsc::UnboundedSender<(String, Value)>;

/// One provider child process and its framed stdio JSON-RPC exchange.
///
/// Requests from any number of concurrent callers are multiplexed over the
/// single byte stream: ids are allocated monotonically and registered in the
/// in-flight table under one lock, frames are written under a second lock so
/// they never interleave, and a background read loop completes callers by id
/// regardless of response order.
#[derive(Clone)]
pub struct ServerProcess {
    inner: Arc<ProcessInner>,
}

struct ProcessInner {
    server: String,
    writer: AsyncMutex<Option<BufWriter<BoxedWriter>>>,
    pending: AsyncMutex<PendingTable>,
    child: AsyncMutex<Option<Child>>,
    notifications: AsyncMutex<Option<NotificationSink>>,
}

struct PendingTable {
    /// Never reused for the life of the process, so a response to a request
    /// that already timed out can only miss.
    next_id: u64,
    slots: HashMap<u64, PendingRequest>,
    /// Set once the transport is dead; later calls fail fast.
    closed: Option<ClosedReason>,
}

struct PendingRequest {
    sent_at: Instant,
    tx: oneshot::Sender<Result<Value, TransportError>>,
}

#[derive(Debug, Clone)]
enum ClosedReason {
    Terminated,
    MalformedFrame(String),
}

impl ClosedReason {
    fn to_error(&self, server: &str) -> TransportError {
        match self {
            ClosedReason::Terminated => TransportError::Terminated {
                server: server.to_string(),
            },
            ClosedReason::MalformedFrame(detail) => TransportError::MalformedFrame {
                server: server.to_string(),
                detail: detail.clone(),
            },
        }
    }
}

impl ServerProcess {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ProcessInner::unwired(server.into())),
        }
    }

    /// Spawn the configured command and wire the transport to its stdio.
    ///
    /// With `inherit_env = false` the child sees only the configured
    /// environment map; providers that take credentials this way must not
    /// observe stray variables from the parent.
    pub async fn start(&self, config: &ServerConfig) -> Result<(), TransportError> {
        {
            let writer = self.inner.writer.lock().await;
            if writer.is_some() {
                return Ok(());
            }
        }

        let mut command = Command::new(&config.command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &config.workdir {
            command.current_dir(dir);
        }
        if !config.args.is_empty() {
            command.args(&config.args);
        }
        if !config.inherit_env {
            command.env_clear();
        }
        command.envs(&config.env);

        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            server: self.inner.server.clone(),
            source,
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.inner.transport_error("failed to capture provider stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.inner.transport_error("failed to capture provider stdout"))?;

        self.inner
            .wire(Box::new(stdin), stdout, Some(child))
            .await;
        Ok(())
    }

    /// Wire the transport over arbitrary stream halves instead of a child
    /// process. Lets tests script the provider end in-process.
    pub fn from_streams<W, R>(server: impl Into<String>, writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let inner = Arc::new(ProcessInner {
            writer: AsyncMutex::new(Some(BufWriter::new(Box::new(writer) as BoxedWriter))),
            ..ProcessInner::unwired(server.into())
        });
        let loop_inner = Arc::clone(&inner);
        tokio::spawn(async move { loop_inner.read_loop(reader).await });
        Self { inner }
    }

    /// Register the sink that receives unsolicited provider notifications.
    /// Without one, notifications are logged and dropped.
    pub async fn set_notification_sink(&self, sink: NotificationSink) {
        *self.inner.notifications.lock().await = Some(sink);
    }

    /// Send one request and suspend until its response, the timeout, or
    /// process death, whichever comes first. A timed-out request's slot is
    /// released immediately so a late response is dropped by id miss.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let inner = &self.inner;

        // Allocate-and-register is one atomic step under the table lock.
        let (id, rx) = {
            let mut pending = inner.pending.lock().await;
            if let Some(reason) = &pending.closed {
                return Err(reason.to_error(&inner.server));
            }
            let id = pending.next_id;
            pending.next_id += 1;
            let (tx, rx) = oneshot::channel();
            pending.slots.insert(id, PendingRequest {
                sent_at: Instant::now(),
                tx,
            });
            (id, rx)
        };

        let request = RpcRequest::new(id, method, params);
        if let Err(error) = inner.write_frame(&request).await {
            inner.pending.lock().await.slots.remove(&id);
            return Err(error);
        }

        match time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // The sender was dropped without completing: the table was torn
            // down while we raced it.
            Ok(Err(_)) => Err(TransportError::Terminated {
                server: inner.server.clone(),
            }),
            Err(_) => {
                inner.pending.lock().await.slots.remove(&id);
                Err(TransportError::Timeout {
                    server: inner.server.clone(),
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Fire-and-forget notification to the provider.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        self.inner
            .write_frame(&RpcNotification::new(method, params))
            .await
    }

    /// Close stdin to request a graceful exit, escalate to kill after the
    /// grace period, and fail every pending request before returning. No
    /// caller is left suspended.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        {
            let mut writer = self.inner.writer.lock().await;
            *writer = None;
        }

        let child = self.inner.child.lock().await.take();
        let mut failure = None;
        if let Some(mut child) = child {
            match time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(server = %self.inner.server, ?status, "provider exited")
                }
                Ok(Err(source)) => {
                    failure = Some(self.inner.transport_error(format!(
                        "failed to reap provider process: {source}"
                    )));
                }
                Err(_) => {
                    warn!(
                        server = %self.inner.server,
                        "provider did not exit within the grace period, killing"
                    );
                    if let Err(source) = child.kill().await {
                        failure = Some(self.inner.transport_error(format!(
                            "failed to kill provider process: {source}"
                        )));
                    }
                }
            }
        }

        self.inner.close(ClosedReason::Terminated).await;
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl ProcessInner {
    fn unwired(server: String) -> Self {
        Self {
            server,
            writer: AsyncMutex::new(None),
            pending: AsyncMutex::new(PendingTable {
                next_id: 1,
                slots: HashMap::new(),
                closed: None,
            }),
            child: AsyncMutex::new(None),
            notifications: AsyncMutex::new(None),
        }
    }

    async fn wire<R>(self: &Arc<Self>, writer: BoxedWriter, reader: R, child: Option<Child>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        *self.writer.lock().await = Some(BufWriter::new(writer));
        *self.child.lock().await = child;
        let loop_inner = Arc::clone(self);
        tokio::spawn(async move { loop_inner.read_loop(reader).await });
    }

    async fn write_frame<T: Serialize>(&self, frame: &T) -> Result<(), TransportError> {
        let encoded = serde_json::to_string(frame)
            .map_err(|source| self.transport_error(format!("failed to encode frame: {source}")))?;

        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| self.transport_error("transport is not wired"))?;
        let io_error = |source: std::io::Error| self.transport_error(source.to_string());
        stream.write_all(encoded.as_bytes()).await.map_err(io_error)?;
        stream.write_all(b"\n").await.map_err(io_error)?;
        stream.flush().await.map_err(io_error)?;
        Ok(())
    }

    async fn read_loop<R>(self: Arc<Self>, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(raw)) => {
                    let line = raw.trim();
                    if line.is_empty() {
                        continue;
                    }
                    // Providers occasionally leak ANSI-decorated log lines
                    // onto stdout; those are noise, not frames.
                    if line.starts_with('\u{1b}') {
                        debug!(server = %self.server, line, "skipping ANSI log line");
                        continue;
                    }
                    match InboundFrame::parse(line) {
                        Ok(frame) => self.dispatch(frame).await,
                        Err(source) => {
                            // Framing is unrecoverable once desynchronized:
                            // fail the transport rather than guess where the
                            // next frame starts.
                            warn!(
                                server = %self.server,
                                line = raw,
                                %source,
                                "malformed frame, failing transport"
                            );
                            self.close(ClosedReason::MalformedFrame(source.to_string()))
                                .await;
                            return;
                        }
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        self.close(ClosedReason::Terminated).await;
    }

    async fn dispatch(&self, frame: InboundFrame) {
        match frame {
            InboundFrame::Response { id, outcome } => {
                let slot = self.pending.lock().await.slots.remove(&id);
                match slot {
                    Some(pending) => {
                        let outcome = outcome.map_err(|error| TransportError::Rpc {
                            server: self.server.clone(),
                            code: error.code,
                            message: error.message,
                        });
                        let _ = pending.tx.send(outcome);
                    }
                    None => debug!(
                        server = %self.server,
                        id,
                        "response without a pending request, dropping"
                    ),
                }
            }
            InboundFrame::Notification { method, params } => {
                let sink = self.notifications.lock().await.clone();
                match sink {
                    Some(sink) => {
                        let _ = sink.send((method, params));
                    }
                    None => debug!(server = %self.server, method, "unhandled notification"),
                }
            }
            InboundFrame::Unroutable { detail } => {
                debug!(server = %self.server, detail, "ignoring unroutable frame");
            }
        }
    }

    /// Tear the transport down: reap the child if any, then fail every
    /// pending request with the close reason. Idempotent.
    async fn close(&self, reason: ClosedReason) {
        {
            let mut writer = self.writer.lock().await;
            *writer = None;
        }

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(error) = child.kill().await {
                debug!(
                    server = %self.server,
                    %error,
                    "failed to kill provider process (may have already exited)"
                );
            }
        }

        let mut pending = self.pending.lock().await;
        if pending.closed.is_none() {
            pending.closed = Some(reason.clone());
        }
        for (id, slot) in pending.slots.drain() {
            debug!(
                server = %self.server,
                id,
                elapsed_ms = slot.sent_at.elapsed().as_millis() as u64,
                "failing request pending at transport close"
            );
            let _ = slot.tx.send(Err(reason.to_error(&self.server)));
        }
    }

    fn transport_error(&self, message: impl Into<String>) -> TransportError {
        TransportError::Transport {
            server: self.server.clone(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{ReadHalf, WriteHalf, duplex, split};

    type Stub = (
        ServerProcess,
        tokio::io::BufReader<ReadHalf<tokio::io::DuplexStream>>,
        WriteHalf<tokio::io::DuplexStream>,
    );

    /// A transport wired to in-memory streams; returns the far end so the
    /// test can play the provider.
    fn stub_transport(name: &str) -> Stub {
        let (near, far) = duplex(16 * 1024);
        let (near_read, near_write) = split(near);
        let process = ServerProcess::from_streams(name, near_write, near_read);
        let (far_read, far_write) = split(far);
        (process, BufReader::new(far_read), far_write)
    }

    async fn respond(
        writer: &mut WriteHalf<tokio::io::DuplexStream>,
        frame: Value,
    ) {
        writer
            .write_all(format!("{frame}\n").as_bytes())
            .await
            .expect("stub write");
        writer.flush().await.expect("stub flush");
    }

    #[tokio::test]
    async fn correlates_responses_by_id_not_arrival_order() {
        let (process, mut reader, mut writer) = stub_transport("stub");

        let provider = tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..4 {
                let mut line = String::new();
                reader.read_line(&mut line).await.expect("stub read");
                let frame: Value = serde_json::from_str(&line).expect("request json");
                seen.push((
                    frame["id"].as_u64().expect("integer id"),
                    frame["method"].as_str().expect("method").to_string(),
                ));
            }
            // Answer in reverse order; correlation must be by id alone.
            for (id, method) in seen.into_iter().rev() {
                respond(
                    &mut writer,
                    json!({"jsonrpc": "2.0", "id": id, "result": {"method": method}}),
                )
                .await;
            }
        });

        let timeout = Duration::from_secs(5);
        let (a, b, c, d) = tokio::join!(
            process.call("alpha", json!({}), timeout),
            process.call("beta", json!({}), timeout),
            process.call("gamma", json!({}), timeout),
            process.call("delta", json!({}), timeout),
        );
        assert_eq!(a.unwrap()["method"], "alpha");
        assert_eq!(b.unwrap()["method"], "beta");
        assert_eq!(c.unwrap()["method"], "gamma");
        assert_eq!(d.unwrap()["method"], "delta");
        provider.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_frees_slot_and_drops_the_late_response() {
        let (process, mut reader, mut writer) = stub_transport("stub");

        let err = process
            .call("slow", json!({}), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));

        // The response for the timed-out id 1 arrives late, then a fresh
        // call is answered properly. The late frame must be dropped, not
        // delivered to the new caller.
        respond(
            &mut writer,
            json!({"jsonrpc": "2.0", "id": 1, "result": {"stale": true}}),
        )
        .await;
        let provider = tokio::spawn(async move {
            let mut line = String::new();
            reader.read_line(&mut line).await.expect("slow request");
            line.clear();
            reader.read_line(&mut line).await.expect("fresh request");
            let frame: Value = serde_json::from_str(&line).expect("request json");
            assert_eq!(frame["id"].as_u64(), Some(2), "ids are never reused");
            respond(
                &mut writer,
                json!({"jsonrpc": "2.0", "id": 2, "result": {"fresh": true}}),
            )
            .await;
        });

        let value = process
            .call("fresh", json!({}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, json!({"fresh": true}));
        provider.await.unwrap();
    }

    #[tokio::test]
    async fn rpc_error_response_is_typed() {
        let (process, mut reader, mut writer) = stub_transport("stub");

        let provider = tokio::spawn(async move {
            let mut line = String::new();
            reader.read_line(&mut line).await.expect("request");
            respond(
                &mut writer,
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {"code": -32601, "message": "no such tool"}
                }),
            )
            .await;
        });

        let err = process
            .call("tools/call", json!({"name": "ghost"}), Duration::from_secs(5))
            .await
            .unwrap_err();
        let TransportError::Rpc { code, message, .. } = err else {
            panic!("expected rpc error, got {err:?}");
        };
        assert_eq!(code, -32601);
        assert_eq!(message, "no such tool");
        provider.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_frame_fails_pending_and_future_calls() {
        let (process, mut reader, mut writer) = stub_transport("stub");

        let pending = {
            let process = process.clone();
            tokio::spawn(async move {
                process
                    .call("hang", json!({}), Duration::from_secs(30))
                    .await
            })
        };

        let mut line = String::new();
        reader.read_line(&mut line).await.expect("request");
        writer
            .write_all(b"this is not a frame\n")
            .await
            .expect("stub write");
        writer.flush().await.expect("stub flush");

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::MalformedFrame { .. }));

        // The transport is terminally failed; later calls do not hang.
        let err = process
            .call("after", json!({}), Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::MalformedFrame { .. }));
    }

    #[tokio::test]
    async fn stream_end_fails_pending_with_terminated() {
        let (process, mut reader, writer) = stub_transport("stub");

        let pending = {
            let process = process.clone();
            tokio::spawn(async move {
                process
                    .call("hang", json!({}), Duration::from_secs(30))
                    .await
            })
        };

        // Take the request so the caller is suspended on its response, then
        // close both far halves, which is what an exiting provider looks like.
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("request");
        drop(reader);
        drop(writer);

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Terminated { .. }));
    }

    #[tokio::test]
    async fn notifications_reach_the_sink_and_log_noise_is_skipped() {
        let (process, _reader, mut writer) = stub_transport("stub");
        let (tx, mut rx) = mpsc::unbounded_channel();
        process.set_notification_sink(tx).await;

        writer
            .write_all(b"\x1b[2mprovider log line\x1b[0m\n\n")
            .await
            .expect("stub write");
        respond(
            &mut writer,
            json!({
                "jsonrpc": "2.0",
                "method": "notifications/tools/list_changed",
                "params": {}
            }),
        )
        .await;

        let (method, params) = rx.recv().await.expect("notification");
        assert_eq!(method, "notifications/tools/list_changed");
        assert_eq!(params, json!({}));
    }
}
