// End-to-end: place an order against the mock legacy service, then persist
// the receipt through a stub filesystem provider, exactly once.

#![cfg(unix)]

use std::collections::HashMap;
use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use mcp_bridge::ServerConfig;
use mcp_bridge::catalog;
use mcp_bridge::domain::ApiDocument;
use mcp_bridge::http::HttpInvoker;
use mcp_bridge::tooling::{ConnectResult, ServerManager};
use serde_json::{Map as JsonMap, Value, json};

/// Filesystem-provider stand-in: acknowledges write_file calls and appends
/// each one to the file named by RECEIPT_LOG so the test can count them.
const FILESYSTEM_STUB: &str = r##"
while IFS= read -r line; do
  case "$line" in
    *'"method":"notifications/initialized"'*) ;;
    *'"method":"initialize"'*)
      printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{}}'
      ;;
    *'"method":"tools/list"'*)
      printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"write_file","description":"Write a file"}]}}'
      ;;
    *'"method":"tools/call"'*)
      id=$(printf '%s' "$line" | sed 's/.*"id":\([0-9][0-9]*\).*/\1/')
      printf '%s\n' "$line" >> "$RECEIPT_LOG"
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"{\\"status\\":\\"success\\"}"}]}}\n' "$id"
      ;;
  esac
done
"##;

async fn create_order(Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(body["pizza_type"], "pepperoni");
    Json(json!({
        "order_id": "abc123",
        "total_price": 16.80,
        "eta_minutes": 30
    }))
}

#[tokio::test]
async fn order_then_receipt_records_the_write_exactly_once() {
    // The legacy service, reduced to the one operation this flow needs.
    let app = Router::new().route("/orders", post(create_order));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock");
    });

    let document = ApiDocument::from_value(&json!({
        "paths": {
            "/orders": {
                "post": {
                    "operationId": "create_order",
                    "requestBody": {
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "properties": {
                                        "pizza_type": {"type": "string"},
                                        "size": {"type": "string"}
                                    },
                                    "required": ["pizza_type"]
                                }
                            }
                        }
                    }
                }
            }
        }
    }))
    .expect("valid document");
    let outcome = catalog::compile(&document);
    let create = &outcome.tools[0];

    // 1. Place the order over HTTP; the payload passes through unmodified.
    let invoker = HttpInvoker::new(base_url);
    let mut args = JsonMap::new();
    args.insert("pizza_type".to_string(), json!("pepperoni"));
    args.insert("size".to_string(), json!("large"));
    let order = invoker.invoke(create, &args).await.expect("order succeeds");
    assert_eq!(
        order,
        json!({"order_id": "abc123", "total_price": 16.80, "eta_minutes": 30})
    );

    // 2. Persist the receipt through the filesystem provider.
    let receipts = tempfile::NamedTempFile::new().expect("receipt log");
    let receipt_log = receipts.path().to_str().expect("utf8 path").to_string();
    let manager = ServerManager::new(
        vec![ServerConfig {
            name: "filesystem".to_string(),
            command: "/bin/sh".into(),
            args: vec!["-c".to_string(), FILESYSTEM_STUB.to_string()],
            env: HashMap::from([("RECEIPT_LOG".to_string(), receipt_log.clone())]),
            inherit_env: true,
            workdir: None,
        }],
        Duration::from_secs(10),
    );
    let results = manager.connect_all().await;
    assert!(matches!(
        results["filesystem"],
        ConnectResult::Ready { tools: 1 }
    ));

    let order_id = order["order_id"].as_str().expect("order id");
    let written = manager
        .invoke(
            "filesystem",
            "write_file",
            json!({
                "path": format!("orders/order_{order_id}.json"),
                "content": serde_json::to_string(&order).expect("serializable"),
            }),
            Duration::from_secs(5),
        )
        .await
        .expect("receipt write succeeds");
    assert_eq!(written, json!({"status": "success"}));

    assert!(manager.shutdown_all().await.is_empty());

    // Exactly one write reached the provider, carrying the receipt path.
    let log = std::fs::read_to_string(receipts.path()).expect("read receipt log");
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1, "expected exactly one write, got: {log}");
    assert!(lines[0].contains("orders/order_abc123.json"));
    assert!(lines[0].contains("write_file"));
}
