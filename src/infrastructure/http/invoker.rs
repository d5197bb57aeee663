use std::time::Duration;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde_json::{Map as JsonMap, Value};
use tracing::debug;

use crate::domain::{HttpMethod, ParamLocation, ToolDescriptor};

use super::error::HttpInvokeError;

/// Characters escaped when a value is substituted into a path segment.
/// Matches the set the `url` crate applies to path components, plus `{`/`}`
/// so an encoded value can never be mistaken for a template placeholder.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%');

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes compiled tool descriptors against the legacy HTTP service.
/// Holds no per-descriptor state; one invoker serves every tool compiled
/// from the same document.
pub struct HttpInvoker {
    base_url: String,
    client: reqwest::Client,
}

impl HttpInvoker {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Fill the descriptor's invocation template with concrete arguments and
    /// perform the call. Arguments travel where their binding says: path
    /// placeholders (percent-encoded), query pairs, or the JSON body.
    pub async fn invoke(
        &self,
        descriptor: &ToolDescriptor,
        arguments: &JsonMap<String, Value>,
    ) -> Result<Value, HttpInvokeError> {
        for required in descriptor.required_arguments() {
            if !arguments.contains_key(required) {
                return Err(HttpInvokeError::MissingRequiredArgument {
                    tool: descriptor.name.clone(),
                    name: required.clone(),
                });
            }
        }

        let invocation = &descriptor.invocation;
        let mut path = invocation.path_template.clone();
        let mut query: Vec<(String, String)> = Vec::new();
        let mut body = JsonMap::new();

        for binding in &invocation.bindings {
            let Some(value) = arguments.get(&binding.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            match binding.location {
                ParamLocation::Path => {
                    let encoded =
                        utf8_percent_encode(&scalar_string(value), PATH_SEGMENT).to_string();
                    path = path.replace(&format!("{{{}}}", binding.name), &encoded);
                }
                ParamLocation::Query => query.push((binding.name.clone(), scalar_string(value))),
                ParamLocation::Body => {
                    body.insert(binding.name.clone(), value.clone());
                }
            }
        }

        let url = format!("{}{}", self.base_url, path);
        debug!(tool = %descriptor.name, method = invocation.method.as_str(), %url, "invoking legacy service");

        let mut request = self
            .client
            .request(to_reqwest_method(invocation.method), &url)
            .timeout(REQUEST_TIMEOUT);
        if !query.is_empty() {
            request = request.query(&query);
        }
        if invocation.method.takes_body() && !body.is_empty() {
            request = request.json(&Value::Object(body));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(HttpInvokeError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Render a scalar argument the way it appears in a URL: bare strings stay
/// bare, everything else uses its JSON form.
fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
