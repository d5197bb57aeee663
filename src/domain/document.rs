use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::descriptor::HttpMethod;
use super::schema::SchemaNode;

/// Errors raised while building an [`ApiDocument`] from fetched JSON.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("API description has no 'paths' section")]
    MissingPaths,

    #[error("operation {method} {path} is malformed: {source}")]
    InvalidOperation {
        path: String,
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One declared parameter of an operation, as found in the document.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub location: String,
    pub required: bool,
    pub schema: SchemaNode,
}

/// One `(path, method, operation)` entry, in document order.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub path: String,
    pub method: HttpMethod,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<ParameterSpec>,
    pub request_body: Option<SchemaNode>,
}

/// An immutable, fully parsed API description document.
#[derive(Debug, Clone)]
pub struct ApiDocument {
    pub title: String,
    pub version: String,
    pub operations: Vec<OperationSpec>,
    schemas: HashMap<String, SchemaNode>,
}

#[derive(Debug, Deserialize)]
struct RawOperation {
    #[serde(rename = "operationId")]
    operation_id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    #[serde(default)]
    parameters: Vec<RawParameter>,
    #[serde(rename = "requestBody")]
    request_body: Option<RawRequestBody>,
}

#[derive(Debug, Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "in")]
    location: String,
    #[serde(default)]
    required: bool,
    schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawRequestBody {
    #[serde(default)]
    content: HashMap<String, RawMediaType>,
}

#[derive(Debug, Deserialize)]
struct RawMediaType {
    schema: Option<Value>,
}

impl ApiDocument {
    /// Build a document from an OpenAPI 3.x JSON value. Path and method
    /// order follow the source document.
    pub fn from_value(value: &Value) -> Result<Self, DocumentError> {
        let paths = value
            .get("paths")
            .and_then(Value::as_object)
            .ok_or(DocumentError::MissingPaths)?;

        let mut operations = Vec::new();
        for (path, item) in paths {
            let Some(methods) = item.as_object() else {
                continue;
            };
            for (key, raw) in methods {
                let Some(method) = HttpMethod::from_key(key) else {
                    continue;
                };
                let parsed: RawOperation = serde_json::from_value(raw.clone()).map_err(
                    |source| DocumentError::InvalidOperation {
                        path: path.clone(),
                        method: key.clone(),
                        source,
                    },
                )?;
                operations.push(OperationSpec {
                    path: path.clone(),
                    method,
                    operation_id: parsed.operation_id,
                    summary: parsed.summary,
                    description: parsed.description,
                    parameters: parsed
                        .parameters
                        .into_iter()
                        .map(|param| ParameterSpec {
                            name: param.name,
                            location: param.location,
                            required: param.required,
                            schema: param
                                .schema
                                .as_ref()
                                .map(SchemaNode::from_value)
                                .unwrap_or_else(SchemaNode::string),
                        })
                        .collect(),
                    request_body: parsed.request_body.and_then(|body| {
                        body.content
                            .get("application/json")
                            .and_then(|media| media.schema.as_ref())
                            .map(SchemaNode::from_value)
                    }),
                });
            }
        }

        let schemas = value
            .pointer("/components/schemas")
            .and_then(Value::as_object)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(name, schema)| (name.clone(), SchemaNode::from_value(schema)))
                    .collect()
            })
            .unwrap_or_default();

        let info = value.get("info");
        Ok(Self {
            title: info
                .and_then(|i| i.get("title"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown API")
                .to_string(),
            version: info
                .and_then(|i| i.get("version"))
                .and_then(Value::as_str)
                .unwrap_or("1.0.0")
                .to_string(),
            operations,
            schemas,
        })
    }

    /// Look up a component schema by bare name.
    pub fn component(&self, name: &str) -> Option<&SchemaNode> {
        self.schemas.get(name)
    }
}
