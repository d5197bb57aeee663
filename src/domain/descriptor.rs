use serde_json::{Value, json};

use super::schema::SchemaNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Parse a path-item key. Keys that are not operations (e.g. a
    /// path-level `parameters` entry) return `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "patch" => Some(HttpMethod::Patch),
            "delete" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    /// Whether a request of this method carries a JSON body.
    pub fn takes_body(self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

/// Where an argument travels in the final HTTP call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamBinding {
    pub name: String,
    pub location: ParamLocation,
}

/// The HTTP invocation template of a compiled tool. Placeholders in
/// `path_template` keep their `{param}` form; values are substituted at
/// invocation time, never at compile time.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub method: HttpMethod,
    pub path_template: String,
    pub bindings: Vec<ParamBinding>,
}

impl Invocation {
    pub fn binding(&self, name: &str) -> Option<&ParamBinding> {
        self.bindings.iter().find(|binding| binding.name == name)
    }
}

/// A named, schema-typed callable compiled from one API operation.
///
/// Created once by the interface compiler and shared read-only with
/// invokers and tool listings.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: SchemaNode,
    pub invocation: Invocation,
}

impl ToolDescriptor {
    /// Names of input properties the caller must supply.
    pub fn required_arguments(&self) -> &[String] {
        match &self.input_schema {
            SchemaNode::Object { required, .. } => required,
            _ => &[],
        }
    }

    /// The `{name, description, inputSchema}` listing entry exposed to
    /// external callers.
    pub fn to_listing(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema.to_json_schema(),
        })
    }
}

/// Derive a bare identifier from an operation id or `method path` pair:
/// non-alphanumerics become `_`, runs collapse, leading digits and
/// underscores are stripped, and the result is lowercased.
pub fn sanitize_tool_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out
        .trim_matches('_')
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches('_');
    if trimmed.is_empty() {
        "op".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_paths_into_identifiers() {
        assert_eq!(sanitize_tool_name("get /menu/{pizza_type}"), "get_menu_pizza_type");
        assert_eq!(
            sanitize_tool_name("patch /orders/{order_id}/cancel"),
            "patch_orders_order_id_cancel"
        );
    }

    #[test]
    fn collapses_runs_and_strips_leading_noise() {
        assert_eq!(sanitize_tool_name("__3--list--Orders__"), "list_orders");
        assert_eq!(sanitize_tool_name("CreateOrder"), "createorder");
    }

    #[test]
    fn never_returns_an_empty_name() {
        assert_eq!(sanitize_tool_name(""), "op");
        assert_eq!(sanitize_tool_name("123"), "op");
        assert_eq!(sanitize_tool_name("{}/"), "op");
    }
}
