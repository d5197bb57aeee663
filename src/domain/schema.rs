use serde_json::{Map as JsonMap, Value, json};

/// A type schema as it appears in an API description document.
///
/// `Reference` variants point into the document's component section and are
/// replaced during resolution; a descriptor's input contract never contains
/// them.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Primitive {
        kind: PrimitiveKind,
        format: Option<String>,
    },
    Object {
        /// Property order follows the source document.
        properties: Vec<(String, SchemaNode)>,
        required: Vec<String>,
    },
    Array {
        items: Box<SchemaNode>,
    },
    Reference {
        pointer: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

impl PrimitiveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Number => "number",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Null => "null",
        }
    }
}

impl SchemaNode {
    pub fn string() -> Self {
        SchemaNode::Primitive {
            kind: PrimitiveKind::String,
            format: None,
        }
    }

    pub fn empty_object() -> Self {
        SchemaNode::Object {
            properties: Vec::new(),
            required: Vec::new(),
        }
    }

    /// Parse a schema value from an API description document.
    ///
    /// Untyped or unrecognized schemas fall back to `string`, matching how
    /// the legacy service's documents are consumed. A single-element `allOf`
    /// wrapper (common around enum references) is unwrapped in place.
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return SchemaNode::string();
        };

        if let Some(pointer) = object.get("$ref").and_then(Value::as_str) {
            return SchemaNode::Reference {
                pointer: pointer.to_string(),
            };
        }

        if let Some(all_of) = object.get("allOf").and_then(Value::as_array) {
            if let [single] = all_of.as_slice() {
                return SchemaNode::from_value(single);
            }
        }

        let declared = object.get("type").and_then(Value::as_str);
        match declared {
            Some("object") => Self::object_from(object),
            Some("array") => {
                let items = object
                    .get("items")
                    .map(SchemaNode::from_value)
                    .unwrap_or_else(SchemaNode::string);
                SchemaNode::Array {
                    items: Box::new(items),
                }
            }
            Some(other) => {
                let kind = match other {
                    "integer" => PrimitiveKind::Integer,
                    "number" => PrimitiveKind::Number,
                    "boolean" => PrimitiveKind::Boolean,
                    "null" => PrimitiveKind::Null,
                    _ => PrimitiveKind::String,
                };
                SchemaNode::Primitive {
                    kind,
                    format: object
                        .get("format")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                }
            }
            // Untyped but with properties: treat as object (the legacy
            // documents omit "type" on some inline bodies).
            None if object.contains_key("properties") => Self::object_from(object),
            None => SchemaNode::string(),
        }
    }

    fn object_from(object: &JsonMap<String, Value>) -> Self {
        let properties = object
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, schema)| (name.clone(), SchemaNode::from_value(schema)))
                    .collect()
            })
            .unwrap_or_default();
        let required = object
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        SchemaNode::Object {
            properties,
            required,
        }
    }

    /// Render as a JSON-Schema value, the shape exposed to tool callers.
    pub fn to_json_schema(&self) -> Value {
        match self {
            SchemaNode::Primitive { kind, format } => {
                let mut out = JsonMap::new();
                out.insert("type".to_string(), json!(kind.as_str()));
                if let Some(format) = format {
                    out.insert("format".to_string(), json!(format));
                }
                Value::Object(out)
            }
            SchemaNode::Object {
                properties,
                required,
            } => {
                let mut props = JsonMap::new();
                for (name, schema) in properties {
                    props.insert(name.clone(), schema.to_json_schema());
                }
                let mut out = JsonMap::new();
                out.insert("type".to_string(), json!("object"));
                out.insert("properties".to_string(), Value::Object(props));
                if !required.is_empty() {
                    out.insert("required".to_string(), json!(required));
                }
                Value::Object(out)
            }
            SchemaNode::Array { items } => json!({
                "type": "array",
                "items": items.to_json_schema(),
            }),
            SchemaNode::Reference { pointer } => json!({ "$ref": pointer }),
        }
    }

    /// True if any `Reference` node is reachable from this one.
    pub fn contains_reference(&self) -> bool {
        match self {
            SchemaNode::Primitive { .. } => false,
            SchemaNode::Reference { .. } => true,
            SchemaNode::Array { items } => items.contains_reference(),
            SchemaNode::Object { properties, .. } => properties
                .iter()
                .any(|(_, schema)| schema.contains_reference()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitive_with_format() {
        let node = SchemaNode::from_value(&json!({"type": "string", "format": "date-time"}));
        assert_eq!(
            node,
            SchemaNode::Primitive {
                kind: PrimitiveKind::String,
                format: Some("date-time".to_string()),
            }
        );
    }

    #[test]
    fn parses_object_preserving_property_order() {
        let node = SchemaNode::from_value(&json!({
            "type": "object",
            "properties": {
                "zebra": {"type": "integer"},
                "apple": {"type": "string"}
            },
            "required": ["zebra"]
        }));
        let SchemaNode::Object {
            properties,
            required,
        } = node
        else {
            panic!("expected object");
        };
        assert_eq!(properties[0].0, "zebra");
        assert_eq!(properties[1].0, "apple");
        assert_eq!(required, vec!["zebra".to_string()]);
    }

    #[test]
    fn unwraps_single_all_of() {
        let node = SchemaNode::from_value(&json!({
            "allOf": [{"$ref": "#/components/schemas/PizzaSize"}],
            "default": "large"
        }));
        assert_eq!(
            node,
            SchemaNode::Reference {
                pointer: "#/components/schemas/PizzaSize".to_string(),
            }
        );
    }

    #[test]
    fn untyped_schema_falls_back_to_string() {
        assert_eq!(SchemaNode::from_value(&json!({})), SchemaNode::string());
        assert_eq!(SchemaNode::from_value(&json!(null)), SchemaNode::string());
    }

    #[test]
    fn json_schema_round_trip_shape() {
        let node = SchemaNode::Object {
            properties: vec![("count".to_string(), SchemaNode::Primitive {
                kind: PrimitiveKind::Integer,
                format: None,
            })],
            required: vec!["count".to_string()],
        };
        assert_eq!(
            node.to_json_schema(),
            json!({
                "type": "object",
                "properties": {"count": {"type": "integer"}},
                "required": ["count"]
            })
        );
    }
}
