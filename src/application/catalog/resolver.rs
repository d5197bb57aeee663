use std::collections::HashMap;

use crate::domain::{ApiDocument, SchemaNode};

use super::error::SchemaError;

const COMPONENT_PREFIX: &str = "#/components/schemas/";

/// Inlines reference nodes against one immutable document.
///
/// Resolution is memoized per pointer; a pointer revisited while it is still
/// being resolved is a cycle and fails with the full chain instead of
/// recursing.
pub struct SchemaResolver<'a> {
    document: &'a ApiDocument,
    cache: HashMap<String, SchemaNode>,
    in_flight: Vec<String>,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(document: &'a ApiDocument) -> Self {
        Self {
            document,
            cache: HashMap::new(),
            in_flight: Vec::new(),
        }
    }

    /// Return a structurally equivalent node with every reference replaced
    /// by its resolved target.
    pub fn resolve(&mut self, node: &SchemaNode) -> Result<SchemaNode, SchemaError> {
        match node {
            SchemaNode::Primitive { .. } => Ok(node.clone()),
            SchemaNode::Array { items } => Ok(SchemaNode::Array {
                items: Box::new(self.resolve(items)?),
            }),
            SchemaNode::Object {
                properties,
                required,
            } => {
                let mut resolved = Vec::with_capacity(properties.len());
                for (name, schema) in properties {
                    resolved.push((name.clone(), self.resolve(schema)?));
                }
                Ok(SchemaNode::Object {
                    properties: resolved,
                    required: required.clone(),
                })
            }
            SchemaNode::Reference { pointer } => self.resolve_pointer(pointer),
        }
    }

    fn resolve_pointer(&mut self, pointer: &str) -> Result<SchemaNode, SchemaError> {
        if let Some(hit) = self.cache.get(pointer) {
            return Ok(hit.clone());
        }
        if self.in_flight.iter().any(|seen| seen == pointer) {
            let mut chain = self.in_flight.clone();
            chain.push(pointer.to_string());
            return Err(SchemaError::Cycle { chain });
        }

        let target = pointer
            .strip_prefix(COMPONENT_PREFIX)
            .and_then(|name| self.document.component(name))
            .ok_or_else(|| SchemaError::UnresolvedReference {
                pointer: pointer.to_string(),
            })?
            .clone();

        self.in_flight.push(pointer.to_string());
        let resolved = self.resolve(&target);
        self.in_flight.pop();

        let resolved = resolved?;
        self.cache.insert(pointer.to_string(), resolved.clone());
        Ok(resolved)
    }
}
