use std::fmt;

use tracing::{debug, warn};

use crate::domain::{
    ApiDocument, HttpMethod, Invocation, OperationSpec, ParamBinding, ParamLocation, SchemaNode,
    ToolDescriptor, descriptor::sanitize_tool_name,
};

use super::error::CompileError;
use super::resolver::SchemaResolver;

/// Result of compiling one document: the descriptors that compiled, the
/// operations that did not, and any lint findings. A failed operation never
/// aborts the batch.
#[derive(Debug, Default)]
pub struct CompileOutcome {
    pub tools: Vec<ToolDescriptor>,
    pub failures: Vec<OperationFailure>,
    pub warnings: Vec<CompileWarning>,
}

#[derive(Debug)]
pub struct OperationFailure {
    pub tool: String,
    pub path: String,
    pub method: HttpMethod,
    pub error: CompileError,
}

/// A path/query parameter and a body property shared a name; the later
/// declaration (document order) won. Known quirk of the legacy call shape:
/// reported, not rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileWarning {
    pub tool: String,
    pub argument: String,
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tool '{}': argument '{}' is declared more than once; the last declaration wins",
            self.tool, self.argument
        )
    }
}

/// Compile every operation of a document into a tool descriptor, preserving
/// document order.
pub fn compile(document: &ApiDocument) -> CompileOutcome {
    let mut resolver = SchemaResolver::new(document);
    let mut outcome = CompileOutcome::default();

    for operation in &document.operations {
        let tool = tool_name(operation);
        match compile_operation(&mut resolver, operation, &tool, &mut outcome.warnings) {
            Ok(descriptor) => {
                debug!(tool = %descriptor.name, path = %operation.path, "compiled operation");
                outcome.tools.push(descriptor);
            }
            Err(error) => {
                warn!(
                    tool = %tool,
                    path = %operation.path,
                    method = operation.method.as_str(),
                    %error,
                    "operation failed to compile, continuing with the rest"
                );
                outcome.failures.push(OperationFailure {
                    tool,
                    path: operation.path.clone(),
                    method: operation.method,
                    error,
                });
            }
        }
    }

    outcome
}

fn tool_name(operation: &OperationSpec) -> String {
    match &operation.operation_id {
        Some(id) => sanitize_tool_name(id),
        None => sanitize_tool_name(&format!(
            "{} {}",
            operation.method.as_str(),
            operation.path
        )),
    }
}

fn compile_operation(
    resolver: &mut SchemaResolver<'_>,
    operation: &OperationSpec,
    tool: &str,
    warnings: &mut Vec<CompileWarning>,
) -> Result<ToolDescriptor, CompileError> {
    let mut properties: Vec<(String, SchemaNode)> = Vec::new();
    let mut required: Vec<String> = Vec::new();
    let mut bindings: Vec<ParamBinding> = Vec::new();

    for parameter in &operation.parameters {
        let location = match parameter.location.as_str() {
            "path" => ParamLocation::Path,
            "query" => ParamLocation::Query,
            // Header/cookie parameters have no counterpart in the flat
            // argument contract.
            _ => continue,
        };
        let schema = resolver.resolve(&parameter.schema)?;
        merge_property(
            &mut properties,
            &mut bindings,
            warnings,
            tool,
            &parameter.name,
            schema,
            location,
        );
        if parameter.required {
            mark_required(&mut required, &parameter.name);
        }
    }

    if let Some(body) = &operation.request_body {
        let resolved = resolver.resolve(body)?;
        let SchemaNode::Object {
            properties: body_properties,
            required: body_required,
        } = resolved
        else {
            return Err(CompileError::UnsupportedBodyShape {
                method: operation.method.as_str(),
                path: operation.path.clone(),
            });
        };
        for (name, schema) in body_properties {
            merge_property(
                &mut properties,
                &mut bindings,
                warnings,
                tool,
                &name,
                schema,
                ParamLocation::Body,
            );
        }
        for name in body_required {
            mark_required(&mut required, &name);
        }
    }

    Ok(ToolDescriptor {
        name: tool.to_string(),
        description: describe(operation),
        input_schema: SchemaNode::Object {
            properties,
            required,
        },
        invocation: Invocation {
            method: operation.method,
            path_template: operation.path.clone(),
            bindings,
        },
    })
}

/// Add one property to the flat input contract. A repeated name replaces the
/// earlier schema and binding (last writer wins) and is reported as a lint
/// warning.
fn merge_property(
    properties: &mut Vec<(String, SchemaNode)>,
    bindings: &mut Vec<ParamBinding>,
    warnings: &mut Vec<CompileWarning>,
    tool: &str,
    name: &str,
    schema: SchemaNode,
    location: ParamLocation,
) {
    if let Some(slot) = properties.iter_mut().find(|(existing, _)| existing == name) {
        warn!(
            tool,
            argument = name,
            "argument declared more than once; the last declaration wins"
        );
        warnings.push(CompileWarning {
            tool: tool.to_string(),
            argument: name.to_string(),
        });
        slot.1 = schema;
        if let Some(binding) = bindings.iter_mut().find(|binding| binding.name == name) {
            binding.location = location;
        }
        return;
    }
    properties.push((name.to_string(), schema));
    bindings.push(ParamBinding {
        name: name.to_string(),
        location,
    });
}

fn mark_required(required: &mut Vec<String>, name: &str) {
    if !required.iter().any(|existing| existing == name) {
        required.push(name.to_string());
    }
}

fn describe(operation: &OperationSpec) -> String {
    let raw = operation
        .summary
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .or(operation.description.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {}", operation.method.as_str(), operation.path));
    raw.replace('\n', " ").trim().to_string()
}
