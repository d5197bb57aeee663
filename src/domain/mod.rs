pub mod descriptor;
pub mod document;
pub mod schema;

pub use descriptor::{HttpMethod, Invocation, ParamBinding, ParamLocation, ToolDescriptor};
pub use document::{ApiDocument, DocumentError, OperationSpec, ParameterSpec};
pub use schema::{PrimitiveKind, SchemaNode};
