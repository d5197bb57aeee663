mod compiler;
mod error;
mod resolver;

pub use compiler::{CompileOutcome, CompileWarning, OperationFailure, compile};
pub use error::{CompileError, SchemaError};
pub use resolver::SchemaResolver;
