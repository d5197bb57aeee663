use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema reference cycle: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("unresolved schema reference '{pointer}'")]
    UnresolvedReference { pointer: String },
}

/// A failure compiling one operation. Other operations in the same document
/// keep compiling.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("request body of {method} {path} is not a flat object")]
    UnsupportedBodyShape { method: &'static str, path: String },
}
