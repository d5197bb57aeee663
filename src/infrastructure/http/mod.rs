mod error;
mod fetch;
mod invoker;

pub use error::HttpInvokeError;
pub use fetch::{FetchError, fetch_document};
pub use invoker::HttpInvoker;
