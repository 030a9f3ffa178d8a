mod errors;
mod service;
mod source;
mod store;

pub use errors::ImportError;
pub use service::{ImportService, ImportStatus, ImportSummary};
