//! The remote configuration API collaborator: trait, request/response
//! types, and an in-process implementation.

pub mod service;
pub mod types;

pub use service::{ConfigApi, LocalConfigService};
pub use types::NewConfigRequest;
