// Callbacks module - Consumer-facing subscriptions
pub mod registry;

pub use registry::{CallbackKind, CallbackRegistry};
