// Module declarations
mod builder;
mod connection;
mod endpoint;
mod manager;
pub(crate) mod state;

// Public API exports
pub use builder::{ConnectionManagerBuilder, ConnectionOptions};
pub use connection::{ConnectOutcome, ConnectionInfo, ConnectionState};
pub use endpoint::{display_origin, validate_server_url};
pub use manager::ConnectionManager;
pub use state::ClientState;
