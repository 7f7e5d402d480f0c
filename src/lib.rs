//! # Parking Realtime
//!
//! Client core for the smart parking monitoring service: a persistent,
//! auto-reconnecting event-stream connection that keeps a device in sync with
//! occupancy and vehicle entry/exit events, plus an HTTP poller as fallback.
//!
//! ## Example
//!
//! ```no_run
//! use parking_realtime::{ConnectionManager, Identity, StaticSettings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = StaticSettings::new("192.168.1.6:5000")
//!         .with_identity(Identity::new("51F-12345", "0901234567"));
//!     let manager = ConnectionManager::new(Arc::new(settings))?;
//!
//!     manager.registry().register_status("dashboard", |status| {
//!         println!("{} free of {}", status.snapshot.available, status.snapshot.total);
//!     });
//!
//!     manager.connect().await;
//!     Ok(())
//! }
//! ```

pub mod callbacks;
pub mod client;
pub mod infrastructure;
pub mod messaging;
pub mod notify;
pub mod poller;
pub mod settings;
pub mod transport;
pub mod types;

pub use callbacks::{CallbackKind, CallbackRegistry};
pub use client::{
    ConnectOutcome, ConnectionInfo, ConnectionManager, ConnectionManagerBuilder,
    ConnectionOptions, ConnectionState,
};
pub use infrastructure::Credentials;
pub use messaging::SocketEvent;
pub use notify::{LocalNotifier, LogNotifier};
pub use poller::{PollerOptions, StatusPoller};
pub use settings::{SettingsProvider, StaticSettings};
pub use transport::{Connector, DisconnectReason, SocketIoConnector, TransportKind};
pub use types::{
    AppState, EventMessage, Identity, NotificationItem, NotificationKind, ParkingSnapshot,
    ParkingStatus, Priority, QuickStatus, RealtimeError, Result, VehicleAction, VehicleEvent,
};
