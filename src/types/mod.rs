pub mod constants;
pub mod error;
pub mod message;
pub mod models;

pub use constants::*;
pub use error::{RealtimeError, Result};
pub use message::EventMessage;
pub use models::{
    AppState, AuthPayload, Identity, NotificationItem, NotificationKind, ParkingSnapshot,
    ParkingStatus, Priority, QuickStatus, VehicleAction, VehicleEvent, format_duration,
};
