// Messaging module - Event names, payload decoding and inbound routing
pub mod codec;
pub mod dedup;
pub mod event;
pub mod router;

pub use codec::{decode_notification, decode_parking_status, decode_vehicle_event};
pub use dedup::RecentVehicleEvents;
pub use event::SocketEvent;
pub use router::MessageRouter;
