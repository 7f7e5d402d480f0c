// Infrastructure module - Background services and the HTTP session
pub mod heartbeat;
pub mod http;
pub mod task_manager;
pub mod timer;

pub use heartbeat::HeartbeatManager;
pub use http::{Credentials, HttpSession};
pub use task_manager::TaskManager;
pub use timer::ReconnectBudget;
