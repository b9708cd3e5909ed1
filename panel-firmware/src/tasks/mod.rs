// Task-Modul: Enthält alle Embassy Tasks
//
// Die Update-Tasks melden Fortschritt über den UpdateEventChannel,
// Status-LED und WebSocket-Clients hören mit.

pub mod feedback;
pub mod http;
pub mod mdns;
pub mod updates;
pub mod wifi;

// Re-export Tasks für einfachen Import
pub use feedback::update_feedback_task;
pub use http::http_server_task;
pub use mdns::mdns_responder_task;
pub use updates::{poll_scheduler_task, push_session_task};
pub use wifi::{connection_task, dhcp_task, net_task};
