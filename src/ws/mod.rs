pub mod connection;
pub mod messages;
pub mod supervisor;

pub use connection::{StreamConnection, StreamHandle};
pub use supervisor::StreamSupervisor;
