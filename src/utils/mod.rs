//! Shared helpers: process execution, socket binding, log throttling

pub mod command;
pub mod net;
pub mod throttle;

pub use command::{run_command, CommandOutput};
pub use net::bind_tcp_listener;
pub use throttle::LogThrottler;
