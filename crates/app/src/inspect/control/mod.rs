//! Control link to the line PLC/SCADA endpoint.
//!
//! - `endpoint`: session/connector traits and the wire error type.
//! - `http`: concrete HTTP value-server transport.
//! - `link`: reconnect state machine, polling tick, lockout protocol.

pub use endpoint::{Connector, ControlError, ControlSession};
pub use http::{HttpConnector, ValueIds};
pub use link::{LinkSettings, run_control_link};

mod endpoint;
mod http;
mod link;

/// Status string commanded while the line is allowed to run.
pub const STATUS_RUNNING: &str = "Running";

/// Status string commanded once the lockout protocol engages.
pub const STATUS_STOPPED_CRITICAL: &str = "Stopped - Critical Defect";
