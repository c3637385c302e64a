use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to open control session: {0}")]
    Connect(String),
    #[error("control I/O failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("control endpoint returned HTTP {status} for {value_id}")]
    Rejected { value_id: String, status: u16 },
    #[error("unexpected value payload for {value_id}: {detail}")]
    UnexpectedValue { value_id: String, detail: String },
}

/// One live session against the control endpoint.
///
/// Any error from any call is treated by the link as loss of the whole
/// session; there are no per-call retries at this layer.
#[async_trait]
pub trait ControlSession: Send {
    /// Write the current defect code. Issued every tick as the link heartbeat.
    async fn write_defect_code(&mut self, code: i64) -> Result<(), ControlError>;

    /// Read the status string the endpoint currently reports.
    async fn read_status(&mut self) -> Result<String, ControlError>;

    /// Write the commanded status string.
    async fn write_status(&mut self, status: &str) -> Result<(), ControlError>;

    /// Assert (or release) the production stop command.
    async fn write_stop(&mut self, engaged: bool) -> Result<(), ControlError>;
}

/// Opens sessions. Every attempt is independent; a failed handshake leaves
/// nothing behind.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: ControlSession;

    async fn connect(&self) -> Result<Self::Session, ControlError>;
}
