//! The `Runner` service-provider interface: an execution endpoint that
//! consumes bundles and emits packet frames.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Channel a runner's `connect` handler uses to emit complete packet
/// frames back to the target, exactly once per frame.
pub type Emit = mpsc::UnboundedSender<Vec<u8>>;

/// An execution endpoint: local in-process sandbox or an external
/// process/fleet, dispatched to uniformly by the target abstraction.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Human-readable name (reported to reporters, used for
    /// multi-runner column padding).
    fn name(&self) -> &str;

    /// Pre-assigned id, if the runner configuration carried one.
    fn configured_id(&self) -> Option<&str> {
        None
    }

    fn connection_timeout(&self) -> Duration {
        Duration::from_millis(5000)
    }

    fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(5000)
    }

    /// Establish the connection. Must call `emit` exactly once per
    /// complete packet frame it subsequently produces.
    async fn connect(
        &self,
        emit: Emit,
        runner_id: &str,
        argv: &HashMap<String, String>,
    ) -> Result<(), crate::error::XjetError>;

    /// Dispatch one suite's bundle. Must guarantee an eventual `EndSuite`
    /// or `Error` packet for `suite_id`.
    async fn dispatch(&self, bytes: Vec<u8>, suite_id: &str) -> Result<(), crate::error::XjetError>;

    async fn disconnect(&self) -> Result<(), crate::error::XjetError> {
        Ok(())
    }
}
