use super::error::PadError;
use super::handler::{HandlerKind, PadHandler};
use super::pad_state::Pad;
use std::sync::Arc;
use tracing::debug;

/// Device name used for ports that have nothing configured
pub const NULL_DEVICE: &str = "Default Null Device";

/// Fallback backend: accepts every bind, never reports input
#[derive(Debug, Default)]
pub struct NullPadHandler;

impl NullPadHandler {
    pub fn new() -> Self {
        Self
    }
}

impl PadHandler for NullPadHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Null
    }

    fn init(&mut self) {}

    fn bind_pad_to_device(&mut self, _pad: Arc<Pad>, device: &str) -> Result<(), PadError> {
        debug!("Null handler accepted device '{}'", device);
        Ok(())
    }

    fn poll(&mut self) {}

    fn connected(&self) -> u32 {
        0
    }
}
