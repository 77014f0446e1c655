//! JSON codec for gateway frames.

use crate::errors::HostlinkError;
use crate::gateway::message::MessageFrame;

/// Stateless encoder/decoder for the JSON wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec;

impl MessageCodec {
    pub fn new() -> Self {
        Self
    }

    /// Serialize a frame to its wire representation.
    pub fn encode(&self, frame: &MessageFrame) -> Result<String, HostlinkError> {
        serde_json::to_string(frame)
            .map_err(|err| HostlinkError::Codec(format!("failed to encode frame: {err}")))
    }

    /// Parse a wire string into a frame. Rejects frames without a type
    /// discriminator.
    pub fn decode(&self, raw: &str) -> Result<MessageFrame, HostlinkError> {
        let frame: MessageFrame = serde_json::from_str(raw)
            .map_err(|err| HostlinkError::Codec(format!("failed to decode frame: {err}")))?;
        if frame.message_type.is_empty() {
            return Err(HostlinkError::Codec("frame has no type".to_string()));
        }
        Ok(frame)
    }
}
