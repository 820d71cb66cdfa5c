//! Wire codecs for protocol envelopes.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::Envelope;

/// Serialization used on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// UTF-8 JSON text.
    #[default]
    Json,
    /// CBOR (RFC 8949).
    Cbor,
}

impl WireFormat {
    /// Encodes an envelope.
    pub fn encode(self, envelope: &Envelope) -> ProtocolResult<Vec<u8>> {
        match self {
            WireFormat::Json => serde_json::to_vec(envelope)
                .map_err(|e| ProtocolError::encoding_failed(e.to_string())),
            WireFormat::Cbor => {
                let mut buf = Vec::new();
                ciborium::into_writer(envelope, &mut buf)
                    .map_err(|e| ProtocolError::encoding_failed(e.to_string()))?;
                Ok(buf)
            }
        }
    }

    /// Decodes an envelope.
    pub fn decode(self, bytes: &[u8]) -> ProtocolResult<Envelope> {
        match self {
            WireFormat::Json => serde_json::from_slice(bytes)
                .map_err(|e| ProtocolError::decoding_failed(e.to_string())),
            WireFormat::Cbor => ciborium::from_reader(bytes)
                .map_err(|e| ProtocolError::decoding_failed(e.to_string())),
        }
    }

    /// Returns the format name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            WireFormat::Json => "json",
            WireFormat::Cbor => "cbor",
        }
    }
}
