//! Wire message shape for the Real-time Fan-out (§4.7).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `type` of a fan-out channel message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    /// A Yjs-compatible text CRDT update for one file.
    YjsUpdate,
    /// A structure CRDT update for the vault's file tree.
    StructureUpdate,
    /// An opaque binary update relayed without server-side CRDT state.
    BinaryUpdate,
    /// Liveness probe; the server replies with `Pong` on the same channel.
    Ping,
    /// Liveness reply; refreshes `last_seen` only.
    Pong,
    /// A peer's request for current state or an incremental delta.
    SyncRequest,
    /// A reply to a `SyncRequest`.
    SyncResponse,
    /// An error report, either from the peer or echoed back by the server.
    Error,
}

/// A single fan-out channel frame (§4.7).
///
/// `payload` carries base64-encoded bytes on the wire; callers decode it
/// with [`decode_payload`] and encode outgoing payloads with
/// [`encode_payload`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    /// What kind of message this is.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// The vault this message belongs to.
    pub vault_name: String,
    /// The originating (or, for a server-to-client message, the
    /// destination) device.
    pub device_id: String,
    /// The file this update applies to, for `yjs-update` messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<Uuid>,
    /// Base64-encoded payload bytes, present on every type except `ping`,
    /// `pong`, and `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Seconds since epoch this message was produced.
    pub timestamp: i64,
    /// Human-readable error detail, present only on `type: "error"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChannelMessage {
    /// Build a bare message of `kind` with no payload, stamped `now`.
    #[must_use]
    pub fn new(kind: MessageType, vault_name: &str, device_id: &str, now: i64) -> Self {
        Self {
            kind,
            vault_name: vault_name.to_owned(),
            device_id: device_id.to_owned(),
            file_id: None,
            payload: None,
            timestamp: now,
            error: None,
        }
    }

    /// Build an `error` message.
    #[must_use]
    pub fn error(vault_name: &str, device_id: &str, now: i64, detail: impl Into<String>) -> Self {
        Self { error: Some(detail.into()), ..Self::new(MessageType::Error, vault_name, device_id, now) }
    }

    /// Decode this message's `payload`, if present.
    pub fn decode_payload(&self) -> Result<Option<Vec<u8>>, crate::error::VaultError> {
        use base64::Engine;
        self.payload
            .as_deref()
            .map(|p| {
                base64::engine::general_purpose::STANDARD
                    .decode(p)
                    .map_err(|e| crate::error::VaultError::validation(format!("invalid base64 payload: {e}")))
            })
            .transpose()
    }

    /// Base64-encode `bytes` into this message's `payload` field.
    pub fn with_payload(mut self, bytes: &[u8]) -> Self {
        use base64::Engine;
        self.payload = Some(base64::engine::general_purpose::STANDARD.encode(bytes));
        self
    }
}
