//! Inbound message handling for one fan-out channel (§4.7 "Server behavior
//! per inbound message").
//!
//! [`Applier`] breaks the cyclic dependency between this layer and the
//! Operation Engine (§9): the fan-out layer calls back into the engine to
//! commit materialized CRDT text, but never imports the engine's concrete
//! types. `vault_sync::engine` implements this trait for
//! [`VaultHandle`](crate::registry::VaultHandle).

use uuid::Uuid;

use super::channel::ChannelTable;
use super::types::{ChannelMessage, MessageType};
use crate::crdt::structure::StructureCrdtStore;
use crate::crdt::text::TextCrdtStore;
use crate::error::VaultError;

/// The engine operation the fan-out layer needs, without depending on the
/// engine's concrete types (§9 "cyclic dependency ... break by defining an
/// `Applier` interface").
pub trait Applier: Send + Sync {
    /// Commit `text`, the materialized state of `file_id`'s text CRDT, into
    /// the Content Store via Modify semantics (§4.7 `yjs-update`).
    fn apply_materialized_text(&self, file_id: Uuid, text: &str) -> Result<(), VaultError>;
}

/// Handle one inbound message from `origin_device_id` on `vault_name`.
///
/// Performs CRDT application, Content Store commit, and peer broadcast as
/// required by the message's `type` (§4.7). Returns a direct reply to send
/// back to the originating channel only, if any (`pong`, `error`).
pub fn handle_inbound(
    table: &ChannelTable,
    applier: &dyn Applier,
    text_crdt: &TextCrdtStore,
    structure_crdt: &StructureCrdtStore,
    vault_name: &str,
    origin_device_id: &str,
    msg: &ChannelMessage,
    now: i64,
) -> Option<ChannelMessage> {
    match msg.kind {
        MessageType::Ping => Some(ChannelMessage::new(MessageType::Pong, vault_name, origin_device_id, now)),

        MessageType::Pong => None,

        MessageType::YjsUpdate => {
            let Some(file_id) = msg.file_id else {
                return Some(ChannelMessage::error(vault_name, origin_device_id, now, "yjs-update missing fileId"));
            };
            let payload = match msg.decode_payload() {
                Ok(Some(bytes)) => bytes,
                Ok(None) => return Some(ChannelMessage::error(vault_name, origin_device_id, now, "yjs-update missing payload")),
                Err(e) => return Some(ChannelMessage::error(vault_name, origin_device_id, now, e.to_string())),
            };

            let doc = text_crdt.get_or_create(file_id);
            if let Err(e) = doc.apply_update(&payload) {
                return Some(ChannelMessage::error(vault_name, origin_device_id, now, e.to_string()));
            }
            let text = doc.materialize_text();
            if let Err(e) = applier.apply_materialized_text(file_id, &text) {
                tracing::warn!(%file_id, error = %e, "failed to commit materialized CRDT text");
            }

            table.broadcast(origin_device_id, msg);
            None
        }

        MessageType::StructureUpdate => {
            let Some(payload) = (match msg.decode_payload() {
                Ok(p) => p,
                Err(e) => return Some(ChannelMessage::error(vault_name, origin_device_id, now, e.to_string())),
            }) else {
                return Some(ChannelMessage::error(vault_name, origin_device_id, now, "structure-update missing payload"));
            };
            if let Err(e) = structure_crdt.apply_update_bytes(&payload) {
                return Some(ChannelMessage::error(vault_name, origin_device_id, now, e.to_string()));
            }
            table.broadcast(origin_device_id, msg);
            None
        }

        MessageType::BinaryUpdate => {
            // Relay-only: no server-side CRDT state (§4.7).
            table.broadcast(origin_device_id, msg);
            None
        }

        MessageType::SyncRequest => {
            // Reserved (§4.7): answered with a full snapshot of whatever the
            // message targets. A `fileId` asks for the text CRDT's current
            // state; its absence asks for the structure CRDT's.
            let payload = match msg.file_id {
                Some(file_id) => text_crdt.get_or_create(file_id).encode_state_as_update(None),
                None => match structure_crdt.encode_state_as_update() {
                    Ok(bytes) => bytes,
                    Err(e) => return Some(ChannelMessage::error(vault_name, origin_device_id, now, e.to_string())),
                },
            };
            let mut reply = ChannelMessage::new(MessageType::SyncResponse, vault_name, origin_device_id, now).with_payload(&payload);
            reply.file_id = msg.file_id;
            Some(reply)
        }

        MessageType::SyncResponse | MessageType::Error => {
            tracing::debug!(kind = ?msg.kind, device_id = origin_device_id, "dropping unsolicited message type");
            None
        }
    }
}
