//! Per-file text CRDT (§4.8).
//!
//! One [`yrs`] document per `(vault, file_id)`, holding the collaborative
//! text of that file. Updates are commutative, associative, and idempotent
//! (§4.8) — `apply_update` never needs to know what order peers observed
//! them in.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, TextRef, Transact, Update};

use crate::error::VaultError;

/// A single file's collaborative text state.
pub struct TextCrdtDoc {
    doc: Doc,
    text: TextRef,
}

impl Default for TextCrdtDoc {
    fn default() -> Self {
        let doc = Doc::new();
        let text = doc.get_or_insert_text("content");
        Self { doc, text }
    }
}

impl TextCrdtDoc {
    /// Apply a remote update, decoded from the wire `payload` (§4.7
    /// `yjs-update`).
    pub fn apply_update(&self, update: &[u8]) -> Result<(), VaultError> {
        let update = Update::decode_v1(update)
            .map_err(|e| VaultError::validation(format!("malformed CRDT update: {e}")))?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| VaultError::validation(format!("CRDT update rejected: {e}")))?;
        Ok(())
    }

    /// The current materialized text (§4.7 "materialize the resulting text
    /// state").
    #[must_use]
    pub fn materialize_text(&self) -> String {
        let txn = self.doc.transact();
        self.text.get_string(&txn)
    }

    /// Encode the full document state as an update, or an incremental delta
    /// relative to `state_vector` if supplied (§4.7 `sync-request`).
    #[must_use]
    pub fn encode_state_as_update(&self, state_vector: Option<&[u8]>) -> Vec<u8> {
        let txn = self.doc.transact();
        match state_vector.and_then(|sv| StateVector::decode_v1(sv).ok()) {
            Some(sv) => txn.encode_diff_v1(&sv),
            None => txn.encode_diff_v1(&StateVector::default()),
        }
    }

    /// Encode this document's state vector, used by a joining client to
    /// request only the updates it is missing.
    #[must_use]
    pub fn encode_state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }
}

/// Per-vault registry of [`TextCrdtDoc`]s, keyed by `file_id`.
#[derive(Default)]
pub struct TextCrdtStore {
    docs: Mutex<HashMap<Uuid, std::sync::Arc<TextCrdtDoc>>>,
}

impl TextCrdtStore {
    /// Return the document for `file_id`, creating an empty one if absent.
    pub fn get_or_create(&self, file_id: Uuid) -> std::sync::Arc<TextCrdtDoc> {
        let mut docs = self.docs.lock().expect("text CRDT store mutex poisoned");
        std::sync::Arc::clone(docs.entry(file_id).or_insert_with(|| std::sync::Arc::new(TextCrdtDoc::default())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_update_materializes_text() {
        let writer = TextCrdtDoc::default();
        {
            let mut txn = writer.doc.transact_mut();
            writer.text.push(&mut txn, "hello");
        }
        let update = {
            let txn = writer.doc.transact();
            txn.encode_diff_v1(&StateVector::default())
        };

        let reader = TextCrdtDoc::default();
        reader.apply_update(&update).unwrap();
        assert_eq!(reader.materialize_text(), "hello");
    }

    #[test]
    fn apply_update_is_idempotent() {
        let writer = TextCrdtDoc::default();
        {
            let mut txn = writer.doc.transact_mut();
            writer.text.push(&mut txn, "hi");
        }
        let update = writer.encode_state_as_update(None);

        let reader = TextCrdtDoc::default();
        reader.apply_update(&update).unwrap();
        reader.apply_update(&update).unwrap();
        assert_eq!(reader.materialize_text(), "hi");
    }
}
