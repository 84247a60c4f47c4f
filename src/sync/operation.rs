//! Sync operations: the unit of replication between devices.
//!
//! An operation is canonically serialized (stable key order, compact form),
//! Ed25519-signed, then AEAD-encrypted under an HKDF product of the vault
//! key. Only the encrypted form ever leaves the device.

use std::collections::BTreeSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::crypto::hash::blake2b_hex;
use crate::crypto::keys::{OperationKey, SymmetricKey};
use crate::crypto::signing;
use crate::error::{CoreError, CoreResult};
use crate::model::{Note, Notebook};

/// HKDF info for the vault's operation-log key.
pub const OP_KEY_INFO: &str = "witflo.sync.operations.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpType {
    CreateNote,
    UpdateNote,
    DeleteNote,
    MoveNote,
    CreateNotebook,
    UpdateNotebook,
    DeleteNotebook,
    AddTag,
    RemoveTag,
}

/// Field-wise note update; only present fields are applied on merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_trashed: Option<bool>,
    /// Outer `None` = untouched; `Some(None)` clears the timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trashed_at: Option<Option<DateTime<Utc>>>,
}

impl NoteUpdate {
    pub fn full(note: &Note) -> Self {
        NoteUpdate {
            title: Some(note.title.clone()),
            content: Some(note.content.clone()),
            tags: Some(note.tags.clone()),
            is_pinned: Some(note.is_pinned),
            is_archived: Some(note.is_archived),
            is_trashed: Some(note.is_trashed),
            trashed_at: Some(note.trashed_at),
        }
    }

    pub fn apply_to(&self, note: &mut Note) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
        if let Some(tags) = &self.tags {
            note.tags = tags.clone();
        }
        if let Some(is_pinned) = self.is_pinned {
            note.is_pinned = is_pinned;
        }
        if let Some(is_archived) = self.is_archived {
            note.is_archived = is_archived;
        }
        if let Some(is_trashed) = self.is_trashed {
            note.is_trashed = is_trashed;
        }
        if let Some(trashed_at) = self.trashed_at {
            note.trashed_at = trashed_at;
        }
    }
}

/// Field-wise notebook update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

impl NotebookUpdate {
    pub fn full(notebook: &Notebook) -> Self {
        NotebookUpdate {
            name: Some(notebook.name.clone()),
            description: Some(notebook.description.clone()),
            color: Some(notebook.color.clone()),
            icon: Some(notebook.icon.clone()),
            is_archived: Some(notebook.is_archived),
        }
    }

    pub fn apply_to(&self, notebook: &mut Notebook) {
        if let Some(name) = &self.name {
            notebook.name = name.clone();
        }
        if let Some(description) = &self.description {
            notebook.description = description.clone();
        }
        if let Some(color) = &self.color {
            notebook.color = color.clone();
        }
        if let Some(icon) = &self.icon {
            notebook.icon = icon.clone();
        }
        if let Some(is_archived) = self.is_archived {
            notebook.is_archived = is_archived;
        }
    }
}

/// Payload of a `moveNote` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovePayload {
    pub notebook_id: Option<Uuid>,
}

/// A signed replication operation. `payload` is type-specific JSON decoded
/// through the helpers below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub op_id: Uuid,
    #[serde(rename = "type")]
    pub op_type: OpType,
    pub target_id: Uuid,
    /// Lamport timestamp.
    pub timestamp: i64,
    pub device_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
    /// Producing device's Ed25519 verifying key, hex.
    pub device_pubkey: String,
    /// Ed25519 over the canonical serialization of all other fields, hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl SyncOperation {
    pub fn new(
        op_type: OpType,
        target_id: Uuid,
        timestamp: i64,
        device_id: Uuid,
        payload: Value,
    ) -> Self {
        SyncOperation {
            op_id: Uuid::new_v4(),
            op_type,
            target_id,
            timestamp,
            device_id,
            created_at: Utc::now(),
            payload,
            device_pubkey: String::new(),
            signature: None,
        }
    }

    /// Compact JSON with lexicographically ordered keys and the `signature`
    /// field removed. Both sides of a sync agree on this form.
    pub fn canonical_bytes(&self) -> CoreResult<Vec<u8>> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("signature");
        }
        Ok(serde_json::to_vec(&value)?)
    }

    pub fn sign(&mut self, key: &SigningKey) -> CoreResult<()> {
        self.device_pubkey = hex::encode(key.verifying_key().as_bytes());
        let message = self.canonical_bytes()?;
        self.signature = Some(hex::encode(signing::sign(&message, key)));
        Ok(())
    }

    /// Checks the embedded signature. Unsigned or badly signed operations
    /// must never be applied.
    pub fn verify_signature(&self) -> CoreResult<()> {
        let signature = self
            .signature
            .as_deref()
            .ok_or(CoreError::AuthenticationFailure)?;
        let sig_bytes =
            hex::decode(signature).map_err(|_| CoreError::AuthenticationFailure)?;
        let pk_bytes =
            hex::decode(&self.device_pubkey).map_err(|_| CoreError::AuthenticationFailure)?;
        let message = self.canonical_bytes()?;
        if !signing::verify(&message, &sig_bytes, &pk_bytes) {
            return Err(CoreError::AuthenticationFailure);
        }
        Ok(())
    }

    pub fn note_payload(note: &Note) -> CoreResult<Value> {
        Ok(serde_json::to_value(note)?)
    }

    pub fn decode_note(&self) -> CoreResult<Note> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn update_payload(update: &NoteUpdate) -> CoreResult<Value> {
        Ok(serde_json::to_value(update)?)
    }

    pub fn decode_note_update(&self) -> CoreResult<NoteUpdate> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn notebook_payload(notebook: &Notebook) -> CoreResult<Value> {
        Ok(serde_json::to_value(notebook)?)
    }

    pub fn decode_notebook(&self) -> CoreResult<Notebook> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn notebook_update_payload(update: &NotebookUpdate) -> CoreResult<Value> {
        Ok(serde_json::to_value(update)?)
    }

    pub fn decode_notebook_update(&self) -> CoreResult<NotebookUpdate> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn move_payload(notebook_id: Option<Uuid>) -> CoreResult<Value> {
        Ok(serde_json::to_value(MovePayload { notebook_id })?)
    }

    pub fn decode_move(&self) -> CoreResult<MovePayload> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// At-rest and wire form of an operation. `op_id` stays plaintext for
/// ordering and AAD binding; everything else is inside the ciphertext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedSyncOp {
    pub op_id: Uuid,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    /// BLAKE2b of the ciphertext, hex.
    pub content_hash: String,
    pub timestamp: i64,
}

impl EncryptedSyncOp {
    /// Encrypts a signed operation. Signing first is an invariant, not an
    /// option.
    pub fn seal(op: &SyncOperation, key: &OperationKey) -> CoreResult<Self> {
        if op.signature.is_none() {
            return Err(CoreError::InvariantViolated(
                "attempted to encrypt an unsigned operation".into(),
            ));
        }
        let plaintext = serde_json::to_vec(op)?;
        let ciphertext = key.seal(&plaintext, op.op_id.as_bytes())?;
        Ok(EncryptedSyncOp {
            op_id: op.op_id,
            content_hash: blake2b_hex(&ciphertext),
            timestamp: op.timestamp,
            ciphertext,
        })
    }

    /// Reconstructs the wire form from a pending file's raw bytes.
    pub fn from_blob(op_id: Uuid, ciphertext: Vec<u8>, timestamp: i64) -> Self {
        EncryptedSyncOp {
            op_id,
            content_hash: blake2b_hex(&ciphertext),
            timestamp,
            ciphertext,
        }
    }

    /// Decrypts and signature-verifies the inner operation.
    pub fn open(&self, key: &OperationKey) -> CoreResult<SyncOperation> {
        let plaintext = key.open(&self.ciphertext, self.op_id.as_bytes())?;
        let op: SyncOperation = serde_json::from_slice(&plaintext)?;
        op.verify_signature()?;
        if op.op_id != self.op_id {
            return Err(CoreError::AuthenticationFailure);
        }
        Ok(op)
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::BASE64;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
