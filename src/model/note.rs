use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of characters of stripped content carried into the index row.
pub const PREVIEW_LEN: usize = 200;

/// A logical note. Persisted as an AEAD-encrypted JSON blob in the object
/// store; the index row ([`NoteMetadata`]) is derived from it on every save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<Uuid>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_trashed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trashed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Monotone save counter, starting at 1 on first save.
    #[serde(default)]
    pub version: u64,
}

impl Note {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Note {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            notebook_id: None,
            tags: BTreeSet::new(),
            is_pinned: false,
            is_archived: false,
            is_trashed: false,
            trashed_at: None,
            created_at: now,
            modified_at: now,
            version: 0,
        }
    }

    /// First [`PREVIEW_LEN`] characters of the content with markdown
    /// punctuation stripped and whitespace collapsed.
    pub fn preview(&self) -> String {
        let mut out = String::with_capacity(PREVIEW_LEN);
        let mut last_was_space = true;
        for c in self.content.chars() {
            let c = match c {
                '#' | '*' | '_' | '`' | '>' | '~' | '[' | ']' | '|' => continue,
                c if c.is_whitespace() => ' ',
                c => c,
            };
            if c == ' ' {
                if last_was_space {
                    continue;
                }
                last_was_space = true;
            } else {
                last_was_space = false;
            }
            out.push(c);
            if out.chars().count() >= PREVIEW_LEN {
                break;
            }
        }
        out.trim_end().to_string()
    }
}

/// Index row for a note: everything list views need without touching the
/// object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMetadata {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_trashed: bool,
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// BLAKE2b of the ciphertext blob holding the full note.
    pub content_hash: String,
    /// Identifier of the operation that produced this row; the equal-clock
    /// tie-breaker during merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_op_id: Option<Uuid>,
}

impl NoteMetadata {
    pub fn from_note(note: &Note, content_hash: String, origin_op_id: Option<Uuid>) -> Self {
        NoteMetadata {
            id: note.id,
            title: note.title.clone(),
            tags: note.tags.clone(),
            notebook_id: note.notebook_id,
            created_at: note.created_at,
            modified_at: note.modified_at,
            is_pinned: note.is_pinned,
            is_archived: note.is_archived,
            is_trashed: note.is_trashed,
            version: note.version,
            preview: Some(note.preview()),
            content_hash,
            origin_op_id,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_archived && !self.is_trashed
    }
}
