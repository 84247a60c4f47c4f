use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A notebook groups notes within one vault. Stored like a note: full blob
/// in the object store, row in `refs/notebooks.jsonl.enc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub id: Uuid,
    pub name: String,
    pub vault_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    /// Advisory count persisted at notebook-save time; list calls refresh it
    /// from the live note cache.
    #[serde(default)]
    pub note_count: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Notebook {
    pub fn new(name: impl Into<String>, vault_id: Uuid) -> Self {
        let now = Utc::now();
        Notebook {
            id: Uuid::new_v4(),
            name: name.into(),
            vault_id,
            description: None,
            color: None,
            icon: None,
            is_archived: false,
            note_count: 0,
            created_at: now,
            modified_at: now,
        }
    }
}

/// Index row for a notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookMetadata {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub note_count: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_op_id: Option<Uuid>,
}

impl NotebookMetadata {
    pub fn from_notebook(
        notebook: &Notebook,
        content_hash: String,
        origin_op_id: Option<Uuid>,
    ) -> Self {
        NotebookMetadata {
            id: notebook.id,
            name: notebook.name.clone(),
            description: notebook.description.clone(),
            color: notebook.color.clone(),
            icon: notebook.icon.clone(),
            is_archived: notebook.is_archived,
            note_count: notebook.note_count,
            created_at: notebook.created_at,
            modified_at: notebook.modified_at,
            content_hash,
            origin_op_id,
        }
    }
}
