pub mod note;
pub mod notebook;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use note::{Note, NoteMetadata, PREVIEW_LEN};
pub use notebook::{Notebook, NotebookMetadata};

/// Row of the tag index, rebuilt from the note cache whenever a mutation
/// changes any note's tag set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRow {
    pub tag: String,
    pub note_count: u64,
    pub modified_at: DateTime<Utc>,
}
