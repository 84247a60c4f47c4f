pub mod apply;
pub mod clock;
pub mod cursor;
pub mod engine;
pub mod oplog;
pub mod operation;

pub use apply::{apply_external_pending, apply_operation, ApplyOutcome};
pub use clock::LamportClock;
pub use cursor::SyncCursor;
pub use engine::{SyncEngine, SyncReport};
pub use oplog::{DeviceIdentity, OpLog};
pub use operation::{EncryptedSyncOp, NoteUpdate, NotebookUpdate, OpType, SyncOperation};
