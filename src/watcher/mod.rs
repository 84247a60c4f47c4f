pub mod debounce;
pub mod pipeline;

pub use debounce::{Debouncer, DEBOUNCE_WINDOW};
pub use pipeline::{
    classify, ReloadAction, VaultWatcher, WorkspaceEvent, WorkspaceWatcher, RETRY_DELAY,
};
