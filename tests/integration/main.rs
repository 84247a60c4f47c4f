mod common;

mod crdt;
mod lifecycle;
mod queries;
mod sync_engine;
mod watcher_reload;
