//! The in-memory catalog: flat storage (`store`) plus the synchronization
//! engine and exclusion bookkeeping built on top of it (`tree`).

mod store;
mod tree;

pub use store::TreeStore;
pub use tree::FolderTree;
