//! The Knowledge Ledger (§4.7): persistent nodes, append-only audit
//! trail, and dependency edges over an embedded SQLite store.

pub mod schema;
pub mod store;

pub use store::{KnowledgeLedger, TransitionOptions};
