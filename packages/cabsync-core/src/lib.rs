#![forbid(unsafe_code)]
//! Core of a personal-data vault: a tree of folders, cards, and text entries
//! persisted as an encrypted XML document, plus a timestamp-driven
//! synchronizer that reconciles two independently-edited copies of the same
//! vault. The crate stays independent of concrete file backends so local-disk
//! and cloud adapters can implement the [`Transport`] trait outside the core.

pub mod codec;
pub mod cryptor;
pub mod error;
pub mod ids;
pub mod store;
pub mod sync;
pub mod time;
pub mod transport;
pub mod tree;

pub use cryptor::CipherKind;
pub use error::{Error, Result};
pub use ids::NodeId;
pub use store::{StoreHandle, PASSWORD_LEN};
pub use sync::{synchronize, Side, SyncOutcome};
pub use time::Timestamp;
pub use transport::{MemoryTransport, Transport};
pub use tree::{Cabinet, Node, NodeKind};
