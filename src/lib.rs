//! Tamper-evident document registration ledger.
//!
//! Records are appended as blocks to a single JSON file. Each block carries
//! the SHA-256 digest of its predecessor, so editing any stored record is
//! detected when it is verified.

pub mod block;
pub mod config;
pub mod digest;
pub mod error;
pub mod identifier;
pub mod ledger;
pub mod logging;
pub mod record;
pub mod storage;
pub mod verify;

pub use block::{Block, Payload};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result, ValidationError};
pub use identifier::{CollisionPolicy, IdAllocator, PublicId, RecordRef};
pub use ledger::{Ledger, LedgerStats};
pub use record::{Attachment, BlockSummary, DocumentRecord, RecordType};
pub use storage::{FileStore, MemoryStore, Store};
pub use verify::{ChainAudit, ChainLink, Integrity, VerificationReport};
