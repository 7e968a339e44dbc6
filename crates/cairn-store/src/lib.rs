//! Object database for Cairn.
//!
//! Objects enter the database in one of two ways:
//!
//! - **Bulk check-in** streams content straight into a pack. Each object is
//!   hashed and deflated in fixed-size blocks, so arbitrarily large inputs
//!   never need to fit in memory. While [plugged](ObjectDatabase::plug),
//!   consecutive objects share one pack, which is split whenever the
//!   configured size limit would be crossed.
//! - **Loose objects** are written one file each and committed through the
//!   durability layer, which can defer fsyncs and renames to unplug.
//!
//! Every object is identified by the BLAKE3 hash of its tagged byte sequence
//! `"<kind> <size>\0" + content`, and both storage forms deflate exactly that
//! sequence.
//!
//! # Errors
//!
//! Failures that leave an object half-hashed or a promised commit undone are
//! [fatal](StoreError::is_fatal); the database should not be used further
//! after one.

pub mod batch;
pub mod checkin;
pub mod config;
pub mod durability;
pub mod error;
pub mod loose;
pub mod odb;
pub mod pipeline;
pub mod traits;

pub use batch::{BatchState, FinishOutcome, PackBatch};
pub use checkin::{BulkCheckin, UnplugReport};
pub use config::{FsyncObjectFiles, StoreConfig, CONFIG_FILE};
pub use durability::{fsync, CommitOutcome, FsyncMethod, PendingRenames};
pub use error::{StoreError, StoreResult};
pub use loose::{LooseObjectStore, StagedObject};
pub use odb::ObjectDatabase;
pub use pipeline::{HashMode, StreamOutcome, STREAM_BLOCK_SIZE};
pub use traits::ObjectLookup;

pub use cairn_pack::{PackFile, RawObject};
pub use cairn_types::{ObjectId, ObjectKind};
