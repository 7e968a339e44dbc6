//! Foundation types for the Cairn object store.
//!
//! Every other Cairn crate depends on `cairn-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash)
//! - [`ObjectKind`]: Type tag hashed into every object header

pub mod error;
pub mod kind;
pub mod object;

pub use error::TypeError;
pub use kind::ObjectKind;
pub use object::ObjectId;
