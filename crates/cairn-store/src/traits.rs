use cairn_types::ObjectId;

use crate::error::StoreResult;

/// The store-side view the bulk writer consults while checking objects in.
///
/// `has_object` lets the writer drop objects the store already holds;
/// `reprepare` is called after each pack is finalized so the new objects
/// become visible without reopening the store.
pub trait ObjectLookup {
    /// Whether an object with this ID is already stored, loose or packed.
    fn has_object(&self, id: &ObjectId) -> bool;

    /// Rescan for packs written since the last scan.
    fn reprepare(&mut self) -> StoreResult<()>;
}
