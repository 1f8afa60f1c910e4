use crate::{Action, Assignment, AssignmentItem, UserId};

/// A write computed by the engine, applied by storage in one transaction.
///
/// Entities carry the version they were read at. Storage must reject the whole
/// change if any stored version differs, then bump each written version by one.
/// The assignment is always part of the change so transitions on sibling items
/// are serialized.
#[derive(Clone, Debug)]
pub struct Change {
    pub action: Action,
    pub assignment: Assignment,
    pub item: Option<AssignmentItem>,
    pub appended: Option<AssignmentItem>,
    /// When set, storage rejects the change if this worker has another item in progress.
    pub exclusive_for: Option<UserId>,
}

impl Change {
    pub fn item_id(&self) -> Option<&crate::ItemId> {
        self.item.as_ref().or(self.appended.as_ref()).map(|i| &i.id)
    }
}
