//! Three-way diff of inventory entries: existing condition, existing resource, desired resource.

use fnrt_core::{structural_eq, FnError, KubeObject};
use tracing::debug;

use crate::config::ResourceKind;
use crate::inventory::{Entry, EntryKey, Inventory, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

/// Resource action target. `obj` is the desired object for create/update and the existing
/// one for delete.
#[derive(Debug, Clone)]
pub struct DiffObject {
    pub key: EntryKey,
    pub kind: Option<ResourceKind>,
    pub obj: KubeObject,
}

#[derive(Debug, Default)]
pub struct InventoryDiff {
    pub create_objs: Vec<DiffObject>,
    pub update_objs: Vec<DiffObject>,
    pub delete_objs: Vec<DiffObject>,
    pub create_conditions: Vec<EntryKey>,
    pub delete_conditions: Vec<EntryKey>,
    /// Entries that could not be compared.
    pub failures: Vec<(EntryKey, FnError)>,
}

impl InventoryDiff {
    pub fn is_empty(&self) -> bool {
        self.create_objs.is_empty()
            && self.update_objs.is_empty()
            && self.delete_objs.is_empty()
            && self.create_conditions.is_empty()
            && self.delete_conditions.is_empty()
    }

    pub fn actions(&self) -> usize {
        self.create_objs.len()
            + self.update_objs.len()
            + self.delete_objs.len()
            + self.create_conditions.len()
            + self.delete_conditions.len()
    }

    fn push(&mut self, action: Action, key: &EntryKey, entry: &Entry, obj: &KubeObject) {
        debug!(entry = %key, ?action, "diff");
        let d = DiffObject { key: key.clone(), kind: entry.kind, obj: obj.clone() };
        match action {
            Action::Create => self.create_objs.push(d),
            Action::Update => self.update_objs.push(d),
            Action::Delete => self.delete_objs.push(d),
        }
    }
}

/// Does `desired` differ from `existing`? Children compare their `spec`; the governed
/// object compares the whole document.
fn changed(key: &EntryKey, existing: &KubeObject, desired: &KubeObject) -> Result<bool, FnError> {
    if existing.is_flagged_for_deletion() {
        return Ok(true);
    }
    match key.role {
        Role::For => Ok(!structural_eq(existing.as_value(), desired.as_value())),
        Role::Owned | Role::Watched => Ok(!existing.subtree_eq(desired, "spec")?),
    }
}

impl Inventory {
    /// Diff every entry accepted by `filter`.
    ///
    /// Owned entries follow the full three-way rules: a desired object with no existing
    /// one is created, an existing object no longer desired is (soft) deleted, and a changed
    /// `spec` is updated. Condition actions apply to kinds that exchange conditions. Other
    /// roles are only compared when they carry a desired object.
    pub fn diff(&self, mut filter: impl FnMut(&EntryKey) -> bool) -> InventoryDiff {
        let mut out = InventoryDiff::default();
        for (key, entry) in self.iter() {
            if !filter(key) {
                continue;
            }
            let owned = key.role == Role::Owned;

            if !owned || entry.materializes_resource() {
                match (&entry.existing_resource, &entry.new_resource) {
                    (None, Some(new)) => out.push(Action::Create, key, entry, new),
                    (Some(old), None) if owned && !old.is_flagged_for_deletion() => {
                        out.push(Action::Delete, key, entry, old)
                    }
                    (Some(old), Some(new)) => match changed(key, old, new) {
                        Ok(true) => out.push(Action::Update, key, entry, new),
                        Ok(false) => {}
                        Err(e) => {
                            out.failures.push((key.clone(), e));
                            continue;
                        }
                    },
                    _ => {}
                }
            }

            if owned && entry.exchanges_condition() {
                match (&entry.existing_condition, &entry.new_resource) {
                    (None, Some(_)) => out.create_conditions.push(key.clone()),
                    (Some(_), None) => out.delete_conditions.push(key.clone()),
                    _ => {}
                }
            }
        }
        out
    }
}
