//! Apply an [`InventoryDiff`] to the output batch, the manifest conditions and the inventory.

use fnrt_core::{is_refs_valid, refs_string, Condition, ConditionStatus, KubeObject, DELETE_ANNOTATION};
use tracing::debug;

use crate::diff::{DiffObject, InventoryDiff};
use crate::inventory::{EntryKey, Role};
use crate::pipeline::Sdk;

impl Sdk<'_, '_> {
    pub fn commit(&mut self, diff: InventoryDiff) {
        for (key, err) in diff.failures {
            let owner = key.owner.clone().unwrap_or_else(|| key.target.clone());
            let at = self.parent_ref(&owner);
            self.instance_failed(&owner, Some(at), format!("{}: {err}", refs_string(&key.refs())));
        }
        for key in &diff.delete_conditions {
            self.delete_condition(key);
        }
        for d in diff.delete_objs {
            self.soft_delete(&d.key, d.obj);
        }
        for key in diff.create_conditions {
            let c = Condition::new(key.condition_type(), ConditionStatus::False, "create initial resource").with_reason("create");
            self.write_condition(&key, c);
        }
        for d in diff.create_objs {
            self.write_resource(d, false);
        }
        for d in diff.update_objs {
            self.write_resource(d, true);
        }
    }

    fn write_resource(&mut self, d: DiffObject, update: bool) {
        let DiffObject { key, kind, mut obj } = d;
        let owner = key.owner.clone().unwrap_or_else(|| key.target.clone());
        if !is_refs_valid(&key.refs()) {
            let at = self.parent_ref(&owner);
            self.instance_failed(&owner, Some(at), format!("invalid reference, {}", refs_string(&key.refs())));
            return;
        }
        obj.remove_annotation(DELETE_ANNOTATION);
        if key.role == Role::Owned {
            if let Err(e) = obj.set_owner(&owner) {
                let at = self.parent_ref(&owner);
                self.instance_failed(&owner, Some(at), format!("{}: {e}", refs_string(&key.refs())));
                return;
            }
        }
        let exchanged = key.role == Role::Owned && kind.map(|k| k.exchanges_condition()).unwrap_or(false);
        if update && exchanged {
            let c = Condition::new(key.condition_type(), ConditionStatus::False, "update resource").with_reason("update");
            self.write_condition(&key, c);
        }
        if kind.map(|k| k.materializes_resource()).unwrap_or(true) {
            debug!(entry = %key, update, "resource committed");
            self.write_object(obj.clone());
            self.inv.set_existing_resource(&key, obj);
        }
    }

    /// Flag `obj` for deletion and write it back in place. Its condition goes with it.
    pub(crate) fn soft_delete(&mut self, key: &EntryKey, mut obj: KubeObject) {
        if obj.is_flagged_for_deletion() {
            return;
        }
        if let Err(e) = obj.flag_for_deletion() {
            let owner = key.owner.clone().unwrap_or_else(|| key.target.clone());
            self.instance_failed(&owner, Some(obj.reference()), format!("{key}: {e}"));
            return;
        }
        debug!(entry = %key, "soft delete");
        self.write_object(obj.clone());
        self.inv.set_existing_resource(key, obj);
        self.delete_condition(key);
    }

    fn write_object(&mut self, obj: KubeObject) {
        if self.rl.set_object(obj) {
            self.report.objects_written += 1;
            metrics::counter!("fnrt_objects_written", 1u64);
        }
    }

    pub(crate) fn write_condition(&mut self, key: &EntryKey, c: Condition) {
        if self.kptfile.set_condition(c.clone()) {
            debug!(condition = %c.ty, status = %c.status, "condition written");
            self.report.conditions_written += 1;
            metrics::counter!("fnrt_conditions_written", 1u64);
        }
        self.inv.set_existing_condition(key, Some(c));
    }

    pub(crate) fn delete_condition(&mut self, key: &EntryKey) {
        let ty = key.condition_type();
        if self.kptfile.delete_condition(&ty) {
            debug!(condition = %ty, "condition deleted");
            self.report.conditions_deleted += 1;
        }
        self.inv.set_existing_condition(key, None);
    }
}
