//! Readiness-gated generation of governed objects.

use fnrt_core::{Condition, ConditionStatus, KubeObject, ObjectRef, Severity, DELETE_ANNOTATION};
use tracing::{debug, info};

use crate::config::GenerateResourceFn;
use crate::inventory::EntryKey;
use crate::pipeline::{Sdk, Stage};

impl Sdk<'_, '_> {
    /// Evaluate readiness and render every ready governed object.
    ///
    /// When the package is not ready nothing is generated; condition-terminal functions (no
    /// owned kinds) soft-delete their governed objects, others leave them untouched. When
    /// ready, each governed object is judged on its own children. A package without any
    /// governed object gets one generation named after the package.
    pub fn generate(&mut self) {
        let ready = self.inv.is_ready();
        self.report.ready = Some(ready);
        info!(ready, "global readiness");
        let map = self.inv.ready_map();

        if !ready {
            if self.cfg.owns.is_empty() {
                for (r, ctx) in &map {
                    if let Some(obj) = &ctx.for_obj {
                        self.soft_delete(&EntryKey::governed(r.clone()), obj.clone());
                    }
                }
            }
            self.rl.add_result("dependencies not ready, generation skipped", Severity::Info, None);
            self.report.stage = Stage::Generated;
            return;
        }

        // conditions of governed objects that are gone
        for (r, ctx) in &map {
            if ctx.for_obj.is_none() {
                self.delete_condition(&EntryKey::governed(r.clone()));
            }
        }

        let Some(mut generate) = self.cfg.generate_resource.take() else {
            self.report.stage = Stage::Generated;
            return;
        };

        if map.values().all(|ctx| ctx.for_obj.is_none()) {
            let name = self.kptfile.name().to_string();
            if name.is_empty() {
                let (gvk, at) = (self.cfg.for_gvk.clone(), self.kptfile_ref.clone());
                self.instance_failed(&gvk, Some(at), "package has no name to generate from");
            } else {
                let r = self.cfg.for_gvk.with_name(name);
                self.generate_one(&mut generate, r, None, &[]);
            }
        }

        for (r, ctx) in map {
            let Some(for_obj) = ctx.for_obj.as_ref() else { continue };
            if self.failed.contains(&r) {
                debug!(owner = %r, "skip failed instance");
                continue;
            }
            if !ctx.ready {
                debug!(owner = %r, "instance not ready");
                if self.cfg.owns.is_empty() {
                    self.soft_delete(&EntryKey::governed(r.clone()), for_obj.clone());
                }
                continue;
            }
            let objs = ctx.objects();
            self.generate_one(&mut generate, r, Some(for_obj), &objs);
        }

        self.cfg.generate_resource = Some(generate);
        self.report.stage = Stage::Generated;
    }

    fn generate_one(
        &mut self,
        generate: &mut GenerateResourceFn<'_>,
        r: ObjectRef,
        for_obj: Option<&KubeObject>,
        objs: &[KubeObject],
    ) {
        let at = for_obj.map(KubeObject::reference).unwrap_or_else(|| self.kptfile_ref.clone());
        let mut obj = match generate(for_obj, objs) {
            Ok(Some(obj)) => obj,
            Ok(None) => {
                self.instance_failed(&r, Some(at), format!("cannot generate resource, generator returned nothing for {r}"));
                return;
            }
            Err(e) => {
                self.instance_failed(&r, Some(at), format!("error generating {r}: {e:#}"));
                return;
            }
        };
        obj.remove_annotation(DELETE_ANNOTATION);
        if self.cfg.owns.is_empty() {
            if let Err(e) = obj.set_owner(&r) {
                self.instance_failed(&r, Some(at), format!("error generating {r}: {e}"));
                return;
            }
        }
        debug!(owner = %r, inputs = objs.len(), "generated");
        self.report.generated += 1;

        let key = EntryKey::governed(r);
        self.inv.add_new(key.clone(), None, obj);
        self.write_condition(&key, Condition::new(key.condition_type(), ConditionStatus::True, "done"));
        let diff = self.inv.diff(|k| *k == key);
        self.commit(diff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ResourceKind};
    use fnrt_core::ResourceList;

    #[test]
    fn package_without_governed_objects_generates_one_named_after_it() {
        let mut rl = ResourceList::new(vec![KubeObject::new("kpt.dev/v1", "Kptfile", "upf")]);
        let cfg = Config::new(ObjectRef::gvk("req/v1", "Interface"))
            .generate(|for_obj, _| {
                assert!(for_obj.is_none());
                Ok(Some(KubeObject::new("req/v1", "Interface", "upf")))
            });
        let report = crate::run(&mut rl, cfg);
        assert_eq!(report.generated, 1);
        assert_eq!(rl.items.len(), 2);
        assert!(rl.items[1].is_owned_by(&ObjectRef::new("req/v1", "Interface", "upf")));
    }

    #[test]
    fn unnamed_package_cannot_generate() {
        let mut rl = ResourceList::new(vec![KubeObject::new("kpt.dev/v1", "Kptfile", "")]);
        let cfg = Config::new(ObjectRef::gvk("req/v1", "Interface")).generate(|_, _| Ok(None));
        let report = crate::run(&mut rl, cfg);
        assert_eq!(report.instance_failures, 1);
        assert_eq!(report.generated, 0);
    }

    #[test]
    fn owner_with_children_is_left_alone_when_not_ready() {
        let mut rl = ResourceList::new(vec![
            KubeObject::new("kpt.dev/v1", "Kptfile", "upf"),
            KubeObject::new("infra/v1", "Cluster", "edge"),
            KubeObject::new("req/v1", "Interface", "n3"),
        ]);
        let edge = ObjectRef::new("infra/v1", "Cluster", "edge");
        rl.items[0]
            .set(
                &["status", "conditions"],
                serde_json::json!([{"type": fnrt_core::condition_type(&edge), "status": "False"}]),
            )
            .unwrap();
        let cfg = Config::new(ObjectRef::gvk("req/v1", "Interface"))
            .owns(ObjectRef::gvk("ipam/v1", "IPAllocation"), ResourceKind::ConditionAndResource)
            .watch(ObjectRef::gvk("infra/v1", "Cluster"), |_| Ok(()))
            .generate(|_, _| panic!("generation must not run"));
        let report = crate::run(&mut rl, cfg);
        assert_eq!(report.ready, Some(false));
        assert!(!rl.items[2].is_flagged_for_deletion());
    }
}
