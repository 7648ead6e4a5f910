//! Readiness: global (watched resources not tied to a parent) and per governed object.

use std::collections::BTreeMap;

use fnrt_core::{Condition, KubeObject, ObjectRef};
use smallvec::SmallVec;
use tracing::debug;

use crate::config::ResourceKind;
use crate::inventory::{Entry, Inventory, Role};

/// Readiness of one governed object plus the dependency objects handed to generation.
#[derive(Debug, Clone, Default)]
pub struct ReadyCtx {
    pub ready: bool,
    pub for_obj: Option<KubeObject>,
    pub owns: BTreeMap<ObjectRef, KubeObject>,
    pub watches: BTreeMap<ObjectRef, KubeObject>,
}

impl ReadyCtx {
    /// Owned objects first, then watched ones.
    pub fn objects(&self) -> SmallVec<[KubeObject; 4]> {
        self.owns.values().chain(self.watches.values()).cloned().collect()
    }
}

fn condition_holds(c: Option<&Condition>) -> bool {
    matches!(c, Some(c) if !c.is_false())
}

fn child_ready(entry: &Entry) -> bool {
    match entry.kind {
        Some(ResourceKind::LocalOnly) => entry.existing_resource.is_some(),
        _ => condition_holds(entry.existing_condition.as_ref()),
    }
}

impl Inventory {
    /// Every global watch has its resource and no failing condition.
    pub fn is_ready(&self) -> bool {
        let mut ready = true;
        for (target, entry) in self.global_watches() {
            let ok = entry.existing_resource.is_some()
                && !entry.existing_condition.as_ref().map(Condition::is_false).unwrap_or(false);
            if !ok {
                debug!(watch = %target, "global watch not ready");
                ready = false;
            }
        }
        ready
    }

    /// Readiness per governed reference. Only direct children count.
    pub fn ready_map(&self) -> BTreeMap<ObjectRef, ReadyCtx> {
        let mut out = BTreeMap::new();
        for (key, entry) in self.iter() {
            if key.role != Role::For {
                continue;
            }
            let owner = &key.target;
            let mut ctx = ReadyCtx { ready: true, for_obj: entry.existing_resource.clone(), ..Default::default() };

            for (child, e) in self.children(Role::Owned, owner) {
                let retired = e.new_resource.is_none()
                    && e.existing_resource.as_ref().map(KubeObject::is_flagged_for_deletion).unwrap_or(false);
                if retired {
                    continue;
                }
                if !child_ready(e) {
                    debug!(owner = %owner, child = %child, "owned child not ready");
                    ctx.ready = false;
                }
                if let Some(o) = &e.existing_resource {
                    ctx.owns.insert(child.clone(), o.clone());
                }
            }
            for (watched, e) in self.children(Role::Watched, owner) {
                if !condition_holds(e.existing_condition.as_ref()) {
                    debug!(owner = %owner, watch = %watched, "watched dependency not ready");
                    ctx.ready = false;
                }
                if let Some(o) = &e.existing_resource {
                    ctx.watches.insert(watched.clone(), o.clone());
                }
            }
            out.insert(owner.clone(), ctx);
        }
        out
    }
}
