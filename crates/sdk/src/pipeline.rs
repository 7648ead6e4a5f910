//! Pipeline driver: load manifest, classify, watch, populate children, commit, generate,
//! write manifest.

use std::fmt;

use anyhow::Context;
use fnrt_core::{FnError, Kptfile, KubeObject, ObjectRef, ResourceList};
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::inventory::{entry_ref, EntryKey, Inventory, Role};

/// Last stage a run reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    #[default]
    Init,
    ManifestLoaded,
    InventoryPopulated,
    GlobalWatchesCalled,
    ChildrenPopulated,
    ChildrenCommitted,
    Generated,
    ManifestWritten,
    Aborted,
}

/// Summary of one invocation. User-facing diagnostics live in the ResourceList results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub stage: Stage,
    pub unmatched: usize,
    pub objects_written: usize,
    pub conditions_written: usize,
    pub conditions_deleted: usize,
    pub instance_failures: usize,
    pub generated: usize,
    /// Global readiness, once evaluated.
    pub ready: Option<bool>,
}

impl RunReport {
    pub fn aborted(&self) -> bool {
        self.stage == Stage::Aborted
    }
}

/// Run the whole pipeline over `rl`. Fatal errors leave a single error result and no manifest
/// write.
pub fn run(rl: &mut ResourceList, cfg: Config<'_>) -> RunReport {
    match Sdk::new(rl, cfg) {
        Ok(sdk) => sdk.run(),
        Err(e) => abort(rl, RunReport::default(), e, None),
    }
}

fn abort(rl: &mut ResourceList, mut report: RunReport, err: impl fmt::Display, at: Option<ObjectRef>) -> RunReport {
    error!(error = %err, "run aborted");
    metrics::counter!("fnrt_fatal", 1u64);
    rl.error(err, at);
    report.stage = Stage::Aborted;
    report
}

/// One invocation over a ResourceList. Owns the inventory and the manifest conditions for
/// the lifetime of the run.
pub struct Sdk<'r, 'c> {
    pub(crate) rl: &'r mut ResourceList,
    pub(crate) cfg: Config<'c>,
    pub(crate) inv: Inventory,
    pub(crate) kptfile: Kptfile,
    kptfile_idx: usize,
    pub(crate) kptfile_ref: ObjectRef,
    pub(crate) failed: FxHashSet<ObjectRef>,
    pub(crate) report: RunReport,
}

impl<'r, 'c> Sdk<'r, 'c> {
    /// Validate `cfg` and load the manifest.
    pub fn new(rl: &'r mut ResourceList, cfg: Config<'c>) -> Result<Self, FnError> {
        metrics::counter!("fnrt_runs", 1u64);
        cfg.validate()?;
        if rl.is_empty() {
            return Err(FnError::EmptyResourceList);
        }
        let (kptfile_idx, obj) = rl.root_kptfile().ok_or(FnError::MissingKptfile)?;
        let kptfile = Kptfile::from_object(obj)?;
        let kptfile_ref = obj.reference();
        debug!(package = kptfile.name(), conditions = kptfile.conditions().len(), "manifest loaded");
        Ok(Self {
            rl,
            cfg,
            inv: Inventory::new(),
            kptfile,
            kptfile_idx,
            kptfile_ref,
            failed: FxHashSet::default(),
            report: RunReport { stage: Stage::ManifestLoaded, ..Default::default() },
        })
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inv
    }

    pub fn kptfile(&self) -> &Kptfile {
        &self.kptfile
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn run(mut self) -> RunReport {
        self.populate_inventory();
        if let Err((err, at)) = self.call_watches() {
            return abort(self.rl, self.report, format!("{err:#}"), Some(at));
        }
        self.populate_children();
        self.update_children();
        self.generate();
        self.write_manifest();
        info!(
            unmatched = self.report.unmatched,
            objects = self.report.objects_written,
            conditions = self.report.conditions_written,
            failures = self.report.instance_failures,
            generated = self.report.generated,
            "run complete"
        );
        self.report
    }

    /// Classify every input object, then every manifest condition.
    pub fn populate_inventory(&mut self) {
        for (idx, obj) in self.rl.items.iter().enumerate() {
            if idx != self.kptfile_idx {
                self.inv.observe_object(&self.cfg, obj);
            }
        }
        for c in self.kptfile.conditions() {
            self.inv.observe_condition(&self.cfg, c);
        }
        for line in self.inv.list() {
            debug!(role = %line.role, target = %line.target, owner = ?line.owner, existing = line.existing, "inventory");
        }
        self.report.unmatched = self.inv.unmatched();
        self.report.stage = Stage::InventoryPopulated;
    }

    /// Hand every observed watched object to its callback. The first error aborts the run
    /// and carries the object it was raised for.
    pub fn call_watches(&mut self) -> Result<(), (anyhow::Error, ObjectRef)> {
        let observed: Vec<(ObjectRef, KubeObject)> = self
            .inv
            .iter()
            .filter(|(k, _)| k.role == Role::Watched)
            .filter_map(|(k, e)| {
                let gvk = match k.owner {
                    Some(_) => self.cfg.watch_exact(&k.target),
                    None => self.cfg.watch_global(&k.target),
                }?;
                e.existing_resource.clone().map(|o| (gvk, o))
            })
            .collect();
        for (gvk, obj) in observed {
            if let Some(cb) = self.cfg.watch.get_mut(&gvk) {
                debug!(watch = %gvk, object = %obj.reference(), "watch callback");
                cb(&obj).with_context(|| format!("watch callback for {}", obj.reference())).map_err(|e| (e, obj.reference()))?;
            }
        }
        self.report.stage = Stage::GlobalWatchesCalled;
        Ok(())
    }

    /// Ask the populate callback for the desired children of every governed object.
    pub fn populate_children(&mut self) {
        let parents: Vec<KubeObject> = self.inv.governed().filter_map(|(_, e)| e.existing_resource.clone()).collect();
        if let Some(mut populate) = self.cfg.populate_children.take() {
            for parent in parents {
                let owner = entry_ref(&parent);
                match populate(&parent) {
                    Ok(children) => {
                        debug!(owner = %owner, children = children.len(), "children populated");
                        for child in children {
                            self.register_child(&parent, &owner, child);
                        }
                    }
                    Err(e) => self.instance_failed(&owner, Some(parent.reference()), format!("populate children: {e:#}")),
                }
            }
            self.cfg.populate_children = Some(populate);
        }
        self.report.stage = Stage::ChildrenPopulated;
    }

    fn register_child(&mut self, parent: &KubeObject, owner: &ObjectRef, mut child: KubeObject) {
        if child.name().is_empty() {
            if let Err(e) = child.set_name(parent.name()) {
                self.instance_failed(owner, Some(parent.reference()), format!("child of {owner}: {e}"));
                return;
            }
        }
        let target = entry_ref(&child);
        match self.cfg.owned_kind(&target) {
            Some(kind) => self.inv.add_new(EntryKey::owned(owner.clone(), target), Some(kind), child),
            None => self.instance_failed(
                owner,
                Some(parent.reference()),
                format!("child {target} is not of an owned kind"),
            ),
        }
    }

    /// Diff and commit owned entries, skipping the children of failed parents.
    pub fn update_children(&mut self) {
        if self.cfg.populate_children.is_some() {
            let failed = &self.failed;
            let diff = self
                .inv
                .diff(|k| k.role == Role::Owned && !k.owner.as_ref().map(|o| failed.contains(o)).unwrap_or(false));
            debug!(actions = diff.actions(), failures = diff.failures.len(), "children diff");
            self.commit(diff);
        }
        self.report.stage = Stage::ChildrenCommitted;
    }

    pub fn write_manifest(&mut self) {
        match self.kptfile.to_object() {
            Ok(obj) => {
                self.rl.set_object(obj);
            }
            Err(e) => self.rl.error(e, Some(self.kptfile_ref.clone())),
        }
        self.report.stage = Stage::ManifestWritten;
    }

    /// Record a failure scoped to one governed instance. The run continues.
    pub(crate) fn instance_failed(&mut self, owner: &ObjectRef, at: Option<ObjectRef>, msg: impl fmt::Display) {
        warn!(owner = %owner, error = %msg, "instance failed");
        metrics::counter!("fnrt_instance_failures", 1u64);
        self.failed.insert(owner.clone());
        self.report.instance_failures += 1;
        self.rl.error(msg, at);
    }

    /// Full reference of the governed object behind `owner`, for attaching results.
    pub(crate) fn parent_ref(&self, owner: &ObjectRef) -> ObjectRef {
        self.inv
            .get(&EntryKey::governed(owner.clone()))
            .and_then(|e| e.existing_resource.as_ref())
            .map(KubeObject::reference)
            .unwrap_or_else(|| owner.clone())
    }
}

impl fmt::Debug for Sdk<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sdk")
            .field("cfg", &self.cfg)
            .field("entries", &self.inv.len())
            .field("report", &self.report)
            .finish()
    }
}
