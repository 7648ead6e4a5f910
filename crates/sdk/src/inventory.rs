//! Inventory: classifies package objects and manifest conditions into for/owned/watched
//! entries and holds the existing and desired state of each.

use std::collections::BTreeMap;
use std::fmt;

use fnrt_core::{
    condition_type, pair_condition_type, parse_condition_type, Condition, ConditionKey, KubeObject, ObjectRef,
    OWNER_ANNOTATION,
};
use serde::Serialize;
use smallvec::{smallvec, SmallVec};
use tracing::debug;

use crate::config::{Config, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    For,
    Owned,
    Watched,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::For => "for",
            Self::Owned => "owned",
            Self::Watched => "watched",
        })
    }
}

/// Identity of an inventory entry. `owner` is set for owned children and per-parent
/// watches, and absent for governed resources and global watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntryKey {
    pub role: Role,
    pub owner: Option<ObjectRef>,
    pub target: ObjectRef,
}

impl EntryKey {
    pub fn governed(target: ObjectRef) -> Self {
        Self { role: Role::For, owner: None, target }
    }

    pub fn owned(owner: ObjectRef, target: ObjectRef) -> Self {
        Self { role: Role::Owned, owner: Some(owner), target }
    }

    pub fn watched(owner: Option<ObjectRef>, target: ObjectRef) -> Self {
        Self { role: Role::Watched, owner, target }
    }

    pub fn is_global_watch(&self) -> bool {
        self.role == Role::Watched && self.owner.is_none()
    }

    pub fn condition_type(&self) -> String {
        match &self.owner {
            Some(owner) => pair_condition_type(owner, &self.target),
            None => condition_type(&self.target),
        }
    }

    /// Owner first, then target.
    pub fn refs(&self) -> SmallVec<[ObjectRef; 2]> {
        match &self.owner {
            Some(owner) => smallvec![owner.clone(), self.target.clone()],
            None => smallvec![self.target.clone()],
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{} {} (owner {})", self.role, self.target, owner),
            None => write!(f, "{} {}", self.role, self.target),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub existing_condition: Option<Condition>,
    pub existing_resource: Option<KubeObject>,
    pub new_resource: Option<KubeObject>,
    /// Declared kind, owned entries only.
    pub kind: Option<ResourceKind>,
}

impl Entry {
    pub fn is_empty(&self) -> bool {
        self.existing_condition.is_none() && self.existing_resource.is_none() && self.new_resource.is_none()
    }

    pub fn exchanges_condition(&self) -> bool {
        self.kind.map(ResourceKind::exchanges_condition).unwrap_or(true)
    }

    pub fn materializes_resource(&self) -> bool {
        self.kind.map(ResourceKind::materializes_resource).unwrap_or(true)
    }
}

/// Observed state handed to [`Inventory::add_existing`].
#[derive(Debug, Clone)]
pub enum Existing {
    Resource(KubeObject),
    Condition(Condition),
}

/// One row of the inventory listing.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryLine {
    pub role: Role,
    pub owner: Option<String>,
    pub target: String,
    pub kind: Option<String>,
    pub condition: Option<String>,
    pub existing: bool,
    pub desired: bool,
}

#[derive(Debug, Default)]
pub struct Inventory {
    entries: BTreeMap<EntryKey, Entry>,
    unmatched: usize,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_existing(&mut self, key: EntryKey, kind: Option<ResourceKind>, item: Existing) {
        let entry = self.entries.entry(key).or_default();
        if kind.is_some() {
            entry.kind = kind;
        }
        match item {
            Existing::Resource(o) => entry.existing_resource = Some(o),
            Existing::Condition(c) => entry.existing_condition = Some(c),
        }
    }

    pub fn add_new(&mut self, key: EntryKey, kind: Option<ResourceKind>, obj: KubeObject) {
        let entry = self.entries.entry(key).or_default();
        if kind.is_some() {
            entry.kind = kind;
        }
        entry.new_resource = Some(obj);
    }

    /// Write back a committed condition (`None` removes it).
    pub fn set_existing_condition(&mut self, key: &EntryKey, c: Option<Condition>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.existing_condition = c;
        } else if let Some(c) = c {
            self.entries.insert(key.clone(), Entry { existing_condition: Some(c), ..Default::default() });
        }
        self.prune_key(key);
    }

    /// Write back a committed resource.
    pub fn set_existing_resource(&mut self, key: &EntryKey, obj: KubeObject) {
        self.entries.entry(key.clone()).or_default().existing_resource = Some(obj);
    }

    pub fn get(&self, key: &EntryKey) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntryKey, &Entry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn governed(&self) -> impl Iterator<Item = (&ObjectRef, &Entry)> {
        self.entries.iter().filter(|(k, _)| k.role == Role::For).map(|(k, e)| (&k.target, e))
    }

    pub fn children<'s>(&'s self, role: Role, owner: &'s ObjectRef) -> impl Iterator<Item = (&'s ObjectRef, &'s Entry)> + 's {
        self.entries
            .iter()
            .filter(move |(k, _)| k.role == role && k.owner.as_ref() == Some(owner))
            .map(|(k, e)| (&k.target, e))
    }

    pub fn global_watches(&self) -> impl Iterator<Item = (&ObjectRef, &Entry)> {
        self.entries.iter().filter(|(k, _)| k.is_global_watch()).map(|(k, e)| (&k.target, e))
    }

    pub fn unmatched(&self) -> usize {
        self.unmatched
    }

    pub fn note_unmatched(&mut self) {
        self.unmatched += 1;
        metrics::counter!("fnrt_unmatched_objects", 1u64);
    }

    fn prune_key(&mut self, key: &EntryKey) {
        if self.entries.get(key).map(Entry::is_empty) == Some(true) {
            self.entries.remove(key);
        }
    }

    /// Classify one package object against `cfg` and record it. Objects matching no
    /// declared kind are skipped and counted.
    pub fn observe_object(&mut self, cfg: &Config<'_>, obj: &KubeObject) {
        match classify_object(cfg, obj) {
            Some((key, kind)) => {
                debug!(entry = %key, "observe object");
                self.add_existing(key, kind, Existing::Resource(obj.clone()));
            }
            None => {
                debug!(object = %obj.reference(), "object matches no declared kind");
                self.note_unmatched();
            }
        }
    }

    /// Attribute one manifest condition to its entry. Conditions of other functions and
    /// of undeclared kinds are skipped and counted.
    pub fn observe_condition(&mut self, cfg: &Config<'_>, c: &Condition) {
        match self.classify_condition(cfg, c) {
            Some((key, kind)) => {
                debug!(entry = %key, status = %c.status, "observe condition");
                self.add_existing(key, kind, Existing::Condition(c.clone()));
            }
            None => {
                debug!(condition = %c.ty, "condition matches no declared kind");
                self.note_unmatched();
            }
        }
    }

    fn classify_condition(&self, cfg: &Config<'_>, c: &Condition) -> Option<(EntryKey, Option<ResourceKind>)> {
        match parse_condition_type(&c.ty)? {
            ConditionKey::Single(target) => {
                if cfg.is_for(&target) {
                    return Some((EntryKey::governed(target), None));
                }
                let key = EntryKey::watched(None, target);
                // wildcard watches only pick up conditions of resources already observed
                if cfg.watch_exact(&key.target).is_some() || self.entries.contains_key(&key) {
                    return Some((key, None));
                }
                None
            }
            ConditionKey::Pair { owner, child } => {
                if !cfg.is_for(&owner) {
                    return None;
                }
                if let Some(kind) = cfg.owned_kind(&child) {
                    return kind.exchanges_condition().then(|| (EntryKey::owned(owner, child), Some(kind)));
                }
                cfg.watch_exact(&child).map(|_| (EntryKey::watched(Some(owner), child), None))
            }
        }
    }

    pub fn list(&self) -> Vec<InventoryLine> {
        self.entries
            .iter()
            .map(|(k, e)| InventoryLine {
                role: k.role,
                owner: k.owner.as_ref().map(ToString::to_string),
                target: k.target.to_string(),
                kind: e.kind.map(|k| k.to_string()),
                condition: e.existing_condition.as_ref().map(|c| c.status.to_string()),
                existing: e.existing_resource.is_some(),
                desired: e.new_resource.is_some(),
            })
            .collect()
    }
}

/// Entry target for `obj`. Condition types carry no namespace, so neither do entry keys.
pub fn entry_ref(obj: &KubeObject) -> ObjectRef {
    ObjectRef::new(obj.api_version(), obj.kind(), obj.name())
}

/// Owner named by the ownership annotation, when it is a governed reference.
pub fn owner_of(cfg: &Config<'_>, obj: &KubeObject) -> Option<ObjectRef> {
    let value = obj.annotation(OWNER_ANNOTATION)?;
    match parse_condition_type(value)? {
        ConditionKey::Single(owner) if cfg.is_for(&owner) => Some(owner),
        _ => None,
    }
}

/// Role lookup for a package object. Pure; `None` for undeclared kinds and owner-less
/// owned kinds.
pub fn classify_object(cfg: &Config<'_>, obj: &KubeObject) -> Option<(EntryKey, Option<ResourceKind>)> {
    let target = entry_ref(obj);
    if cfg.is_for(&target) {
        return Some((EntryKey::governed(target), None));
    }
    if let Some(kind) = cfg.owned_kind(&target) {
        let owner = owner_of(cfg, obj)?;
        return Some((EntryKey::owned(owner, target), Some(kind)));
    }
    match owner_of(cfg, obj) {
        Some(owner) if cfg.watch_exact(&target).is_some() => Some((EntryKey::watched(Some(owner), target), None)),
        _ => cfg.watch_global(&target).map(|_| (EntryKey::watched(None, target), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnrt_core::ConditionStatus;

    fn cfg() -> Config<'static> {
        Config::new(ObjectRef::gvk("req/v1", "Interface"))
            .owns(ObjectRef::gvk("ipam/v1", "IPAllocation"), ResourceKind::ConditionAndResource)
            .owns(ObjectRef::gvk("k8s.cni/v1", "NAD"), ResourceKind::ConditionOnly)
            .owns(ObjectRef::gvk("v1", "ConfigMap"), ResourceKind::LocalOnly)
            .watch(ObjectRef::gvk("infra/v1", "ClusterContext"), |_| Ok(()))
    }

    fn owned_by(mut o: KubeObject, owner: &ObjectRef) -> KubeObject {
        o.set_owner(owner).unwrap();
        o
    }

    #[test]
    fn objects_classify_by_role() {
        let cfg = cfg();
        let itfce = ObjectRef::new("req/v1", "Interface", "n3");
        let mut inv = Inventory::new();
        inv.observe_object(&cfg, &KubeObject::new("req/v1", "Interface", "n3"));
        inv.observe_object(&cfg, &owned_by(KubeObject::new("ipam/v1", "IPAllocation", "n3"), &itfce));
        inv.observe_object(&cfg, &KubeObject::new("infra/v1", "ClusterContext", "edge"));
        inv.observe_object(&cfg, &owned_by(KubeObject::new("infra/v1", "ClusterContext", "scoped"), &itfce));
        inv.observe_object(&cfg, &KubeObject::new("apps/v1", "Deployment", "x"));
        // owned kind without an owner annotation has nowhere to go
        inv.observe_object(&cfg, &KubeObject::new("ipam/v1", "IPAllocation", "orphan"));

        assert_eq!(inv.unmatched(), 2);
        assert_eq!(inv.governed().count(), 1);
        assert_eq!(inv.children(Role::Owned, &itfce).count(), 1);
        assert_eq!(inv.children(Role::Watched, &itfce).count(), 1);
        let globals: Vec<_> = inv.global_watches().map(|(r, _)| r.name.clone()).collect();
        assert_eq!(globals, vec!["edge".to_string()]);
        let child = EntryKey::owned(itfce, ObjectRef::new("ipam/v1", "IPAllocation", "n3"));
        assert_eq!(inv.get(&child).unwrap().kind, Some(ResourceKind::ConditionAndResource));
    }

    #[test]
    fn conditions_attach_to_entries() {
        let cfg = cfg();
        let itfce = ObjectRef::new("req/v1", "Interface", "n3");
        let alloc = ObjectRef::new("ipam/v1", "IPAllocation", "n3");
        let cm = ObjectRef::new("v1", "ConfigMap", "n3");
        let mut inv = Inventory::new();
        let t = |ty: String| Condition::new(ty, ConditionStatus::True, "");
        inv.observe_condition(&cfg, &t(condition_type(&itfce)));
        inv.observe_condition(&cfg, &t(pair_condition_type(&itfce, &alloc)));
        // local-only kinds exchange no condition
        inv.observe_condition(&cfg, &t(pair_condition_type(&itfce, &cm)));
        inv.observe_condition(&cfg, &t("Ready".into()));
        inv.observe_condition(&cfg, &t(condition_type(&ObjectRef::new("infra/v1", "ClusterContext", "edge"))));

        assert_eq!(inv.unmatched(), 2);
        assert!(inv.get(&EntryKey::governed(itfce.clone())).unwrap().existing_condition.is_some());
        let child = inv.get(&EntryKey::owned(itfce, alloc)).unwrap();
        assert!(child.existing_condition.is_some() && child.existing_resource.is_none());
        assert_eq!(inv.global_watches().count(), 1);
    }

    #[test]
    fn wildcard_watch_takes_conditions_only_for_observed_resources() {
        let cfg = Config::new(ObjectRef::gvk("req/v1", "Interface")).watch(ObjectRef::wildcard(), |_| Ok(()));
        let seen = ObjectRef::new("v1", "Secret", "s");
        let unseen = ObjectRef::new("v1", "Secret", "other");
        let mut inv = Inventory::new();
        inv.observe_object(&cfg, &KubeObject::new("v1", "Secret", "s"));
        inv.observe_condition(&cfg, &Condition::new(condition_type(&seen), ConditionStatus::False, ""));
        inv.observe_condition(&cfg, &Condition::new(condition_type(&unseen), ConditionStatus::False, ""));
        assert_eq!(inv.unmatched(), 1);
        let e = inv.get(&EntryKey::watched(None, seen)).unwrap();
        assert!(e.existing_condition.is_some() && e.existing_resource.is_some());
    }

    #[test]
    fn clearing_the_last_slot_drops_the_entry() {
        let key = EntryKey::governed(ObjectRef::new("req/v1", "Interface", "n3"));
        let mut inv = Inventory::new();
        inv.set_existing_condition(&key, Some(Condition::new(key.condition_type(), ConditionStatus::True, "done")));
        assert_eq!(inv.len(), 1);
        inv.set_existing_condition(&key, None);
        assert!(inv.is_empty());
    }

    #[test]
    fn entry_keys_render_condition_types() {
        let owner = ObjectRef::new("req/v1", "Interface", "n3");
        let child = ObjectRef::new("ipam/v1", "IPAllocation", "n3");
        assert_eq!(EntryKey::governed(owner.clone()).condition_type(), "req/v1.Interface.n3");
        let k = EntryKey::owned(owner.clone(), child.clone());
        assert_eq!(k.condition_type(), "req/v1.Interface.n3_ipam/v1.IPAllocation.n3");
        assert_eq!(k.refs().as_slice(), &[owner, child]);
    }
}
