//! Function configuration: the governed coordinate, owned kinds, watches and callbacks.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use fnrt_core::{FnError, KubeObject, ObjectRef};
use serde::{Deserialize, Serialize};

/// How an owned kind is exchanged with the rest of the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Only a condition is exchanged; the resource materializes elsewhere.
    ConditionOnly,
    /// Condition and resource are both written.
    ConditionAndResource,
    /// Resource is written, no condition roundtrip.
    LocalOnly,
}

impl ResourceKind {
    pub fn exchanges_condition(self) -> bool {
        !matches!(self, Self::LocalOnly)
    }

    pub fn materializes_resource(self) -> bool {
        !matches!(self, Self::ConditionOnly)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConditionOnly => "condition-only",
            Self::ConditionAndResource => "condition-and-resource",
            Self::LocalOnly => "local-only",
        })
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "condition-only" | "remote-condition" | "none" => Ok(Self::ConditionOnly),
            "condition-and-resource" | "remote" | "full" => Ok(Self::ConditionAndResource),
            "local-only" | "local" => Ok(Self::LocalOnly),
            other => Err(format!("unknown resource kind `{other}` (condition-only|condition-and-resource|local-only)")),
        }
    }
}

pub type WatchCallbackFn<'a> = Box<dyn FnMut(&KubeObject) -> anyhow::Result<()> + 'a>;
/// Returns the complete desired set of children for one governed object.
pub type PopulateChildrenFn<'a> = Box<dyn FnMut(&KubeObject) -> anyhow::Result<Vec<KubeObject>> + 'a>;
/// Receives the governed object (absent for a synthetic generation) and its owned + watched
/// objects; returns the rendered governed object.
pub type GenerateResourceFn<'a> =
    Box<dyn FnMut(Option<&KubeObject>, &[KubeObject]) -> anyhow::Result<Option<KubeObject>> + 'a>;

pub struct Config<'a> {
    pub for_gvk: ObjectRef,
    pub owns: BTreeMap<ObjectRef, ResourceKind>,
    pub watch: BTreeMap<ObjectRef, WatchCallbackFn<'a>>,
    pub populate_children: Option<PopulateChildrenFn<'a>>,
    pub generate_resource: Option<GenerateResourceFn<'a>>,
}

impl<'a> Config<'a> {
    pub fn new(for_gvk: ObjectRef) -> Self {
        Self { for_gvk: for_gvk.coordinate(), owns: BTreeMap::new(), watch: BTreeMap::new(), populate_children: None, generate_resource: None }
    }

    pub fn owns(mut self, gvk: ObjectRef, kind: ResourceKind) -> Self {
        self.owns.insert(gvk.coordinate(), kind);
        self
    }

    pub fn watch(mut self, gvk: ObjectRef, f: impl FnMut(&KubeObject) -> anyhow::Result<()> + 'a) -> Self {
        self.watch.insert(gvk.coordinate(), Box::new(f));
        self
    }

    pub fn populate(mut self, f: impl FnMut(&KubeObject) -> anyhow::Result<Vec<KubeObject>> + 'a) -> Self {
        self.populate_children = Some(Box::new(f));
        self
    }

    pub fn generate(
        mut self,
        f: impl FnMut(Option<&KubeObject>, &[KubeObject]) -> anyhow::Result<Option<KubeObject>> + 'a,
    ) -> Self {
        self.generate_resource = Some(Box::new(f));
        self
    }

    pub fn validate(&self) -> Result<(), FnError> {
        self.for_gvk.validate_gvk()?;
        if self.for_gvk.is_wildcard() {
            return Err(FnError::WildcardTarget(self.for_gvk.to_string()));
        }
        for gvk in self.owns.keys() {
            gvk.validate_gvk()?;
            if gvk.is_wildcard() {
                return Err(FnError::WildcardTarget(gvk.to_string()));
            }
        }
        for gvk in self.watch.keys() {
            gvk.validate_gvk()?;
        }
        Ok(())
    }

    pub fn is_for(&self, r: &ObjectRef) -> bool {
        self.for_gvk.same_coordinate(r)
    }

    pub fn owned_kind(&self, r: &ObjectRef) -> Option<ResourceKind> {
        self.owns.get(&r.coordinate()).copied()
    }

    /// Exact watch key for `r`.
    pub fn watch_exact(&self, r: &ObjectRef) -> Option<ObjectRef> {
        let gvk = r.coordinate();
        self.watch.contains_key(&gvk).then_some(gvk)
    }

    /// Watch key for a global (owner-less) resource: the exact key, else the wildcard key.
    pub fn watch_global(&self, r: &ObjectRef) -> Option<ObjectRef> {
        self.watch_exact(r).or_else(|| {
            let w = ObjectRef::wildcard();
            self.watch.contains_key(&w).then_some(w)
        })
    }
}

impl fmt::Debug for Config<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("for_gvk", &self.for_gvk)
            .field("owns", &self.owns)
            .field("watch", &self.watch.keys().collect::<Vec<_>>())
            .field("populate_children", &self.populate_children.is_some())
            .field("generate_resource", &self.generate_resource.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_kind_parses_aliases() {
        assert_eq!("full".parse::<ResourceKind>().unwrap(), ResourceKind::ConditionAndResource);
        assert_eq!("remote-condition".parse::<ResourceKind>().unwrap(), ResourceKind::ConditionOnly);
        assert_eq!("Local".parse::<ResourceKind>().unwrap(), ResourceKind::LocalOnly);
        assert!("other".parse::<ResourceKind>().is_err());
        assert!(!ResourceKind::LocalOnly.exchanges_condition());
        assert!(!ResourceKind::ConditionOnly.materializes_resource());
    }

    #[test]
    fn validate_rejects_wildcard_owns_and_empty_for() {
        assert!(Config::new(ObjectRef::gvk("a/v1", "For")).validate().is_ok());
        assert!(Config::new(ObjectRef::gvk("", "For")).validate().is_err());
        assert!(Config::new(ObjectRef::wildcard()).validate().is_err());
        let cfg = Config::new(ObjectRef::gvk("a/v1", "For")).owns(ObjectRef::wildcard(), ResourceKind::LocalOnly);
        assert!(cfg.validate().is_err());
        let cfg = Config::new(ObjectRef::gvk("a/v1", "For")).watch(ObjectRef::wildcard(), |_| Ok(()));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn watch_lookup_falls_back_to_wildcard_for_globals_only() {
        let cfg = Config::new(ObjectRef::gvk("a/v1", "For"))
            .watch(ObjectRef::gvk("infra/v1", "Cluster"), |_| Ok(()))
            .watch(ObjectRef::wildcard(), |_| Ok(()));
        let cluster = ObjectRef::new("infra/v1", "Cluster", "c");
        let other = ObjectRef::new("v1", "ConfigMap", "x");
        assert_eq!(cfg.watch_exact(&cluster), Some(ObjectRef::gvk("infra/v1", "Cluster")));
        assert_eq!(cfg.watch_exact(&other), None);
        assert!(cfg.watch_global(&other).unwrap().is_wildcard());
        assert!(cfg.is_for(&ObjectRef::new("a/v1", "For", "f")));
    }
}
