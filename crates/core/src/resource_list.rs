//! The KRM `ResourceList` envelope: ordered items plus function results.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FnError, Result};
use crate::kptfile::{is_kptfile, package_path, KPTFILE_PATH};
use crate::object::KubeObject;
use crate::reference::ObjectRef;

pub const RESOURCE_LIST_API_VERSION: &str = "config.kubernetes.io/v1";
pub const RESOURCE_LIST_KIND: &str = "ResourceList";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FnResult {
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ref: Option<ObjectRef>,
}

fn default_api_version() -> String { RESOURCE_LIST_API_VERSION.to_string() }
fn default_kind() -> String { RESOURCE_LIST_KIND.to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub items: Vec<KubeObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_config: Option<KubeObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<FnResult>,
}

impl Default for ResourceList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ResourceList {
    pub fn new(items: Vec<KubeObject>) -> Self {
        Self { api_version: default_api_version(), kind: default_kind(), items, function_config: None, results: Vec::new() }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let val: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let json = serde_json::to_value(val)?;
        if let Some(items) = json.get("items").and_then(|v| v.as_array()) {
            if let Some(i) = items.iter().position(|v| !v.is_object()) {
                return Err(FnError::invalid_object(format!("items[{i}] is not a mapping")));
            }
        }
        Ok(serde_json::from_value(json)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn objects(&self) -> &[KubeObject] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// The package's root Kptfile: the one whose path annotation is `Kptfile`, or the first
    /// Kptfile when none of them carries a path.
    pub fn root_kptfile(&self) -> Option<(usize, &KubeObject)> {
        let mut kptfiles = self.items.iter().enumerate().filter(|(_, o)| is_kptfile(o));
        let first = kptfiles.clone().next();
        if let Some(root) = kptfiles.clone().find(|(_, o)| package_path(o) == Some(KPTFILE_PATH)) {
            return Some(root);
        }
        if kptfiles.all(|(_, o)| package_path(o).is_none()) {
            return first;
        }
        None
    }

    /// Position of the item with the same apiVersion, kind and name. Namespaces are not part
    /// of item identity.
    pub fn position_of(&self, r: &ObjectRef) -> Option<usize> {
        self.items
            .iter()
            .position(|o| o.api_version() == r.api_version && o.kind() == r.kind && o.name() == r.name)
    }

    /// Write `obj` at the position of the item with the same identity, or append it. An
    /// item's namespace is kept when `obj` carries none. Returns false when an identical
    /// item is already in place.
    pub fn set_object(&mut self, mut obj: KubeObject) -> bool {
        let r = obj.reference();
        match self.position_of(&r) {
            Some(idx) => {
                if obj.namespace().is_none() {
                    if let Some(ns) = self.items[idx].namespace().map(str::to_string) {
                        if let Err(e) = obj.set(&["metadata", "namespace"], serde_json::Value::String(ns)) {
                            warn!(object = %r, error = %e, "cannot keep namespace");
                        }
                    }
                }
                if self.items[idx] == obj {
                    return false;
                }
                debug!(object = %r, idx, "replace item");
                self.items[idx] = obj;
                true
            }
            None => {
                debug!(object = %r, "append item");
                self.items.push(obj);
                true
            }
        }
    }

    pub fn add_result(&mut self, message: impl Into<String>, severity: Severity, resource_ref: Option<ObjectRef>) {
        self.results.push(FnResult { message: message.into(), severity, resource_ref });
    }

    pub fn error(&mut self, err: impl fmt::Display, resource_ref: Option<ObjectRef>) {
        self.add_result(err.to_string(), Severity::Error, resource_ref);
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|r| r.severity == Severity::Error)
    }
}
