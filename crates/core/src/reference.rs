//! Resource references: the identity key of every document the runtime tracks.
//!
//! A reference with only `api_version` and `kind` set is a *coordinate*; it names a
//! class of resources (used as keys in `Config`). A coordinate whose fields are both
//! [`WILDCARD`] matches any resource, but only for watch classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FnError, Result};

pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectRef {
    /// Coordinate-only reference (no name).
    pub fn gvk(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { api_version: api_version.into(), kind: kind.into(), name: String::new(), namespace: None }
    }

    pub fn new(api_version: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self { api_version: api_version.into(), kind: kind.into(), name: name.into(), namespace: None }
    }

    pub fn wildcard() -> Self {
        Self::gvk(WILDCARD, WILDCARD)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Same coordinate, different name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self { api_version: self.api_version.clone(), kind: self.kind.clone(), name: name.into(), namespace: None }
    }

    pub fn is_wildcard(&self) -> bool {
        self.api_version == WILDCARD && self.kind == WILDCARD
    }

    /// Strip name and namespace.
    pub fn coordinate(&self) -> ObjectRef {
        Self::gvk(self.api_version.clone(), self.kind.clone())
    }

    pub fn same_coordinate(&self, other: &ObjectRef) -> bool {
        self.api_version == other.api_version && self.kind == other.kind
    }

    pub fn validate_gvk(&self) -> Result<()> {
        if self.api_version.is_empty() || self.kind.is_empty() {
            return Err(FnError::InvalidCoordinate(self.to_string()));
        }
        Ok(())
    }

    pub fn validate_gvkn(&self) -> Result<()> {
        if self.api_version.is_empty() || self.kind.is_empty() || self.name.is_empty() {
            return Err(FnError::InvalidReference(self.to_string()));
        }
        Ok(())
    }

    /// A reference usable as a create/update/delete target.
    pub fn validate_target(&self) -> Result<()> {
        if self.is_wildcard() {
            return Err(FnError::WildcardTarget(self.to_string()));
        }
        self.validate_gvkn()
    }

    /// Parse `apiVersion/Kind` (e.g. `v1/ConfigMap`, `nephio.org/v1alpha1/Interface`).
    /// A bare `*` or `*/*` yields the wildcard coordinate.
    pub fn parse_gvk(key: &str) -> Result<ObjectRef> {
        let key = key.trim();
        if key == WILDCARD {
            return Ok(Self::wildcard());
        }
        match key.rsplit_once('/') {
            Some((api_version, kind)) if !api_version.is_empty() && !kind.is_empty() => {
                Ok(Self::gvk(api_version, kind))
            }
            _ => Err(FnError::InvalidCoordinate(format!("{key} (expect v1/Kind or group/v1/Kind)"))),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)?;
        match (&self.namespace, self.name.is_empty()) {
            (_, true) => Ok(()),
            (Some(ns), false) => write!(f, ":{}/{}", ns, self.name),
            (None, false) => write!(f, ":{}", self.name),
        }
    }
}

/// Valid reference lists hold an owner and optionally one child, all usable as targets.
pub fn is_refs_valid(refs: &[ObjectRef]) -> bool {
    match refs {
        [one] => one.validate_target().is_ok(),
        [owner, child] => owner.validate_target().is_ok() && child.validate_target().is_ok(),
        _ => false,
    }
}

/// Human readable form of an owner/child reference list, used in log lines and results.
pub fn refs_string(refs: &[ObjectRef]) -> String {
    let mut out = String::new();
    for (i, r) in refs.iter().enumerate() {
        if i == 0 {
            out.push_str(&format!("forKind: {} forName: {}", r.kind, r.name));
        } else {
            out.push_str(&format!(" ownKind: {} ownName: {}", r.kind, r.name));
        }
    }
    out
}
