//! `KubeObject`: a structured KRM document backed by `serde_json::Value`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::condition::condition_type;
use crate::error::{FnError, Result};
use crate::reference::ObjectRef;

/// Ownership annotation; value is the condition type of the owner reference.
pub const OWNER_ANNOTATION: &str = "fnruntime.nephio.org/owner";
/// Soft-deletion annotation; value is `"true"`.
pub const DELETE_ANNOTATION: &str = "fnruntime.nephio.org/delete";
pub const PATH_ANNOTATION: &str = "internal.config.kubernetes.io/path";
pub const LEGACY_PATH_ANNOTATION: &str = "config.kubernetes.io/path";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KubeObject(Json);

impl KubeObject {
    pub fn new(api_version: &str, kind: &str, name: &str) -> Self {
        Self(serde_json::json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": { "name": name },
        }))
    }

    pub fn from_value(v: Json) -> Result<Self> {
        if !v.is_object() {
            return Err(FnError::invalid_object("document root must be a mapping"));
        }
        Ok(Self(v))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let val: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(serde_json::to_value(val)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    pub fn as_value(&self) -> &Json { &self.0 }
    pub fn into_value(self) -> Json { self.0 }

    pub fn api_version(&self) -> &str { self.get_string(&["apiVersion"]).unwrap_or("") }
    pub fn kind(&self) -> &str { self.get_string(&["kind"]).unwrap_or("") }
    pub fn name(&self) -> &str { self.get_string(&["metadata", "name"]).unwrap_or("") }
    pub fn namespace(&self) -> Option<&str> { self.get_string(&["metadata", "namespace"]) }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.set(&["metadata", "name"], Json::String(name.to_string()))
    }

    pub fn reference(&self) -> ObjectRef {
        let r = ObjectRef::new(self.api_version(), self.kind(), self.name());
        match self.namespace() {
            Some(ns) => r.with_namespace(ns),
            None => r,
        }
    }

    pub fn coordinate(&self) -> ObjectRef {
        ObjectRef::gvk(self.api_version(), self.kind())
    }

    pub fn get(&self, path: &[&str]) -> Option<&Json> {
        path.iter().try_fold(&self.0, |cur, seg| cur.get(*seg))
    }

    /// Set `value` at `path`, creating intermediate mappings. Fails when an intermediate
    /// field exists but is not a mapping.
    pub fn set(&mut self, path: &[&str], value: Json) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            return Err(FnError::invalid_object("empty field path"));
        };
        let mut cur = &mut self.0;
        for (i, seg) in parents.iter().enumerate() {
            let map = cur
                .as_object_mut()
                .ok_or_else(|| FnError::invalid_object(format!("field `{}` is not a mapping", path[..i].join("."))))?;
            cur = map.entry(seg.to_string()).or_insert_with(|| Json::Object(Map::new()));
        }
        let map = cur
            .as_object_mut()
            .ok_or_else(|| FnError::invalid_object(format!("field `{}` is not a mapping", parents.join("."))))?;
        map.insert(last.to_string(), value);
        Ok(())
    }

    pub fn remove(&mut self, path: &[&str]) -> Option<Json> {
        let (last, parents) = path.split_last()?;
        let mut cur = &mut self.0;
        for seg in parents {
            cur = cur.get_mut(*seg)?;
        }
        cur.as_object_mut()?.remove(*last)
    }

    pub fn get_string(&self, path: &[&str]) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    pub fn get_int(&self, path: &[&str]) -> Option<i64> {
        self.get(path).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, path: &[&str]) -> Option<bool> {
        self.get(path).and_then(|v| v.as_bool())
    }

    /// String-valued entries of the mapping at `path`; non-string values are skipped.
    pub fn get_string_map(&self, path: &[&str]) -> BTreeMap<String, String> {
        self.get(path)
            .and_then(|v| v.as_object())
            .map(|m| m.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
            .unwrap_or_default()
    }

    pub fn set_nested_string(&mut self, value: &str, path: &[&str]) -> Result<()> {
        self.set(path, Json::String(value.to_string()))
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.get(&["metadata", "annotations", key]).and_then(|v| v.as_str())
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.get_string_map(&["metadata", "annotations"])
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) -> Result<()> {
        self.set(&["metadata", "annotations", key], Json::String(value.to_string()))
    }

    pub fn remove_annotation(&mut self, key: &str) -> Option<String> {
        let removed = self.remove(&["metadata", "annotations", key])?;
        let empty = self.get(&["metadata", "annotations"]).and_then(|v| v.as_object()).map(|m| m.is_empty());
        if empty == Some(true) {
            self.remove(&["metadata", "annotations"]);
        }
        removed.as_str().map(str::to_string)
    }

    pub fn is_owned_by(&self, owner: &ObjectRef) -> bool {
        self.annotation(OWNER_ANNOTATION) == Some(condition_type(owner).as_str())
    }

    pub fn set_owner(&mut self, owner: &ObjectRef) -> Result<()> {
        self.set_annotation(OWNER_ANNOTATION, &condition_type(owner))
    }

    pub fn flag_for_deletion(&mut self) -> Result<()> {
        self.set_annotation(DELETE_ANNOTATION, "true")
    }

    pub fn is_flagged_for_deletion(&self) -> bool {
        self.annotation(DELETE_ANNOTATION) == Some("true")
    }

    /// Structural equality of the `field` subtree. An absent subtree equals an absent one;
    /// a subtree that exists but is not a mapping is malformed.
    pub fn subtree_eq(&self, other: &KubeObject, field: &str) -> Result<bool> {
        let a = self.mapping_field(field)?;
        let b = other.mapping_field(field)?;
        Ok(match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => structural_eq(a, b),
            _ => false,
        })
    }

    fn mapping_field(&self, field: &str) -> Result<Option<&Json>> {
        match self.0.get(field) {
            None | Some(Json::Null) => Ok(None),
            Some(v @ Json::Object(_)) => Ok(Some(v)),
            Some(_) => Err(FnError::MalformedSubtree { reference: self.reference().to_string(), field: field.to_string() }),
        }
    }
}

/// Recursive value equality over a document tree. Numbers compare by value (`1` equals
/// `1.0`) and a mapping key holding `null` equals a missing key.
pub fn structural_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Object(ao), Json::Object(bo)) => {
            let present = |m: &Map<String, Json>| m.iter().filter(|(_, v)| !v.is_null()).count();
            if present(ao) != present(bo) {
                return false;
            }
            ao.iter().filter(|(_, v)| !v.is_null()).all(|(k, av)| match bo.get(k) {
                Some(bv) => structural_eq(av, bv),
                None => false,
            })
        }
        (Json::Array(aa), Json::Array(bb)) => {
            aa.len() == bb.len() && aa.iter().zip(bb.iter()).all(|(x, y)| structural_eq(x, y))
        }
        (Json::Number(x), Json::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (av, bv) => av == bv,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Json) -> KubeObject { KubeObject::from_value(v).unwrap() }

    #[test]
    fn paths_create_intermediate_mappings() {
        let mut o = KubeObject::new("v1", "ConfigMap", "cm");
        o.set(&["spec", "a", "b"], json!(1)).unwrap();
        assert_eq!(o.get_int(&["spec", "a", "b"]), Some(1));
        o.set_nested_string("x", &["spec", "name"]).unwrap();
        assert_eq!(o.get_string(&["spec", "name"]), Some("x"));
        assert_eq!(o.remove(&["spec", "name"]), Some(json!("x")));
        assert!(o.get(&["spec", "name"]).is_none());
    }

    #[test]
    fn set_through_scalar_fails() {
        let mut o = obj(json!({"apiVersion": "v1", "kind": "X", "metadata": {"name": "x"}, "spec": "oops"}));
        let err = o.set(&["spec", "a"], json!(1)).unwrap_err();
        assert!(err.to_string().contains("spec"), "err={err}");
    }

    #[test]
    fn ownership_and_deletion_annotations() {
        let owner = ObjectRef::new("nephio.org/v1", "Interface", "n3");
        let mut o = KubeObject::new("v1", "ConfigMap", "cm");
        assert!(!o.is_owned_by(&owner));
        o.set_owner(&owner).unwrap();
        assert!(o.is_owned_by(&owner));
        assert_eq!(o.annotation(OWNER_ANNOTATION), Some("nephio.org/v1.Interface.n3"));
        o.flag_for_deletion().unwrap();
        assert!(o.is_flagged_for_deletion());
        assert_eq!(o.remove_annotation(DELETE_ANNOTATION).as_deref(), Some("true"));
        assert!(!o.is_flagged_for_deletion());
        assert_eq!(o.annotations().len(), 1);
    }

    #[test]
    fn removing_last_annotation_drops_the_mapping() {
        let mut o = KubeObject::new("v1", "ConfigMap", "cm");
        o.flag_for_deletion().unwrap();
        o.remove_annotation(DELETE_ANNOTATION);
        assert_eq!(o, KubeObject::new("v1", "ConfigMap", "cm"));
    }

    #[test]
    fn subtree_equality_ignores_other_fields() {
        let a = obj(json!({"kind": "X", "metadata": {"name": "a"}, "spec": {"n": 1, "l": [1, 2]}, "status": {"s": 1}}));
        let b = obj(json!({"kind": "X", "metadata": {"name": "a", "annotations": {"k": "v"}}, "spec": {"l": [1, 2], "n": 1.0, "z": null}}));
        assert!(a.subtree_eq(&b, "spec").unwrap());
        let c = obj(json!({"kind": "X", "spec": {"n": 2, "l": [1, 2]}}));
        assert!(!a.subtree_eq(&c, "spec").unwrap());
        let d = obj(json!({"kind": "X", "spec": {"n": 1, "l": [2, 1]}}));
        assert!(!a.subtree_eq(&d, "spec").unwrap());
    }

    #[test]
    fn subtree_equality_handles_absence_and_malformed() {
        let none = obj(json!({"kind": "X"}));
        let empty = obj(json!({"kind": "X", "spec": {}}));
        let bad = obj(json!({"kind": "X", "metadata": {"name": "b"}, "spec": [1]}));
        assert!(none.subtree_eq(&none, "spec").unwrap());
        assert!(!none.subtree_eq(&empty, "spec").unwrap());
        assert!(matches!(none.subtree_eq(&bad, "spec"), Err(FnError::MalformedSubtree { .. })));
    }

    #[test]
    fn string_map_skips_non_strings() {
        let o = obj(json!({"metadata": {"labels": {"a": "1", "b": 2}}}));
        let m = o.get_string_map(&["metadata", "labels"]);
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn from_yaml_rejects_non_mapping_roots() {
        assert!(KubeObject::from_yaml("- a\n- b\n").is_err());
        let o = KubeObject::from_yaml("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\n  namespace: ns\n").unwrap();
        assert_eq!(o.reference(), ObjectRef::new("v1", "ConfigMap", "x").with_namespace("ns"));
    }
}
