//! The package manifest (Kptfile) and its `status.conditions` store.

use serde_json::Value as Json;

use crate::condition::Condition;
use crate::error::{FnError, Result};
use crate::object::{KubeObject, LEGACY_PATH_ANNOTATION, PATH_ANNOTATION};

pub const KPTFILE_KIND: &str = "Kptfile";
pub const KPT_API_GROUP: &str = "kpt.dev/";
pub const KPTFILE_PATH: &str = "Kptfile";

pub fn is_kptfile(obj: &KubeObject) -> bool {
    obj.kind() == KPTFILE_KIND && obj.api_version().starts_with(KPT_API_GROUP)
}

/// Path annotation of a document inside the package, if any.
pub fn package_path(obj: &KubeObject) -> Option<&str> {
    obj.annotation(PATH_ANNOTATION).or_else(|| obj.annotation(LEGACY_PATH_ANNOTATION))
}

#[derive(Debug, Clone)]
pub struct Kptfile {
    obj: KubeObject,
    conditions: Vec<Condition>,
}

impl Kptfile {
    pub fn from_object(obj: &KubeObject) -> Result<Self> {
        if !is_kptfile(obj) {
            return Err(FnError::invalid_kptfile(format!("expected kpt.dev Kptfile, got {}", obj.coordinate())));
        }
        let conditions = match obj.get(&["status", "conditions"]) {
            None | Some(Json::Null) => Vec::new(),
            Some(v @ Json::Array(_)) => serde_json::from_value(v.clone())
                .map_err(|e| FnError::invalid_kptfile(format!("status.conditions: {e}")))?,
            Some(_) => return Err(FnError::invalid_kptfile("status.conditions is not a list")),
        };
        Ok(Self { obj: obj.clone(), conditions })
    }

    /// Package name (`metadata.name`).
    pub fn name(&self) -> &str { self.obj.name() }

    pub fn conditions(&self) -> &[Condition] { &self.conditions }

    pub fn condition(&self, ty: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.ty == ty)
    }

    /// Insert or replace the condition with the same type. Returns false when an identical
    /// condition is already present.
    pub fn set_condition(&mut self, c: Condition) -> bool {
        match self.conditions.iter_mut().find(|x| x.ty == c.ty) {
            Some(existing) if *existing == c => false,
            Some(existing) => {
                *existing = c;
                true
            }
            None => {
                self.conditions.push(c);
                true
            }
        }
    }

    pub fn delete_condition(&mut self, ty: &str) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|c| c.ty != ty);
        before != self.conditions.len()
    }

    /// Render the manifest with the current condition set. An empty set removes
    /// `status.conditions` (and an emptied `status`).
    pub fn to_object(&self) -> Result<KubeObject> {
        let mut obj = self.obj.clone();
        if self.conditions.is_empty() {
            obj.remove(&["status", "conditions"]);
            if obj.get(&["status"]).and_then(|s| s.as_object()).map(|m| m.is_empty()) == Some(true) {
                obj.remove(&["status"]);
            }
        } else {
            obj.set(&["status", "conditions"], serde_json::to_value(&self.conditions)?)?;
        }
        Ok(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionStatus;
    use serde_json::json;

    fn kptfile(status: Json) -> KubeObject {
        let mut v = json!({"apiVersion": "kpt.dev/v1", "kind": "Kptfile", "metadata": {"name": "pkg"}});
        if !status.is_null() {
            v["status"] = status;
        }
        KubeObject::from_value(v).unwrap()
    }

    #[test]
    fn parses_conditions_and_name() {
        let k = Kptfile::from_object(&kptfile(json!({"conditions": [
            {"type": "a", "status": "True", "message": "done"},
            {"type": "b", "status": "False", "reason": "create"}
        ]})))
        .unwrap();
        assert_eq!(k.name(), "pkg");
        assert_eq!(k.conditions().len(), 2);
        assert!(k.condition("b").unwrap().is_false());
    }

    #[test]
    fn rejects_malformed_conditions() {
        assert!(Kptfile::from_object(&kptfile(json!({"conditions": "nope"}))).is_err());
        assert!(Kptfile::from_object(&kptfile(json!({"conditions": [{"type": "a", "status": "Maybe"}]}))).is_err());
        let cm = KubeObject::new("v1", "ConfigMap", "x");
        assert!(matches!(Kptfile::from_object(&cm), Err(FnError::InvalidKptfile(_))));
    }

    #[test]
    fn set_condition_is_idempotent() {
        let mut k = Kptfile::from_object(&kptfile(Json::Null)).unwrap();
        let c = Condition::new("a", ConditionStatus::True, "done");
        assert!(k.set_condition(c.clone()));
        assert!(!k.set_condition(c));
        assert!(k.set_condition(Condition::new("a", ConditionStatus::False, "update")));
        assert_eq!(k.conditions().len(), 1);
        assert!(k.delete_condition("a"));
        assert!(!k.delete_condition("a"));
    }

    #[test]
    fn empty_condition_set_leaves_no_status() {
        let original = kptfile(Json::Null);
        let k = Kptfile::from_object(&original).unwrap();
        assert_eq!(k.to_object().unwrap(), original);

        let mut k = Kptfile::from_object(&kptfile(json!({"conditions": [{"type": "a", "status": "True"}]}))).unwrap();
        k.delete_condition("a");
        assert_eq!(k.to_object().unwrap(), original);
    }
}
