//! fnrt core: references, KRM objects, conditions, the Kptfile and the ResourceList envelope.

#![forbid(unsafe_code)]

pub mod condition;
pub mod error;
pub mod kptfile;
pub mod object;
pub mod reference;
pub mod resource_list;

pub use condition::{condition_type, pair_condition_type, parse_condition_type, Condition, ConditionKey, ConditionStatus};
pub use error::{FnError, Result};
pub use kptfile::{is_kptfile, Kptfile};
pub use object::{structural_eq, KubeObject, DELETE_ANNOTATION, OWNER_ANNOTATION};
pub use reference::{is_refs_valid, refs_string, ObjectRef, WILDCARD};
pub use resource_list::{FnResult, ResourceList, Severity};

pub mod prelude {
    pub use super::{Condition, ConditionStatus, FnError, KubeObject, Kptfile, ObjectRef, ResourceList, Severity};
}
