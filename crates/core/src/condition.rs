//! Conditions and their deterministic type strings.
//!
//! A single reference encodes as `<apiVersion>.<kind>.<name>`; an owner/child pair encodes
//! as `<owner>_<child>`. `_` never occurs in DNS names, API groups or kinds, so the pair
//! splits unambiguously, and the single form is split on the version segment that follows
//! the group's `/`, which leaves dotted names intact.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reference::ObjectRef;

pub const PAIR_SEPARATOR: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub ty: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    pub fn new(ty: impl Into<String>, status: ConditionStatus, message: impl Into<String>) -> Self {
        Self { ty: ty.into(), status, reason: None, message: message.into() }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }
}

/// Condition type of a governed (or globally watched) reference.
pub fn condition_type(r: &ObjectRef) -> String {
    format!("{}.{}.{}", r.api_version, r.kind, r.name)
}

/// Condition type of a child scoped to its owner.
pub fn pair_condition_type(owner: &ObjectRef, child: &ObjectRef) -> String {
    format!("{}{}{}", condition_type(owner), PAIR_SEPARATOR, condition_type(child))
}

/// Decoded form of a condition type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionKey {
    Single(ObjectRef),
    Pair { owner: ObjectRef, child: ObjectRef },
}

pub fn parse_condition_type(ty: &str) -> Option<ConditionKey> {
    match ty.split_once(PAIR_SEPARATOR) {
        Some((owner, child)) => Some(ConditionKey::Pair {
            owner: parse_single(owner)?,
            child: parse_single(child)?,
        }),
        None => parse_single(ty).map(ConditionKey::Single),
    }
}

fn parse_single(s: &str) -> Option<ObjectRef> {
    let (group, rest) = match s.split_once('/') {
        Some((g, rest)) => (Some(g), rest),
        None => (None, s),
    };
    let mut parts = rest.splitn(3, '.');
    let version = parts.next().filter(|p| !p.is_empty())?;
    let kind = parts.next().filter(|p| !p.is_empty())?;
    let name = parts.next().filter(|p| !p.is_empty())?;
    let api_version = match group {
        Some(g) if !g.is_empty() => format!("{g}/{version}"),
        Some(_) => return None,
        None => version.to_string(),
    };
    Some(ObjectRef::new(api_version, kind, name))
}
