//! fnrt sdk: the condition-driven reconciliation engine shared by KRM functions.
//!
//! A function declares the kind it governs, the kinds it owns and watches, and two
//! callbacks. [`run`] classifies the package into an [`Inventory`], commits desired
//! children, and regenerates governed objects once their dependencies report ready.

#![forbid(unsafe_code)]

pub mod commit;
pub mod config;
pub mod diff;
pub mod generate;
pub mod inventory;
pub mod pipeline;
pub mod ready;

pub use config::{Config, GenerateResourceFn, PopulateChildrenFn, ResourceKind, WatchCallbackFn};
pub use diff::{Action, DiffObject, InventoryDiff};
pub use inventory::{classify_object, entry_ref, Entry, EntryKey, Existing, Inventory, InventoryLine, Role};
pub use pipeline::{run, RunReport, Sdk, Stage};
pub use ready::ReadyCtx;

pub mod prelude {
    pub use super::{run, Config, ResourceKind, RunReport};
    pub use fnrt_core::prelude::*;
}
