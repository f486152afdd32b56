//! Spec resolution, ordering and implementation planning for nodegen
//!
//! Interface specs connected by multiple inheritance are linearized,
//! their members merged across ancestors, and every `IMPL` spec is turned
//! into a single-inheritance [`ImplementationPlan`] for an emitter to render.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod markers;
pub mod merge;
pub mod model;
pub mod naming;
pub mod order;
pub mod pipeline;
pub mod plan;

pub use config::NodegenConfig;
pub use diagnostics::{Category, Diagnostic, Diagnostics, Severity, Site};
pub use error::{NodegenError, ValidationError};
pub use graph::{resolve_ancestors, ResolvedAncestry, SpecLookup, SpecSet, SupertypeFallback};
pub use merge::{merge_members, MergedMember, MergedMemberSet};
pub use model::{InterfaceSpec, PropertyDeclaration, PropertyId, SpecId, SpecKind, TypeDescriptor};
pub use order::{CycleError, OrderError, Orderable};
pub use pipeline::{Pipeline, RunReport, RunSummary, SpecOutcome};
pub use plan::{build_plan, ImplementationPlan, ParentRef, PlanRegistry};
