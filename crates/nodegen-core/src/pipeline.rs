//! Planning every `IMPL` spec of a set, ancestors first
//!
//! [`Pipeline::run`] plans one spec after another in dependency order.
//! [`Pipeline::run_concurrent`] drains a ready queue on a bounded pool of
//! tokio tasks: a spec becomes ready once each `IMPL` ancestor in the set has
//! been planned or has failed. The coordinating task is the only writer of
//! the plan registry; workers get a snapshot of it. Both produce the same
//! plans.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::config::NodegenConfig;
use crate::diagnostics::{Category, Diagnostic, Diagnostics, Severity, Site};
use crate::graph::{resolve_ancestors, NoFallback, ResolvedAncestry, SpecSet, SupertypeFallback};
use crate::merge::{merge_members_with, MergedMemberSet};
use crate::model::{InterfaceSpec, SpecId, SpecKind};
use crate::order::{self, OrderNode};
use crate::plan::{build_plan, ImplementationPlan, PlanRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpecOutcome {
    Planned,
    /// Planned, but with error diagnostics attached
    Flagged,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecReport {
    pub spec: SpecId,
    #[serde(flatten)]
    pub outcome: SpecOutcome,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub planned: usize,
    pub flagged: usize,
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} planned, {} flagged, {} failed",
            self.planned, self.flagged, self.failed
        )
    }
}

/// Result of a whole run; per-spec reports are in planning order
#[derive(Debug, Clone)]
pub struct RunReport {
    registry: PlanRegistry,
    reports: Vec<SpecReport>,
    diagnostics: Diagnostics,
}

impl RunReport {
    pub fn registry(&self) -> &PlanRegistry {
        &self.registry
    }

    pub fn plan(&self, id: &str) -> Option<&Arc<ImplementationPlan>> {
        self.registry.get(id)
    }

    pub fn reports(&self) -> &[SpecReport] {
        &self.reports
    }

    pub fn report(&self, id: &str) -> Option<&SpecReport> {
        self.reports.iter().find(|r| r.spec.as_str() == id)
    }

    pub fn outcome(&self, id: &str) -> Option<&SpecOutcome> {
        self.report(id).map(|r| &r.outcome)
    }

    /// Findings about the input set itself, not attributed to a single run step
    pub fn input_diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Every diagnostic of the run
    pub fn diagnostics(&self) -> Diagnostics {
        let mut all = self.diagnostics.clone();
        for report in &self.reports {
            all.extend(report.diagnostics.clone());
        }
        all
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for report in &self.reports {
            match report.outcome {
                SpecOutcome::Planned => summary.planned += 1,
                SpecOutcome::Flagged => summary.flagged += 1,
                SpecOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.summary().failed > 0
    }
}

pub struct Pipeline {
    specs: Arc<SpecSet>,
    config: NodegenConfig,
    fallback: Arc<dyn SupertypeFallback>,
    input_diagnostics: Diagnostics,
    extraction_diagnostics: Diagnostics,
}

impl Pipeline {
    pub fn new(specs: SpecSet, config: NodegenConfig) -> Self {
        Self {
            specs: Arc::new(specs),
            config,
            fallback: Arc::new(NoFallback),
            input_diagnostics: Diagnostics::new(),
            extraction_diagnostics: Diagnostics::new(),
        }
    }

    /// Build from raw specs; duplicate identities are reported and skipped
    pub fn from_specs(specs: impl IntoIterator<Item = InterfaceSpec>, config: NodegenConfig) -> Self {
        let (set, diagnostics) = SpecSet::from_specs(specs);
        let mut pipeline = Self::new(set, config);
        pipeline.input_diagnostics = diagnostics;
        pipeline
    }

    pub fn with_fallback(mut self, fallback: impl SupertypeFallback + 'static) -> Self {
        self.fallback = Arc::new(fallback);
        self
    }

    /// Findings from decoding the specs, e.g. [`crate::markers::Extraction`]
    /// diagnostics. Each is reported with the spec it names, and an error
    /// there flags that spec.
    pub fn with_extraction_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.extraction_diagnostics.extend(diagnostics);
        self
    }

    pub fn specs(&self) -> &SpecSet {
        &self.specs
    }

    pub fn config(&self) -> &NodegenConfig {
        &self.config
    }

    /// Ancestry and merged members of one spec, without planning it
    pub fn inspect(&self, id: &str) -> Option<(ResolvedAncestry, MergedMemberSet)> {
        let spec = self.specs.get(id)?;
        let ancestry = resolve_ancestors(spec, self.specs.as_ref(), self.fallback.as_ref());
        let merged = merge_members_with(&ancestry, spec, self.implicit_override_severity());
        Some((ancestry, merged))
    }

    fn implicit_override_severity(&self) -> Severity {
        if self.config.strict_overrides {
            Severity::Error
        } else {
            Severity::Warning
        }
    }

    fn extracted_for(&self, id: &SpecId) -> Diagnostics {
        self.extraction_diagnostics.for_spec(id).cloned().collect()
    }

    fn log_input_findings(&self) {
        for cycle in self.specs.detect_parent_cycles() {
            let ids: Vec<&str> = cycle.iter().map(|id| id.as_str()).collect();
            warn!("inheritance cycle between {}", ids.join(", "));
        }
        for (missing, referrers) in self.specs.unresolved_parents() {
            let ids: Vec<&str> = referrers.iter().map(|id| id.as_str()).collect();
            warn!("{} is not in the input (parent of {})", missing, ids.join(", "));
        }
    }

    /// `IMPL` ancestors present in the set, for every `IMPL` spec
    fn impl_dependencies(&self) -> Vec<(SpecId, Vec<SpecId>)> {
        self.specs
            .of_kind(SpecKind::Impl)
            .map(|spec| {
                let ancestry = resolve_ancestors(spec, self.specs.as_ref(), &NoFallback);
                let dependencies = ancestry
                    .ids()
                    .into_iter()
                    .filter(|id| {
                        self.specs
                            .get(id.as_str())
                            .is_some_and(|s| s.kind() == SpecKind::Impl)
                    })
                    .cloned()
                    .collect();
                (spec.id().clone(), dependencies)
            })
            .collect()
    }

    /// Planning order: every `IMPL` spec after its `IMPL` ancestors
    pub fn impl_order(&self) -> Vec<SpecId> {
        let nodes: Vec<OrderNode<SpecId>> = self
            .impl_dependencies()
            .into_iter()
            .map(|(id, dependencies)| OrderNode::new(id).with_after(dependencies))
            .collect();

        let (sorted, error) = order::sort_lenient(nodes);
        if let Some(e) = error {
            debug!("impl order is best effort: {}", e);
        }
        sorted.into_iter().map(|node| node.name).collect()
    }

    #[instrument(skip(self), fields(specs = self.specs.len()))]
    pub fn run(&self) -> RunReport {
        self.log_input_findings();

        let mut registry = PlanRegistry::new();
        let mut reports = Vec::new();
        for id in self.impl_order() {
            let Some(spec) = self.specs.get(id.as_str()) else {
                continue;
            };
            let (report, plan) = plan_spec(
                spec,
                &self.specs,
                self.fallback.as_ref(),
                &registry,
                &self.config,
                self.extracted_for(&id),
            );
            reports.push(register(&mut registry, report, plan));
        }

        self.finish(registry, reports)
    }

    #[instrument(skip(self), fields(specs = self.specs.len(), workers = self.config.workers))]
    pub async fn run_concurrent(&self) -> RunReport {
        self.log_input_findings();

        let order = self.impl_order();
        let mut waiting: HashMap<SpecId, HashSet<SpecId>> = HashMap::new();
        let mut dependents: HashMap<SpecId, Vec<SpecId>> = HashMap::new();
        let mut ready: VecDeque<SpecId> = VecDeque::new();

        let dependencies: HashMap<SpecId, Vec<SpecId>> =
            self.impl_dependencies().into_iter().collect();
        for id in &order {
            let pending: HashSet<SpecId> = dependencies
                .get(id)
                .map(|deps| deps.iter().cloned().collect())
                .unwrap_or_default();
            for dependency in &pending {
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .push(id.clone());
            }
            if pending.is_empty() {
                ready.push_back(id.clone());
            } else {
                waiting.insert(id.clone(), pending);
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks: JoinSet<(SpecReport, Option<ImplementationPlan>)> = JoinSet::new();
        let mut in_flight: HashSet<SpecId> = HashSet::new();
        let mut registry = PlanRegistry::new();
        let mut finished: HashMap<SpecId, SpecReport> = HashMap::new();

        loop {
            while let Some(id) = ready.pop_front() {
                let Some(spec) = self.specs.get(id.as_str()).cloned() else {
                    continue;
                };
                debug!("spawning plan for {}", id);
                in_flight.insert(id);

                let semaphore = Arc::clone(&semaphore);
                let specs = Arc::clone(&self.specs);
                let fallback = Arc::clone(&self.fallback);
                let snapshot = registry.clone();
                let config = self.config.clone();
                let extracted = self.extracted_for(spec.id());
                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    plan_spec(&spec, &specs, fallback.as_ref(), &snapshot, &config, extracted)
                });
            }

            let completed = match tasks.join_next().await {
                Some(Ok((report, plan))) => {
                    let id = report.spec.clone();
                    finished.insert(id.clone(), register(&mut registry, report, plan));
                    vec![id]
                }
                Some(Err(e)) => {
                    warn!("planning task did not complete: {}", e);
                    continue;
                }
                None => {
                    // Nothing is running: whatever is still in flight was lost,
                    // and anything still waiting sits on an inheritance cycle.
                    let lost: Vec<SpecId> = in_flight.iter().cloned().collect();
                    for id in &lost {
                        finished.insert(
                            id.clone(),
                            failed_report(id, "planning task did not complete".to_string()),
                        );
                    }
                    if lost.is_empty() {
                        match order.iter().find(|id| waiting.contains_key(*id)) {
                            Some(next) => {
                                debug!("releasing {} from a dependency cycle", next);
                                waiting.remove(next);
                                ready.push_back(next.clone());
                            }
                            None => break,
                        }
                    }
                    lost
                }
            };

            for id in completed {
                in_flight.remove(&id);
                for dependent in dependents.get(&id).into_iter().flatten() {
                    if let Some(pending) = waiting.get_mut(dependent) {
                        pending.remove(&id);
                        if pending.is_empty() {
                            waiting.remove(dependent);
                            ready.push_back(dependent.clone());
                        }
                    }
                }
            }
        }

        let reports = order
            .iter()
            .filter_map(|id| finished.remove(id))
            .collect();
        self.finish(registry, reports)
    }

    fn finish(&self, registry: PlanRegistry, reports: Vec<SpecReport>) -> RunReport {
        // Extraction findings of specs that were not planned stay run-wide
        let mut diagnostics = self.input_diagnostics.clone();
        diagnostics.extend(
            self.extraction_diagnostics
                .iter()
                .filter(|d| !reports.iter().any(|r| r.spec == d.site.spec))
                .cloned()
                .collect(),
        );

        let report = RunReport {
            registry,
            reports,
            diagnostics,
        };
        info!("run finished: {}", report.summary());
        report
    }
}

fn failed_report(id: &SpecId, reason: String) -> SpecReport {
    let mut diagnostics = Diagnostics::new();
    diagnostics.record(Diagnostic::error(
        Category::Validation,
        Site::spec(id.clone()),
        reason.clone(),
    ));
    SpecReport {
        spec: id.clone(),
        outcome: SpecOutcome::Failed { reason },
        diagnostics,
    }
}

fn register(
    registry: &mut PlanRegistry,
    mut report: SpecReport,
    plan: Option<ImplementationPlan>,
) -> SpecReport {
    if let Some(plan) = plan {
        if let Err(e) = registry.insert(plan) {
            let failed = failed_report(&report.spec, e.to_string());
            report.diagnostics.extend(failed.diagnostics);
            report.outcome = failed.outcome;
        }
    }
    report
}

/// Resolve, merge and plan one spec against the plans that exist so far
fn plan_spec(
    spec: &InterfaceSpec,
    specs: &SpecSet,
    fallback: &dyn SupertypeFallback,
    registry: &PlanRegistry,
    config: &NodegenConfig,
    extracted: Diagnostics,
) -> (SpecReport, Option<ImplementationPlan>) {
    let severity = if config.strict_overrides {
        Severity::Error
    } else {
        Severity::Warning
    };

    let ancestry = resolve_ancestors(spec, specs, fallback);
    let mut diagnostics = extracted;
    diagnostics.record_all(ancestry.diagnostics());
    let merged = merge_members_with(&ancestry, spec, severity);
    diagnostics.extend(merged.diagnostics().clone());

    match build_plan(spec, &ancestry, &merged, registry, config) {
        Ok(outcome) => {
            diagnostics.extend(outcome.diagnostics);
            let status = if diagnostics.has_errors() {
                SpecOutcome::Flagged
            } else {
                SpecOutcome::Planned
            };
            debug!("{}: {:?}", spec.id(), status);
            let report = SpecReport {
                spec: spec.id().clone(),
                outcome: status,
                diagnostics,
            };
            (report, Some(outcome.plan))
        }
        Err(e) => {
            let failed = failed_report(spec.id(), e.to_string());
            diagnostics.extend(failed.diagnostics);
            let report = SpecReport {
                spec: spec.id().clone(),
                outcome: failed.outcome,
                diagnostics,
            };
            (report, None)
        }
    }
}
