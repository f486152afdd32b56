//! Rendering run results for the terminal and for downstream emitters

use std::fmt::Write as _;

use nodegen_core::graph::ResolvedAncestry;
use nodegen_core::merge::MergedMemberSet;
use nodegen_core::pipeline::SpecReport;
use nodegen_core::{Diagnostics, ImplementationPlan, RunReport, RunSummary};
use serde::Serialize;

/// The JSON document written by `nodegen plan`
#[derive(Debug, Serialize)]
pub struct PlanDocument<'a> {
    pub summary: RunSummary,
    pub plans: Vec<&'a ImplementationPlan>,
    pub reports: &'a [SpecReport],
    pub diagnostics: &'a Diagnostics,
}

impl<'a> PlanDocument<'a> {
    pub fn new(report: &'a RunReport) -> Self {
        Self {
            summary: report.summary(),
            plans: report.registry().iter().map(|p| p.as_ref()).collect(),
            reports: report.reports(),
            diagnostics: report.input_diagnostics(),
        }
    }
}

/// Run-wide diagnostics, then one line per planned spec plus its diagnostics, indented
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    for diagnostic in report.input_diagnostics().iter() {
        let _ = writeln!(out, "{}", diagnostic);
    }
    for spec_report in report.reports() {
        let _ = match report.plan(spec_report.spec.as_str()) {
            Some(plan) => writeln!(
                out,
                "{} -> {} extends {} ({} fields, {} accessors)",
                spec_report.spec,
                plan.name(),
                plan.base_name(),
                plan.all_fields().len(),
                plan.accessors().len()
            ),
            None => writeln!(out, "{} -> not planned", spec_report.spec),
        };
        for diagnostic in spec_report.diagnostics.iter() {
            let _ = writeln!(out, "    {}", diagnostic);
        }
    }
    let _ = writeln!(out, "{}", report.summary());
    out
}

/// Ancestor order and merged members of a single spec
pub fn render_inspection(ancestry: &ResolvedAncestry, merged: &MergedMemberSet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", ancestry.spec());

    let _ = writeln!(out, "  ancestors:");
    for ancestor in ancestry.ancestors() {
        let marker = if ancestry.placeholders().contains(ancestor.id()) {
            " (placeholder)"
        } else {
            ""
        };
        let _ = writeln!(out, "    {} [{}]{}", ancestor.id(), ancestor.kind(), marker);
    }
    for missing in ancestry.missing() {
        let _ = writeln!(
            out,
            "    {} (missing, parent of {})",
            missing.id, missing.referenced_by
        );
    }

    let _ = writeln!(out, "  members:");
    for member in merged {
        let _ = writeln!(
            out,
            "    {}: {} from {}",
            member.id(),
            member.declaration.ty(),
            member.owner
        );
    }

    let mut diagnostics = ancestry.diagnostics();
    diagnostics.extend(merged.diagnostics().clone());
    if !diagnostics.is_empty() {
        let _ = writeln!(out, "  diagnostics:");
        for diagnostic in diagnostics.iter() {
            let _ = writeln!(out, "    {}", diagnostic);
        }
    }
    out
}
