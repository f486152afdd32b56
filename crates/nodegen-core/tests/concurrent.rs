use nodegen_core::model::{InterfaceSpec, PropertyDeclaration, SpecId, SpecKind, TypeDescriptor};
use nodegen_core::{NodegenConfig, Pipeline, RunReport, SpecOutcome};
use pretty_assertions::assert_eq;

fn spec(id: String, kind: SpecKind, parents: Vec<String>, properties: &[(&str, bool)]) -> InterfaceSpec {
    InterfaceSpec::new(
        id,
        kind,
        parents.into_iter().map(SpecId::from).collect(),
        properties
            .iter()
            .map(|(name, is_override)| {
                PropertyDeclaration::child(*name, TypeDescriptor::reference("Tree"))
                    .with_override(*is_override)
            })
            .collect(),
    )
    .unwrap()
}

/// One root, a layer of mixed-kind mids, and leaves that join two mids each
fn wide_hierarchy() -> Vec<InterfaceSpec> {
    let mut specs = vec![spec("tree.Base".into(), SpecKind::Impl, vec![], &[("kind", false)])];
    for i in 0..8 {
        let kind = if i % 2 == 0 { SpecKind::Impl } else { SpecKind::NoImpl };
        let own = format!("mid{i}");
        specs.push(spec(
            format!("tree.Mid{i}"),
            kind,
            vec!["tree.Base".into()],
            &[(own.as_str(), false), ("kind", true)],
        ));
    }
    for j in 0..24 {
        let own = format!("leaf{j}");
        specs.push(spec(
            format!("tree.Leaf{j}"),
            SpecKind::Impl,
            vec![format!("tree.Mid{}", j % 8), format!("tree.Mid{}", (j + 3) % 8)],
            &[(own.as_str(), false)],
        ));
    }
    specs
}

fn outcomes(report: &RunReport) -> Vec<(String, SpecOutcome)> {
    report
        .reports()
        .iter()
        .map(|r| (r.spec.to_string(), r.outcome.clone()))
        .collect()
}

fn assert_same_plans(sequential: &RunReport, concurrent: &RunReport) {
    assert_eq!(outcomes(concurrent), outcomes(sequential));
    assert_eq!(concurrent.registry().len(), sequential.registry().len());
    for plan in sequential.registry().iter() {
        assert_eq!(concurrent.plan(plan.target().as_str()), Some(plan));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_matches_sequential() {
    let pipeline = Pipeline::from_specs(wide_hierarchy(), NodegenConfig::default().with_workers(4));

    let sequential = pipeline.run();
    let concurrent = pipeline.run_concurrent().await;

    assert_eq!(sequential.summary().failed, 0);
    assert_eq!(sequential.registry().len(), 1 + 4 + 24);
    assert_same_plans(&sequential, &concurrent);
}

#[tokio::test]
async fn test_single_worker_matches_sequential() {
    let pipeline = Pipeline::from_specs(wide_hierarchy(), NodegenConfig::default().with_workers(1));

    let sequential = pipeline.run();
    let concurrent = pipeline.run_concurrent().await;

    assert_same_plans(&sequential, &concurrent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_leaves_extend_nearest_planned_mid() {
    let pipeline = Pipeline::from_specs(wide_hierarchy(), NodegenConfig::default().with_workers(3));
    let report = pipeline.run_concurrent().await;

    // Leaf1 joins Mid1 (NO_IMPL) and Mid4 (IMPL)
    let leaf = report.plan("tree.Leaf1").unwrap();
    assert_eq!(leaf.base_name(), "Mid4Impl");
    let declared: Vec<&str> = leaf.declared_fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(declared, vec!["mid1", "leaf1"]);

    // Leaf0 joins Mid0 and Mid3; Mid0 is planned and nearest
    let leaf = report.plan("tree.Leaf0").unwrap();
    assert_eq!(leaf.base_name(), "Mid0Impl");
}
