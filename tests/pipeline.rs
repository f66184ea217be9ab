use std::sync::Arc;

use anyhow::Result;
use proptest::prelude::*;
use scene_director::{
    catalog::{CatalogCategory, CatalogVariant, StaticCatalog},
    config::Settings,
    llm::{ModelTask, ScriptedModel},
    model::{Issue, IssueCategory, SceneStatus, Severity},
    pipeline::Director,
    protocol::SceneRequestPayload,
    record::SceneRecord,
    stages::{Stage, decomposer},
};

fn crate_catalog(size: f64, height: f64) -> Result<StaticCatalog> {
    StaticCatalog::from_categories(vec![CatalogCategory {
        category: "crate".into(),
        default: "big_crate".into(),
        variants: vec![CatalogVariant {
            key: "big_crate".into(),
            path: "assets/models/big_crate.glb".into(),
            polygons: 1_200,
            extents: [size, size, height],
        }],
    }])
}

fn square_room(side: f64) -> Settings {
    let mut settings = Settings::default();
    settings.room.width = side;
    settings.room.depth = side;
    settings
}

fn scripted(plan: &str) -> Arc<ScriptedModel> {
    Arc::new(ScriptedModel::new().with_response(ModelTask::Plan, plan))
}

fn summaries(record: &SceneRecord, stage: Stage) -> Vec<&str> {
    record
        .actions
        .iter()
        .filter(|a| a.stage == stage)
        .map(|a| a.summary.as_str())
        .collect()
}

#[test]
fn missing_desk_asset_warns_instead_of_failing() -> Result<()> {
    let director = Director::offline(Settings::default())?
        .with_catalog(Arc::new(StaticCatalog::bundled()?.without("desk")));
    let record = director.run("bed, desk", 3);

    assert_ne!(record.status, SceneStatus::Failed);
    assert_eq!(record.status, SceneStatus::Completed);
    let desk = record
        .entities
        .iter()
        .find(|e| e.name == "desk")
        .expect("desk entity kept");
    assert!(desk.placeholder || desk.substituted_from.is_some());
    assert!(record.issues.iter().any(|i| {
        i.category == IssueCategory::MissingAsset && i.severity == Severity::Warning
    }));
    assert!(record.errors.is_empty());
    Ok(())
}

#[test]
fn non_converging_scene_stops_at_iteration_limit() -> Result<()> {
    let plan = r#"{"interpreted_mood":"storage","required_objects":["crate","crate","crate"]}"#;
    let director = Director::offline(square_room(2.0))?
        .with_catalog(Arc::new(crate_catalog(1.5, 1.5)?))
        .with_model(scripted(plan));

    let record = director.run("three big crates in a closet", 3);

    assert_eq!(record.status, SceneStatus::Completed);
    assert_eq!(record.iteration_count, 3);
    assert!(!record.issues.is_empty());
    let validation = record.validation.as_ref().expect("validated");
    assert!(!validation.passed);
    let report = validation.report.as_deref().expect("report on escape valve");
    assert!(report.contains("Iteration limit reached"));

    assert_eq!(summaries(&record, Stage::Validator).len(), 3);
    // Revisions resume at the placer; the resolver ran only on the first pass.
    assert_eq!(summaries(&record, Stage::AssetResolver).len(), 1);
    Ok(())
}

#[test]
fn clipping_is_repaired_on_revision() -> Result<()> {
    // In a 2.6 m room the second crate only fits a corner, 0.33 m into the first.
    let plan = r#"{"interpreted_mood":"storage","required_objects":["crate","crate"]}"#;
    let director = Director::offline(square_room(2.6))?
        .with_catalog(Arc::new(crate_catalog(1.4, 1.0)?))
        .with_model(scripted(plan));

    let record = director.run("two crates in a storage room", 3);

    assert_eq!(record.status, SceneStatus::Completed);
    assert_eq!(record.iteration_count, 1);
    let validation = record.validation.as_ref().expect("validated");
    assert!(validation.passed);
    assert!(validation.report.is_some());
    assert!(record.issues.iter().all(|i| i.severity != Severity::Error));

    let placer = summaries(&record, Stage::Placer);
    assert_eq!(placer.len(), 2);
    assert!(placer[0].starts_with("placed 2 entities"));
    assert!(placer[1].starts_with("repaired layout: moved 1 entities"));
    assert_eq!(summaries(&record, Stage::AssetResolver).len(), 1);
    Ok(())
}

#[test]
fn asset_revision_keeps_layout_for_repair() -> Result<()> {
    // The placeholder keeps a missing_asset warning open, which routes the
    // revision to the resolver ahead of the clipping repair.
    let plan = r#"{"interpreted_mood":"storage","required_objects":["crate","crate","spaceship"]}"#;
    let director = Director::offline(square_room(2.6))?
        .with_catalog(Arc::new(crate_catalog(1.4, 1.0)?))
        .with_model(scripted(plan));

    let record = director.run("two crates and a spaceship", 3);

    let routing = summaries(&record, Stage::Decomposer);
    assert!(routing.iter().any(|s| s.starts_with("routing revision 1 to asset_resolver")));

    let resolver = summaries(&record, Stage::AssetResolver);
    assert_eq!(resolver.len(), 2);
    assert!(resolver[1].contains("kept 3 placements"));

    let placer = summaries(&record, Stage::Placer);
    assert_eq!(placer.len(), 2);
    assert!(placer[1].starts_with("repaired layout"));

    assert_eq!(record.status, SceneStatus::Completed);
    assert_eq!(record.iteration_count, 1);
    assert!(record.passed());
    assert!(record.issues.iter().any(|i| i.category == IssueCategory::MissingAsset));
    assert!(record.issues.iter().all(|i| i.severity != Severity::Error));
    let spaceship = record
        .entities
        .iter()
        .find(|e| e.name == "spaceship")
        .expect("placeholder kept");
    assert!(spaceship.placeholder);
    Ok(())
}

#[test]
fn empty_request_is_fatal() -> Result<()> {
    let director = Director::offline(Settings::default())?;
    let response = director.process(&SceneRequestPayload {
        prompt: String::new(),
        max_iterations: Some(3),
    });
    assert_eq!(response.status, SceneStatus::Failed);
    assert_eq!(response.iteration_count, 0);
    assert!(!response.errors.is_empty());
    assert!(response.entities.is_empty());
    Ok(())
}

#[test]
fn scripted_plan_drives_the_scene() -> Result<()> {
    let plan = r#"Here is the plan:
{
  "interpreted_mood": "cozy",
  "required_objects": ["bed", "nightstand", "lamp"],
  "spatial_requirements": {"primary_focal_point": "bed"},
  "lighting_requirements": {"time_of_day": "evening", "mood": "warm"}
}"#;
    let director = Director::offline(Settings::default())?
        .with_model(scripted(plan));
    let response = director.process(&SceneRequestPayload {
        prompt: "a cozy bedroom at night".into(),
        max_iterations: None,
    });

    assert_eq!(response.status, SceneStatus::Completed);
    let names: Vec<&str> = response.entities.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["bed", "nightstand", "lamp"]);
    assert!(response.lighting.is_some());
    assert!(response.camera.is_some());
    assert!(response.report.is_some());
    Ok(())
}

fn category() -> impl Strategy<Value = IssueCategory> {
    prop::sample::select(IssueCategory::ALL.to_vec())
}

fn severity() -> impl Strategy<Value = Severity> {
    prop::sample::select(vec![Severity::Info, Severity::Warning, Severity::Error])
}

proptest! {
    #[test]
    fn revision_routes_to_earliest_responsible_stage(
        issues in prop::collection::vec((severity(), category()), 1..12)
    ) {
        let issues: Vec<Issue> = issues
            .into_iter()
            .map(|(s, c)| Issue::new(s, c, "generated"))
            .collect();
        let target = decomposer::revision_target(&issues);
        let responsible: Vec<Stage> = issues
            .iter()
            .map(|i| decomposer::route_category(i.category))
            .collect();

        prop_assert!(responsible.contains(&target));
        prop_assert!(responsible.iter().all(|s| *s >= target));
    }
}
