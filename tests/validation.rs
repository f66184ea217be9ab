use anyhow::Result;
use proptest::prelude::*;
use scene_director::{
    catalog::StaticCatalog,
    config::Settings,
    llm::OfflineModel,
    memory::InMemorySceneMemory,
    model::{
        EntityStatus, Extents, Issue, IssueCategory, Lighting, Material, SceneEntity, Severity,
        ShaderKind, Vec3,
    },
    record::{SceneRecord, merge},
    stages::{
        StageContext,
        decomposer::fallback_plan,
        validator::{self, passes, score_issues},
    },
};

fn textured(name: &str) -> Material {
    Material {
        name: format!("{name}_material"),
        shader: ShaderKind::Wood,
        base_color: [0.4, 0.3, 0.2, 1.0],
        roughness: 0.6,
        metallic: 0.0,
        subsurface: 0.0,
        clear_coat: 0.0,
        texture_map: Some(format!("textures/{name}.png")),
        normal_map: None,
        roughness_map: None,
    }
}

fn placed(id: &str, name: &str, x: f64) -> SceneEntity {
    let mut e = SceneEntity::requested(id, name);
    e.extents = Some(Extents::new(1.0, 1.0, 0.8));
    e.position = Some(Vec3::new(x, 0.0, 0.0));
    e.rotation = Some(Vec3::ZERO);
    e.material = Some(textured(name));
    e.status = EntityStatus::Textured;
    e
}

fn unlit_record() -> SceneRecord {
    let mut record = SceneRecord::new("s", "bed and desk", 3);
    record.plan = Some(fallback_plan("bed and desk"));
    record.entities = vec![placed("bed-1", "bed", -1.5), placed("desk-1", "desk", 1.5)];
    record.lighting = Some(Lighting {
        lights: Vec::new(),
        hdri: None,
        ambient_intensity: 0.1,
        exposure: 1.0,
    });
    record
}

#[test]
fn scene_without_lights_fails_with_one_lighting_error() -> Result<()> {
    let settings = Settings::default();
    let catalog = StaticCatalog::bundled()?;
    let memory = InMemorySceneMemory::new();
    let ctx = StageContext {
        settings: &settings,
        model: &OfflineModel,
        catalog: &catalog,
        memory: &memory,
    };

    let record = merge(unlit_record(), validator::validate(&ctx, &unlit_record())?);
    let lighting_errors: Vec<&Issue> = record
        .issues
        .iter()
        .filter(|i| i.category == IssueCategory::Lighting && i.severity == Severity::Error)
        .collect();

    assert_eq!(lighting_errors.len(), 1);
    assert_eq!(record.issues.len(), 1);
    let outcome = record.validation.as_ref().unwrap();
    assert_eq!(outcome.score, 90);
    assert!(!outcome.passed);
    assert!(outcome.report.is_none());
    assert!(record.entities.iter().all(|e| e.status == EntityStatus::Textured));
    Ok(())
}

fn issue() -> impl Strategy<Value = Issue> {
    (
        prop::sample::select(vec![Severity::Info, Severity::Warning, Severity::Error]),
        prop::sample::select(IssueCategory::ALL.to_vec()),
    )
        .prop_map(|(s, c)| Issue::new(s, c, "generated"))
}

proptest! {
    #[test]
    fn score_never_rises_as_issues_accumulate(
        base in prop::collection::vec(issue(), 0..20),
        extra in issue(),
    ) {
        let before = score_issues(&base);
        let mut more = base.clone();
        more.push(extra);
        prop_assert!(score_issues(&more) <= before);
        prop_assert!(score_issues(&more) <= 100);
    }

    #[test]
    fn any_error_means_failure(
        base in prop::collection::vec(issue(), 0..10),
        category in prop::sample::select(IssueCategory::ALL.to_vec()),
        passing in 0u32..=100,
    ) {
        let mut issues = base;
        issues.push(Issue::new(Severity::Error, category, "blocking"));
        prop_assert!(!passes(score_issues(&issues), &issues, passing));
    }
}
