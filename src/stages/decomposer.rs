//! Turns the request text into a [`Plan`] and, after a failed validation,
//! decides where the pipeline re-enters.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use log::{info, warn};
use serde::Deserialize;

use crate::{
    llm::{ModelRequest, ModelTask, extract_json_object},
    model::{Issue, IssueCategory, LightingHints, MaterialHint, Plan, SceneStatus, Severity, SpatialHints},
    record::{SceneRecord, StageUpdate},
    stages::{Stage, StageContext},
};

pub const SYSTEM_PROMPT: &str = r#"You are the lead art director of a 3D scene team. Break the request into a plan for the asset, layout, material and lighting stages. You do not perform those tasks yourself.

Answer with a single JSON object:
{
  "interpreted_mood": "mood or atmosphere",
  "required_objects": ["bed", "desk"],
  "spatial_requirements": {
    "primary_focal_point": "bed",
    "relationships": [{"object": "lamp", "relative_to": "desk", "position": "on"}],
    "zones": {"desk": "window_area"}
  },
  "material_requirements": {"desk": {"style": "wood", "finish": "matte"}},
  "lighting_requirements": {"time_of_day": "morning", "mood": "warm", "intimacy": "cozy"}
}"#;

pub const FALLBACK_MOOD: &str = "neutral";
pub const PRIMARY_OBJECT: &str = "primary_object";

/// Words the tokenizer accepts as entity names when no plan could be parsed.
const VOCABULARY: [&str; 28] = [
    "bed", "desk", "chair", "table", "lamp", "sofa", "couch", "window", "door", "shelf",
    "bookshelf", "plant", "rug", "curtain", "mirror", "painting", "clock", "vase", "books",
    "nightstand", "dresser", "wardrobe", "armchair", "tv", "laptop", "candle", "mug", "statue",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlan {
    interpreted_mood: String,
    required_objects: Vec<String>,
    spatial_requirements: SpatialHints,
    material_requirements: BTreeMap<String, MaterialHint>,
    lighting_requirements: LightingHints,
}

/// Plan creation. Revision routing is [`route_revision`], which the
/// controller calls directly when it needs a re-entry stage.
pub fn decompose(ctx: &StageContext<'_>, record: &SceneRecord) -> Result<StageUpdate> {
    let request = record.request_text.trim();
    if request.is_empty() {
        bail!("no request text provided");
    }
    info!("[decomposer] planning: {}", truncate(request, 100));

    let memory_context = if ctx.settings.pipeline.use_memory {
        memory_context(ctx, request)
    } else {
        None
    };

    let mut user = format!("Create a detailed master plan for this 3D scene request: {request}");
    if let Some(reference) = memory_context.as_deref() {
        user.push_str("\n\n");
        user.push_str(reference);
    }

    let response = ctx.model.generate(&ModelRequest {
        task: ModelTask::Plan,
        system_prompt: SYSTEM_PROMPT,
        context: "",
        user: &user,
    });

    let (plan, fell_back) = match response.and_then(|text| parse_plan(&text)) {
        Ok(plan) => (plan, false),
        Err(e) => {
            warn!("[decomposer] unusable plan from language model, using fallback: {e:#}");
            (fallback_plan(request), true)
        }
    };

    let mut summary = format!(
        "interpreted request as '{}' mood with {} entities",
        plan.mood,
        plan.required_entities.len()
    );
    if fell_back {
        summary.push_str(" (fallback plan)");
    }
    if memory_context.is_some() {
        summary.push_str(" (with memory context)");
    }
    info!("[decomposer] {summary}");

    Ok(StageUpdate {
        plan: Some(plan),
        status: Some(SceneStatus::InProgress),
        summary,
        ..StageUpdate::default()
    })
}

fn memory_context(ctx: &StageContext<'_>, request: &str) -> Option<String> {
    let limits = &ctx.settings.memory;
    let hits = match ctx.memory.search(request, limits.search_limit, limits.min_score) {
        Ok(hits) => hits,
        Err(e) => {
            warn!("[decomposer] memory search failed: {e:#}");
            return None;
        }
    };
    if hits.is_empty() {
        return None;
    }

    let mut lines = vec!["REFERENCE: similar scenes created before:".to_string()];
    for (i, hit) in hits.iter().enumerate() {
        let s = &hit.summary;
        let names: Vec<&str> = s.entity_names.iter().take(5).map(String::as_str).collect();
        lines.push(format!(
            "{}. \"{}\" | mood: {} | objects: {} | lighting: {} | similarity: {:.0}%",
            i + 1,
            truncate(&s.request_text, 100),
            s.mood,
            names.join(", "),
            s.lighting_mood,
            hit.similarity * 100.0
        ));
    }
    lines.push("Use these as inspiration but plan the current request on its own terms.".to_string());
    Some(lines.join("\n"))
}

/// Parse a model response into a plan. A plan without entities is unusable.
pub fn parse_plan(text: &str) -> Result<Plan> {
    let raw: RawPlan = extract_json_object(text)?;
    let required: Vec<String> = raw
        .required_objects
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if required.is_empty() {
        bail!("plan lists no required objects");
    }
    let mood = raw.interpreted_mood.trim();
    Ok(Plan {
        mood: if mood.is_empty() { FALLBACK_MOOD.to_string() } else { mood.to_string() },
        required_entities: required,
        spatial: raw.spatial_requirements,
        materials: raw.material_requirements,
        lighting: raw.lighting_requirements,
        execution_order: Stage::ORDER.to_vec(),
    })
}

pub fn fallback_plan(request: &str) -> Plan {
    Plan {
        mood: FALLBACK_MOOD.to_string(),
        required_entities: tokenize_entities(request),
        spatial: SpatialHints::default(),
        materials: BTreeMap::new(),
        lighting: LightingHints::default(),
        execution_order: Stage::ORDER.to_vec(),
    }
}

/// Naive entity extraction: vocabulary words in order of appearance.
pub fn tokenize_entities(request: &str) -> Vec<String> {
    let lower = request.to_lowercase();
    let found: Vec<String> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .filter_map(|w| {
            if VOCABULARY.contains(&w) {
                return Some(w.to_string());
            }
            let singular = w.strip_suffix('s')?;
            VOCABULARY.contains(&singular).then(|| singular.to_string())
        })
        .collect();
    if found.is_empty() {
        vec![PRIMARY_OBJECT.to_string()]
    } else {
        found
    }
}

/// Stage responsible for fixing a category of defect.
pub fn route_category(category: IssueCategory) -> Stage {
    match category {
        IssueCategory::Clipping | IssueCategory::Floating => Stage::Placer,
        IssueCategory::Material => Stage::Texturer,
        IssueCategory::Lighting | IssueCategory::Overexposure => Stage::Illuminator,
        IssueCategory::MissingAsset | IssueCategory::PromptAlignment => Stage::AssetResolver,
    }
}

/// Earliest stage in pipeline order among the targets of all open issues.
pub fn revision_target(issues: &[Issue]) -> Stage {
    issues
        .iter()
        .map(|i| route_category(i.category))
        .min()
        .unwrap_or(Stage::Placer)
}

/// Routing decision for a failed validation: the re-entry stage plus an
/// update carrying the categorized issue summary.
pub fn route_revision(ctx: &StageContext<'_>, record: &SceneRecord) -> (Stage, StageUpdate) {
    let target = revision_target(&record.issues);
    let digest = summarize_issues(&record.issues);

    let context = format!(
        "User request: {}\nScene has {} entities.\nValidation summary ({} issues):\n{}",
        truncate(&record.request_text, 200),
        record.entities.len(),
        record.issues.len(),
        digest
    );
    let advice = ctx
        .model
        .generate(&ModelRequest {
            task: ModelTask::RevisionAdvice,
            system_prompt: SYSTEM_PROMPT,
            context: &context,
            user: "Based on these validation issues, what should the revising stage change?",
        })
        .ok();

    let mut summary = format!(
        "routing revision {} to {}: {}",
        record.iteration_count,
        target.as_str(),
        digest.lines().next().unwrap_or("no issues")
    );
    if let Some(advice) = advice.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        summary.push_str(&format!(" | advice: {}", truncate(advice, 160)));
    }
    info!("[decomposer] {summary}");

    (target, StageUpdate::summary(summary))
}

/// Counts per severity and category, then up to five sample descriptions.
pub fn summarize_issues(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return "no issues".to_string();
    }
    let mut counts: BTreeMap<(std::cmp::Reverse<Severity>, IssueCategory), usize> = BTreeMap::new();
    for issue in issues {
        *counts
            .entry((std::cmp::Reverse(issue.severity), issue.category))
            .or_default() += 1;
    }
    let head: Vec<String> = counts
        .iter()
        .map(|((sev, cat), n)| format!("{} {}: {n}", sev.0.as_str(), cat.as_str()))
        .collect();

    let mut lines = vec![head.join(", ")];
    for (i, issue) in issues.iter().take(5).enumerate() {
        lines.push(format!("{}. {}", i + 1, truncate(&issue.description, 100)));
        if let Some(fix) = &issue.suggested_fix {
            lines.push(format!("   fix: {}", truncate(fix, 80)));
        }
    }
    lines.join("\n")
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(category: IssueCategory) -> Issue {
        Issue::new(Severity::Warning, category, format!("{} problem", category.as_str()))
    }

    #[test]
    fn parses_plan_wrapped_in_prose() {
        let text = r#"Here is the plan:
        {"interpreted_mood": "cozy", "required_objects": ["bed", " lamp ", ""],
         "spatial_requirements": {"primary_focal_point": "bed",
            "relationships": [{"object": "lamp", "relative_to": "bed", "position": "next to"}]},
         "lighting_requirements": {"time_of_day": "evening"},
         "execution_order": ["critic"]}"#;
        let plan = parse_plan(text).unwrap();
        assert_eq!(plan.mood, "cozy");
        assert_eq!(plan.required_entities, vec!["bed", "lamp"]);
        assert_eq!(plan.spatial.primary_focal_point.as_deref(), Some("bed"));
        assert_eq!(plan.spatial.relationships.len(), 1);
        assert_eq!(plan.lighting.time_of_day.as_deref(), Some("evening"));
        assert_eq!(plan.execution_order, Stage::ORDER.to_vec());
    }

    #[test]
    fn plan_without_objects_is_rejected() {
        assert!(parse_plan(r#"{"interpreted_mood": "cozy", "required_objects": []}"#).is_err());
        assert!(parse_plan("I cannot help with that").is_err());
        assert!(parse_plan(r#"{"required_objects": "bed"}"#).is_err());
    }

    #[test]
    fn fallback_tokenizes_vocabulary_words() {
        let plan = fallback_plan("A bed, two Chairs and a desk near the window; another bed");
        assert_eq!(plan.mood, "neutral");
        assert_eq!(plan.required_entities, vec!["bed", "chair", "desk", "window", "bed"]);
    }

    #[test]
    fn fallback_without_known_words_uses_placeholder_entity() {
        assert_eq!(tokenize_entities("something ethereal"), vec![PRIMARY_OBJECT]);
    }

    #[test]
    fn routing_table() {
        assert_eq!(route_category(IssueCategory::Clipping), Stage::Placer);
        assert_eq!(route_category(IssueCategory::Floating), Stage::Placer);
        assert_eq!(route_category(IssueCategory::Material), Stage::Texturer);
        assert_eq!(route_category(IssueCategory::Lighting), Stage::Illuminator);
        assert_eq!(route_category(IssueCategory::Overexposure), Stage::Illuminator);
        assert_eq!(route_category(IssueCategory::MissingAsset), Stage::AssetResolver);
    }

    #[test]
    fn revision_picks_earliest_stage() {
        let issues = vec![
            issue(IssueCategory::Lighting),
            issue(IssueCategory::Material),
            issue(IssueCategory::Clipping),
        ];
        assert_eq!(revision_target(&issues), Stage::Placer);
        assert_eq!(
            revision_target(&[issue(IssueCategory::Overexposure), issue(IssueCategory::MissingAsset)]),
            Stage::AssetResolver
        );
        assert_eq!(revision_target(&[]), Stage::Placer);
    }

    #[test]
    fn summary_counts_by_severity_and_category() {
        let issues = vec![
            Issue::new(Severity::Error, IssueCategory::Clipping, "a hits b").with_fix("move b"),
            Issue::new(Severity::Error, IssueCategory::Clipping, "c hits d"),
            issue(IssueCategory::Material),
        ];
        let s = summarize_issues(&issues);
        let first = s.lines().next().unwrap();
        assert_eq!(first, "error clipping: 2, warning material: 1");
        assert!(s.contains("fix: move b"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("hi", 5), "hi");
    }
}
