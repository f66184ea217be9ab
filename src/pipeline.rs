//! Pipeline controller.
//!
//! Drives one scene request through the stages as a bounded state machine:
//! `Pending -> InProgress -> Completed | Failed`, with `Revision` in between
//! when validation fails and iterations remain. A revision resumes at the
//! routed stage; stages upstream of it are not re-run.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use log::{info, warn};
use uuid::Uuid;

use crate::{
    catalog::{AssetCatalog, StaticCatalog},
    config::Settings,
    llm::{LanguageModel, OfflineModel},
    memory::{InMemorySceneMemory, SceneSummary, SimilarityMemory},
    model::{ActionEntry, SceneStatus, ValidationOutcome},
    protocol::{SceneRequestPayload, SceneResponse, now_millis},
    record::{SceneRecord, StageUpdate, merge},
    stages::{Stage, StageContext, decomposer, validator},
};

pub const ITERATION_LIMIT_NOTE: &str =
    "Iteration limit reached; remaining issues are reported above.";

/// Stage that follows `stage` in a forward traversal. `None` after the
/// validator, whose outcome decides what happens next.
pub fn next(stage: Stage) -> Option<Stage> {
    match stage {
        Stage::Decomposer => Some(Stage::AssetResolver),
        Stage::AssetResolver => Some(Stage::Placer),
        Stage::Placer => Some(Stage::Texturer),
        Stage::Texturer => Some(Stage::Illuminator),
        Stage::Illuminator => Some(Stage::Validator),
        Stage::Validator => None,
    }
}

#[derive(Clone)]
pub struct Director {
    settings: Arc<Settings>,
    model: Arc<dyn LanguageModel>,
    catalog: Arc<dyn AssetCatalog>,
    memory: Arc<dyn SimilarityMemory>,
}

impl Director {
    pub fn new(
        settings: Arc<Settings>,
        model: Arc<dyn LanguageModel>,
        catalog: Arc<dyn AssetCatalog>,
        memory: Arc<dyn SimilarityMemory>,
    ) -> Self {
        Self {
            settings,
            model,
            catalog,
            memory,
        }
    }

    /// Bundled catalog, empty memory and no language model.
    pub fn offline(settings: Settings) -> Result<Self> {
        Ok(Self::new(
            Arc::new(settings),
            Arc::new(OfflineModel),
            Arc::new(StaticCatalog::bundled()?),
            Arc::new(InMemorySceneMemory::new()),
        ))
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = model;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn AssetCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn SimilarityMemory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn memory(&self) -> &Arc<dyn SimilarityMemory> {
        &self.memory
    }

    fn context(&self) -> StageContext<'_> {
        StageContext {
            settings: &self.settings,
            model: self.model.as_ref(),
            catalog: self.catalog.as_ref(),
            memory: self.memory.as_ref(),
        }
    }

    pub fn run(&self, request_text: &str, max_iterations: u32) -> SceneRecord {
        let scene_id = Uuid::new_v4().to_string();
        let mut record = SceneRecord::new(scene_id, request_text, max_iterations);

        if request_text.trim().is_empty() {
            warn!("[pipeline] rejecting empty request");
            record.errors.push("request text is empty".to_string());
            record.status = SceneStatus::Failed;
            return record;
        }

        info!(
            "[pipeline] scene {} started (max {max_iterations} iterations)",
            record.scene_id
        );
        record.status = SceneStatus::InProgress;
        let ctx = self.context();
        let mut stage = Stage::Decomposer;

        loop {
            let update = match stage.run(&ctx, &record) {
                Ok(update) => update,
                Err(e) => {
                    warn!("[pipeline] {} failed: {e:#}", stage.as_str());
                    record.errors.push(format!("{}: {e:#}", stage.as_str()));
                    record.status = SceneStatus::Failed;
                    break;
                }
            };
            record = apply(record, stage, update);

            if let Some(following) = next(stage) {
                stage = following;
                continue;
            }

            if record.passed() {
                record.status = SceneStatus::Completed;
                break;
            }

            record.iteration_count += 1;
            if record.iteration_count >= record.max_iterations {
                warn!(
                    "[pipeline] scene {} stopped after {} iterations with {} open issues",
                    record.scene_id,
                    record.iteration_count,
                    record.issues.len()
                );
                record = finish_at_limit(record);
                break;
            }

            record.status = SceneStatus::Revision;
            let (target, routing) = decomposer::route_revision(&ctx, &record);
            record = apply(record, Stage::Decomposer, routing);
            record.status = SceneStatus::InProgress;
            stage = target;
        }

        info!(
            "[pipeline] scene {} {:?} after {} iterations, {} actions",
            record.scene_id,
            record.status,
            record.iteration_count,
            record.actions.len()
        );

        if record.status == SceneStatus::Completed && self.settings.pipeline.store_completed {
            let summary = SceneSummary::from_record(&record, now_millis());
            if let Err(e) = self.memory.store(summary) {
                warn!("[pipeline] failed to store scene {} in memory: {e:#}", record.scene_id);
            }
        }
        record
    }

    pub fn process(&self, request: &SceneRequestPayload) -> SceneResponse {
        let started = Instant::now();
        let max = request
            .max_iterations
            .unwrap_or(self.settings.pipeline.default_max_iterations);
        let record = self.run(&request.prompt, max);
        SceneResponse::from_record(&record, started.elapsed().as_millis() as u64)
    }
}

/// Merge a stage's update and log it as one action entry.
fn apply(record: SceneRecord, stage: Stage, mut update: StageUpdate) -> SceneRecord {
    let summary = std::mem::take(&mut update.summary);
    update.actions.push(ActionEntry {
        stage,
        summary,
        timestamp: now_millis(),
    });
    merge(record, update)
}

/// Escape valve: complete with the outstanding issues and a report that says
/// the run gave up rather than converged.
fn finish_at_limit(mut record: SceneRecord) -> SceneRecord {
    let (score, passed) = record
        .validation
        .as_ref()
        .map_or((validator::score_issues(&record.issues), false), |v| (v.score, v.passed));
    let report = validator::report::render(&record, &record.issues, score, passed, Some(ITERATION_LIMIT_NOTE));
    record.validation = Some(ValidationOutcome {
        passed,
        score,
        report: Some(report),
    });
    record.status = SceneStatus::Completed;
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_follow_stage_order() {
        for pair in Stage::ORDER.windows(2) {
            assert_eq!(next(pair[0]), Some(pair[1]));
        }
        assert_eq!(next(Stage::Validator), None);
    }

    #[test]
    fn one_action_per_stage_in_a_clean_run() -> Result<()> {
        let director = Director::offline(Settings::default())?;
        let record = director.run("a bed and a desk", 3);

        assert_eq!(record.status, SceneStatus::Completed);
        assert_eq!(record.iteration_count, 0);
        let stages: Vec<Stage> = record.actions.iter().map(|a| a.stage).collect();
        assert_eq!(stages, Stage::ORDER.to_vec());
        assert!(record.validation.as_ref().is_some_and(|v| v.report.is_some()));
        Ok(())
    }

    #[test]
    fn completed_scenes_are_remembered() -> Result<()> {
        let director = Director::offline(Settings::default())?;
        let record = director.run("a bed and a desk", 3);
        assert_eq!(director.memory().len(), 1);
        assert!(director.memory().get(&record.scene_id).is_some());
        Ok(())
    }

    #[test]
    fn empty_request_fails_without_running_stages() -> Result<()> {
        let director = Director::offline(Settings::default())?;
        let record = director.run("   ", 3);
        assert_eq!(record.status, SceneStatus::Failed);
        assert!(record.actions.is_empty());
        assert_eq!(record.iteration_count, 0);
        assert!(!record.errors.is_empty());
        assert!(director.memory().is_empty());
        Ok(())
    }
}
