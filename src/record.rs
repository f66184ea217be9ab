//! The scene record threaded through the pipeline and the partial updates that
//! stages hand back to the controller.
//!
//! Stages never mutate the record. Each returns a [`StageUpdate`] and the
//! controller folds it in with [`merge`]:
//! - plan, lighting, camera, validation outcome: replaced when present
//! - entities, issues: replaced wholesale when present
//! - action log, error list: appended

use serde::{Deserialize, Serialize};

use crate::model::{
    ActionEntry, Camera, Issue, Lighting, Plan, SceneEntity, SceneStatus, ValidationOutcome,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub scene_id: String,
    pub request_text: String,
    pub plan: Option<Plan>,
    pub entities: Vec<SceneEntity>,
    pub lighting: Option<Lighting>,
    pub camera: Option<Camera>,
    pub issues: Vec<Issue>,
    pub validation: Option<ValidationOutcome>,
    pub status: SceneStatus,
    pub iteration_count: u32,
    pub max_iterations: u32,
    pub actions: Vec<ActionEntry>,
    pub errors: Vec<String>,
}

impl SceneRecord {
    pub fn new(scene_id: impl Into<String>, request_text: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            scene_id: scene_id.into(),
            request_text: request_text.into(),
            plan: None,
            entities: Vec::new(),
            lighting: None,
            camera: None,
            issues: Vec::new(),
            validation: None,
            status: SceneStatus::Pending,
            iteration_count: 0,
            max_iterations,
            actions: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn entity(&self, id: &str) -> Option<&SceneEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn passed(&self) -> bool {
        self.validation.as_ref().is_some_and(|v| v.passed)
    }
}

/// Partial update produced by one stage invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageUpdate {
    pub plan: Option<Plan>,
    pub entities: Option<Vec<SceneEntity>>,
    pub lighting: Option<Lighting>,
    pub camera: Option<Camera>,
    pub issues: Option<Vec<Issue>>,
    pub validation: Option<ValidationOutcome>,
    pub status: Option<SceneStatus>,
    pub iteration_count: Option<u32>,
    pub actions: Vec<ActionEntry>,
    pub errors: Vec<String>,
    /// One-line description of what the stage did; the controller turns it
    /// into an action-log entry.
    pub summary: String,
}

impl StageUpdate {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }
}

pub fn merge(record: SceneRecord, update: StageUpdate) -> SceneRecord {
    let SceneRecord {
        scene_id,
        request_text,
        plan,
        entities,
        lighting,
        camera,
        issues,
        validation,
        status,
        iteration_count,
        max_iterations,
        mut actions,
        mut errors,
    } = record;

    actions.extend(update.actions);
    errors.extend(update.errors);

    SceneRecord {
        scene_id,
        request_text,
        plan: update.plan.or(plan),
        entities: update.entities.unwrap_or(entities),
        lighting: update.lighting.or(lighting),
        camera: update.camera.or(camera),
        issues: update.issues.unwrap_or(issues),
        validation: update.validation.or(validation),
        status: update.status.unwrap_or(status),
        iteration_count: update.iteration_count.unwrap_or(iteration_count),
        max_iterations,
        actions,
        errors,
    }
}
