//! Language-model collaborator.
//!
//! Stages only ever ask for text and parse a JSON object out of it. Whatever
//! sits behind [`LanguageModel`] may fail or answer with prose; callers treat
//! both the same way and fall back to deterministic defaults.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;

use crate::stages::Stage;

/// What a request asks the model for. Scripted responses are queued per task,
/// so a plan and revision advice never draw from the same queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTask {
    Plan,
    RevisionAdvice,
    LightingPreset,
}

impl ModelTask {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelTask::Plan => "plan",
            ModelTask::RevisionAdvice => "revision_advice",
            ModelTask::LightingPreset => "lighting_preset",
        }
    }

    /// Stage on whose behalf the request is made.
    pub fn stage(self) -> Stage {
        match self {
            ModelTask::Plan | ModelTask::RevisionAdvice => Stage::Decomposer,
            ModelTask::LightingPreset => Stage::Illuminator,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub task: ModelTask,
    pub system_prompt: &'a str,
    pub context: &'a str,
    pub user: &'a str,
}

pub trait LanguageModel: Send + Sync {
    fn generate(&self, request: &ModelRequest<'_>) -> Result<String>;
}

/// Model used when nothing is configured. Every call fails, so every stage
/// takes its documented fallback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineModel;

impl LanguageModel for OfflineModel {
    fn generate(&self, request: &ModelRequest<'_>) -> Result<String> {
        Err(anyhow!(
            "no language model configured ({} {} request)",
            request.task.stage().as_str(),
            request.task.as_str()
        ))
    }
}

/// Replays canned responses per task, in order. A task with no responses
/// left behaves like [`OfflineModel`].
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<HashMap<ModelTask, VecDeque<String>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, task: ModelTask, response: impl Into<String>) -> Self {
        self.push(task, response);
        self
    }

    pub fn push(&self, task: ModelTask, response: impl Into<String>) {
        if let Ok(mut map) = self.responses.lock() {
            map.entry(task).or_default().push_back(response.into());
        }
    }

    pub fn remaining(&self, task: ModelTask) -> usize {
        self.responses
            .lock()
            .ok()
            .and_then(|map| map.get(&task).map(VecDeque::len))
            .unwrap_or(0)
    }
}

impl LanguageModel for ScriptedModel {
    fn generate(&self, request: &ModelRequest<'_>) -> Result<String> {
        let mut map = self
            .responses
            .lock()
            .map_err(|_| anyhow!("scripted model lock poisoned"))?;
        map.get_mut(&request.task)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| anyhow!("no scripted response left for {}", request.task.as_str()))
    }
}

/// Parse the span between the first `{` and the last `}` of `text`.
pub fn extract_json_object<T: DeserializeOwned>(text: &str) -> Result<T> {
    let start = text
        .find('{')
        .ok_or_else(|| anyhow!("response contains no json object"))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow!("response json object is not closed"))?;
    serde_json::from_str(&text[start..=end]).context("response json does not match expected shape")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct PresetReply {
        preset: String,
    }

    fn request(task: ModelTask) -> ModelRequest<'static> {
        ModelRequest {
            task,
            system_prompt: "sys",
            context: "",
            user: "hi",
        }
    }

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let text = "Sure! Here you go:\n```json\n{\"preset\": \"cozy\"}\n```\nAnything else?";
        let reply: PresetReply = extract_json_object(text).unwrap();
        assert_eq!(reply.preset, "cozy");
    }

    #[test]
    fn rejects_text_without_object() {
        assert!(extract_json_object::<PresetReply>("no braces here").is_err());
        assert!(extract_json_object::<PresetReply>("} backwards {").is_err());
        assert!(extract_json_object::<PresetReply>("{\"other\": 1}").is_err());
    }

    #[test]
    fn scripted_model_replays_per_task() {
        let model = ScriptedModel::new()
            .with_response(ModelTask::Plan, "one")
            .with_response(ModelTask::Plan, "two")
            .with_response(ModelTask::LightingPreset, "light");

        assert_eq!(model.generate(&request(ModelTask::Plan)).unwrap(), "one");
        assert_eq!(model.generate(&request(ModelTask::LightingPreset)).unwrap(), "light");
        assert_eq!(model.generate(&request(ModelTask::Plan)).unwrap(), "two");
        assert!(model.generate(&request(ModelTask::Plan)).is_err());
        assert_eq!(model.remaining(ModelTask::LightingPreset), 0);
    }

    #[test]
    fn advice_does_not_consume_queued_plans() {
        let model = ScriptedModel::new().with_response(ModelTask::Plan, "plan");
        assert!(model.generate(&request(ModelTask::RevisionAdvice)).is_err());
        assert_eq!(model.remaining(ModelTask::Plan), 1);
        assert_eq!(model.generate(&request(ModelTask::Plan)).unwrap(), "plan");
    }

    #[test]
    fn offline_model_always_fails() {
        let err = OfflineModel.generate(&request(ModelTask::LightingPreset)).unwrap_err();
        assert!(err.to_string().contains("illuminator"));
    }
}
