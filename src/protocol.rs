use serde::{Deserialize, Serialize};

use crate::{
    memory::RankedSummary,
    model::{Camera, Issue, Lighting, SceneEntity, SceneStatus},
    record::SceneRecord,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WSMessage<T> {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub timestamp: u64,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T> WSMessage<T> {
    pub fn new(msg_type: &str, request_id: Option<String>, payload: Option<T>) -> Self {
        Self {
            msg_type: msg_type.to_string(),
            timestamp: now_millis(),
            request_id,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRequestPayload {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchPayload {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryResultsPayload {
    pub results: Vec<RankedSummary>,
}

/// What a caller gets back for one scene request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneResponse {
    pub scene_id: String,
    pub status: SceneStatus,
    pub entities: Vec<SceneEntity>,
    pub lighting: Option<Lighting>,
    pub camera: Option<Camera>,
    pub passed: bool,
    pub score: Option<u32>,
    pub issues: Vec<Issue>,
    pub report: Option<String>,
    pub iteration_count: u32,
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}

impl SceneResponse {
    pub fn from_record(record: &SceneRecord, elapsed_ms: u64) -> Self {
        let validation = record.validation.as_ref();
        Self {
            scene_id: record.scene_id.clone(),
            status: record.status,
            entities: record.entities.clone(),
            lighting: record.lighting.clone(),
            camera: record.camera.clone(),
            passed: record.passed(),
            score: validation.map(|v| v.score),
            issues: record.issues.clone(),
            report: validation.and_then(|v| v.report.clone()),
            iteration_count: record.iteration_count,
            errors: record.errors.clone(),
            elapsed_ms,
        }
    }
}

pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scene_request_uses_camel_case_envelope() {
        let text = r#"{"type":"scene_request","timestamp":1,"requestId":"r1","payload":{"prompt":"a bed","maxIterations":2}}"#;
        let msg: WSMessage<SceneRequestPayload> = serde_json::from_str(text).unwrap();
        assert_eq!(msg.msg_type, "scene_request");
        assert_eq!(msg.request_id.as_deref(), Some("r1"));
        let payload = msg.payload.unwrap();
        assert_eq!(payload.prompt, "a bed");
        assert_eq!(payload.max_iterations, Some(2));
    }

    #[test]
    fn optional_fields_are_omitted() {
        let msg = WSMessage::<ErrorPayload>::new("pong", None, None);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value.get("type"), Some(&json!("pong")));
        assert!(value.get("requestId").is_none());
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn response_projects_record() {
        let mut record = SceneRecord::new("s1", "a bed", 3);
        record.status = SceneStatus::Failed;
        record.errors.push("boom".into());
        let response = SceneResponse::from_record(&record, 12);
        assert_eq!(response.scene_id, "s1");
        assert!(!response.passed);
        assert_eq!(response.score, None);
        assert_eq!(response.elapsed_ms, 12);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value.get("status"), Some(&json!("failed")));
        assert!(value.get("elapsedMs").is_some());
    }
}
