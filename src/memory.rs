//! Similarity memory of completed scenes.
//!
//! The decomposer reads from it for context and the controller writes a
//! summary after a run completes. Inserts only append, so concurrent runs
//! never need a read-then-write transaction; a search racing an insert may or
//! may not see the new scene.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::record::SceneRecord;
use crate::stages::validator::score_issues;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSummary {
    pub scene_id: String,
    pub request_text: String,
    pub mood: String,
    pub entity_names: Vec<String>,
    pub lighting_mood: String,
    pub light_count: usize,
    pub color_temperature: Option<u32>,
    pub focal_length: Option<f64>,
    pub aperture: Option<f64>,
    pub passed: bool,
    pub score: u32,
    pub stored_at: u64,
}

impl SceneSummary {
    pub fn from_record(record: &SceneRecord, stored_at: u64) -> Self {
        let key_light = record.lighting.as_ref().and_then(|l| l.lights.first());
        let lighting_mood = match key_light.map(|l| l.color_temperature) {
            Some(k) if k < 4000 => "warm",
            Some(k) if k > 6000 => "cool",
            Some(_) => "neutral",
            None => "",
        };
        let score = record
            .validation
            .as_ref()
            .map(|v| v.score)
            .unwrap_or_else(|| score_issues(&record.issues));
        Self {
            scene_id: record.scene_id.clone(),
            request_text: record.request_text.clone(),
            mood: record.plan.as_ref().map(|p| p.mood.clone()).unwrap_or_default(),
            entity_names: record.entities.iter().map(|e| e.name.clone()).collect(),
            lighting_mood: lighting_mood.to_string(),
            light_count: record.lighting.as_ref().map_or(0, |l| l.lights.len()),
            color_temperature: key_light.map(|l| l.color_temperature),
            focal_length: record.camera.as_ref().map(|c| c.focal_length),
            aperture: record.camera.as_ref().map(|c| c.aperture),
            passed: record.passed(),
            score,
            stored_at,
        }
    }

    pub fn search_text(&self) -> String {
        let mut parts = vec![
            format!("Scene: {}", self.request_text),
            format!("Mood: {}", self.mood),
            format!("Objects: {}", self.entity_names.join(", ")),
        ];
        if !self.lighting_mood.is_empty() {
            parts.push(format!("Lighting: {}", self.lighting_mood));
        }
        if let (Some(focal), Some(aperture)) = (self.focal_length, self.aperture) {
            parts.push(format!("Camera: {focal}mm f/{aperture}"));
        }
        parts.join(" | ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSummary {
    pub summary: SceneSummary,
    /// Cosine similarity in 0..=1.
    pub similarity: f64,
}

pub trait SimilarityMemory: Send + Sync {
    fn store(&self, summary: SceneSummary) -> Result<()>;
    fn search(&self, query: &str, limit: usize, min_score: f64) -> Result<Vec<RankedSummary>>;
    fn get(&self, scene_id: &str) -> Option<SceneSummary>;
    /// Most recently stored first.
    fn recent(&self, limit: usize) -> Vec<SceneSummary>;
    fn remove(&self, scene_id: &str) -> bool;
    fn clear(&self) -> usize;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type TermVector = HashMap<String, f64>;

#[derive(Debug, Default)]
pub struct InMemorySceneMemory {
    entries: RwLock<Vec<(SceneSummary, TermVector)>>,
}

impl InMemorySceneMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

fn term_vector(text: &str) -> TermVector {
    let mut v = TermVector::new();
    for w in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
    {
        *v.entry(w.to_string()).or_insert(0.0) += 1.0;
    }
    v
}

fn cosine(a: &TermVector, b: &TermVector) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(k, x)| b.get(k).map(|y| x * y))
        .sum();
    let norm = |v: &TermVector| v.values().map(|x| x * x).sum::<f64>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 { 0.0 } else { dot / denom }
}

impl SimilarityMemory for InMemorySceneMemory {
    fn store(&self, summary: SceneSummary) -> Result<()> {
        let vector = term_vector(&summary.search_text());
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("scene memory lock poisoned"))?;
        entries.push((summary, vector));
        Ok(())
    }

    fn search(&self, query: &str, limit: usize, min_score: f64) -> Result<Vec<RankedSummary>> {
        let query = term_vector(query);
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("scene memory lock poisoned"))?;
        let mut ranked: Vec<RankedSummary> = entries
            .iter()
            .map(|(summary, vector)| RankedSummary {
                summary: summary.clone(),
                similarity: cosine(&query, vector),
            })
            .filter(|r| r.similarity >= min_score && r.similarity > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(limit);
        Ok(ranked)
    }

    fn get(&self, scene_id: &str) -> Option<SceneSummary> {
        let entries = self.entries.read().ok()?;
        entries
            .iter()
            .find(|(s, _)| s.scene_id == scene_id)
            .map(|(s, _)| s.clone())
    }

    fn recent(&self, limit: usize) -> Vec<SceneSummary> {
        let Ok(entries) = self.entries.read() else {
            return Vec::new();
        };
        entries.iter().rev().take(limit).map(|(s, _)| s.clone()).collect()
    }

    fn remove(&self, scene_id: &str) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(s, _)| s.scene_id != scene_id);
        entries.len() != before
    }

    fn clear(&self) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let n = entries.len();
        entries.clear();
        n
    }

    fn len(&self) -> usize {
        self.entries.read().map_or(0, |e| e.len())
    }
}
