use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::model::Extents;

pub const ENV_ADDR: &str = "SCENE_DIRECTOR_ADDR";
pub const ENV_WORKERS: &str = "SCENE_DIRECTOR_WORKERS";
pub const ENV_MAX_ITERATIONS: &str = "SCENE_DIRECTOR_MAX_ITERATIONS";

/// Runtime settings. Every section falls back to its defaults when omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineSection,
    pub room: RoomSection,
    pub placement: PlacementSection,
    pub validation: ValidationSection,
    pub assets: AssetsSection,
    pub memory: MemorySection,
    pub server: ServerSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub default_max_iterations: u32,
    /// Consult the similarity memory while decomposing.
    pub use_memory: bool,
    /// Store completed scenes in the similarity memory.
    pub store_completed: bool,
    /// Let the illuminator ask the language model for a preset.
    pub llm_lighting_override: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            default_max_iterations: 3,
            use_memory: true,
            store_completed: true,
            llm_lighting_override: true,
        }
    }
}

/// Room centred on the origin, floor at z = 0.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomSection {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl Default for RoomSection {
    fn default() -> Self {
        Self {
            width: 6.0,
            depth: 6.0,
            height: 3.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlacementSection {
    pub grid_step: f64,
    pub min_spacing: f64,
    pub clip_tolerance: f64,
    pub repair_passes: u32,
}

impl Default for PlacementSection {
    fn default() -> Self {
        Self {
            grid_step: 0.4,
            min_spacing: 0.5,
            clip_tolerance: 0.05,
            repair_passes: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
    pub passing_score: u32,
    pub clip_tolerance: f64,
    pub severe_overlap: f64,
    pub sink_threshold: f64,
    pub float_threshold: f64,
    pub resting_tolerance: f64,
    pub overexposure_brightness: f64,
    pub max_exposure: f64,
    pub key_light_intensity: f64,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            passing_score: 60,
            clip_tolerance: 0.05,
            severe_overlap: 0.3,
            sink_threshold: -0.1,
            float_threshold: 0.2,
            resting_tolerance: 0.1,
            overexposure_brightness: 0.98,
            max_exposure: 1.5,
            key_light_intensity: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsSection {
    pub polygon_ceiling: u32,
    pub placeholder_extents: [f64; 3],
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            polygon_ceiling: 500_000,
            placeholder_extents: [0.5, 0.5, 0.5],
        }
    }
}

impl AssetsSection {
    pub fn placeholder(&self) -> Extents {
        let [w, d, h] = self.placeholder_extents;
        Extents::new(w, d, h)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub search_limit: usize,
    pub min_score: f64,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            search_limit: 3,
            min_score: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub addr: String,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            workers: 4,
            queue_capacity: 64,
        }
    }
}

impl Settings {
    /// Defaults, then the optional TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings at {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("failed to parse settings toml")
    }

    /// Apply overrides from a key lookup (the process environment in `load`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup(ENV_ADDR) {
            self.server.addr = addr;
        }
        if let Some(workers) = lookup(ENV_WORKERS) {
            self.server.workers = workers
                .trim()
                .parse()
                .with_context(|| format!("{ENV_WORKERS} must be an integer, got '{workers}'"))?;
        }
        if let Some(max) = lookup(ENV_MAX_ITERATIONS) {
            self.pipeline.default_max_iterations = max
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_ITERATIONS} must be an integer, got '{max}'"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let room = &self.room;
        if !(room.width > 0.0 && room.depth > 0.0 && room.height > 0.0) {
            bail!(
                "room dimensions must be positive, got {}x{}x{}",
                room.width,
                room.depth,
                room.height
            );
        }
        if !(self.placement.grid_step > 0.0) {
            bail!("placement.grid_step must be positive");
        }
        if self.placement.min_spacing < 0.0 || self.placement.clip_tolerance < 0.0 {
            bail!("placement spacing and tolerance must not be negative");
        }
        if self.validation.passing_score > 100 {
            bail!("validation.passing_score must be within 0..=100");
        }
        if self.server.workers == 0 {
            bail!("server.workers must be at least 1");
        }
        Ok(())
    }
}
