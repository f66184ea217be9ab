use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Right-handed, z-up coordinate (metres for positions, degrees for rotations).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

/// Bounding extents: width along x, depth along y, height along z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extents {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl Extents {
    pub fn new(width: f64, depth: f64, height: f64) -> Self {
        Self {
            width,
            depth,
            height,
        }
    }

    pub fn footprint_area(&self) -> f64 {
        self.width * self.depth
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    Pending,
    InProgress,
    Revision,
    Completed,
    Failed,
}

impl SceneStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SceneStatus::Completed | SceneStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Requested,
    Resolved,
    Placed,
    Textured,
    Validated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderKind {
    Cloth,
    Wood,
    Metal,
    Glass,
    Plastic,
    PrincipledBsdf,
}

impl ShaderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ShaderKind::Cloth => "cloth",
            ShaderKind::Wood => "wood",
            ShaderKind::Metal => "metal",
            ShaderKind::Glass => "glass",
            ShaderKind::Plastic => "plastic",
            ShaderKind::PrincipledBsdf => "principled_bsdf",
        }
    }

    /// Glass and metal read correctly without a diffuse texture.
    pub fn texture_optional(self) -> bool {
        matches!(self, ShaderKind::Glass | ShaderKind::Metal)
    }
}

/// PBR material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub shader: ShaderKind,
    /// RGBA in 0..=1.
    pub base_color: [f64; 4],
    pub roughness: f64,
    pub metallic: f64,
    pub subsurface: f64,
    pub clear_coat: f64,
    pub texture_map: Option<String>,
    pub normal_map: Option<String>,
    pub roughness_map: Option<String>,
}

impl Material {
    /// Mean of the RGB channels.
    pub fn brightness(&self) -> f64 {
        (self.base_color[0] + self.base_color[1] + self.base_color[2]) / 3.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntity {
    pub id: String,
    pub name: String,
    pub asset_ref: Option<String>,
    pub extents: Option<Extents>,
    #[serde(default)]
    pub polygon_count: u32,
    /// World position for roots; offset from the parent's position for children.
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub material: Option<Material>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub placeholder: bool,
    #[serde(default)]
    pub substituted_from: Option<String>,
    pub status: EntityStatus,
}

impl SceneEntity {
    pub fn requested(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            asset_ref: None,
            extents: None,
            polygon_count: 0,
            position: None,
            rotation: None,
            material: None,
            parent_id: None,
            placeholder: false,
            substituted_from: None,
            status: EntityStatus::Requested,
        }
    }

    pub fn name_contains(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(&needle.to_lowercase())
    }

    /// Walls, floors and similar fixtures are not subject to resting checks.
    /// The fixture word has to be the head noun: a floor lamp is a lamp.
    pub fn is_architectural(&self) -> bool {
        const FIXTURES: [&str; 5] = ["wall", "floor", "window", "ceiling", "door"];
        let lower = self.name.to_lowercase();
        let Some(head) = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .last()
        else {
            return false;
        };
        FIXTURES
            .iter()
            .any(|f| head == *f || head.strip_suffix('s') == Some(*f))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightKind {
    Sun,
    Area,
    Point,
    Spot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightSource {
    pub name: String,
    pub kind: LightKind,
    pub position: Vec3,
    pub rotation: Vec3,
    /// Kelvin.
    pub color_temperature: u32,
    pub intensity: f64,
    /// Degrees.
    pub angle: f64,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lighting {
    pub lights: Vec<LightSource>,
    pub hdri: Option<String>,
    pub ambient_intensity: f64,
    pub exposure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    /// Millimetres.
    pub focal_length: f64,
    /// f-stop.
    pub aperture: f64,
    pub sensor_size: f64,
    pub depth_of_field: bool,
    pub focus_distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Clipping,
    Floating,
    Material,
    Lighting,
    Overexposure,
    PromptAlignment,
    MissingAsset,
}

impl IssueCategory {
    pub const ALL: [IssueCategory; 7] = [
        IssueCategory::Clipping,
        IssueCategory::Floating,
        IssueCategory::Material,
        IssueCategory::Lighting,
        IssueCategory::Overexposure,
        IssueCategory::PromptAlignment,
        IssueCategory::MissingAsset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IssueCategory::Clipping => "clipping",
            IssueCategory::Floating => "floating",
            IssueCategory::Material => "material",
            IssueCategory::Lighting => "lighting",
            IssueCategory::Overexposure => "overexposure",
            IssueCategory::PromptAlignment => "prompt_alignment",
            IssueCategory::MissingAsset => "missing_asset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub category: IssueCategory,
    pub description: String,
    pub entity_id: Option<String>,
    pub suggested_fix: Option<String>,
}

impl Issue {
    pub fn new(severity: Severity, category: IssueCategory, description: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            description: description.into(),
            entity_id: None,
            suggested_fix: None,
        }
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Relationship {
    pub object: String,
    pub relative_to: String,
    /// Free-form relation, e.g. "on", "next to", "facing".
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialHints {
    pub primary_focal_point: Option<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    /// Explicit zone assignment by entity name.
    #[serde(default)]
    pub zones: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MaterialHint {
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub finish: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightingHints {
    pub time_of_day: Option<String>,
    pub mood: Option<String>,
    pub intimacy: Option<String>,
}

/// Intent derived from the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub mood: String,
    pub required_entities: Vec<String>,
    pub spatial: SpatialHints,
    pub materials: BTreeMap<String, MaterialHint>,
    pub lighting: LightingHints,
    pub execution_order: Vec<crate::stages::Stage>,
}

impl Plan {
    pub fn is_primary_focal(&self, entity_name: &str) -> bool {
        self.spatial
            .primary_focal_point
            .as_deref()
            .is_some_and(|focal| !focal.is_empty() && entity_name.eq_ignore_ascii_case(focal))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub stage: crate::stages::Stage,
    pub summary: String,
    pub timestamp: u64,
}

/// Result of one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub score: u32,
    pub report: Option<String>,
}
