use anyhow::Result;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::{
    llm::{ModelRequest, ModelTask, extract_json_object},
    model::{Camera, IssueCategory, LightKind, LightSource, Lighting, Severity, Vec3},
    record::{SceneRecord, StageUpdate},
    stages::{StageContext, placer::geometry::world_position},
};

pub const SYSTEM_PROMPT: &str = r#"You are the lighting director of a 3D scene team. Pick the lighting preset that best fits the scene.

Known presets: warm_morning, cool_evening, dramatic, soft_diffuse, cozy, neutral.

Answer with a single JSON object: {"preset": "cozy"}"#;

const KEY_POSITION: Vec3 = Vec3 {
    x: 3.0,
    y: -2.0,
    z: 4.0,
};
const FILL_POSITION: Vec3 = Vec3 {
    x: -2.0,
    y: -1.0,
    z: 3.0,
};
const AMBIENT_INTENSITY: f64 = 0.1;
const EYE_HEIGHT: f64 = 1.6;
const SENSOR_SIZE: f64 = 36.0;
const EXPOSURE_STEP: f64 = 0.1;
const EXPOSURE_FLOOR: f64 = 0.6;
const KEY_BOOST: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightingPreset {
    WarmMorning,
    CoolEvening,
    Dramatic,
    SoftDiffuse,
    Cozy,
    Neutral,
}

#[derive(Debug, Clone, Copy)]
struct LightSpec {
    kind: LightKind,
    angle: f64,
    color_temperature: u32,
    intensity: f64,
    size: f64,
}

const fn light(kind: LightKind, angle: f64, color_temperature: u32, intensity: f64, size: f64) -> LightSpec {
    LightSpec {
        kind,
        angle,
        color_temperature,
        intensity,
        size,
    }
}

impl LightingPreset {
    pub const ALL: [LightingPreset; 6] = [
        LightingPreset::WarmMorning,
        LightingPreset::CoolEvening,
        LightingPreset::Dramatic,
        LightingPreset::SoftDiffuse,
        LightingPreset::Cozy,
        LightingPreset::Neutral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LightingPreset::WarmMorning => "warm_morning",
            LightingPreset::CoolEvening => "cool_evening",
            LightingPreset::Dramatic => "dramatic",
            LightingPreset::SoftDiffuse => "soft_diffuse",
            LightingPreset::Cozy => "cozy",
            LightingPreset::Neutral => "neutral",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|p| p.as_str() == normalized)
    }

    /// A full preset name in the text wins outright; otherwise the last preset
    /// sharing a word with the text; otherwise neutral.
    pub fn for_mood(text: &str) -> Self {
        let lower = text.to_lowercase();
        let mut chosen = LightingPreset::Neutral;
        for preset in Self::ALL {
            let name = preset.as_str();
            if lower.contains(&name.replace('_', " ")) || lower.contains(name) {
                return preset;
            }
            if name.split('_').any(|w| lower.contains(w)) {
                chosen = preset;
            }
        }
        chosen
    }

    fn key(self) -> LightSpec {
        use LightKind::*;
        match self {
            LightingPreset::WarmMorning => light(Sun, 20.0, 3500, 3.0, 1.0),
            LightingPreset::CoolEvening => light(Sun, 15.0, 6500, 1.5, 1.0),
            LightingPreset::Dramatic => light(Spot, 45.0, 4000, 5.0, 1.0),
            LightingPreset::SoftDiffuse => light(Area, 45.0, 5500, 2.0, 3.0),
            LightingPreset::Cozy => light(Area, 30.0, 3200, 2.5, 1.0),
            LightingPreset::Neutral => light(Sun, 45.0, 5500, 2.0, 1.0),
        }
    }

    fn fill(self) -> Option<LightSpec> {
        use LightKind::*;
        match self {
            LightingPreset::WarmMorning => Some(light(Area, 45.0, 4500, 0.5, 1.0)),
            LightingPreset::CoolEvening => Some(light(Area, 45.0, 7000, 0.3, 1.0)),
            LightingPreset::Dramatic => None,
            LightingPreset::SoftDiffuse => Some(light(Area, 45.0, 5500, 1.0, 2.0)),
            LightingPreset::Cozy => Some(light(Point, 45.0, 2800, 0.8, 1.0)),
            LightingPreset::Neutral => Some(light(Area, 45.0, 5500, 0.6, 1.0)),
        }
    }

    fn hdri(self) -> &'static str {
        match self {
            LightingPreset::WarmMorning => "/hdri/morning_interior.hdr",
            LightingPreset::CoolEvening => "/hdri/evening_blue.hdr",
            LightingPreset::Dramatic => "/hdri/studio_dark.hdr",
            LightingPreset::SoftDiffuse => "/hdri/overcast_soft.hdr",
            LightingPreset::Cozy => "/hdri/cozy_interior.hdr",
            LightingPreset::Neutral => "/hdri/neutral_studio.hdr",
        }
    }

    pub fn exposure(self) -> f64 {
        match self {
            LightingPreset::CoolEvening => 0.8,
            LightingPreset::Dramatic => 1.2,
            LightingPreset::Cozy => 0.9,
            _ => 1.0,
        }
    }

    pub fn lighting(self) -> Lighting {
        let mut lights = vec![source("key_light", self.key(), KEY_POSITION, 45.0)];
        if let Some(fill) = self.fill() {
            lights.push(source("fill_light", fill, FILL_POSITION, -45.0));
        }
        Lighting {
            lights,
            hdri: Some(self.hdri().to_string()),
            ambient_intensity: AMBIENT_INTENSITY,
            exposure: self.exposure(),
        }
    }
}

fn source(name: &str, spec: LightSpec, position: Vec3, heading: f64) -> LightSource {
    LightSource {
        name: name.to_string(),
        kind: spec.kind,
        position,
        rotation: Vec3::new(spec.angle, 0.0, heading),
        color_temperature: spec.color_temperature,
        intensity: spec.intensity,
        angle: spec.angle,
        size: spec.size,
    }
}

#[derive(Debug, Deserialize)]
struct PresetChoice {
    preset: String,
}

pub fn illuminate(ctx: &StageContext<'_>, record: &SceneRecord) -> Result<StageUpdate> {
    let plan = record.plan.as_ref();
    let mood = plan.map_or("neutral", |p| p.mood.as_str());
    let hints = plan.map(|p| &p.lighting);
    let mood_text = match hints.and_then(|h| h.mood.as_deref()) {
        Some(extra) => format!("{mood} {extra}"),
        None => mood.to_string(),
    };
    info!("[illuminator] lighting for '{mood_text}'");

    let suggested = if ctx.settings.pipeline.llm_lighting_override {
        ask_model(ctx, record, &mood_text)
    } else {
        None
    };
    let preset = suggested.unwrap_or_else(|| LightingPreset::for_mood(&mood_text));

    let mut lighting = preset.lighting();
    if let Some(time) = hints.and_then(|h| h.time_of_day.as_deref()) {
        adjust_for_time(&mut lighting, time);
    }
    let revisions = apply_revision_feedback(&mut lighting, record);

    let intimacy = hints.and_then(|h| h.intimacy.as_deref()).unwrap_or_default();
    let camera = camera_for(record, &format!("{intimacy} {mood}"));

    let mut summary = format!(
        "configured {} lights ({}) exposure {:.2}; camera {}mm at f/{}",
        lighting.lights.len(),
        preset.as_str(),
        lighting.exposure,
        camera.focal_length,
        camera.aperture
    );
    if !revisions.is_empty() {
        summary.push_str(&format!(" [{}]", revisions.join(", ")));
    }
    info!("[illuminator] {summary}");

    Ok(StageUpdate {
        lighting: Some(lighting),
        camera: Some(camera),
        summary,
        ..StageUpdate::default()
    })
}

fn ask_model(ctx: &StageContext<'_>, record: &SceneRecord, mood: &str) -> Option<LightingPreset> {
    let context = format!(
        "Scene mood: {mood}\nEntities: {}",
        record
            .entities
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    let text = ctx
        .model
        .generate(&ModelRequest {
            task: ModelTask::LightingPreset,
            system_prompt: SYSTEM_PROMPT,
            context: &context,
            user: "Which lighting preset fits this scene?",
        })
        .map_err(|e| debug!("[illuminator] no preset suggestion: {e:#}"))
        .ok()?;
    let choice: PresetChoice = match extract_json_object(&text) {
        Ok(choice) => choice,
        Err(e) => {
            warn!("[illuminator] unparsable preset suggestion: {e:#}");
            return None;
        }
    };
    let parsed = LightingPreset::parse(&choice.preset);
    if parsed.is_none() {
        warn!("[illuminator] ignoring unknown preset '{}'", choice.preset);
    }
    parsed
}

pub fn adjust_for_time(lighting: &mut Lighting, time_of_day: &str) {
    let (kelvin, angle, scale): (i64, f64, f64) = match time_of_day.trim().to_lowercase().as_str() {
        "morning" => (-500, -10.0, 1.0),
        "afternoon" => (0, 0.0, 1.0),
        "evening" => (-800, -20.0, 1.0),
        "night" => (1500, 0.0, 0.3),
        _ => return,
    };
    for light in &mut lighting.lights {
        light.color_temperature = (light.color_temperature as i64 + kelvin).max(1000) as u32;
        light.angle += angle;
        light.intensity *= scale;
    }
}

/// Respond to the previous validation pass: lower exposure for overexposure,
/// raise the key light for an underlit scene.
fn apply_revision_feedback(lighting: &mut Lighting, record: &SceneRecord) -> Vec<String> {
    let mut notes = Vec::new();
    if record.iteration_count == 0 {
        return notes;
    }
    let previous = record.lighting.as_ref();

    if record
        .issues
        .iter()
        .any(|i| i.category == IssueCategory::Overexposure)
    {
        let base = previous.map_or(lighting.exposure, |l| l.exposure);
        lighting.exposure = ((base - EXPOSURE_STEP).max(EXPOSURE_FLOOR) * 100.0).round() / 100.0;
        notes.push(format!("exposure lowered to {:.2}", lighting.exposure));
    }

    let underlit = record
        .issues
        .iter()
        .any(|i| i.category == IssueCategory::Lighting && i.severity == Severity::Warning);
    if underlit {
        if let Some(key) = lighting.lights.first_mut() {
            let base = previous
                .and_then(|l| l.lights.first())
                .map_or(key.intensity, |l| l.intensity);
            key.intensity = base + KEY_BOOST;
            notes.push(format!("key light raised to {:.2}", key.intensity));
        }
    }
    notes
}

pub fn camera_for(record: &SceneRecord, style: &str) -> Camera {
    let placed: Vec<(Vec3, f64, f64)> = record
        .entities
        .iter()
        .filter_map(|e| {
            let p = world_position(e, &record.entities)?;
            let ext = e.extents?;
            Some((p, ext.height, ext.width.max(ext.depth)))
        })
        .collect();

    let (center, radius) = if placed.is_empty() {
        (Vec3::new(0.0, 0.0, 0.5), 2.0)
    } else {
        let n = placed.len() as f64;
        let cx = placed.iter().map(|(p, _, _)| p.x).sum::<f64>() / n;
        let cy = placed.iter().map(|(p, _, _)| p.y).sum::<f64>() / n;
        let cz = placed.iter().map(|(p, h, _)| p.z + h / 2.0).sum::<f64>() / n;
        let extent = placed
            .iter()
            .map(|(p, _, size)| p.x.abs().max(p.y.abs()) + size / 2.0)
            .fold(0.0, f64::max);
        (Vec3::new(cx, cy, cz), (extent * 1.5).max(2.0))
    };

    let style = style.to_lowercase();
    let (focal_length, aperture, depth_of_field) = if style.contains("intimate") || style.contains("cozy") {
        (50.0, 1.8, true)
    } else if style.contains("dramatic") {
        (35.0, 2.8, true)
    } else if style.contains("wide") || style.contains("architectural") {
        (24.0, 8.0, false)
    } else {
        (35.0, 2.8, true)
    };

    let distance = radius * 2.0;
    let position = Vec3::new(center.x, center.y - distance, EYE_HEIGHT);
    let focus_distance = (distance.powi(2) + (EYE_HEIGHT - center.z).powi(2)).sqrt();
    Camera {
        position,
        target: center,
        focal_length,
        aperture,
        sensor_size: SENSOR_SIZE,
        depth_of_field,
        focus_distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Issue;

    #[test]
    fn mood_selects_preset() {
        assert_eq!(LightingPreset::for_mood("cozy evening"), LightingPreset::Cozy);
        assert_eq!(LightingPreset::for_mood("Warm Morning light"), LightingPreset::WarmMorning);
        assert_eq!(LightingPreset::for_mood("a cool study"), LightingPreset::CoolEvening);
        assert_eq!(LightingPreset::for_mood("serene"), LightingPreset::Neutral);
    }

    #[test]
    fn every_preset_has_a_key_light() {
        for preset in LightingPreset::ALL {
            let lighting = preset.lighting();
            assert!(!lighting.lights.is_empty());
            assert_eq!(lighting.lights[0].name, "key_light");
        }
        assert_eq!(LightingPreset::Dramatic.lighting().lights.len(), 1);
    }

    #[test]
    fn night_dims_lights() {
        let mut lighting = LightingPreset::Neutral.lighting();
        adjust_for_time(&mut lighting, "Night");
        assert!((lighting.lights[0].intensity - 0.6).abs() < 1e-9);
        assert_eq!(lighting.lights[0].color_temperature, 7000);
    }

    #[test]
    fn revision_lowers_exposure_with_floor() {
        let mut record = SceneRecord::new("s", "bed", 3);
        record.iteration_count = 1;
        record.issues = vec![Issue::new(Severity::Warning, IssueCategory::Overexposure, "bright")];
        let mut previous = LightingPreset::Neutral.lighting();
        previous.exposure = 0.65;
        record.lighting = Some(previous);

        let mut lighting = LightingPreset::Neutral.lighting();
        apply_revision_feedback(&mut lighting, &record);
        assert_eq!(lighting.exposure, 0.6);
    }

    #[test]
    fn underlit_warning_boosts_key_light() {
        let mut record = SceneRecord::new("s", "bed", 3);
        record.iteration_count = 2;
        record.issues = vec![Issue::new(Severity::Warning, IssueCategory::Lighting, "dim")];
        let mut previous = LightingPreset::CoolEvening.lighting();
        previous.lights[0].intensity = 1.5;
        record.lighting = Some(previous);

        let mut lighting = LightingPreset::CoolEvening.lighting();
        let notes = apply_revision_feedback(&mut lighting, &record);
        assert_eq!(lighting.lights[0].intensity, 2.0);
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn camera_frames_empty_scene_at_eye_height() {
        let record = SceneRecord::new("s", "bed", 3);
        let camera = camera_for(&record, "cozy");
        assert_eq!(camera.position, Vec3::new(0.0, -4.0, 1.6));
        assert_eq!(camera.focal_length, 50.0);
        assert!(camera.depth_of_field);
    }
}
