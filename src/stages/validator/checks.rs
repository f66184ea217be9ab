//! Independent validation checks. Every check runs on every pass.

use std::collections::HashMap;

use crate::{
    config::ValidationSection,
    model::{Issue, IssueCategory, Lighting, Plan, SceneEntity, Severity},
    stages::placer::geometry::{Aabb, world_box},
};

pub fn collisions(entities: &[SceneEntity], limits: &ValidationSection) -> Vec<Issue> {
    let boxes: Vec<Option<Aabb>> = entities.iter().map(|e| world_box(e, entities)).collect();
    let mut issues = Vec::new();
    for i in 0..entities.len() {
        let Some(a) = boxes[i] else { continue };
        for j in i + 1..entities.len() {
            let Some(b) = boxes[j] else { continue };
            let (first, second) = (&entities[i], &entities[j]);
            if is_parent_pair(first, second) {
                continue;
            }
            let depth = a.penetration(&b);
            if depth <= limits.clip_tolerance {
                continue;
            }
            let issue = if depth > limits.severe_overlap {
                Issue::new(
                    Severity::Error,
                    IssueCategory::Clipping,
                    format!(
                        "'{}' severely intersects with '{}' ({depth:.2}m overlap)",
                        first.name, second.name
                    ),
                )
                .with_fix(format!("move '{}' away from '{}'", second.name, first.name))
            } else {
                Issue::new(
                    Severity::Warning,
                    IssueCategory::Clipping,
                    format!("'{}' slightly overlaps '{}' ({depth:.2}m)", first.name, second.name),
                )
                .with_fix(format!("adjust position of '{}'", second.name))
            };
            issues.push(issue.with_entity(second.id.clone()));
        }
    }
    issues
}

fn is_parent_pair(a: &SceneEntity, b: &SceneEntity) -> bool {
    a.parent_id.as_deref() == Some(b.id.as_str()) || b.parent_id.as_deref() == Some(a.id.as_str())
}

/// Sunken entities and roots hovering above the floor with nothing under them.
pub fn resting(entities: &[SceneEntity], limits: &ValidationSection) -> Vec<Issue> {
    let boxes: Vec<Option<Aabb>> = entities.iter().map(|e| world_box(e, entities)).collect();
    let mut issues = Vec::new();
    for (i, e) in entities.iter().enumerate() {
        if e.is_architectural() {
            continue;
        }
        let Some(own) = boxes[i] else { continue };
        let z = own.min.z;
        if z < limits.sink_threshold {
            issues.push(
                Issue::new(
                    Severity::Warning,
                    IssueCategory::Floating,
                    format!("'{}' is below floor level (z={z:.2})", e.name),
                )
                .with_entity(e.id.clone())
                .with_fix("set z position to 0"),
            );
            continue;
        }
        if e.parent_id.is_some() || z <= limits.float_threshold {
            continue;
        }
        let supported = boxes.iter().enumerate().any(|(j, other)| {
            j != i
                && other.is_some_and(|o| {
                    (o.max.z - z).abs() <= limits.resting_tolerance
                        && o.footprint().penetration(&own.footprint()) > 0.0
                })
        });
        if !supported {
            issues.push(
                Issue::new(
                    Severity::Info,
                    IssueCategory::Floating,
                    format!("'{}' appears to be floating (z={z:.2})", e.name),
                )
                .with_entity(e.id.clone())
                .with_fix("place it on the floor or on a supporting surface"),
            );
        }
    }
    issues
}

pub fn materials(entities: &[SceneEntity]) -> Vec<Issue> {
    let mut issues = Vec::new();
    for e in entities {
        match &e.material {
            None => issues.push(
                Issue::new(
                    Severity::Warning,
                    IssueCategory::Material,
                    format!("'{}' has no material assigned", e.name),
                )
                .with_entity(e.id.clone())
                .with_fix("apply a PBR material preset"),
            ),
            Some(m) if m.texture_map.is_none() && !m.shader.texture_optional() => issues.push(
                Issue::new(
                    Severity::Info,
                    IssueCategory::Material,
                    format!("'{}' uses flat color without texture", e.name),
                )
                .with_entity(e.id.clone())
                .with_fix("add a diffuse texture map"),
            ),
            Some(_) => {}
        }
    }
    issues
}

pub fn exposure(entities: &[SceneEntity], lighting: Option<&Lighting>, limits: &ValidationSection) -> Vec<Issue> {
    let Some(lighting) = lighting else {
        return Vec::new();
    };
    let mut issues = Vec::new();
    for e in entities {
        let Some(m) = &e.material else { continue };
        let brightness = m.brightness() * lighting.exposure;
        if brightness > limits.overexposure_brightness {
            issues.push(
                Issue::new(
                    Severity::Warning,
                    IssueCategory::Overexposure,
                    format!("'{}' may be overexposed (brightness={brightness:.2})", e.name),
                )
                .with_entity(e.id.clone())
                .with_fix("reduce exposure or darken the base color"),
            );
        }
    }
    if lighting.exposure > limits.max_exposure {
        issues.push(
            Issue::new(
                Severity::Warning,
                IssueCategory::Overexposure,
                format!("scene exposure may be too high ({:.2})", lighting.exposure),
            )
            .with_fix(format!("keep exposure at or below {:.2}", limits.max_exposure)),
        );
    }
    issues
}

/// Zero lights is a single error; otherwise a dim key light is a warning.
pub fn lights(lighting: Option<&Lighting>, limits: &ValidationSection) -> Vec<Issue> {
    let lights = lighting.map_or(&[][..], |l| l.lights.as_slice());
    if lights.is_empty() {
        return vec![
            Issue::new(Severity::Error, IssueCategory::Lighting, "scene has no light sources")
                .with_fix("add at least a key light"),
        ];
    }
    if lights.iter().all(|l| l.intensity < limits.key_light_intensity) {
        return vec![
            Issue::new(
                Severity::Warning,
                IssueCategory::Lighting,
                format!(
                    "scene is underlit: no light reaches intensity {:.1}",
                    limits.key_light_intensity
                ),
            )
            .with_fix("raise the key light intensity"),
        ];
    }
    Vec::new()
}

/// One warning per requested entity without a counterpart; duplicates in the
/// request need as many entities.
pub fn alignment(plan: Option<&Plan>, entities: &[SceneEntity]) -> Vec<Issue> {
    let Some(plan) = plan else {
        return Vec::new();
    };
    let mut available: HashMap<String, usize> = HashMap::new();
    for e in entities {
        *available.entry(e.name.to_lowercase()).or_default() += 1;
    }
    let mut issues = Vec::new();
    for required in &plan.required_entities {
        match available.get_mut(&required.to_lowercase()) {
            Some(n) if *n > 0 => *n -= 1,
            _ => issues.push(
                Issue::new(
                    Severity::Warning,
                    IssueCategory::PromptAlignment,
                    format!("required object '{required}' not found in scene"),
                )
                .with_fix(format!("add '{required}' to the scene")),
            ),
        }
    }
    issues
}

pub fn placeholders(entities: &[SceneEntity]) -> Vec<Issue> {
    entities
        .iter()
        .filter(|e| e.placeholder)
        .map(|e| {
            Issue::new(
                Severity::Warning,
                IssueCategory::MissingAsset,
                format!("'{}' is placeholder geometry", e.name),
            )
            .with_entity(e.id.clone())
            .with_fix("provide a catalog asset")
        })
        .collect()
}
