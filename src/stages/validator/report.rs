use std::fmt::Write;

use crate::{model::Issue, record::SceneRecord};

pub fn recommendations(record: &SceneRecord) -> Vec<String> {
    let mut out = Vec::new();
    if record.entities.len() < 3 {
        out.push("Consider adding more objects for a richer scene composition".to_string());
    }
    if record.lighting.as_ref().is_some_and(|l| l.lights.len() == 1) {
        out.push("Adding a fill light could soften harsh shadows".to_string());
    }
    let cozy = record
        .plan
        .as_ref()
        .is_some_and(|p| p.mood.to_lowercase().contains("cozy"));
    if cozy && !record.entities.iter().any(|e| e.name_contains("rug")) {
        out.push("Adding a rug could enhance the cozy atmosphere".to_string());
    }
    out
}

/// Markdown report of the scene as it stands in `record`, with `issues` as
/// the outcome of the latest validation pass.
pub fn render(record: &SceneRecord, issues: &[Issue], score: u32, passed: bool, note: Option<&str>) -> String {
    // Writing into a String cannot fail.
    let mut r = String::new();
    let _ = writeln!(r, "# 3D Scene Validation Report\n");
    let _ = writeln!(r, "## Summary");
    let _ = writeln!(r, "- **Score**: {score}/100");
    let _ = writeln!(r, "- **Status**: {}", if passed { "PASSED" } else { "NEEDS REVISION" });
    let _ = writeln!(r, "- **Objects**: {}", record.entities.len());
    let _ = writeln!(r, "- **Iterations**: {}", record.iteration_count);

    let _ = writeln!(r, "\n## Scene Contents");
    for e in &record.entities {
        let material = e.material.as_ref().map_or("None", |m| m.name.as_str());
        match e.position {
            Some(p) => {
                let _ = writeln!(
                    r,
                    "- **{}**: Position ({:.2}, {:.2}, {:.2}), Material: {material}",
                    e.name, p.x, p.y, p.z
                );
            }
            None => {
                let _ = writeln!(r, "- **{}**: unplaced, Material: {material}", e.name);
            }
        }
    }

    if let Some(lighting) = &record.lighting {
        let _ = writeln!(r, "\n## Lighting");
        let _ = writeln!(r, "- **Lights**: {}", lighting.lights.len());
        let _ = writeln!(r, "- **HDRI**: {}", lighting.hdri.as_deref().unwrap_or("None"));
        let _ = writeln!(r, "- **Exposure**: {:.2}", lighting.exposure);
    }

    if let Some(camera) = &record.camera {
        let _ = writeln!(r, "\n## Camera");
        let _ = writeln!(r, "- **Focal Length**: {}mm", camera.focal_length);
        let _ = writeln!(r, "- **Aperture**: f/{}", camera.aperture);
        let _ = writeln!(
            r,
            "- **Depth of Field**: {}",
            if camera.depth_of_field { "Enabled" } else { "Disabled" }
        );
    }

    if !issues.is_empty() {
        let _ = writeln!(r, "\n## Issues Found");
        for issue in issues {
            let _ = writeln!(
                r,
                "- [{}] {}: {}",
                issue.severity.as_str().to_uppercase(),
                issue.category.as_str(),
                issue.description
            );
            if let Some(fix) = &issue.suggested_fix {
                let _ = writeln!(r, "  - Fix: {fix}");
            }
        }
    }

    let recs = recommendations(record);
    if !recs.is_empty() {
        let _ = writeln!(r, "\n## Recommendations");
        for rec in recs {
            let _ = writeln!(r, "- {rec}");
        }
    }

    if let Some(note) = note {
        let _ = writeln!(r, "\n## Note\n{note}");
    }
    r
}
