use anyhow::{Result, bail};
use log::info;

use crate::{
    model::{EntityStatus, Material, MaterialHint, ShaderKind},
    record::{SceneRecord, StageUpdate},
    stages::StageContext,
};

pub const GENERIC_TEXTURE: &str = "/textures/generic/default_diffuse.png";

struct Preset {
    variant: Option<&'static str>,
    name: &'static str,
    shader: ShaderKind,
    color: [f64; 3],
    roughness: f64,
    metallic: f64,
    subsurface: f64,
    clear_coat: f64,
    texture: &'static str,
    normal: Option<&'static str>,
}

fn preset(
    variant: Option<&'static str>,
    name: &'static str,
    shader: ShaderKind,
    color: [f64; 3],
    roughness: f64,
    texture: &'static str,
) -> Preset {
    Preset {
        variant,
        name,
        shader,
        color,
        roughness,
        metallic: 0.0,
        subsurface: 0.0,
        clear_coat: 0.0,
        texture,
        normal: None,
    }
}

/// Category keyword and its presets; the first preset without a variant is
/// the category default. Categories are tried in order: bookshelf before book,
/// lamp before desk and table.
fn presets() -> Vec<(&'static str, Vec<Preset>)> {
    use ShaderKind::*;
    vec![
        (
            "bookshelf",
            vec![preset(None, "bookshelf_wood", Wood, [0.4, 0.25, 0.15], 0.55, "/textures/wood/pine_diffuse.png")],
        ),
        (
            "book",
            vec![preset(None, "book_covers", Plastic, [0.3, 0.25, 0.4], 0.6, "/textures/misc/book_spines.png")],
        ),
        (
            "lamp",
            vec![
                Preset {
                    subsurface: 0.3,
                    ..preset(Some("shade"), "lamp_shade", Cloth, [0.95, 0.92, 0.85], 0.8, "/textures/fabric/lamp_shade.png")
                },
                Preset {
                    metallic: 0.9,
                    ..preset(None, "lamp_material", Metal, [0.8, 0.75, 0.65], 0.3, "/textures/metal/brushed_metal.png")
                },
            ],
        ),
        (
            "bed",
            vec![
                Preset {
                    subsurface: 0.2,
                    ..preset(Some("white"), "white_bedding", Cloth, [0.98, 0.98, 0.98], 0.9, "/textures/fabric/cotton_white.png")
                },
                Preset {
                    subsurface: 0.15,
                    ..preset(None, "bed_fabric", Cloth, [0.95, 0.95, 0.95], 0.85, "/textures/fabric/linen_diffuse.png")
                },
            ],
        ),
        (
            "desk",
            vec![
                Preset {
                    clear_coat: 0.15,
                    ..preset(Some("wooden"), "oak_wood", Wood, [0.6, 0.4, 0.25], 0.35, "/textures/wood/oak_grain.png")
                },
                Preset {
                    clear_coat: 0.1,
                    normal: Some("/textures/wood/oak_normal.png"),
                    ..preset(None, "desk_wood", Wood, [0.55, 0.35, 0.2], 0.4, "/textures/wood/oak_diffuse.png")
                },
            ],
        ),
        (
            "chair",
            vec![
                Preset {
                    subsurface: 0.05,
                    ..preset(Some("leather"), "leather_chair", Cloth, [0.15, 0.1, 0.08], 0.6, "/textures/leather/brown_leather.png")
                },
                preset(None, "chair_material", Wood, [0.45, 0.3, 0.18], 0.5, "/textures/wood/walnut_diffuse.png"),
            ],
        ),
        (
            "plant",
            vec![Preset {
                subsurface: 0.4,
                ..preset(None, "plant_leaves", Cloth, [0.2, 0.45, 0.15], 0.7, "/textures/nature/leaves_diffuse.png")
            }],
        ),
        (
            "rug",
            vec![Preset {
                subsurface: 0.1,
                ..preset(None, "rug_fabric", Cloth, [0.6, 0.55, 0.5], 0.95, "/textures/fabric/rug_pattern.png")
            }],
        ),
        (
            "curtain",
            vec![Preset {
                subsurface: 0.25,
                ..preset(None, "curtain_fabric", Cloth, [0.9, 0.88, 0.82], 0.85, "/textures/fabric/sheer_curtain.png")
            }],
        ),
        (
            "sofa",
            vec![
                Preset {
                    subsurface: 0.05,
                    ..preset(Some("leather"), "leather_sofa", Cloth, [0.2, 0.12, 0.08], 0.55, "/textures/leather/brown_leather.png")
                },
                Preset {
                    subsurface: 0.1,
                    ..preset(None, "sofa_fabric", Cloth, [0.45, 0.5, 0.55], 0.85, "/textures/fabric/upholstery.png")
                },
            ],
        ),
        (
            "table",
            vec![
                preset(Some("glass"), "glass_tabletop", Glass, [0.9, 0.95, 0.95], 0.05, "/textures/glass/clear_glass.png"),
                Preset {
                    clear_coat: 0.2,
                    ..preset(None, "table_wood", Wood, [0.5, 0.33, 0.2], 0.4, "/textures/wood/walnut_diffuse.png")
                },
            ],
        ),
        (
            "window",
            vec![preset(None, "window_glass", Glass, [0.85, 0.9, 0.92], 0.02, "/textures/glass/window_frame.png")],
        ),
        (
            "mirror",
            vec![Preset {
                metallic: 1.0,
                ..preset(None, "mirror_silver", Metal, [0.9, 0.9, 0.9], 0.02, "/textures/metal/mirror_frame.png")
            }],
        ),
        (
            "vase",
            vec![
                preset(Some("glass"), "glass_vase", Glass, [0.8, 0.88, 0.9], 0.05, "/textures/glass/tinted_glass.png"),
                Preset {
                    subsurface: 0.05,
                    ..preset(None, "ceramic_vase", Plastic, [0.85, 0.8, 0.72], 0.45, "/textures/ceramic/glazed_diffuse.png")
                },
            ],
        ),
    ]
}

impl Preset {
    fn material(&self) -> Material {
        Material {
            name: self.name.to_string(),
            shader: self.shader,
            base_color: [self.color[0], self.color[1], self.color[2], 1.0],
            roughness: self.roughness,
            metallic: self.metallic,
            subsurface: self.subsurface,
            clear_coat: self.clear_coat,
            texture_map: Some(self.texture.to_string()),
            normal_map: self.normal.map(str::to_string),
            roughness_map: None,
        }
    }
}

pub fn texture(_ctx: &StageContext<'_>, record: &SceneRecord) -> Result<StageUpdate> {
    if record.entities.is_empty() {
        bail!("no entities to texture");
    }
    let mood = record.plan.as_ref().map_or("neutral", |p| p.mood.as_str());
    info!("[texturer] applying materials for '{mood}' mood");

    let mut generic = 0usize;
    let entities = record
        .entities
        .iter()
        .map(|e| {
            let hint = record.plan.as_ref().and_then(|p| {
                p.materials
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&e.name))
                    .map(|(_, hint)| hint)
            });
            let material = match hint {
                Some(hint) => from_hint(&e.name, hint),
                None => {
                    let (material, matched) = select_material(&e.name);
                    if !matched {
                        generic += 1;
                    }
                    adjust_for_mood(material, mood)
                }
            };
            let mut e = e.clone();
            e.material = Some(material);
            e.status = EntityStatus::Textured;
            e
        })
        .collect::<Vec<_>>();

    let summary = format!(
        "applied materials to {} entities for '{mood}' mood ({generic} generic)",
        entities.len()
    );
    info!("[texturer] {summary}");
    Ok(StageUpdate {
        entities: Some(entities),
        summary,
        ..StageUpdate::default()
    })
}

/// Preset for an entity name, or the generic material. The flag is false
/// when nothing category-specific matched.
pub fn select_material(name: &str) -> (Material, bool) {
    let lower = name.to_lowercase();
    for (category, variants) in presets() {
        if !lower.contains(category) {
            continue;
        }
        let chosen = variants
            .iter()
            .find(|p| p.variant.is_some_and(|v| lower.contains(v)))
            .or_else(|| variants.iter().find(|p| p.variant.is_none()));
        if let Some(p) = chosen {
            return (p.material(), true);
        }
    }
    (generic_material(name), false)
}

pub fn generic_material(name: &str) -> Material {
    Material {
        name: format!("{}_material", slug(name)),
        shader: ShaderKind::PrincipledBsdf,
        base_color: [0.8, 0.8, 0.8, 1.0],
        roughness: 0.5,
        metallic: 0.0,
        subsurface: 0.0,
        clear_coat: 0.0,
        texture_map: Some(GENERIC_TEXTURE.to_string()),
        normal_map: None,
        roughness_map: None,
    }
}

/// Material built from an explicit style/finish request.
pub fn from_hint(name: &str, hint: &MaterialHint) -> Material {
    let style = hint.style.to_lowercase();
    let finish = if hint.finish.is_empty() {
        "matte".to_string()
    } else {
        hint.finish.to_lowercase()
    };

    const SHADERS: [(&str, ShaderKind); 7] = [
        ("fabric", ShaderKind::Cloth),
        ("wood", ShaderKind::Wood),
        ("metal", ShaderKind::Metal),
        ("glass", ShaderKind::Glass),
        ("plastic", ShaderKind::Plastic),
        ("glossy", ShaderKind::Plastic),
        ("matte", ShaderKind::Cloth),
    ];
    let shader = SHADERS
        .iter()
        .find(|(key, _)| style.contains(key) || finish.contains(key))
        .map_or(ShaderKind::PrincipledBsdf, |(_, s)| *s);

    let roughness = if finish.contains("glossy") || finish.contains("shiny") {
        0.2
    } else if finish.contains("matte") {
        0.8
    } else if finish.contains("satin") {
        0.4
    } else {
        0.5
    };

    let texture = match shader {
        ShaderKind::Cloth => "/textures/fabric/generic_fabric.png",
        ShaderKind::Wood => "/textures/wood/generic_wood.png",
        ShaderKind::Metal => "/textures/metal/generic_metal.png",
        ShaderKind::Glass => "/textures/glass/generic_glass.png",
        ShaderKind::Plastic => "/textures/plastic/generic_plastic.png",
        ShaderKind::PrincipledBsdf => GENERIC_TEXTURE,
    };

    Material {
        name: format!("{}_custom", slug(name)),
        shader,
        base_color: [0.8, 0.8, 0.8, 1.0],
        roughness,
        metallic: if shader == ShaderKind::Metal { 0.9 } else { 0.0 },
        subsurface: 0.0,
        clear_coat: 0.0,
        texture_map: Some(texture.to_string()),
        normal_map: None,
        roughness_map: None,
    }
}

pub fn adjust_for_mood(mut material: Material, mood: &str) -> Material {
    let mood = mood.to_lowercase();
    let c = &mut material.base_color;
    if mood.contains("warm") || mood.contains("cozy") {
        c[0] = (c[0] * 1.05).min(1.0);
        c[2] *= 0.95;
        material.roughness = (material.roughness + 0.05).min(1.0);
    } else if mood.contains("cool") || mood.contains("modern") {
        c[0] *= 0.95;
        c[2] = (c[2] * 1.05).min(1.0);
        material.roughness = (material.roughness - 0.1).max(0.0);
    } else if mood.contains("dramatic") {
        material.roughness = (material.roughness - 0.15).max(0.2);
    }
    material
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_beats_category_default() {
        let (m, matched) = select_material("White Bed");
        assert!(matched);
        assert_eq!(m.name, "white_bedding");
        let (m, _) = select_material("bed");
        assert_eq!(m.name, "bed_fabric");
    }

    #[test]
    fn category_order() {
        assert_eq!(select_material("bookshelf").0.name, "bookshelf_wood");
        assert_eq!(select_material("books").0.name, "book_covers");
        assert_eq!(select_material("desk lamp").0.name, "lamp_material");
    }

    #[test]
    fn every_material_has_a_texture() {
        for name in ["glass vase", "window", "mirror", "desk lamp", "unknown thing"] {
            let (m, _) = select_material(name);
            assert!(m.texture_map.is_some(), "{name} has no texture");
        }
        let m = from_hint("table", &MaterialHint {
            style: "glass".into(),
            finish: "glossy".into(),
        });
        assert_eq!(m.shader, ShaderKind::Glass);
        assert_eq!(m.roughness, 0.2);
        assert!(m.texture_map.is_some());
    }

    #[test]
    fn unknown_names_get_generic_material() {
        let (m, matched) = select_material("Spaceship");
        assert!(!matched);
        assert_eq!(m.name, "spaceship_material");
        assert_eq!(m.texture_map.as_deref(), Some(GENERIC_TEXTURE));
    }

    #[test]
    fn mood_tints() {
        let base = select_material("bed").0;
        let warm = adjust_for_mood(base.clone(), "Cozy evening");
        assert!(warm.base_color[0] >= base.base_color[0]);
        assert!(warm.base_color[2] < base.base_color[2]);
        assert!((warm.roughness - 0.9).abs() < 1e-9);

        let cool = adjust_for_mood(base.clone(), "modern");
        assert!(cool.base_color[0] < base.base_color[0]);
        assert!((cool.roughness - 0.75).abs() < 1e-9);

        let dramatic = adjust_for_mood(select_material("window").0, "dramatic");
        assert_eq!(dramatic.roughness, 0.2);
    }
}
