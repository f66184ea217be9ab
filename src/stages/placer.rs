//! Placement engine.
//!
//! Roots are placed one at a time, focal entities first and then by
//! descending footprint, through three tiers: a raster grid over the entity's
//! zone, a square spiral from the zone centre out to the room walls, and
//! finally the most open room corner. Corner placements may still overlap
//! and are left for validation to flag. Surface items become children of a
//! support and sit in slots across its top.
//!
//! Placement is deterministic: the same entities, plan and settings always
//! produce the same positions.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use log::{debug, info, warn};

use crate::{
    config::Settings,
    model::{EntityStatus, IssueCategory, Plan, SceneEntity, Vec3},
    record::{SceneRecord, StageUpdate},
    stages::StageContext,
};

pub mod geometry;
pub mod repair;
pub mod search;
pub mod zones;

use geometry::{Rect, Room, footprint, snap};
use repair::{RepairParams, repair};
use search::{Search, SearchParams, nearest_corner};
pub use search::Tier;
pub use zones::Zone;
use zones::{select_zone, yaw_for};

/// Matched as whole words, singular or plural.
const SURFACE_ITEMS: [&str; 8] = [
    "book",
    "vase",
    "clock",
    "desk lamp",
    "table lamp",
    "laptop",
    "candle",
    "mug",
];
const SUPPORTS: [&str; 5] = ["desk", "table", "nightstand", "dresser", "shelf"];

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// Same order as the input entities.
    pub entities: Vec<SceneEntity>,
    pub tiers: BTreeMap<String, Tier>,
    pub zones: BTreeMap<String, Zone>,
}

impl Layout {
    pub fn count(&self, tier: Tier) -> usize {
        self.tiers.values().filter(|t| **t == tier).count()
    }
}

pub fn place(ctx: &StageContext<'_>, record: &SceneRecord) -> Result<StageUpdate> {
    if record.entities.is_empty() {
        bail!("no entities to place");
    }
    let plan = record.plan.as_ref();
    let settings = ctx.settings;

    let already_placed = record.entities.iter().all(|e| e.position.is_some());
    let geometric_issues = record
        .issues
        .iter()
        .any(|i| matches!(i.category, IssueCategory::Clipping | IssueCategory::Floating));

    if already_placed && geometric_issues {
        info!("[placer] repairing layout of {} entities", record.entities.len());
        let params = RepairParams {
            room: Room::from(&settings.room),
            margin: settings.placement.min_spacing,
            tolerance: settings.placement.clip_tolerance,
            passes: settings.placement.repair_passes,
        };
        let (mut entities, stats) = repair(&record.entities, &record.issues, plan, &params);
        for e in &mut entities {
            e.status = EntityStatus::Placed;
        }
        let summary = format!(
            "repaired layout: moved {} entities, grounded {}, {} overlaps left after {} passes",
            stats.moved, stats.grounded, stats.remaining, stats.passes
        );
        if stats.remaining > 0 {
            warn!("[placer] {summary}");
        } else {
            info!("[placer] {summary}");
        }
        return Ok(StageUpdate {
            entities: Some(entities),
            summary,
            ..StageUpdate::default()
        });
    }

    info!("[placer] placing {} entities", record.entities.len());
    let layout = layout(&record.entities, plan, settings);
    let summary = format!(
        "placed {} entities (grid {}, spiral {}, corner {}, attached {})",
        layout.entities.len(),
        layout.count(Tier::Grid),
        layout.count(Tier::Spiral),
        layout.count(Tier::Corner),
        layout.count(Tier::Attached)
    );
    if layout.count(Tier::Corner) > 0 {
        warn!("[placer] {summary}");
    } else {
        info!("[placer] {summary}");
    }
    Ok(StageUpdate {
        entities: Some(layout.entities),
        summary,
        ..StageUpdate::default()
    })
}

/// Full placement of every entity, discarding any previous positions.
pub fn layout(entities: &[SceneEntity], plan: Option<&Plan>, settings: &Settings) -> Layout {
    let room = Room::from(&settings.room);
    let params = SearchParams {
        step: settings.placement.grid_step,
        margin: settings.placement.min_spacing,
        tolerance: settings.placement.clip_tolerance,
    };
    let parents = attachments(entities, plan);

    let mut out = entities.to_vec();
    for (e, parent) in out.iter_mut().zip(&parents) {
        e.parent_id = parent.map(|p| entities[p].id.clone());
        e.position = None;
        e.rotation = None;
        if e.extents.is_none() {
            e.extents = Some(settings.assets.placeholder());
        }
    }

    let mut tiers = BTreeMap::new();
    let mut zones = BTreeMap::new();
    let mut occupied: Vec<Rect> = Vec::new();

    let roots: Vec<usize> = (0..out.len()).filter(|&i| parents[i].is_none()).collect();
    for i in placement_order(&out, &roots, plan) {
        let zone = select_zone(&out[i].name, plan);
        let yaw = yaw_for(&out[i].name, zone);
        let extents = out[i].extents.unwrap_or_else(|| settings.assets.placeholder());
        let (w, d) = footprint(extents, yaw);
        let zone_rect = zone.rect(&room);

        let search = Search {
            room,
            params,
            occupied: &occupied,
        };
        let (tier, (x, y)) = if let Some(p) = search.grid(&zone_rect, w, d) {
            (Tier::Grid, p)
        } else if let Some(p) = search.spiral(zone_rect.center(), w, d) {
            (Tier::Spiral, p)
        } else {
            let (corner, p) = nearest_corner(&room, w, d, zone_rect.center(), &occupied, params.margin);
            warn!(
                "[placer] no free space for {}, falling back to corner {corner}",
                out[i].id
            );
            (Tier::Corner, p)
        };
        debug!(
            "[placer] {} -> ({x:.3}, {y:.3}) yaw {yaw} in {} via {}",
            out[i].id,
            zone.as_str(),
            tier.as_str()
        );

        occupied.push(Rect::around(x, y, w, d).expand(params.margin));
        let e = &mut out[i];
        e.position = Some(Vec3::new(x, y, 0.0));
        e.rotation = Some(Vec3::new(0.0, 0.0, yaw));
        e.status = EntityStatus::Placed;
        tiers.insert(e.id.clone(), tier);
        zones.insert(e.id.clone(), zone);
    }

    for (p, kids) in children_by_parent(&parents) {
        let parent_extents = out[p].extents.unwrap_or_else(|| settings.assets.placeholder());
        let parent_rotation = out[p].rotation;
        let parent_zone = zones.get(&out[p].id).copied().unwrap_or(Zone::Default);
        let slots = kids.len() as f64;
        for (slot, &c) in kids.iter().enumerate() {
            let offset_x = -parent_extents.width / 2.0 + parent_extents.width * (slot as f64 + 0.5) / slots;
            let e = &mut out[c];
            e.position = Some(Vec3::new(snap(offset_x), 0.0, snap(parent_extents.height)));
            e.rotation = parent_rotation;
            e.status = EntityStatus::Placed;
            tiers.insert(e.id.clone(), Tier::Attached);
            zones.insert(e.id.clone(), parent_zone);
        }
    }

    Layout {
        entities: out,
        tiers,
        zones,
    }
}

/// Primary focal entities first, then descending footprint area; ties keep
/// input order.
pub fn placement_order(entities: &[SceneEntity], roots: &[usize], plan: Option<&Plan>) -> Vec<usize> {
    let focal = |i: usize| plan.is_some_and(|p| p.is_primary_focal(&entities[i].name));
    let area = |i: usize| entities[i].extents.map_or(0.0, |e| e.footprint_area());
    let mut order = roots.to_vec();
    order.sort_by(|&a, &b| {
        focal(b)
            .cmp(&focal(a))
            .then_with(|| area(b).total_cmp(&area(a)))
    });
    order
}

/// Parent index per entity. Supports are never children themselves, so the
/// hierarchy is one level deep.
pub fn attachments(entities: &[SceneEntity], plan: Option<&Plan>) -> Vec<Option<usize>> {
    let desired: Vec<Option<usize>> = (0..entities.len())
        .map(|i| desired_support(entities, plan, i))
        .collect();

    let mut accepted = vec![None; entities.len()];
    let mut is_parent = vec![false; entities.len()];
    for (i, want) in desired.into_iter().enumerate() {
        let Some(j) = want else { continue };
        if accepted[j].is_none() && !is_parent[i] {
            accepted[i] = Some(j);
            is_parent[j] = true;
        }
    }
    accepted
}

fn desired_support(entities: &[SceneEntity], plan: Option<&Plan>, i: usize) -> Option<usize> {
    let name = &entities[i].name;
    let others = || (0..entities.len()).filter(move |&j| j != i);

    if let Some(rel) = plan.and_then(|p| {
        p.spatial
            .relationships
            .iter()
            .find(|r| r.object.eq_ignore_ascii_case(name) && is_on_relation(&r.position))
    }) {
        let target = rel.relative_to.to_lowercase();
        let hit = others()
            .find(|&j| entities[j].name.eq_ignore_ascii_case(&target))
            .or_else(|| others().find(|&j| !target.is_empty() && entities[j].name_contains(&target)));
        if hit.is_some() {
            return hit;
        }
    }

    if !is_surface_item(name) {
        return None;
    }
    others().find(|&j| is_support(&entities[j].name) && !is_surface_item(&entities[j].name))
}

fn is_on_relation(position: &str) -> bool {
    position
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| matches!(w, "on" | "atop" | "onto"))
}

pub fn is_surface_item(name: &str) -> bool {
    let words: Vec<String> = name
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let padded = format!(" {} ", words.join(" "));
    SURFACE_ITEMS
        .iter()
        .any(|item| padded.contains(&format!(" {item} ")) || padded.contains(&format!(" {item}s ")))
}

pub fn is_support(name: &str) -> bool {
    let lower = name.to_lowercase();
    SUPPORTS.iter().any(|s| lower.contains(s))
}

fn children_by_parent(parents: &[Option<usize>]) -> BTreeMap<usize, Vec<usize>> {
    let mut map: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (child, parent) in parents.iter().enumerate() {
        if let Some(p) = parent {
            map.entry(*p).or_default().push(child);
        }
    }
    map
}
