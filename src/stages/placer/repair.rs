//! Local repair after a validation pass reported clipping or floating.
//! Positions of entities that are not implicated stay untouched.

use std::collections::HashSet;

use log::debug;

use crate::model::{Issue, IssueCategory, Plan, SceneEntity, Vec3};

use super::geometry::{Room, footprint, snap, world_box, yaw_of};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairStats {
    pub moved: usize,
    pub grounded: usize,
    pub passes: u32,
    /// Overlapping root pairs left after the last pass.
    pub remaining: usize,
}

pub struct RepairParams {
    pub room: Room,
    pub margin: f64,
    pub tolerance: f64,
    pub passes: u32,
}

/// Separate clipping root entities and put floating or sunken roots back on
/// the floor. Children move with their parent.
pub fn repair(
    entities: &[SceneEntity],
    issues: &[Issue],
    plan: Option<&Plan>,
    params: &RepairParams,
) -> (Vec<SceneEntity>, RepairStats) {
    let mut out = entities.to_vec();
    let mut stats = RepairStats::default();

    let floating: HashSet<&str> = issues
        .iter()
        .filter(|i| i.category == IssueCategory::Floating)
        .filter_map(|i| i.entity_id.as_deref())
        .collect();
    for e in out
        .iter_mut()
        .filter(|e| e.parent_id.is_none() && floating.contains(e.id.as_str()))
    {
        let Some(p) = e.position.as_mut() else {
            continue;
        };
        if p.z != 0.0 {
            debug!("[placer] grounding {} from z={:.3}", e.id, p.z);
            p.z = 0.0;
            stats.grounded += 1;
        }
    }

    let roots: Vec<usize> = (0..out.len())
        .filter(|&i| out[i].parent_id.is_none() && out[i].position.is_some() && out[i].extents.is_some())
        .collect();

    let mut moved: HashSet<String> = HashSet::new();
    for pass in 0..params.passes {
        let pairs = clipping_pairs(&out, &roots, params.tolerance);
        if pairs.is_empty() {
            break;
        }
        stats.passes = pass + 1;
        let mut progressed = false;
        for (a, b) in pairs {
            let (mover, anchor) = if more_anchored(&out, plan, a, b) { (b, a) } else { (a, b) };
            let anchor_is_focal = plan.is_some_and(|p| p.is_primary_focal(&out[anchor].name));
            let shifted = if separate(&mut out, &roots, mover, anchor, params) {
                Some(mover)
            } else if !anchor_is_focal && separate(&mut out, &roots, anchor, mover, params) {
                Some(anchor)
            } else {
                None
            };
            if let Some(i) = shifted {
                moved.insert(out[i].id.clone());
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    stats.moved = moved.len();
    stats.remaining = clipping_pairs(&out, &roots, params.tolerance).len();
    (out, stats)
}

fn clipping_pairs(entities: &[SceneEntity], roots: &[usize], tolerance: f64) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (n, &a) in roots.iter().enumerate() {
        let Some(box_a) = world_box(&entities[a], entities) else {
            continue;
        };
        for &b in &roots[n + 1..] {
            let Some(box_b) = world_box(&entities[b], entities) else {
                continue;
            };
            if box_a.penetration(&box_b) > tolerance {
                pairs.push((a, b));
            }
        }
    }
    pairs
}

/// Total penetration beyond the tolerance between `index` and every other root.
fn clipping_load(entities: &[SceneEntity], roots: &[usize], index: usize, tolerance: f64) -> f64 {
    let Some(own) = world_box(&entities[index], entities) else {
        return 0.0;
    };
    roots
        .iter()
        .filter(|&&r| r != index)
        .filter_map(|&r| world_box(&entities[r], entities))
        .map(|other| own.penetration(&other))
        .filter(|depth| *depth > tolerance)
        .sum()
}

/// Focal entities win, then the larger footprint, then the earlier entity.
fn more_anchored(entities: &[SceneEntity], plan: Option<&Plan>, a: usize, b: usize) -> bool {
    let focal = |i: usize| plan.is_some_and(|p| p.is_primary_focal(&entities[i].name));
    if focal(a) != focal(b) {
        return focal(a);
    }
    let area = |i: usize| entities[i].extents.map_or(0.0, |e| e.footprint_area());
    let (area_a, area_b) = (area(a), area(b));
    if (area_a - area_b).abs() > 1e-9 {
        return area_a > area_b;
    }
    a < b
}

/// Move `mover` clear of `anchor`, plus the margin, along one of the four
/// horizontal directions, clamped to the room. The direction leaving the least
/// clipping against all roots wins, shorter moves breaking ties. Nothing
/// moves unless the mover's clipping strictly drops.
fn separate(
    entities: &mut [SceneEntity],
    roots: &[usize],
    mover: usize,
    anchor: usize,
    params: &RepairParams,
) -> bool {
    let (Some(m), Some(a)) = (
        world_box(&entities[mover], entities),
        world_box(&entities[anchor], entities),
    ) else {
        return false;
    };
    if m.penetration(&a) <= params.tolerance {
        return false;
    }
    let (Some(pos), Some(ext)) = (entities[mover].position, entities[mover].extents) else {
        return false;
    };
    let (w, d) = footprint(ext, yaw_of(&entities[mover]));
    let gap = params.margin;
    let targets = [
        (a.max.x + gap + w / 2.0, pos.y),
        (a.min.x - gap - w / 2.0, pos.y),
        (pos.x, a.max.y + gap + d / 2.0),
        (pos.x, a.min.y - gap - d / 2.0),
    ];

    let current = clipping_load(entities, roots, mover, params.tolerance);
    let mut best: Option<(f64, f64, Vec3)> = None;
    for (x, y) in targets {
        let (x, y) = params.room.clamp_center(x, y, w, d);
        let candidate = Vec3::new(snap(x), snap(y), pos.z);
        if candidate == pos {
            continue;
        }
        entities[mover].position = Some(candidate);
        let load = clipping_load(entities, roots, mover, params.tolerance);
        let travel = (candidate.x - pos.x).hypot(candidate.y - pos.y);
        let better = best.is_none_or(|(l, t, _)| load < l - 1e-9 || ((load - l).abs() <= 1e-9 && travel < t));
        if better {
            best = Some((load, travel, candidate));
        }
    }
    entities[mover].position = Some(pos);

    let Some((load, _, target)) = best.filter(|(load, _, _)| *load < current - 1e-9) else {
        return false;
    };
    debug!(
        "[placer] repair moved {} ({:.3},{:.3}) -> ({:.3},{:.3}), clipping {current:.3} -> {load:.3}",
        entities[mover].id, pos.x, pos.y, target.x, target.y
    );
    entities[mover].position = Some(target);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Extents, Severity};

    fn entity(id: &str, name: &str, x: f64, y: f64, ext: (f64, f64, f64)) -> SceneEntity {
        let mut e = SceneEntity::requested(id, name);
        e.extents = Some(Extents::new(ext.0, ext.1, ext.2));
        e.position = Some(Vec3::new(x, y, 0.0));
        e.rotation = Some(Vec3::ZERO);
        e
    }

    fn params() -> RepairParams {
        RepairParams {
            room: Room {
                width: 6.0,
                depth: 6.0,
                height: 3.0,
            },
            margin: 0.5,
            tolerance: 0.05,
            passes: 4,
        }
    }

    #[test]
    fn smaller_entity_moves_along_shallow_axis() {
        let entities = vec![
            entity("bed-1", "bed", 0.0, 0.0, (2.0, 1.6, 0.8)),
            entity("chair-1", "chair", 1.0, 0.2, (0.5, 0.5, 0.9)),
        ];
        let (out, stats) = repair(&entities, &[], None, &params());
        assert_eq!(out[0].position, entities[0].position);
        let moved = out[1].position.unwrap();
        assert!(moved.x > 1.0, "chair pushed to +x, got {moved:?}");
        assert_eq!(moved.y, 0.2);
        assert_eq!(stats.remaining, 0);
        assert!(stats.moved >= 1);
    }

    #[test]
    fn floating_roots_are_grounded() {
        let mut e = entity("vase-1", "vase", 0.0, 0.0, (0.2, 0.2, 0.3));
        e.position = Some(Vec3::new(0.0, 0.0, 0.7));
        let issue = Issue::new(Severity::Info, IssueCategory::Floating, "vase floats").with_entity("vase-1");
        let (out, stats) = repair(&[e], &[issue], None, &params());
        assert_eq!(out[0].position.unwrap().z, 0.0);
        assert_eq!(stats.grounded, 1);
    }

    #[test]
    fn wall_pinned_mover_slides_along_the_wall() {
        let entities = vec![
            entity("bed-1", "bed", 2.0, 0.0, (2.0, 1.6, 0.8)),
            entity("chair-1", "chair", 2.75, 0.3, (0.5, 0.5, 0.9)),
        ];
        let (out, stats) = repair(&entities, &[], None, &params());
        assert_eq!(out[0].position, entities[0].position);
        assert_eq!(out[1].position, Some(Vec3::new(2.75, 1.55, 0.0)));
        assert_eq!(stats.moved, 1);
        assert_eq!(stats.remaining, 0);
    }

    #[test]
    fn anchor_yields_when_mover_is_cornered() {
        let mut p = params();
        p.room = Room {
            width: 2.6,
            depth: 2.6,
            height: 3.0,
        };
        let entities = vec![
            entity("crate-1", "crate", -0.467, -0.467, (1.4, 1.4, 1.0)),
            entity("crate-2", "crate", 0.6, -0.6, (1.4, 1.4, 1.0)),
        ];
        let depth = |all: &[SceneEntity]| {
            let a = world_box(&all[0], all).unwrap();
            let b = world_box(&all[1], all).unwrap();
            a.penetration(&b)
        };
        assert!(depth(&entities) > 0.3);

        let (out, stats) = repair(&entities, &[], None, &p);
        assert_eq!(out[1].position, entities[1].position);
        assert_eq!(out[0].position, Some(Vec3::new(-0.6, -0.467, 0.0)));
        assert_eq!(stats.moved, 1);
        assert!(depth(&out) < 0.3);
    }

    #[test]
    fn focal_anchor_never_yields() {
        let mut p = params();
        p.room = Room {
            width: 2.6,
            depth: 2.6,
            height: 3.0,
        };
        let entities = vec![
            entity("bed-1", "bed", -0.467, -0.467, (1.4, 1.4, 1.0)),
            entity("crate-1", "crate", 0.6, -0.6, (1.4, 1.4, 1.0)),
        ];
        let mut plan = crate::stages::decomposer::fallback_plan("bed");
        plan.spatial.primary_focal_point = Some("bed".into());
        let (out, _) = repair(&entities, &[], Some(&plan), &p);
        assert_eq!(out[0].position, entities[0].position);
    }

    #[test]
    fn overcrowded_room_reports_remaining_pairs() {
        let mut p = params();
        p.room = Room {
            width: 2.0,
            depth: 2.0,
            height: 3.0,
        };
        let entities = vec![
            entity("a-1", "a", 0.0, 0.0, (1.5, 1.5, 1.0)),
            entity("b-1", "b", 0.2, 0.2, (1.5, 1.5, 1.0)),
        ];
        let (_, stats) = repair(&entities, &[], None, &p);
        assert_eq!(stats.remaining, 1);
    }
}
