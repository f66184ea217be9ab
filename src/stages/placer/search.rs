//! Candidate search for one footprint against already-occupied space.
//!
//! Occupied rects are stored already expanded by the spacing margin; a
//! candidate is expanded the same way and accepted when its penetration into
//! every occupied rect is within the tolerance.

use serde::{Deserialize, Serialize};

use super::geometry::{Rect, Room, snap};

/// How a position was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Grid,
    Spiral,
    Corner,
    Attached,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Grid => "grid",
            Tier::Spiral => "spiral",
            Tier::Corner => "corner",
            Tier::Attached => "attached",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub step: f64,
    pub margin: f64,
    pub tolerance: f64,
}

pub struct Search<'a> {
    pub room: Room,
    pub params: SearchParams,
    pub occupied: &'a [Rect],
}

impl Search<'_> {
    fn accepts(&self, cx: f64, cy: f64, width: f64, depth: f64) -> bool {
        let footprint = Rect::around(cx, cy, width, depth);
        if !self.room.bounds().contains(&footprint) {
            return false;
        }
        let expanded = footprint.expand(self.params.margin);
        self.occupied
            .iter()
            .all(|o| expanded.penetration(o) <= self.params.tolerance)
    }

    /// Raster scan of the zone rect: rows along y, columns along x.
    pub fn grid(&self, zone: &Rect, width: f64, depth: f64) -> Option<(f64, f64)> {
        let step = self.params.step;
        let cols = steps_across(zone.max_x - zone.min_x, step);
        let rows = steps_across(zone.max_y - zone.min_y, step);
        for row in 0..=rows {
            let y = snap(zone.min_y + row as f64 * step);
            for col in 0..=cols {
                let x = snap(zone.min_x + col as f64 * step);
                if self.accepts(x, y, width, depth) {
                    return Some((x, y));
                }
            }
        }
        None
    }

    /// Square rings around `center` on the grid step until the rings cover
    /// the whole room.
    pub fn spiral(&self, center: (f64, f64), width: f64, depth: f64) -> Option<(f64, f64)> {
        let step = self.params.step;
        let reach = self.room.width.max(self.room.depth) + step;
        let max_ring = steps_across(reach, step);
        for ring in 0..=max_ring {
            let r = ring as i64;
            for j in -r..=r {
                for i in -r..=r {
                    if i.abs().max(j.abs()) != r {
                        continue;
                    }
                    let x = snap(center.0 + i as f64 * step);
                    let y = snap(center.1 + j as f64 * step);
                    if self.accepts(x, y, width, depth) {
                        return Some((x, y));
                    }
                }
            }
        }
        None
    }
}

/// Room corners inset so the footprint touches both walls, in the order
/// (-x,-y), (+x,-y), (-x,+y), (+x,+y).
pub fn corners(room: &Room, width: f64, depth: f64) -> [(f64, f64); 4] {
    let (x, y) = room.clamp_center(room.width, room.depth, width, depth);
    [
        (snap(-x), snap(-y)),
        (snap(x), snap(-y)),
        (snap(-x), snap(y)),
        (snap(x), snap(y)),
    ]
}

/// Most open corner: least penetration into `occupied` (with the candidate
/// expanded by `margin`), then nearest to `from`, then corner order. Returns
/// the corner index and centre.
pub fn nearest_corner(
    room: &Room,
    width: f64,
    depth: f64,
    from: (f64, f64),
    occupied: &[Rect],
    margin: f64,
) -> (usize, (f64, f64)) {
    let candidates = corners(room, width, depth);
    let blocked = |c: &(f64, f64)| {
        let expanded = Rect::around(c.0, c.1, width, depth).expand(margin);
        occupied
            .iter()
            .map(|o| expanded.penetration(o).max(0.0))
            .fold(0.0, f64::max)
    };
    let dist = |c: &(f64, f64)| (c.0 - from.0).powi(2) + (c.1 - from.1).powi(2);
    candidates
        .iter()
        .enumerate()
        .min_by(|a, b| {
            blocked(a.1)
                .total_cmp(&blocked(b.1))
                .then_with(|| dist(a.1).total_cmp(&dist(b.1)))
        })
        .map(|(i, c)| (i, *c))
        .unwrap_or((0, candidates[0]))
}

fn steps_across(span: f64, step: f64) -> usize {
    if span <= 0.0 || step <= 0.0 {
        return 0;
    }
    (span / step + 1e-9).floor() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> Room {
        Room {
            width: 6.0,
            depth: 6.0,
            height: 3.0,
        }
    }

    fn params() -> SearchParams {
        SearchParams {
            step: 0.4,
            margin: 0.5,
            tolerance: 0.05,
        }
    }

    #[test]
    fn grid_returns_first_free_cell_in_raster_order() {
        let zone = Rect::new(-1.0, -1.0, 1.0, 1.0);
        let search = Search {
            room: room(),
            params: params(),
            occupied: &[],
        };
        assert_eq!(search.grid(&zone, 1.0, 1.0), Some((-1.0, -1.0)));

        let blocker = Rect::around(-1.0, -1.0, 1.0, 1.0).expand(0.5);
        let occupied = [blocker];
        let search = Search {
            occupied: &occupied,
            ..search
        };
        let (x, y) = search.grid(&zone, 1.0, 1.0).unwrap();
        assert_eq!(y, -1.0);
        assert!(x > 0.9, "moved along the row to x={x}");
    }

    #[test]
    fn spiral_escapes_a_full_zone() {
        let zone = Rect::new(-0.4, -0.4, 0.4, 0.4);
        let occupied = [Rect::around(0.0, 0.0, 1.2, 1.2).expand(0.5)];
        let search = Search {
            room: room(),
            params: params(),
            occupied: &occupied,
        };
        assert_eq!(search.grid(&zone, 0.5, 0.5), None);
        let (x, y) = search.spiral((0.0, 0.0), 0.5, 0.5).unwrap();
        let candidate = Rect::around(x, y, 0.5, 0.5).expand(0.5);
        assert!(candidate.penetration(&occupied[0]) <= 0.05);
        assert!(room().bounds().contains(&Rect::around(x, y, 0.5, 0.5)));
    }

    #[test]
    fn candidates_outside_room_are_rejected() {
        let search = Search {
            room: room(),
            params: params(),
            occupied: &[],
        };
        let zone = Rect::new(2.8, 2.8, 2.8, 2.8);
        assert_eq!(search.grid(&zone, 1.0, 1.0), None);
    }

    #[test]
    fn nearest_open_corner() {
        let r = room();
        let (i, c) = nearest_corner(&r, 1.0, 2.0, (2.0, 2.0), &[], 0.5);
        assert_eq!((i, c), (3, (2.5, 2.0)));

        let taken = [Rect::around(2.5, 2.0, 1.0, 2.0).expand(0.5)];
        let (i, _) = nearest_corner(&r, 1.0, 2.0, (2.0, 2.0), &taken, 0.5);
        assert_eq!(i, 1);
    }

    #[test]
    fn corner_overlapping_a_placed_footprint_loses_to_an_open_one() {
        let r = Room {
            width: 2.0,
            depth: 2.0,
            height: 3.0,
        };
        // Off-centre grid placement next to corner 0.
        let occupied = [Rect::around(-0.267, -0.267, 1.0, 1.0).expand(0.5)];
        let (i, (x, y)) = nearest_corner(&r, 1.0, 1.0, (-0.5, -0.5), &occupied, 0.5);
        assert_ne!(i, 0);
        let raw = Rect::around(x, y, 1.0, 1.0);
        assert!(raw.penetration(&Rect::around(-0.267, -0.267, 1.0, 1.0)) < 0.3);
    }
}
