use serde::{Deserialize, Serialize};

use crate::model::Plan;

use super::geometry::{Rect, Room};

/// Zone layout is authored for a 6 m x 6 m room and scaled to the actual one.
const REFERENCE_ROOM: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    PrimaryWall,
    WindowArea,
    Center,
    CornerLeft,
    CornerRight,
    OppositeWall,
    WallMounted,
    Default,
}

impl Zone {
    /// Keyword matching order.
    pub const ALL: [Zone; 8] = [
        Zone::PrimaryWall,
        Zone::WindowArea,
        Zone::Center,
        Zone::CornerLeft,
        Zone::CornerRight,
        Zone::OppositeWall,
        Zone::WallMounted,
        Zone::Default,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Zone::PrimaryWall => "primary_wall",
            Zone::WindowArea => "window_area",
            Zone::Center => "center",
            Zone::CornerLeft => "corner_left",
            Zone::CornerRight => "corner_right",
            Zone::OppositeWall => "opposite_wall",
            Zone::WallMounted => "wall_mounted",
            Zone::Default => "default",
        }
    }

    pub fn parse(name: &str) -> Option<Zone> {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");
        Zone::ALL.into_iter().find(|z| z.as_str() == normalized)
    }

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Zone::PrimaryWall => &["bed", "sofa", "couch"],
            Zone::WindowArea => &["desk", "window"],
            Zone::Center => &["rug", "table"],
            Zone::CornerLeft => &["bookshelf", "plant"],
            Zone::CornerRight => &["lamp"],
            Zone::OppositeWall => &["chair"],
            Zone::WallMounted => &["wall", "floor", "ceiling"],
            Zone::Default => &[],
        }
    }

    fn reference_rect(self) -> Rect {
        match self {
            Zone::PrimaryWall => Rect::new(-1.5, 1.5, 1.5, 2.8),
            Zone::WindowArea => Rect::new(1.0, -1.5, 2.8, 0.5),
            Zone::Center => Rect::new(-0.8, -0.8, 0.8, 0.8),
            Zone::CornerLeft => Rect::new(-2.8, 1.0, -1.5, 2.5),
            Zone::CornerRight => Rect::new(1.5, 1.0, 2.8, 2.5),
            Zone::OppositeWall => Rect::new(-1.5, -2.8, 1.5, -1.5),
            Zone::WallMounted => Rect::new(-2.8, 2.5, 2.8, 2.9),
            Zone::Default => Rect::new(-2.0, -2.0, 2.0, 2.0),
        }
    }

    /// Candidate-centre rectangle for this zone in the given room.
    pub fn rect(self, room: &Room) -> Rect {
        let sx = room.width / REFERENCE_ROOM;
        let sy = room.depth / REFERENCE_ROOM;
        let r = self.reference_rect();
        Rect::new(r.min_x * sx, r.min_y * sy, r.max_x * sx, r.max_y * sy)
    }

    /// Yaw (degrees) that turns an entity in this zone toward the room.
    pub fn yaw(self) -> f64 {
        match self {
            Zone::OppositeWall => 180.0,
            Zone::WindowArea => 90.0,
            _ => 0.0,
        }
    }
}

/// Zone for an entity: explicit plan hint, then keyword role, then focal
/// entities on the primary wall, then the default zone.
pub fn select_zone(name: &str, plan: Option<&Plan>) -> Zone {
    if let Some(hinted) = plan.and_then(|p| {
        p.spatial
            .zones
            .iter()
            .find(|(entity, _)| entity.eq_ignore_ascii_case(name))
            .and_then(|(_, zone)| Zone::parse(zone))
    }) {
        return hinted;
    }

    let lower = name.to_lowercase();
    if let Some(zone) = Zone::ALL
        .into_iter()
        .find(|z| z.keywords().iter().any(|k| lower.contains(k)))
    {
        return zone;
    }

    if plan.is_some_and(|p| p.is_primary_focal(name)) {
        return Zone::PrimaryWall;
    }
    Zone::Default
}

/// Yaw for an entity placed in `zone`; desks face away from their wall.
pub fn yaw_for(name: &str, zone: Zone) -> f64 {
    if name.to_lowercase().contains("desk") {
        180.0
    } else {
        zone.yaw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::decomposer::fallback_plan;

    #[test]
    fn keyword_roles() {
        assert_eq!(select_zone("Bed", None), Zone::PrimaryWall);
        assert_eq!(select_zone("desk", None), Zone::WindowArea);
        assert_eq!(select_zone("coffee table", None), Zone::Center);
        assert_eq!(select_zone("bookshelf", None), Zone::CornerLeft);
        assert_eq!(select_zone("floor lamp", None), Zone::CornerRight);
        assert_eq!(select_zone("chair", None), Zone::OppositeWall);
        assert_eq!(select_zone("wall mirror", None), Zone::WallMounted);
        assert_eq!(select_zone("statue", None), Zone::Default);
    }

    #[test]
    fn plan_hint_beats_keywords_and_focal_beats_default() {
        let mut plan = fallback_plan("bed statue");
        plan.spatial.zones.insert("bed".into(), "center".into());
        plan.spatial.zones.insert("chair".into(), "nowhere".into());
        plan.spatial.primary_focal_point = Some("statue".into());

        assert_eq!(select_zone("bed", Some(&plan)), Zone::Center);
        assert_eq!(select_zone("chair", Some(&plan)), Zone::OppositeWall);
        assert_eq!(select_zone("statue", Some(&plan)), Zone::PrimaryWall);
    }

    #[test]
    fn zones_scale_with_room() {
        let room = Room {
            width: 3.0,
            depth: 12.0,
            height: 3.0,
        };
        assert_eq!(Zone::Center.rect(&room), Rect::new(-0.4, -1.6, 0.4, 1.6));
    }

    #[test]
    fn desk_overrides_zone_yaw() {
        assert_eq!(yaw_for("desk", Zone::WindowArea), 180.0);
        assert_eq!(yaw_for("window", Zone::WindowArea), 90.0);
        assert_eq!(yaw_for("chair", Zone::OppositeWall), 180.0);
        assert_eq!(Zone::parse("Corner Left"), Some(Zone::CornerLeft));
    }
}
