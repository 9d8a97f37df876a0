//! Derived marker styling. Radius and colour are computed from a node's
//! occupancy on every render and never stored.

/// Marker radius of an empty (or capacity-less) node.
pub const BASE_RADIUS: f64 = 5.0;
/// Marker radius of a node at or above capacity.
pub const MAX_RADIUS: f64 = 20.0;

/// Fill opacity shared by every node marker.
pub const MARKER_FILL_OPACITY: f64 = 0.9;

/// Stroke of a rendered edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeStyle {
    pub weight: f64,
    pub opacity: f64,
    pub color: &'static str,
}

pub const EDGE_STYLE: EdgeStyle = EdgeStyle {
    weight: 2.0,
    opacity: 0.8,
    color: "black",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyLevel {
    /// Capacity is zero, so no ratio exists.
    Unknown,
    Free,
    Moderate,
    Full,
}

impl OccupancyLevel {
    /// Bucket a node by occupancy ratio. The four buckets partition every
    /// possible (occupancy, capacity) pair.
    pub fn classify(occupancy: u32, capacity: u32) -> Self {
        match occupancy_ratio(occupancy, capacity) {
            None => OccupancyLevel::Unknown,
            Some(r) if r == 0.0 => OccupancyLevel::Free,
            Some(r) if r < 0.5 => OccupancyLevel::Moderate,
            Some(_) => OccupancyLevel::Full,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            OccupancyLevel::Unknown => "#BDBDBD",
            OccupancyLevel::Free => "#4CAF50",
            OccupancyLevel::Moderate => "#FFC107",
            OccupancyLevel::Full => "#F44336",
        }
    }
}

impl std::fmt::Display for OccupancyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OccupancyLevel::Unknown => write!(f, "unknown"),
            OccupancyLevel::Free => write!(f, "free"),
            OccupancyLevel::Moderate => write!(f, "moderate"),
            OccupancyLevel::Full => write!(f, "full"),
        }
    }
}

/// Raw occupancy ratio, or `None` when capacity is zero. Not clamped:
/// an over-full node reports a ratio above 1.
pub fn occupancy_ratio(occupancy: u32, capacity: u32) -> Option<f64> {
    if capacity == 0 {
        return None;
    }
    Some(occupancy as f64 / capacity as f64)
}

/// Interpolate marker radius between `BASE_RADIUS` and `MAX_RADIUS`.
pub fn node_radius(occupancy: u32, capacity: u32) -> f64 {
    let t = occupancy_ratio(occupancy, capacity)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    BASE_RADIUS + t * (MAX_RADIUS - BASE_RADIUS)
}

pub fn node_color(occupancy: u32, capacity: u32) -> &'static str {
    OccupancyLevel::classify(occupancy, capacity).color()
}
