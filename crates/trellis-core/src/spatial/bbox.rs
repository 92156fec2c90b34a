//! Points and axis-aligned boxes in the projected (time, relevance, semantic) space

use serde::{Deserialize, Serialize};

// ============================================================================
// POINT
// ============================================================================

/// A point in the projected space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance
    pub fn distance(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub(crate) fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

// ============================================================================
// BOUNDING BOX
// ============================================================================

/// An axis-aligned bounding box, defined by its minimum and maximum corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3,
    pub max: Point3,
}

impl BoundingBox {
    /// Create a box from two opposite corners; corners are normalised so `min <= max`
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Box from per-axis `(lo, hi)` ranges
    pub fn from_ranges(x: (f64, f64), y: (f64, f64), z: (f64, f64)) -> Self {
        Self::new(Point3::new(x.0, y.0, z.0), Point3::new(x.1, y.1, z.1))
    }

    /// Cube of half-width `radius` around `center`
    pub fn around(center: Point3, radius: f64) -> Self {
        Self::new(
            Point3::new(center.x - radius, center.y - radius, center.z - radius),
            Point3::new(center.x + radius, center.y + radius, center.z + radius),
        )
    }

    pub fn center(&self) -> Point3 {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// True when the point lies inside or on the boundary
    pub fn contains_point(&self, p: Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// True when `other` intersects or touches this box
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Smallest box covering both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Volume; degenerate axes count as a small epsilon so flat boxes still compare
    pub fn volume(&self) -> f64 {
        const EPS: f64 = 1e-9;
        ((self.max.x - self.min.x).max(EPS))
            * ((self.max.y - self.min.y).max(EPS))
            * ((self.max.z - self.min.z).max(EPS))
    }

    /// Growth in volume if `other` were merged in
    pub fn enlargement(&self, other: &BoundingBox) -> f64 {
        self.union(other).volume() - self.volume()
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }
}
