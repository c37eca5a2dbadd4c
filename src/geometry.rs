//! Polygon geometry for region-of-interest authoring.
//!
//! Everything here is a pure function over value types. Coordinates live in
//! frame-pixel space: `x` grows to the right, `y` grows downwards, and a point is
//! inside the frame when `0 <= x < width` and `0 <= y < height`.
//!
//! # Validation
//!
//! [`validate_polygon`] is the single gate every ROI passes through. It applies,
//! in order:
//!
//! 1. collapse consecutive duplicate points (including last == first);
//!    fewer than three left is [`GeometryError::DegenerateShape`]
//! 2. bounds check, [`GeometryError::OutOfBounds`]
//! 3. all points on one line is [`GeometryError::DegenerateShape`]
//! 4. crossing or touching edges is [`GeometryError::SelfIntersecting`]
//!
//! Non-convex polygons are accepted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GeometryError;

/// Tolerance for orientation and interval comparisons, in pixels.
const EPSILON: f64 = 1e-9;

// =============================================================================
// Value types
// =============================================================================

/// A point in frame-pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate, pixels from the left edge
    pub x: f64,
    /// Vertical coordinate, pixels from the top edge
    pub y: f64,
}

impl Point {
    /// Create a point from its coordinates.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Dimensions of the reference camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameBounds {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl FrameBounds {
    /// Create frame bounds from width and height in pixels.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether `point` lies within `[0, width) x [0, height)`.
    pub fn contains(&self, point: &Point) -> bool {
        point.is_finite()
            && point.x >= 0.0
            && point.y >= 0.0
            && point.x < f64::from(self.width)
            && point.y < f64::from(self.height)
    }

    /// Width divided by height.
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    /// Total pixel count.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for FrameBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned bounding box in continuous coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Smallest x of any vertex
    pub min_x: f64,
    /// Smallest y of any vertex
    pub min_y: f64,
    /// Largest x of any vertex
    pub max_x: f64,
    /// Largest y of any vertex
    pub max_y: f64,
}

impl BoundingBox {
    fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

/// Inclusive pixel rectangle covered by a polygon's vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRect {
    /// Left-most pixel column
    pub x: u32,
    /// Top-most pixel row
    pub y: u32,
    /// Number of pixel columns
    pub width: u32,
    /// Number of pixel rows
    pub height: u32,
}

/// A validated, simple (non-self-intersecting) polygon.
///
/// Only [`validate_polygon`] constructs one, so holding a `Polygon` means the
/// invariants have been checked against some frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    /// The vertices in insertion order. The closing edge runs from the last
    /// vertex back to the first.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a validated polygon; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over the edges as `(start, end)` pairs, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        edges_of(&self.points)
    }

    /// Enclosed area (shoelace formula), always non-negative.
    pub fn area(&self) -> f64 {
        signed_area(&self.points).abs()
    }

    /// Bounding box of the vertices.
    pub fn bounding_box(&self) -> BoundingBox {
        bounding_box_of(&self.points)
    }

    /// Inclusive pixel rectangle spanned by the vertices.
    pub fn pixel_extent(&self) -> PixelRect {
        let bbox = self.bounding_box();
        // Validated polygons are in bounds, so the casts cannot go negative.
        let x = bbox.min_x.floor() as u32;
        let y = bbox.min_y.floor() as u32;
        let right = bbox.max_x.floor() as u32;
        let bottom = bbox.max_y.floor() as u32;
        PixelRect {
            x,
            y,
            width: right - x + 1,
            height: bottom - y + 1,
        }
    }

    /// Consume the polygon and return its vertices.
    pub fn into_points(self) -> Vec<Point> {
        self.points
    }
}

// =============================================================================
// Kernel operations
// =============================================================================

/// Validate a point sequence against `bounds` and build a [`Polygon`].
///
/// Consecutive duplicates are collapsed first; the returned polygon holds the
/// collapsed sequence, which equals the input when it had no duplicates.
pub fn validate_polygon(points: &[Point], bounds: FrameBounds) -> Result<Polygon, GeometryError> {
    let points = collapse_duplicates(points);
    if points.len() < 3 {
        return Err(GeometryError::DegenerateShape {
            distinct: points.len(),
        });
    }

    if let Some(outside) = points.iter().find(|p| !bounds.contains(p)) {
        return Err(GeometryError::OutOfBounds {
            point: *outside,
            bounds,
        });
    }

    if all_collinear(&points) {
        return Err(GeometryError::DegenerateShape {
            distinct: points.len(),
        });
    }

    if let Some((first, second)) = find_self_intersection(&points) {
        return Err(GeometryError::SelfIntersecting { first, second });
    }

    Ok(Polygon { points })
}

/// Even-odd (ray casting) point-in-polygon test.
///
/// Points exactly on the boundary may fall either way.
pub fn contains_point(polygon: &Polygon, point: &Point) -> bool {
    let vertices = polygon.points();
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let vi = &vertices[i];
        let vj = &vertices[j];
        if ((vi.y > point.y) != (vj.y > point.y))
            && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Whether the interiors of `a` and `b` share a positive area.
///
/// Polygons that only share an edge or a corner do not overlap.
pub fn overlaps(a: &Polygon, b: &Polygon) -> bool {
    if !a.bounding_box().intersects(&b.bounding_box()) {
        return false;
    }

    // A proper crossing always leaves a wedge of shared interior next to it.
    for (p1, p2) in a.edges() {
        for (q1, q2) in b.edges() {
            if segments_cross_properly(p1, p2, q1, q2) {
                return true;
            }
        }
    }

    // Without proper crossings the edge order is fixed inside every vertical
    // strip between vertex x-coordinates, so the strip centre line decides.
    let mut xs: Vec<f64> = a
        .points()
        .iter()
        .chain(b.points())
        .map(|p| p.x)
        .collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup_by(|next, prev| (*next - *prev).abs() <= EPSILON);

    xs.windows(2).any(|pair| {
        let mid = (pair[0] + pair[1]) / 2.0;
        let spans_a = inside_spans(a.points(), mid);
        let spans_b = inside_spans(b.points(), mid);
        spans_a.iter().any(|(a_lo, a_hi)| {
            spans_b
                .iter()
                .any(|(b_lo, b_hi)| a_hi.min(*b_hi) - a_lo.max(*b_lo) > EPSILON)
        })
    })
}

// =============================================================================
// Screen <-> frame transform
// =============================================================================

/// Maps points between the displayed still image and frame-pixel space.
///
/// The view shows a scaled copy of the camera frame; clicks arrive in display
/// coordinates and have to be scaled back before they reach the kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenTransform {
    scale_x: f64,
    scale_y: f64,
}

impl ScreenTransform {
    /// Build a transform from the displayed image size to `bounds`.
    ///
    /// Returns `None` when either display dimension is not a positive finite number.
    pub fn new(display_width: f64, display_height: f64, bounds: FrameBounds) -> Option<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(display_width) || !valid(display_height) {
            return None;
        }
        Some(Self {
            scale_x: f64::from(bounds.width) / display_width,
            scale_y: f64::from(bounds.height) / display_height,
        })
    }

    /// Transform between two frame sizes, used when rescaling a stored ROI set.
    pub fn between(from: FrameBounds, to: FrameBounds) -> Self {
        Self {
            scale_x: f64::from(to.width) / f64::from(from.width),
            scale_y: f64::from(to.height) / f64::from(from.height),
        }
    }

    /// Display coordinates to frame coordinates.
    pub fn to_frame(&self, point: Point) -> Point {
        Point::new(point.x * self.scale_x, point.y * self.scale_y)
    }

    /// Frame coordinates to display coordinates.
    pub fn to_display(&self, point: Point) -> Point {
        Point::new(point.x / self.scale_x, point.y / self.scale_y)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn collapse_duplicates(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        if out.last() != Some(p) {
            out.push(*p);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

fn edges_of(points: &[Point]) -> impl Iterator<Item = (Point, Point)> + '_ {
    let n = points.len();
    (0..n).map(move |i| (points[i], points[(i + 1) % n]))
}

fn signed_area(points: &[Point]) -> f64 {
    edges_of(points)
        .map(|(p, q)| p.x * q.y - q.x * p.y)
        .sum::<f64>()
        / 2.0
}

fn bounding_box_of(points: &[Point]) -> BoundingBox {
    points.iter().fold(
        BoundingBox {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        },
        |bbox, p| BoundingBox {
            min_x: bbox.min_x.min(p.x),
            min_y: bbox.min_y.min(p.y),
            max_x: bbox.max_x.max(p.x),
            max_y: bbox.max_y.max(p.y),
        },
    )
}

/// Cross product of `(b - a)` and `(c - a)`; positive when `c` is left of `a -> b`.
fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn sign(value: f64) -> i8 {
    if value > EPSILON {
        1
    } else if value < -EPSILON {
        -1
    } else {
        0
    }
}

/// `p` lies on segment `a..b`, assuming the three are collinear.
fn on_segment(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

/// Standard segment intersection test, touching and collinear overlap included.
fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = sign(orientation(q1, q2, p1));
    let d2 = sign(orientation(q1, q2, p2));
    let d3 = sign(orientation(p1, p2, q1));
    let d4 = sign(orientation(p1, p2, q2));

    if d1 * d2 < 0 && d3 * d4 < 0 {
        return true;
    }
    (d1 == 0 && on_segment(q1, q2, p1))
        || (d2 == 0 && on_segment(q1, q2, p2))
        || (d3 == 0 && on_segment(p1, p2, q1))
        || (d4 == 0 && on_segment(p1, p2, q2))
}

/// Interiors of the two segments cross at a single point.
fn segments_cross_properly(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = sign(orientation(q1, q2, p1));
    let d2 = sign(orientation(q1, q2, p2));
    let d3 = sign(orientation(p1, p2, q1));
    let d4 = sign(orientation(p1, p2, q2));
    d1 * d2 < 0 && d3 * d4 < 0
}

fn all_collinear(points: &[Point]) -> bool {
    let origin = points[0];
    let Some(direction) = points.iter().copied().find(|p| *p != origin) else {
        return true;
    };
    points
        .iter()
        .all(|p| sign(orientation(origin, direction, *p)) == 0)
}

/// Returns the indices of the first pair of offending edges, if any.
///
/// Edge `i` runs from vertex `i` to vertex `i + 1`. Adjacent edges legitimately
/// share a vertex, so for them only a fold-back (collinear overlap) counts.
fn find_self_intersection(points: &[Point]) -> Option<(usize, usize)> {
    let n = points.len();
    let edge = |i: usize| (points[i], points[(i + 1) % n]);

    for i in 0..n {
        let (a1, a2) = edge(i);
        for j in (i + 1)..n {
            let (b1, b2) = edge(j);
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                // Shared vertex is a2 == b1 (or b2 == a1 for the wrap pair).
                let (shared, far_a, far_b) = if j == i + 1 {
                    (a2, a1, b2)
                } else {
                    (a1, a2, b1)
                };
                let folds = sign(orientation(far_a, shared, far_b)) == 0
                    && ((far_b.x - shared.x) * (far_a.x - shared.x)
                        + (far_b.y - shared.y) * (far_a.y - shared.y))
                        > EPSILON;
                if folds {
                    return Some((i, j));
                }
            } else if segments_intersect(a1, a2, b1, b2) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Inside intervals of a polygon along the vertical line `x = at`.
///
/// `at` must not coincide with any vertex x-coordinate.
fn inside_spans(points: &[Point], at: f64) -> Vec<(f64, f64)> {
    let mut ys: Vec<f64> = edges_of(points)
        .filter(|(p, q)| (p.x < at) != (q.x < at))
        .map(|(p, q)| p.y + (at - p.x) * (q.y - p.y) / (q.x - p.x))
        .collect();
    ys.sort_by(f64::total_cmp);
    ys.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
}
