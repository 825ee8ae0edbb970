//! Point and rectangle primitives shared by both tree variants.
//!
//! All coordinates are IEEE-754 doubles. Rectangles are closed axis-aligned
//! boxes described by their lower-left and upper-right corners; a rectangle
//! is valid when `lower_left[i] <= upper_right[i]` holds in every dimension.
//! These types are `#[repr(C)]` with no padding so they can live directly in
//! page slots.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Index, IndexMut, Mul, Sub};

use smallvec::SmallVec;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constants::DIMENSIONS;

/// A point in `DIMENSIONS`-dimensional space.
#[derive(Debug, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Point {
    pub values: [f64; DIMENSIONS],
}

impl Point {
    /// Point with every coordinate at positive infinity.
    pub const AT_INFINITY: Point = Point {
        values: [f64::INFINITY; DIMENSIONS],
    };

    /// Point with every coordinate at negative infinity.
    pub const AT_NEG_INFINITY: Point = Point {
        values: [f64::NEG_INFINITY; DIMENSIONS],
    };

    /// The origin.
    pub const AT_ORIGIN: Point = Point {
        values: [0.0; DIMENSIONS],
    };

    pub fn new(values: [f64; DIMENSIONS]) -> Point {
        Point { values }
    }

    /// Point with every coordinate set to `value`.
    pub fn splat(value: f64) -> Point {
        Point {
            values: [value; DIMENSIONS],
        }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        let mut sum = 0.0;
        for d in 0..DIMENSIONS {
            let delta = self.values[d] - other.values[d];
            sum += delta * delta;
        }
        sum.sqrt()
    }

    /// True when every coordinate of `self` is `<=` the matching coordinate
    /// of `rhs`. This is the dominance test rectangles are built on, not a
    /// total order.
    pub fn all_le(&self, rhs: &Point) -> bool {
        (0..DIMENSIONS).all(|d| self.values[d] <= rhs.values[d])
    }

    /// True when every coordinate of `self` is strictly `<` the matching
    /// coordinate of `rhs`.
    pub fn all_lt(&self, rhs: &Point) -> bool {
        (0..DIMENSIONS).all(|d| self.values[d] < rhs.values[d])
    }

    /// Lexicographic comparison over coordinates in dimension order.
    pub fn cmp_lexicographic(&self, rhs: &Point) -> Ordering {
        for d in 0..DIMENSIONS {
            match self.values[d].total_cmp(&rhs.values[d]) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Lower each coordinate to the minimum of itself and `other`'s.
    pub fn take_min(&mut self, other: &Point) {
        for d in 0..DIMENSIONS {
            self.values[d] = self.values[d].min(other.values[d]);
        }
    }

    /// Raise each coordinate to the maximum of itself and `other`'s.
    pub fn take_max(&mut self, other: &Point) {
        for d in 0..DIMENSIONS {
            self.values[d] = self.values[d].max(other.values[d]);
        }
    }

    /// True when any coordinate is infinite.
    pub fn touches_infinity(&self) -> bool {
        self.values.iter().any(|v| v.is_infinite())
    }
}

impl Index<usize> for Point {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

impl IndexMut<usize> for Point {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.values[index]
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        let mut out = self;
        for d in 0..DIMENSIONS {
            out.values[d] += rhs.values[d];
        }
        out
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        let mut out = self;
        for d in 0..DIMENSIONS {
            out.values[d] -= rhs.values[d];
        }
        out
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, scalar: f64) -> Point {
        let mut out = self;
        for d in 0..DIMENSIONS {
            out.values[d] *= scalar;
        }
        out
    }
}

impl Div<f64> for Point {
    type Output = Point;

    fn div(self, scalar: f64) -> Point {
        let mut out = self;
        for d in 0..DIMENSIONS {
            out.values[d] /= scalar;
        }
        out
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (d, value) in self.values.iter().enumerate() {
            if d > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

/// A closed axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Rectangle {
    pub lower_left: Point,
    pub upper_right: Point,
}

impl Rectangle {
    /// Sentinel rectangle with both corners at positive infinity.
    pub const AT_INFINITY: Rectangle = Rectangle {
        lower_left: Point::AT_INFINITY,
        upper_right: Point::AT_INFINITY,
    };

    /// Sentinel rectangle with both corners at negative infinity.
    pub const AT_NEG_INFINITY: Rectangle = Rectangle {
        lower_left: Point::AT_NEG_INFINITY,
        upper_right: Point::AT_NEG_INFINITY,
    };

    /// Degenerate rectangle at the origin.
    pub const AT_ORIGIN: Rectangle = Rectangle {
        lower_left: Point::AT_ORIGIN,
        upper_right: Point::AT_ORIGIN,
    };

    /// Inverted rectangle that any `expand` call snaps onto its argument.
    /// Used as the seed when folding a bounding box over a point set.
    pub const INVERTED: Rectangle = Rectangle {
        lower_left: Point::AT_INFINITY,
        upper_right: Point::AT_NEG_INFINITY,
    };

    pub fn new(lower_left: Point, upper_right: Point) -> Rectangle {
        Rectangle {
            lower_left,
            upper_right,
        }
    }

    /// Degenerate rectangle covering exactly one point.
    pub fn at_point(point: Point) -> Rectangle {
        Rectangle {
            lower_left: point,
            upper_right: point,
        }
    }

    /// True when the corners are ordered in every dimension.
    pub fn is_valid(&self) -> bool {
        self.lower_left.all_le(&self.upper_right)
    }

    /// Product of extents.
    pub fn area(&self) -> f64 {
        let mut area = 1.0;
        for d in 0..DIMENSIONS {
            area *= self.upper_right[d] - self.lower_left[d];
        }
        area
    }

    /// Sum of extents. Used only for tie-breaking expansion decisions.
    pub fn margin(&self) -> f64 {
        let mut margin = 0.0;
        for d in 0..DIMENSIONS {
            margin += self.upper_right[d] - self.lower_left[d];
        }
        margin
    }

    /// Area of the overlap with `other`, zero when they do not intersect.
    pub fn intersection_area(&self, other: &Rectangle) -> f64 {
        let mut area = 1.0;
        for d in 0..DIMENSIONS {
            let lo = self.lower_left[d].max(other.lower_left[d]);
            let hi = self.upper_right[d].min(other.upper_right[d]);
            if hi < lo {
                return 0.0;
            }
            area *= hi - lo;
        }
        area
    }

    /// Growth in area needed to cover `point`.
    pub fn expansion_area(&self, point: &Point) -> f64 {
        self.copy_expand(point).area() - self.area()
    }

    /// Growth in margin needed to cover `point`.
    pub fn expansion_margin(&self, point: &Point) -> f64 {
        self.copy_expand(point).margin() - self.margin()
    }

    /// Growth in area needed to cover `other`.
    pub fn expansion_area_rect(&self, other: &Rectangle) -> f64 {
        let mut merged = *self;
        merged.expand_rect(other);
        merged.area() - self.area()
    }

    /// Grow in place to cover `point`.
    pub fn expand(&mut self, point: &Point) {
        self.lower_left.take_min(point);
        self.upper_right.take_max(point);
    }

    /// Grow in place to cover `other`.
    pub fn expand_rect(&mut self, other: &Rectangle) {
        self.lower_left.take_min(&other.lower_left);
        self.upper_right.take_max(&other.upper_right);
    }

    /// Copy of `self` grown to cover `point`.
    pub fn copy_expand(&self, point: &Point) -> Rectangle {
        let mut copy = *self;
        copy.expand(point);
        copy
    }

    pub fn contains_point(&self, point: &Point) -> bool {
        self.lower_left.all_le(point) && point.all_le(&self.upper_right)
    }

    pub fn strict_contains_point(&self, point: &Point) -> bool {
        self.lower_left.all_lt(point) && point.all_lt(&self.upper_right)
    }

    pub fn contains_rectangle(&self, other: &Rectangle) -> bool {
        self.contains_point(&other.lower_left) && self.contains_point(&other.upper_right)
    }

    /// Closed intersection test: touching borders count.
    pub fn intersects_rectangle(&self, other: &Rectangle) -> bool {
        (0..DIMENSIONS).all(|d| {
            self.lower_left[d] <= other.upper_right[d]
                && other.lower_left[d] <= self.upper_right[d]
        })
    }

    /// Open intersection test: true only when the overlap has positive
    /// extent in every dimension.
    pub fn strict_intersects_rectangle(&self, other: &Rectangle) -> bool {
        (0..DIMENSIONS).all(|d| {
            self.lower_left[d] < other.upper_right[d] && other.lower_left[d] < self.upper_right[d]
        })
    }

    /// True when the rectangles touch but the overlap has zero area.
    pub fn border_only_intersects_rectangle(&self, other: &Rectangle) -> bool {
        self.intersects_rectangle(other) && !self.strict_intersects_rectangle(other)
    }

    /// True when the union of the two rectangles is itself a rectangle:
    /// they agree on every dimension except at most one, and on that
    /// dimension the intervals overlap or touch.
    pub fn aligned_for_merging(&self, other: &Rectangle) -> bool {
        let mut differing = None;
        for d in 0..DIMENSIONS {
            if self.lower_left[d] != other.lower_left[d]
                || self.upper_right[d] != other.upper_right[d]
            {
                if differing.is_some() {
                    return false;
                }
                differing = Some(d);
            }
        }
        match differing {
            None => true,
            Some(d) => {
                self.upper_right[d] >= other.lower_left[d]
                    && other.upper_right[d] >= self.lower_left[d]
            }
        }
    }

    /// True when some border of `self` lies exactly on the opposing border
    /// of `other` in one dimension.
    pub fn aligned_opposing_borders(&self, other: &Rectangle) -> bool {
        (0..DIMENSIONS).any(|d| {
            self.upper_right[d] == other.lower_left[d]
                || self.lower_left[d] == other.upper_right[d]
        })
    }

    /// Geometric intersection, `None` when the rectangles do not meet.
    pub fn intersection(&self, clip: &Rectangle) -> Option<Rectangle> {
        let mut lower = self.lower_left;
        let mut upper = self.upper_right;
        lower.take_max(&clip.lower_left);
        upper.take_min(&clip.upper_right);
        let result = Rectangle::new(lower, upper);
        result.is_valid().then_some(result)
    }

    /// Decompose `self` minus `clip` into at most `2 * DIMENSIONS` disjoint
    /// rectangles. Dimension by dimension, the slab below the clip and the
    /// slab above it are peeled off and the working rectangle narrows to
    /// the clip's extent. When `clip` does not intersect `self` the result
    /// is `self` unchanged.
    pub fn fragment_rectangle(&self, clip: &Rectangle) -> SmallVec<[Rectangle; 2 * DIMENSIONS]> {
        let mut fragments = SmallVec::new();
        if !self.intersects_rectangle(clip) {
            fragments.push(*self);
            return fragments;
        }

        let mut remainder = *self;
        for d in 0..DIMENSIONS {
            if remainder.lower_left[d] < clip.lower_left[d] {
                let mut below = remainder;
                below.upper_right[d] = clip.lower_left[d];
                fragments.push(below);
                remainder.lower_left[d] = clip.lower_left[d];
            }
            if remainder.upper_right[d] > clip.upper_right[d] {
                let mut above = remainder;
                above.lower_left[d] = clip.upper_right[d];
                fragments.push(above);
                remainder.upper_right[d] = clip.upper_right[d];
            }
        }
        fragments
    }

    pub fn centre_point(&self) -> Point {
        (self.lower_left + self.upper_right) / 2.0
    }

    /// True when either corner touches an infinity sentinel.
    pub fn touches_infinity(&self) -> bool {
        self.lower_left.touches_infinity() || self.upper_right.touches_infinity()
    }

    /// True when some dimension has zero extent.
    pub fn has_zero_extent(&self) -> bool {
        (0..DIMENSIONS).any(|d| self.lower_left[d] == self.upper_right[d])
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} - {}]", self.lower_left, self.upper_right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new([x, y])
    }

    fn r(x1: f64, y1: f64, x2: f64, y2: f64) -> Rectangle {
        Rectangle::new(p(x1, y1), p(x2, y2))
    }

    #[test]
    fn test_point_arithmetic() {
        let a = p(1.0, 2.0);
        let b = p(3.0, 4.0);
        assert_eq!(a + b, p(4.0, 6.0));
        assert_eq!(b - a, p(2.0, 2.0));
        assert_eq!(a * 2.0, p(2.0, 4.0));
        assert_eq!(b / 2.0, p(1.5, 2.0));
    }

    #[test]
    fn test_point_dominance() {
        assert!(p(1.0, 1.0).all_le(&p(1.0, 2.0)));
        assert!(!p(1.0, 3.0).all_le(&p(1.0, 2.0)));
        assert!(p(0.0, 0.0).all_lt(&p(1.0, 1.0)));
        assert!(!p(0.0, 1.0).all_lt(&p(1.0, 1.0)));
    }

    #[test]
    fn test_point_lexicographic_order() {
        use std::cmp::Ordering;
        assert_eq!(p(1.0, 5.0).cmp_lexicographic(&p(2.0, 0.0)), Ordering::Less);
        assert_eq!(p(1.0, 5.0).cmp_lexicographic(&p(1.0, 5.0)), Ordering::Equal);
        assert_eq!(
            p(1.0, 5.0).cmp_lexicographic(&p(1.0, 4.0)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_point_distance() {
        assert_eq!(p(0.0, 0.0).distance(&p(3.0, 4.0)), 5.0);
    }

    #[test]
    fn test_rectangle_corner_roundtrip() {
        let rect = r(1.0, 2.0, 3.0, 4.0);
        assert_eq!(Rectangle::new(rect.lower_left, rect.upper_right), rect);
    }

    #[test]
    fn test_area_and_margin() {
        let rect = r(0.0, 0.0, 10.0, 5.0);
        assert_eq!(rect.area(), 50.0);
        assert_eq!(rect.margin(), 15.0);
    }

    #[test]
    fn test_intersection_area() {
        let a = r(0.0, 0.0, 10.0, 10.0);
        let b = r(5.0, 5.0, 15.0, 15.0);
        let c = r(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.intersection_area(&b), 25.0);
        assert_eq!(a.intersection_area(&c), 0.0);
    }

    #[test]
    fn test_expansion_area() {
        let rect = r(0.0, 0.0, 10.0, 10.0);
        assert_eq!(rect.expansion_area(&p(5.0, 5.0)), 0.0);
        assert_eq!(rect.expansion_area(&p(20.0, 10.0)), 100.0);
    }

    #[test]
    fn test_expand_covers_point() {
        let mut rect = r(0.0, 0.0, 10.0, 10.0);
        rect.expand(&p(20.0, -5.0));
        assert!(rect.contains_point(&p(20.0, -5.0)));
        assert_eq!(rect, r(0.0, -5.0, 20.0, 10.0));
    }

    #[test]
    fn test_containment() {
        let rect = r(0.0, 0.0, 10.0, 10.0);
        assert!(rect.contains_point(&p(0.0, 0.0)));
        assert!(rect.contains_point(&p(10.0, 10.0)));
        assert!(!rect.strict_contains_point(&p(0.0, 5.0)));
        assert!(rect.strict_contains_point(&p(5.0, 5.0)));
        assert!(rect.contains_rectangle(&r(2.0, 2.0, 8.0, 8.0)));
        assert!(!rect.contains_rectangle(&r(5.0, 5.0, 15.0, 15.0)));
    }

    #[test]
    fn test_intersects() {
        let a = r(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects_rectangle(&r(5.0, 5.0, 15.0, 15.0)));
        assert!(a.intersects_rectangle(&r(10.0, 10.0, 20.0, 20.0)));
        assert!(!a.intersects_rectangle(&r(11.0, 0.0, 20.0, 10.0)));
        assert!(!a.strict_intersects_rectangle(&r(10.0, 0.0, 20.0, 10.0)));
        assert!(a.border_only_intersects_rectangle(&r(10.0, 0.0, 20.0, 10.0)));
        assert!(!a.border_only_intersects_rectangle(&r(5.0, 5.0, 15.0, 15.0)));
    }

    #[test]
    fn test_aligned_for_merging() {
        let a = r(0.0, 0.0, 5.0, 10.0);
        let b = r(5.0, 0.0, 10.0, 10.0);
        let c = r(5.0, 1.0, 10.0, 11.0);
        let gap = r(6.0, 0.0, 10.0, 10.0);
        assert!(a.aligned_for_merging(&b));
        assert!(a.aligned_for_merging(&a));
        assert!(!a.aligned_for_merging(&c));
        assert!(!a.aligned_for_merging(&gap));
    }

    #[test]
    fn test_intersection() {
        let a = r(0.0, 0.0, 10.0, 10.0);
        assert_eq!(
            a.intersection(&r(5.0, 5.0, 15.0, 15.0)),
            Some(r(5.0, 5.0, 10.0, 10.0))
        );
        assert_eq!(a.intersection(&r(20.0, 20.0, 30.0, 30.0)), None);
    }

    #[test]
    fn test_fragment_rectangle_roundtrip() {
        let square = r(0.0, 0.0, 10.0, 10.0);
        let clip = r(3.0, 3.0, 7.0, 7.0);
        let fragments = square.fragment_rectangle(&clip);

        // Fragments are pairwise border-disjoint.
        for (i, a) in fragments.iter().enumerate() {
            for b in fragments.iter().skip(i + 1) {
                assert!(!a.strict_intersects_rectangle(b));
            }
        }
        // None covers the clip interior.
        for frag in &fragments {
            assert!(!frag.strict_intersects_rectangle(&clip));
        }
        // Union of fragment areas equals the square minus the clip.
        let total: f64 = fragments.iter().map(|f| f.area()).sum();
        assert_eq!(total, square.area() - clip.area());
    }

    #[test]
    fn test_fragment_disjoint_clip() {
        let square = r(0.0, 0.0, 10.0, 10.0);
        let fragments = square.fragment_rectangle(&r(20.0, 20.0, 30.0, 30.0));
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0], square);
    }

    #[test]
    fn test_inverted_seed_expands() {
        let mut seed = Rectangle::INVERTED;
        seed.expand(&p(3.0, 4.0));
        assert_eq!(seed, Rectangle::at_point(p(3.0, 4.0)));
        seed.expand(&p(-1.0, 10.0));
        assert_eq!(seed, r(-1.0, 4.0, 3.0, 10.0));
    }
}
