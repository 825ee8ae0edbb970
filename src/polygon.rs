//! Isothetic polygons: finite unions of axis-aligned rectangles.
//!
//! The NIR-tree describes the region owned by a branch as an isothetic
//! polygon instead of a single bounding rectangle. `IsotheticPolygon` is the
//! owned algebra type every operation is implemented on. Two physical
//! encodings move polygons in and out of pages:
//!
//! - [`InlinePolygon`] holds up to [`MAX_RECTANGLE_COUNT`] basic rectangles
//!   directly inside a branch entry.
//! - An *unbounded* polygon lives in its own page slot: a
//!   [`PolygonSlotHeader`] followed by `max_rect_count` rectangles. Branches
//!   reach it through a node handle once the inline capacity is exceeded.

use std::fmt;
use std::mem::size_of;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constants::{MAX_RECTANGLE_COUNT, PAGE_DATA_SIZE};
use crate::error::{IndexError, IndexResult};
use crate::geometry::{Point, Rectangle};
use crate::storage::handle::PinnedHandle;

/// Result of choosing which basic rectangle to grow for a point.
///
/// The decision is taken once by [`IsotheticPolygon::optimal_expansion`] and
/// handed back to [`IsotheticPolygon::expand_with`] so both steps agree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimalExpansion {
    pub index: usize,
    pub area: f64,
}

/// A finite union of basic rectangles with a cached bounding box.
///
/// The bounding box is refreshed by every mutating operation. An empty
/// polygon carries the inverted sentinel box so that merges and expansions
/// snap onto real geometry.
#[derive(Debug, Clone)]
pub struct IsotheticPolygon {
    pub bounding_box: Rectangle,
    pub basic_rectangles: Vec<Rectangle>,
}

impl IsotheticPolygon {
    pub fn new() -> IsotheticPolygon {
        IsotheticPolygon {
            bounding_box: Rectangle::INVERTED,
            basic_rectangles: Vec::new(),
        }
    }

    pub fn from_rectangle(base: Rectangle) -> IsotheticPolygon {
        IsotheticPolygon {
            bounding_box: base,
            basic_rectangles: vec![base],
        }
    }

    pub fn rectangle_count(&self) -> usize {
        self.basic_rectangles.len()
    }

    /// Sum of basic-rectangle areas. Meaningful once the rectangles are
    /// disjoint, which `refine` and `increase_resolution` maintain.
    pub fn area(&self) -> f64 {
        self.basic_rectangles.iter().map(|r| r.area()).sum()
    }

    pub fn intersection_area(&self, rect: &Rectangle) -> f64 {
        self.basic_rectangles
            .iter()
            .map(|r| r.intersection_area(rect))
            .sum()
    }

    /// Index of the basic rectangle whose expansion area for `point` is
    /// minimal, breaking ties on expansion margin, then on index.
    pub fn optimal_expansion(&self, point: &Point) -> OptimalExpansion {
        debug_assert!(!self.basic_rectangles.is_empty());
        let mut best = OptimalExpansion {
            index: 0,
            area: f64::INFINITY,
        };
        let mut best_margin = f64::INFINITY;
        for (index, rect) in self.basic_rectangles.iter().enumerate() {
            let area = rect.expansion_area(point);
            let margin = rect.expansion_margin(point);
            if area < best.area || (area == best.area && margin < best_margin) {
                best = OptimalExpansion { index, area };
                best_margin = margin;
            }
        }
        best
    }

    /// Grow the polygon to contain `point` using a freshly computed
    /// expansion decision.
    pub fn expand(&mut self, point: &Point) {
        let expansion = self.optimal_expansion(point);
        self.expand_with(point, &expansion);
    }

    /// Grow the polygon to contain `point` using a previously computed
    /// expansion decision.
    pub fn expand_with(&mut self, point: &Point, expansion: &OptimalExpansion) {
        self.basic_rectangles[expansion.index].expand(point);
        self.bounding_box.expand(point);
    }

    pub fn contains_point(&self, point: &Point) -> bool {
        self.bounding_box.contains_point(point)
            && self.basic_rectangles.iter().any(|r| r.contains_point(point))
    }

    pub fn intersects_rectangle(&self, rect: &Rectangle) -> bool {
        self.bounding_box.intersects_rectangle(rect)
            && self
                .basic_rectangles
                .iter()
                .any(|r| r.intersects_rectangle(rect))
    }

    pub fn intersects_polygon(&self, other: &IsotheticPolygon) -> bool {
        if !self.bounding_box.intersects_rectangle(&other.bounding_box) {
            return false;
        }
        self.basic_rectangles.iter().any(|a| {
            other
                .basic_rectangles
                .iter()
                .any(|b| a.intersects_rectangle(b))
        })
    }

    /// True when the polygon touches `rect` but the overlap has zero area.
    pub fn border_only_intersects_rectangle(&self, rect: &Rectangle) -> bool {
        let touches = self
            .basic_rectangles
            .iter()
            .any(|r| r.intersects_rectangle(rect));
        let overlaps = self
            .basic_rectangles
            .iter()
            .any(|r| r.strict_intersects_rectangle(rect));
        touches && !overlaps
    }

    /// True when the polygons share interior volume, not just borders.
    pub fn strictly_intersects_polygon(&self, other: &IsotheticPolygon) -> bool {
        if !self.bounding_box.intersects_rectangle(&other.bounding_box) {
            return false;
        }
        self.basic_rectangles.iter().any(|a| {
            other
                .basic_rectangles
                .iter()
                .any(|b| a.strict_intersects_rectangle(b))
        })
    }

    pub fn disjoint(&self, other: &IsotheticPolygon) -> bool {
        !self.intersects_polygon(other)
    }

    /// Pieces of the polygon that fall inside `rect`.
    pub fn intersection(&self, rect: &Rectangle) -> Vec<Rectangle> {
        self.basic_rectangles
            .iter()
            .filter_map(|r| r.intersection(rect))
            .collect()
    }

    /// Constrain the polygon in place to its overlap with `other`.
    pub fn intersection_with(&mut self, other: &IsotheticPolygon) {
        let mut result = Vec::new();
        for a in &self.basic_rectangles {
            for b in &other.basic_rectangles {
                if let Some(overlap) = a.intersection(b) {
                    result.push(overlap);
                }
            }
        }
        self.basic_rectangles = result;
        self.deduplicate();
        self.recompute_bounding_box();
    }

    /// Carve `clip` out of the polygon while keeping `point` covered.
    ///
    /// Every basic rectangle intersecting `clip` is replaced by its
    /// fragments outside the clip; fragments are kept when they still
    /// contain `point` or carry positive area outside the clip.
    pub fn increase_resolution(&mut self, point: &Point, clip: &Rectangle) {
        let mut result = Vec::with_capacity(self.basic_rectangles.len());
        for rect in &self.basic_rectangles {
            if !rect.intersects_rectangle(clip) {
                result.push(*rect);
                continue;
            }
            for fragment in rect.fragment_rectangle(clip) {
                if fragment.contains_point(point) || !fragment.has_zero_extent() {
                    result.push(fragment);
                }
            }
        }
        self.basic_rectangles = result;
        self.deduplicate();
        self.refine();
        self.recompute_bounding_box();
    }

    /// Carve an entire polygon out of this one while keeping `point`
    /// covered.
    pub fn increase_resolution_polygon(&mut self, point: &Point, clip: &IsotheticPolygon) {
        for rect in &clip.basic_rectangles {
            self.increase_resolution(point, rect);
        }
    }

    /// Clip the polygon to the half-space `coordinate <= limit` on axis `dim`.
    pub fn max_limit(&mut self, limit: f64, dim: usize) {
        for rect in &mut self.basic_rectangles {
            rect.upper_right[dim] = rect.upper_right[dim].min(limit);
        }
        self.basic_rectangles.retain(|r| r.is_valid());
        self.recompute_bounding_box();
    }

    /// Clip the polygon to the half-space `coordinate >= limit` on axis `dim`.
    pub fn min_limit(&mut self, limit: f64, dim: usize) {
        for rect in &mut self.basic_rectangles {
            rect.lower_left[dim] = rect.lower_left[dim].max(limit);
        }
        self.basic_rectangles.retain(|r| r.is_valid());
        self.recompute_bounding_box();
    }

    /// Set-union with another polygon's basic rectangles.
    pub fn merge(&mut self, other: &IsotheticPolygon) {
        self.basic_rectangles
            .extend(other.basic_rectangles.iter().copied());
        self.bounding_box.expand_rect(&other.bounding_box);
    }

    pub fn remove(&mut self, index: usize) {
        self.basic_rectangles.remove(index);
        self.recompute_bounding_box();
    }

    /// Replace each basic rectangle with the tight bounding box of the
    /// input points that fall inside it; rectangles containing no point are
    /// dropped.
    pub fn shrink(&mut self, points: &[Point]) {
        if points.is_empty() || self.basic_rectangles.is_empty() {
            return;
        }
        let mut shrunk = Vec::with_capacity(self.basic_rectangles.len());
        for rect in &self.basic_rectangles {
            let mut tight = Rectangle::INVERTED;
            let mut occupied = false;
            for point in points {
                if rect.contains_point(point) {
                    tight.expand(point);
                    occupied = true;
                }
            }
            if occupied {
                shrunk.push(tight);
            }
        }
        debug_assert!(!shrunk.is_empty());
        self.basic_rectangles = shrunk;
        self.recompute_bounding_box();
    }

    /// Drop exact duplicates among the basic rectangles.
    pub fn deduplicate(&mut self) {
        let mut unique: Vec<Rectangle> = Vec::with_capacity(self.basic_rectangles.len());
        for rect in &self.basic_rectangles {
            if !unique.contains(rect) {
                unique.push(*rect);
            }
        }
        self.basic_rectangles = unique;
    }

    /// Repeatedly merge pairs of basic rectangles whose union is itself a
    /// rectangle, until no such pair remains.
    pub fn refine(&mut self) {
        let mut merged_any = true;
        while merged_any {
            merged_any = false;
            'outer: for i in 0..self.basic_rectangles.len() {
                for j in (i + 1)..self.basic_rectangles.len() {
                    if self.basic_rectangles[i].aligned_for_merging(&self.basic_rectangles[j]) {
                        let other = self.basic_rectangles[j];
                        self.basic_rectangles[i].expand_rect(&other);
                        self.basic_rectangles.remove(j);
                        merged_any = true;
                        break 'outer;
                    }
                }
            }
        }
        self.recompute_bounding_box();
    }

    pub fn recompute_bounding_box(&mut self) {
        let mut bounding_box = Rectangle::INVERTED;
        for rect in &self.basic_rectangles {
            bounding_box.expand_rect(rect);
        }
        self.bounding_box = bounding_box;
    }

    pub fn exists(&self) -> bool {
        !self.basic_rectangles.is_empty()
    }

    /// Every basic rectangle has ordered corners.
    pub fn valid(&self) -> bool {
        self.basic_rectangles.iter().all(|r| r.is_valid())
    }

    /// No two basic rectangles are identical.
    pub fn unique(&self) -> bool {
        for (i, a) in self.basic_rectangles.iter().enumerate() {
            for b in self.basic_rectangles.iter().skip(i + 1) {
                if a == b {
                    return false;
                }
            }
        }
        true
    }

    /// No basic rectangle has zero volume.
    pub fn line_free(&self) -> bool {
        self.basic_rectangles.iter().all(|r| !r.has_zero_extent())
    }

    /// No basic rectangle touches an infinity sentinel.
    pub fn inf_free(&self) -> bool {
        self.basic_rectangles.iter().all(|r| !r.touches_infinity())
    }
}

impl Default for IsotheticPolygon {
    fn default() -> Self {
        Self::new()
    }
}

/// Equality ignores the order of basic rectangles.
impl PartialEq for IsotheticPolygon {
    fn eq(&self, other: &Self) -> bool {
        if self.basic_rectangles.len() != other.basic_rectangles.len() {
            return false;
        }
        let mut unmatched: Vec<Rectangle> = other.basic_rectangles.clone();
        for rect in &self.basic_rectangles {
            match unmatched.iter().position(|r| r == rect) {
                Some(pos) => {
                    unmatched.swap_remove(pos);
                }
                None => return false,
            }
        }
        true
    }
}

impl fmt::Display for IsotheticPolygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, rect) in self.basic_rectangles.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{rect}")?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// Inline (bounded) encoding
// ============================================================================

/// Polygon encoding stored directly inside a branch entry.
///
/// Capacity is fixed at [`MAX_RECTANGLE_COUNT`]; a polygon that does not fit
/// must move to an unbounded page slot instead.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct InlinePolygon {
    rect_count: u32,
    _pad: u32,
    bounding_box: Rectangle,
    rects: [Rectangle; MAX_RECTANGLE_COUNT],
}

impl InlinePolygon {
    pub fn empty() -> InlinePolygon {
        InlinePolygon {
            rect_count: 0,
            _pad: 0,
            bounding_box: Rectangle::INVERTED,
            rects: [Rectangle::AT_ORIGIN; MAX_RECTANGLE_COUNT],
        }
    }

    pub fn from_rectangle(base: Rectangle) -> InlinePolygon {
        let mut inline = Self::empty();
        inline.rect_count = 1;
        inline.bounding_box = base;
        inline.rects[0] = base;
        inline
    }

    /// `None` when the polygon exceeds the inline capacity.
    pub fn from_polygon(polygon: &IsotheticPolygon) -> Option<InlinePolygon> {
        if polygon.basic_rectangles.len() > MAX_RECTANGLE_COUNT {
            return None;
        }
        let mut inline = Self::empty();
        inline.rect_count = polygon.basic_rectangles.len() as u32;
        inline.bounding_box = polygon.bounding_box;
        for (slot, rect) in inline.rects.iter_mut().zip(&polygon.basic_rectangles) {
            *slot = *rect;
        }
        Some(inline)
    }

    pub fn to_polygon(&self) -> IsotheticPolygon {
        IsotheticPolygon {
            bounding_box: self.bounding_box,
            basic_rectangles: self.rects[..self.rect_count as usize].to_vec(),
        }
    }

    pub fn rectangle_count(&self) -> usize {
        self.rect_count as usize
    }

    pub fn bounding_box(&self) -> Rectangle {
        self.bounding_box
    }

    pub fn basic_rectangles(&self) -> &[Rectangle] {
        &self.rects[..self.rect_count as usize]
    }

    pub fn contains_point(&self, point: &Point) -> bool {
        self.bounding_box.contains_point(point)
            && self.basic_rectangles().iter().any(|r| r.contains_point(point))
    }

    pub fn intersects_rectangle(&self, rect: &Rectangle) -> bool {
        self.bounding_box.intersects_rectangle(rect)
            && self
                .basic_rectangles()
                .iter()
                .any(|r| r.intersects_rectangle(rect))
    }
}

impl PartialEq for InlinePolygon {
    fn eq(&self, other: &Self) -> bool {
        self.rect_count == other.rect_count
            && self.basic_rectangles() == other.basic_rectangles()
    }
}

// ============================================================================
// Unbounded (page slot) encoding
// ============================================================================

/// Header of an unbounded polygon slot. `max_rect_count` rectangles follow
/// immediately after the header within the same slot.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct PolygonSlotHeader {
    pub rect_count: u32,
    pub max_rect_count: u32,
    pub bounding_box: Rectangle,
}

/// Byte footprint of an unbounded polygon slot with the given capacity.
pub const fn polygon_slot_size(capacity: usize) -> usize {
    size_of::<PolygonSlotHeader>() + capacity * size_of::<Rectangle>()
}

/// Largest capacity an unbounded polygon slot can declare and still fit in
/// one page.
pub const MAX_SLOT_RECTANGLES: usize =
    (PAGE_DATA_SIZE - size_of::<PolygonSlotHeader>()) / size_of::<Rectangle>();

fn decode_polygon_slot(bytes: &[u8]) -> IndexResult<IsotheticPolygon> {
    let header_size = size_of::<PolygonSlotHeader>();
    let header = PolygonSlotHeader::read_from_bytes(&bytes[..header_size])
        .map_err(|_| IndexError::Corrupt("polygon slot header truncated".into()))?;
    if header.rect_count > header.max_rect_count
        || polygon_slot_size(header.max_rect_count as usize) > bytes.len()
    {
        return Err(IndexError::Corrupt(format!(
            "polygon slot header out of range: {}/{}",
            header.rect_count, header.max_rect_count
        )));
    }
    let rect_size = size_of::<Rectangle>();
    let mut basic_rectangles = Vec::with_capacity(header.rect_count as usize);
    for i in 0..header.rect_count as usize {
        let start = header_size + i * rect_size;
        let rect = Rectangle::read_from_bytes(&bytes[start..start + rect_size])
            .map_err(|_| IndexError::Corrupt("polygon slot rectangle truncated".into()))?;
        basic_rectangles.push(rect);
    }
    Ok(IsotheticPolygon {
        bounding_box: header.bounding_box,
        basic_rectangles,
    })
}

fn encode_polygon_slot(bytes: &mut [u8], polygon: &IsotheticPolygon) -> IndexResult<()> {
    let header_size = size_of::<PolygonSlotHeader>();
    let existing = PolygonSlotHeader::read_from_bytes(&bytes[..header_size])
        .map_err(|_| IndexError::Corrupt("polygon slot header truncated".into()))?;
    let capacity = existing.max_rect_count as usize;
    let needed = polygon.basic_rectangles.len();
    if needed > capacity {
        return Err(IndexError::PolygonOverflow { needed, capacity });
    }
    let header = PolygonSlotHeader {
        rect_count: needed as u32,
        max_rect_count: existing.max_rect_count,
        bounding_box: polygon.bounding_box,
    };
    bytes[..header_size].copy_from_slice(header.as_bytes());
    let rect_size = size_of::<Rectangle>();
    for (i, rect) in polygon.basic_rectangles.iter().enumerate() {
        let start = header_size + i * rect_size;
        bytes[start..start + rect_size].copy_from_slice(rect.as_bytes());
    }
    Ok(())
}

impl PinnedHandle<PolygonSlotHeader> {
    /// Stamp a fresh slot with its declared capacity and no rectangles.
    pub fn init_polygon(&self, capacity: usize) {
        debug_assert!(capacity <= MAX_SLOT_RECTANGLES);
        let header = PolygonSlotHeader {
            rect_count: 0,
            max_rect_count: capacity as u32,
            bounding_box: Rectangle::INVERTED,
        };
        *self.borrow_mut() = header;
    }

    /// Declared rectangle capacity of the slot.
    pub fn polygon_capacity(&self) -> usize {
        self.borrow().max_rect_count as usize
    }

    /// Load the slot contents into an owned polygon.
    pub fn read_polygon(&self) -> IndexResult<IsotheticPolygon> {
        self.with_slot_bytes(|bytes| decode_polygon_slot(bytes))
    }

    /// Store a polygon into the slot, failing when it exceeds the declared
    /// capacity.
    pub fn write_polygon(&self, polygon: &IsotheticPolygon) -> IndexResult<()> {
        self.with_slot_bytes_mut(|bytes| encode_polygon_slot(bytes, polygon))
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
    fn test_expand_covers_point() {
        let mut poly = IsotheticPolygon::from_rectangle(r(0.0, 0.0, 10.0, 10.0));
        poly.expand(&p(20.0, 20.0));

        assert_eq!(poly.bounding_box, r(0.0, 0.0, 20.0, 20.0));
        assert!(poly.contains_point(&p(20.0, 20.0)));
        assert!(poly
            .basic_rectangles
            .iter()
            .any(|rect| rect.contains_point(&p(20.0, 20.0))));
    }

    #[test]
    fn test_optimal_expansion_prefers_cheapest() {
        let poly = IsotheticPolygon {
            bounding_box: r(0.0, 0.0, 30.0, 10.0),
            basic_rectangles: vec![r(0.0, 0.0, 10.0, 10.0), r(20.0, 0.0, 30.0, 10.0)],
        };
        // (31, 5) is adjacent to the second rectangle.
        let expansion = poly.optimal_expansion(&p(31.0, 5.0));
        assert_eq!(expansion.index, 1);
        assert_eq!(expansion.area, 10.0);

        // A contained point costs nothing and resolves to the first
        // containing rectangle.
        let expansion = poly.optimal_expansion(&p(5.0, 5.0));
        assert_eq!(expansion.index, 0);
        assert_eq!(expansion.area, 0.0);
    }

    #[test]
    fn test_bounding_box_invariant_after_mutations() {
        let mut poly = IsotheticPolygon::from_rectangle(r(0.0, 0.0, 10.0, 10.0));
        poly.merge(&IsotheticPolygon::from_rectangle(r(20.0, 20.0, 30.0, 30.0)));
        poly.expand(&p(-5.0, 0.0));
        poly.increase_resolution(&p(-5.0, 0.0), &r(25.0, 25.0, 28.0, 28.0));

        let mut expected = Rectangle::INVERTED;
        for rect in &poly.basic_rectangles {
            expected.expand_rect(rect);
        }
        assert_eq!(poly.bounding_box, expected);
    }

    #[test]
    fn test_increase_resolution_carves_clip() {
        let mut poly = IsotheticPolygon::from_rectangle(r(0.0, 0.0, 10.0, 10.0));
        let pin = p(1.0, 1.0);
        poly.increase_resolution(&pin, &r(3.0, 3.0, 7.0, 7.0));

        assert!(poly.contains_point(&pin));
        assert!(!poly.contains_point(&p(5.0, 5.0)));
        assert!(poly.valid());
        assert!(poly.unique());
        // Total area shrank by exactly the clip area.
        assert_eq!(poly.area(), 100.0 - 16.0);
    }

    #[test]
    fn test_refine_merges_aligned() {
        let mut poly = IsotheticPolygon {
            bounding_box: r(0.0, 0.0, 10.0, 10.0),
            basic_rectangles: vec![r(0.0, 0.0, 5.0, 10.0), r(5.0, 0.0, 10.0, 10.0)],
        };
        poly.refine();
        assert_eq!(poly.basic_rectangles, vec![r(0.0, 0.0, 10.0, 10.0)]);
        assert_eq!(poly.bounding_box, r(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_shrink_to_points() {
        let mut poly = IsotheticPolygon {
            bounding_box: r(0.0, 0.0, 30.0, 10.0),
            basic_rectangles: vec![r(0.0, 0.0, 10.0, 10.0), r(20.0, 0.0, 30.0, 10.0)],
        };
        let points = [p(2.0, 2.0), p(4.0, 8.0)];
        poly.shrink(&points);

        // The unoccupied rectangle is dropped; the survivor is tight.
        assert_eq!(poly.basic_rectangles, vec![r(2.0, 2.0, 4.0, 8.0)]);
        assert!(points.iter().all(|q| poly.contains_point(q)));
    }

    #[test]
    fn test_limits_clip_halfspace() {
        let mut poly = IsotheticPolygon {
            bounding_box: r(0.0, 0.0, 30.0, 10.0),
            basic_rectangles: vec![r(0.0, 0.0, 10.0, 10.0), r(20.0, 0.0, 30.0, 10.0)],
        };
        poly.max_limit(15.0, 0);
        assert_eq!(poly.basic_rectangles, vec![r(0.0, 0.0, 10.0, 10.0)]);

        let mut poly = IsotheticPolygon::from_rectangle(r(0.0, 0.0, 10.0, 10.0));
        poly.min_limit(4.0, 1);
        assert_eq!(poly.basic_rectangles, vec![r(0.0, 4.0, 10.0, 10.0)]);
    }

    #[test]
    fn test_intersection_with_polygon() {
        let mut a = IsotheticPolygon::from_rectangle(r(0.0, 0.0, 10.0, 10.0));
        let b = IsotheticPolygon {
            bounding_box: r(5.0, 5.0, 25.0, 15.0),
            basic_rectangles: vec![r(5.0, 5.0, 15.0, 15.0), r(15.0, 5.0, 25.0, 15.0)],
        };
        a.intersection_with(&b);
        assert_eq!(a.basic_rectangles, vec![r(5.0, 5.0, 10.0, 10.0)]);
    }

    #[test]
    fn test_equality_ignores_order() {
        let a = IsotheticPolygon {
            bounding_box: r(0.0, 0.0, 30.0, 10.0),
            basic_rectangles: vec![r(0.0, 0.0, 10.0, 10.0), r(20.0, 0.0, 30.0, 10.0)],
        };
        let b = IsotheticPolygon {
            bounding_box: r(0.0, 0.0, 30.0, 10.0),
            basic_rectangles: vec![r(20.0, 0.0, 30.0, 10.0), r(0.0, 0.0, 10.0, 10.0)],
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_diagnostics() {
        let poly = IsotheticPolygon {
            bounding_box: r(0.0, 0.0, 10.0, 10.0),
            basic_rectangles: vec![r(0.0, 0.0, 10.0, 10.0), r(0.0, 0.0, 10.0, 0.0)],
        };
        assert!(poly.exists());
        assert!(poly.valid());
        assert!(poly.unique());
        assert!(!poly.line_free());
        assert!(poly.inf_free());
    }

    #[test]
    fn test_inline_polygon_roundtrip() {
        let poly = IsotheticPolygon {
            bounding_box: r(0.0, 0.0, 30.0, 10.0),
            basic_rectangles: vec![r(0.0, 0.0, 10.0, 10.0), r(20.0, 0.0, 30.0, 10.0)],
        };
        let inline = InlinePolygon::from_polygon(&poly).unwrap();
        assert_eq!(inline.rectangle_count(), 2);
        assert_eq!(inline.to_polygon(), poly);
        assert!(inline.contains_point(&p(25.0, 5.0)));
        assert!(!inline.contains_point(&p(15.0, 5.0)));
    }

    #[test]
    fn test_inline_polygon_capacity() {
        let mut rects = Vec::new();
        for i in 0..(MAX_RECTANGLE_COUNT + 1) {
            let x = i as f64 * 10.0;
            rects.push(r(x, 0.0, x + 5.0, 5.0));
        }
        let poly = IsotheticPolygon {
            bounding_box: r(0.0, 0.0, 55.0, 5.0),
            basic_rectangles: rects,
        };
        assert!(InlinePolygon::from_polygon(&poly).is_none());
    }

    #[test]
    fn test_slot_codec_roundtrip() {
        let poly = IsotheticPolygon {
            bounding_box: r(0.0, 0.0, 30.0, 10.0),
            basic_rectangles: vec![r(0.0, 0.0, 10.0, 10.0), r(20.0, 0.0, 30.0, 10.0)],
        };
        let capacity = 4;
        let mut bytes = vec![0u8; polygon_slot_size(capacity)];
        let header = PolygonSlotHeader {
            rect_count: 0,
            max_rect_count: capacity as u32,
            bounding_box: Rectangle::INVERTED,
        };
        bytes[..size_of::<PolygonSlotHeader>()].copy_from_slice(header.as_bytes());

        encode_polygon_slot(&mut bytes, &poly).unwrap();
        let decoded = decode_polygon_slot(&bytes).unwrap();
        assert_eq!(decoded, poly);
        assert_eq!(decoded.bounding_box, poly.bounding_box);
    }

    #[test]
    fn test_slot_codec_overflow() {
        let poly = IsotheticPolygon {
            bounding_box: r(0.0, 0.0, 30.0, 10.0),
            basic_rectangles: vec![r(0.0, 0.0, 10.0, 10.0), r(20.0, 0.0, 30.0, 10.0)],
        };
        let mut bytes = vec![0u8; polygon_slot_size(1)];
        let header = PolygonSlotHeader {
            rect_count: 0,
            max_rect_count: 1,
            bounding_box: Rectangle::INVERTED,
        };
        bytes[..size_of::<PolygonSlotHeader>()].copy_from_slice(header.as_bytes());

        match encode_polygon_slot(&mut bytes, &poly) {
            Err(IndexError::PolygonOverflow { needed, capacity }) => {
                assert_eq!(needed, 2);
                assert_eq!(capacity, 1);
            }
            other => panic!("expected overflow, got {other:?}"),
        }
    }
}
