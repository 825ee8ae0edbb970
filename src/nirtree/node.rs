//! Raw node layouts for the NIR-tree.
//!
//! Branch entries carry the polygon describing the region their subtree
//! owns. Small polygons live inline in the entry; a polygon that outgrows
//! [`InlinePolygon`] moves to its own page slot and the entry keeps its
//! handle plus a single-rectangle bounding-box summary inline, so box-level
//! prechecks never fault the polygon's page.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constants::{MAX_BRANCH_FACTOR, MIN_BRANCH_FACTOR};
use crate::geometry::{Point, Rectangle};
use crate::polygon::InlinePolygon;
use crate::storage::handle::NodeHandle;

/// One child reference plus the polygon covering its subtree.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct NirBranch {
    pub child: NodeHandle,
    /// Slot holding the full polygon when it does not fit inline; null
    /// otherwise.
    pub poly_handle: NodeHandle,
    /// The polygon itself, or its bounding-box summary when out of line.
    pub polygon: InlinePolygon,
}

impl NirBranch {
    /// Bounding box of the subtree region, valid in both encodings.
    pub fn bounding_box(&self) -> Rectangle {
        self.polygon.bounding_box()
    }
}

/// Leaf node holding points.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct NirLeafNode {
    pub parent: NodeHandle,
    count: u32,
    _pad: u32,
    points: [Point; MAX_BRANCH_FACTOR],
}

impl NirLeafNode {
    pub fn new(parent: NodeHandle) -> NirLeafNode {
        NirLeafNode {
            parent,
            count: 0,
            _pad: 0,
            points: [Point::AT_ORIGIN; MAX_BRANCH_FACTOR],
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points[..self.count as usize]
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count as usize == MAX_BRANCH_FACTOR
    }

    pub fn push(&mut self, point: Point) {
        debug_assert!(!self.is_full());
        self.points[self.count as usize] = point;
        self.count += 1;
    }

    pub fn remove_at(&mut self, index: usize) {
        debug_assert!(index < self.count as usize);
        self.count -= 1;
        self.points[index] = self.points[self.count as usize];
    }

    pub fn position_of(&self, point: &Point) -> Option<usize> {
        self.points().iter().position(|p| p == point)
    }

    pub fn bounding_box(&self) -> Rectangle {
        let mut bounding_box = Rectangle::INVERTED;
        for point in self.points() {
            bounding_box.expand(point);
        }
        bounding_box
    }
}

/// Internal node holding polygon-decorated branches.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct NirBranchNode {
    pub parent: NodeHandle,
    count: u32,
    _pad: u32,
    branches: [NirBranch; MAX_BRANCH_FACTOR],
}

impl NirBranchNode {
    pub fn new(parent: NodeHandle) -> NirBranchNode {
        NirBranchNode {
            parent,
            count: 0,
            _pad: 0,
            branches: [NirBranch {
                child: NodeHandle::NULL,
                poly_handle: NodeHandle::NULL,
                polygon: InlinePolygon::empty(),
            }; MAX_BRANCH_FACTOR],
        }
    }

    pub fn branches(&self) -> &[NirBranch] {
        &self.branches[..self.count as usize]
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count as usize == MAX_BRANCH_FACTOR
    }

    pub fn is_underfull(&self) -> bool {
        (self.count as usize) < MIN_BRANCH_FACTOR
    }

    pub fn push(&mut self, branch: NirBranch) {
        debug_assert!(!self.is_full());
        self.branches[self.count as usize] = branch;
        self.count += 1;
    }

    pub fn remove_at(&mut self, index: usize) {
        debug_assert!(index < self.count as usize);
        self.count -= 1;
        self.branches[index] = self.branches[self.count as usize];
    }

    pub fn set_branch(&mut self, index: usize, branch: NirBranch) {
        debug_assert!(index < self.count as usize);
        self.branches[index] = branch;
    }

    pub fn position_of_child(&self, child: NodeHandle) -> Option<usize> {
        self.branches().iter().position(|b| b.child == child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new([x, y])
    }

    #[test]
    fn test_leaf_operations() {
        let mut leaf = NirLeafNode::new(NodeHandle::NULL);
        leaf.push(p(1.0, 1.0));
        leaf.push(p(4.0, 2.0));
        assert_eq!(leaf.len(), 2);
        assert_eq!(leaf.bounding_box(), Rectangle::new(p(1.0, 1.0), p(4.0, 2.0)));

        leaf.remove_at(0);
        assert_eq!(leaf.points(), &[p(4.0, 2.0)]);
    }

    #[test]
    fn test_branch_node_operations() {
        let mut node = NirBranchNode::new(NodeHandle::NULL);
        let child = NodeHandle::new(1, 0, crate::storage::handle::NodeType::NirLeaf);
        node.push(NirBranch {
            child,
            poly_handle: NodeHandle::NULL,
            polygon: InlinePolygon::from_rectangle(Rectangle::new(p(0.0, 0.0), p(5.0, 5.0))),
        });
        assert_eq!(node.len(), 1);
        assert_eq!(node.position_of_child(child), Some(0));
        assert_eq!(
            node.branches()[0].bounding_box(),
            Rectangle::new(p(0.0, 0.0), p(5.0, 5.0))
        );
    }
}
