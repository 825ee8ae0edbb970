//! Disk-resident NIR-tree over points.
//!
//! Branches own isothetic polygons instead of plain bounding rectangles.
//! Descent prefers a branch whose polygon already contains the point;
//! otherwise the cheapest polygon is expanded and then carved back out of
//! its siblings' regions so coverage stays disjoint. Leaf splits cut the
//! parent polygon with half-space limits and shrink each side to its
//! points; branch splits hand each half the union of its children's
//! polygons.

pub mod node;

use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::constants::{DIMENSIONS, MAX_RECTANGLE_COUNT};
use crate::error::{IndexError, IndexResult};
use crate::geometry::{Point, Rectangle};
use crate::index::{checksum_point, SpatialIndex, TreeStats};
use crate::polygon::{
    polygon_slot_size, InlinePolygon, IsotheticPolygon, PolygonSlotHeader, MAX_SLOT_RECTANGLES,
};
use crate::storage::alloc::NodeAllocator;
use crate::storage::buffer_pool::BufferPool;
use crate::storage::handle::{NodeHandle, NodeType};
use crate::storage::meta;

use node::{NirBranch, NirBranchNode, NirLeafNode};

pub struct NirTree {
    allocator: NodeAllocator,
    root: NodeHandle,
    backing_path: PathBuf,
    entry_count: usize,
    height: u32,
}

impl NirTree {
    /// Open a tree over `path` with the given in-memory budget in bytes.
    pub fn open(path: impl AsRef<Path>, memory_budget: usize) -> IndexResult<NirTree> {
        let path = path.as_ref();
        let pool = Rc::new(BufferPool::new(path, memory_budget)?);
        let preexisting = pool.get_preexisting_page_count();
        let mut allocator = NodeAllocator::new(pool);

        if preexisting == 0 {
            let (pin, root) = allocator.create_node::<NirLeafNode>(NodeType::NirLeaf)?;
            *pin.borrow_mut() = NirLeafNode::new(NodeHandle::NULL);
            drop(pin);
            return Ok(NirTree {
                allocator,
                root,
                backing_path: path.to_path_buf(),
                entry_count: 0,
                height: 1,
            });
        }

        let root = meta::read_root(path)?;
        let mut tree = NirTree {
            allocator,
            root,
            backing_path: path.to_path_buf(),
            entry_count: 0,
            height: 0,
        };
        tree.entry_count = tree.count_entries(tree.root)?;
        tree.height = tree.measure_height()?;
        Ok(tree)
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            entries: self.entry_count,
            height: self.height,
            resident_pages: self.allocator.pool().resident_page_count(),
            pool: self.allocator.pool().stats(),
        }
    }

    fn is_leaf(handle: NodeHandle) -> bool {
        handle.node_type == NodeType::NirLeaf.tag()
    }

    /// Load a branch's full polygon, faulting its slot page when it lives
    /// out of line.
    fn branch_polygon(&self, branch: &NirBranch) -> IndexResult<IsotheticPolygon> {
        if branch.poly_handle.is_null() {
            Ok(branch.polygon.to_polygon())
        } else {
            self.allocator
                .get_node::<PolygonSlotHeader>(branch.poly_handle)?
                .read_polygon()
        }
    }

    /// Build a branch entry for `polygon`, spilling to an unbounded slot
    /// when it exceeds the inline capacity. Past the single-page slot
    /// ceiling the polygon degrades to its bounding box: coverage is kept,
    /// precision is given up.
    fn make_branch(&mut self, child: NodeHandle, polygon: &IsotheticPolygon) -> IndexResult<NirBranch> {
        if let Some(inline) = InlinePolygon::from_polygon(polygon) {
            return Ok(NirBranch {
                child,
                poly_handle: NodeHandle::NULL,
                polygon: inline,
            });
        }
        if polygon.rectangle_count() > MAX_SLOT_RECTANGLES {
            return Ok(NirBranch {
                child,
                poly_handle: NodeHandle::NULL,
                polygon: InlinePolygon::from_rectangle(polygon.bounding_box),
            });
        }

        let capacity = (polygon.rectangle_count() + MAX_RECTANGLE_COUNT).min(MAX_SLOT_RECTANGLES);
        let (pin, handle) = self
            .allocator
            .create_slot::<PolygonSlotHeader>(polygon_slot_size(capacity), NodeType::Polygon)?;
        pin.init_polygon(capacity);
        pin.write_polygon(polygon)?;
        drop(pin);
        Ok(NirBranch {
            child,
            poly_handle: handle,
            polygon: InlinePolygon::from_rectangle(polygon.bounding_box),
        })
    }

    fn free_branch_polygon(&mut self, branch: &NirBranch) -> IndexResult<()> {
        if !branch.poly_handle.is_null() {
            let capacity = self
                .allocator
                .get_node::<PolygonSlotHeader>(branch.poly_handle)?
                .polygon_capacity();
            self.allocator
                .free(branch.poly_handle, polygon_slot_size(capacity));
        }
        Ok(())
    }

    /// Replace the polygon of one branch entry, reusing its slot when the
    /// new polygon still fits there.
    fn update_branch_polygon(
        &mut self,
        node_handle: NodeHandle,
        index: usize,
        polygon: &IsotheticPolygon,
    ) -> IndexResult<()> {
        let mut branch_node = self.allocator.read_node::<NirBranchNode>(node_handle)?;
        let branch = branch_node.branches()[index];

        if !branch.poly_handle.is_null() && polygon.rectangle_count() > MAX_RECTANGLE_COUNT {
            let pin = self
                .allocator
                .get_node::<PolygonSlotHeader>(branch.poly_handle)?;
            if pin.polygon_capacity() >= polygon.rectangle_count() {
                pin.write_polygon(polygon)?;
                drop(pin);
                let mut updated = branch;
                updated.polygon = InlinePolygon::from_rectangle(polygon.bounding_box);
                branch_node.set_branch(index, updated);
                return self.allocator.write_node(node_handle, &branch_node);
            }
        }

        self.free_branch_polygon(&branch)?;
        let rebuilt = self.make_branch(branch.child, polygon)?;
        branch_node.set_branch(index, rebuilt);
        self.allocator.write_node(node_handle, &branch_node)
    }

    fn set_parent(&self, child: NodeHandle, parent: NodeHandle) -> IndexResult<()> {
        if Self::is_leaf(child) {
            let mut child_node = self.allocator.read_node::<NirLeafNode>(child)?;
            child_node.parent = parent;
            self.allocator.write_node(child, &child_node)
        } else {
            let mut child_node = self.allocator.read_node::<NirBranchNode>(child)?;
            child_node.parent = parent;
            self.allocator.write_node(child, &child_node)
        }
    }

    /// Descend to the leaf that will take `point`, growing and carving
    /// branch polygons along the way.
    fn choose_leaf(&mut self, point: &Point) -> IndexResult<NodeHandle> {
        let mut current = self.root;
        while !Self::is_leaf(current) {
            let branch_node = self.allocator.read_node::<NirBranchNode>(current)?;

            let mut chosen = None;
            for (index, branch) in branch_node.branches().iter().enumerate() {
                if branch.bounding_box().contains_point(point)
                    && self.branch_polygon(branch)?.contains_point(point)
                {
                    chosen = Some(index);
                    break;
                }
            }

            let index = match chosen {
                Some(index) => index,
                None => {
                    let mut polygons = Vec::with_capacity(branch_node.len());
                    for branch in branch_node.branches() {
                        polygons.push(self.branch_polygon(branch)?);
                    }
                    let mut best = 0;
                    let mut best_area = f64::INFINITY;
                    for (index, polygon) in polygons.iter().enumerate() {
                        let expansion = polygon.optimal_expansion(point);
                        if expansion.area < best_area {
                            best_area = expansion.area;
                            best = index;
                        }
                    }

                    let mut grown = polygons[best].clone();
                    let expansion = grown.optimal_expansion(point);
                    grown.expand_with(point, &expansion);
                    // The point lies outside every sibling polygon, so the
                    // carve keeps it covered while restoring disjointness.
                    // A sibling that already shared interior with the old
                    // region is left alone: carving it would uncover points
                    // this subtree owns.
                    for (sibling_index, sibling) in polygons.iter().enumerate() {
                        if sibling_index == best || !grown.intersects_polygon(sibling) {
                            continue;
                        }
                        if polygons[best].strictly_intersects_polygon(sibling) {
                            continue;
                        }
                        grown.increase_resolution_polygon(point, sibling);
                    }
                    grown.refine();
                    debug_assert!(grown.contains_point(point));
                    self.update_branch_polygon(current, best, &grown)?;
                    best
                }
            };

            current = branch_node.branches()[index].child;
        }
        Ok(current)
    }

    fn split_leaf(
        &mut self,
        handle: NodeHandle,
        leaf: NirLeafNode,
        point: Point,
    ) -> IndexResult<()> {
        let mut entries: Vec<Point> = leaf.points().to_vec();
        entries.push(point);

        // Cut along the axis with the widest spread, at the median.
        let mut best_dim = 0;
        let mut best_spread = f64::NEG_INFINITY;
        for dim in 0..DIMENSIONS {
            let lo = entries.iter().map(|p| p[dim]).fold(f64::INFINITY, f64::min);
            let hi = entries
                .iter()
                .map(|p| p[dim])
                .fold(f64::NEG_INFINITY, f64::max);
            if hi - lo > best_spread {
                best_spread = hi - lo;
                best_dim = dim;
            }
        }
        entries.sort_by(|a, b| a[best_dim].total_cmp(&b[best_dim]));
        let mid = entries.len() / 2;
        let left_points = entries[..mid].to_vec();
        let right_points = entries[mid..].to_vec();

        let (left_poly, right_poly) = if leaf.parent.is_null() {
            (
                Self::tight_polygon(&left_points),
                Self::tight_polygon(&right_points),
            )
        } else {
            let parent_node = self.allocator.read_node::<NirBranchNode>(leaf.parent)?;
            let index = parent_node.position_of_child(handle).ok_or_else(|| {
                IndexError::Corrupt(format!("leaf {handle} missing from parent"))
            })?;
            let old_poly = self.branch_polygon(&parent_node.branches()[index])?;

            let left_max = left_points
                .iter()
                .map(|p| p[best_dim])
                .fold(f64::NEG_INFINITY, f64::max);
            let right_min = right_points
                .iter()
                .map(|p| p[best_dim])
                .fold(f64::INFINITY, f64::min);

            let mut left_poly = old_poly.clone();
            left_poly.max_limit(left_max, best_dim);
            left_poly.shrink(&left_points);
            left_poly.refine();

            let mut right_poly = old_poly;
            right_poly.min_limit(right_min, best_dim);
            right_poly.shrink(&right_points);
            right_poly.refine();
            (left_poly, right_poly)
        };

        let mut left_node = NirLeafNode::new(leaf.parent);
        for p in &left_points {
            left_node.push(*p);
        }
        self.allocator.write_node(handle, &left_node)?;

        let (pin, sibling) = self.allocator.create_node::<NirLeafNode>(NodeType::NirLeaf)?;
        let mut right_node = NirLeafNode::new(leaf.parent);
        for p in &right_points {
            right_node.push(*p);
        }
        *pin.borrow_mut() = right_node;
        drop(pin);

        self.insert_into_parent(handle, left_poly, sibling, right_poly, leaf.parent)
    }

    fn tight_polygon(points: &[Point]) -> IsotheticPolygon {
        let mut bounding_box = Rectangle::INVERTED;
        for point in points {
            bounding_box.expand(point);
        }
        IsotheticPolygon::from_rectangle(bounding_box)
    }

    fn split_branch(
        &mut self,
        handle: NodeHandle,
        branch_node: NirBranchNode,
        extra: NirBranch,
    ) -> IndexResult<()> {
        let mut entries: Vec<NirBranch> = branch_node.branches().to_vec();
        entries.push(extra);

        // Partition on the axis where the region centres spread widest.
        let mut best_dim = 0;
        let mut best_spread = f64::NEG_INFINITY;
        for dim in 0..DIMENSIONS {
            let lo = entries
                .iter()
                .map(|b| b.bounding_box().centre_point()[dim])
                .fold(f64::INFINITY, f64::min);
            let hi = entries
                .iter()
                .map(|b| b.bounding_box().centre_point()[dim])
                .fold(f64::NEG_INFINITY, f64::max);
            if hi - lo > best_spread {
                best_spread = hi - lo;
                best_dim = dim;
            }
        }
        entries.sort_by(|a, b| {
            a.bounding_box().centre_point()[best_dim]
                .total_cmp(&b.bounding_box().centre_point()[best_dim])
        });
        let mid = entries.len() / 2;
        let left: Vec<NirBranch> = entries[..mid].to_vec();
        let right: Vec<NirBranch> = entries[mid..].to_vec();

        let mut left_node = NirBranchNode::new(branch_node.parent);
        for branch in &left {
            left_node.push(*branch);
        }
        self.allocator.write_node(handle, &left_node)?;

        let (pin, sibling) = self
            .allocator
            .create_node::<NirBranchNode>(NodeType::NirBranch)?;
        let mut right_node = NirBranchNode::new(branch_node.parent);
        for branch in &right {
            right_node.push(*branch);
        }
        *pin.borrow_mut() = right_node;
        drop(pin);

        for branch in &left {
            self.set_parent(branch.child, handle)?;
        }
        for branch in &right {
            self.set_parent(branch.child, sibling)?;
        }

        let left_poly = self.merged_polygon(&left)?;
        let right_poly = self.merged_polygon(&right)?;
        self.insert_into_parent(handle, left_poly, sibling, right_poly, branch_node.parent)
    }

    /// Union of the polygons of a group of branches.
    fn merged_polygon(&self, branches: &[NirBranch]) -> IndexResult<IsotheticPolygon> {
        let mut merged = IsotheticPolygon::new();
        for branch in branches {
            let polygon = self.branch_polygon(branch)?;
            merged.merge(&polygon);
        }
        merged.deduplicate();
        merged.refine();
        Ok(merged)
    }

    fn insert_into_parent(
        &mut self,
        old_child: NodeHandle,
        old_poly: IsotheticPolygon,
        new_child: NodeHandle,
        new_poly: IsotheticPolygon,
        parent: NodeHandle,
    ) -> IndexResult<()> {
        if parent.is_null() {
            let old_branch = self.make_branch(old_child, &old_poly)?;
            let new_branch = self.make_branch(new_child, &new_poly)?;
            let (pin, new_root) = self
                .allocator
                .create_node::<NirBranchNode>(NodeType::NirBranch)?;
            let mut root_node = NirBranchNode::new(NodeHandle::NULL);
            root_node.push(old_branch);
            root_node.push(new_branch);
            *pin.borrow_mut() = root_node;
            drop(pin);
            self.set_parent(old_child, new_root)?;
            self.set_parent(new_child, new_root)?;
            self.root = new_root;
            self.height += 1;
            return Ok(());
        }

        let mut parent_node = self.allocator.read_node::<NirBranchNode>(parent)?;
        let index = parent_node.position_of_child(old_child).ok_or_else(|| {
            IndexError::Corrupt(format!("node {old_child} missing from parent {parent}"))
        })?;
        self.free_branch_polygon(&parent_node.branches()[index])?;
        let old_branch = self.make_branch(old_child, &old_poly)?;
        parent_node.set_branch(index, old_branch);

        let new_branch = self.make_branch(new_child, &new_poly)?;
        if parent_node.is_full() {
            self.split_branch(parent, parent_node, new_branch)
        } else {
            parent_node.push(new_branch);
            self.allocator.write_node(parent, &parent_node)?;
            self.set_parent(new_child, parent)
        }
    }

    fn find_leaf(&self, handle: NodeHandle, point: &Point) -> IndexResult<Option<NodeHandle>> {
        if Self::is_leaf(handle) {
            let leaf = self.allocator.read_node::<NirLeafNode>(handle)?;
            return Ok(leaf.position_of(point).map(|_| handle));
        }
        let branch_node = self.allocator.read_node::<NirBranchNode>(handle)?;
        for branch in branch_node.branches() {
            if branch.bounding_box().contains_point(point)
                && self.branch_polygon(branch)?.contains_point(point)
            {
                if let Some(leaf) = self.find_leaf(branch.child, point)? {
                    return Ok(Some(leaf));
                }
            }
        }
        Ok(None)
    }

    /// Tighten the polygon of the leaf's parent branch after a removal.
    fn tighten_leaf_region(&mut self, leaf: NodeHandle, points: &[Point]) -> IndexResult<()> {
        let parent = self.allocator.read_node::<NirLeafNode>(leaf)?.parent;
        if parent.is_null() || points.is_empty() {
            return Ok(());
        }
        let parent_node = self.allocator.read_node::<NirBranchNode>(parent)?;
        let index = parent_node
            .position_of_child(leaf)
            .ok_or_else(|| IndexError::Corrupt(format!("leaf {leaf} missing from parent")))?;
        let mut polygon = self.branch_polygon(&parent_node.branches()[index])?;
        polygon.shrink(points);
        polygon.refine();
        self.update_branch_polygon(parent, index, &polygon)
    }

    /// Drop empty nodes along the path to the root, freeing their slots
    /// and polygon slots, then collapse single-child roots.
    fn condense(&mut self, handle: NodeHandle) -> IndexResult<()> {
        let mut current = handle;
        loop {
            let (is_empty, parent) = if Self::is_leaf(current) {
                let leaf = self.allocator.read_node::<NirLeafNode>(current)?;
                (leaf.is_empty(), leaf.parent)
            } else {
                let branch_node = self.allocator.read_node::<NirBranchNode>(current)?;
                (branch_node.is_empty(), branch_node.parent)
            };

            if !is_empty {
                break;
            }
            if parent.is_null() {
                if !Self::is_leaf(current) {
                    self.allocator.free(current, size_of::<NirBranchNode>());
                    let (pin, root) = self.allocator.create_node::<NirLeafNode>(NodeType::NirLeaf)?;
                    *pin.borrow_mut() = NirLeafNode::new(NodeHandle::NULL);
                    drop(pin);
                    self.root = root;
                    self.height = 1;
                }
                return Ok(());
            }

            let mut parent_node = self.allocator.read_node::<NirBranchNode>(parent)?;
            let index = parent_node.position_of_child(current).ok_or_else(|| {
                IndexError::Corrupt(format!("node {current} missing from parent {parent}"))
            })?;
            self.free_branch_polygon(&parent_node.branches()[index])?;
            parent_node.remove_at(index);
            self.allocator.write_node(parent, &parent_node)?;

            let node_size = if Self::is_leaf(current) {
                size_of::<NirLeafNode>()
            } else {
                size_of::<NirBranchNode>()
            };
            self.allocator.free(current, node_size);
            current = parent;
        }

        while !Self::is_leaf(self.root) {
            let root_node = self.allocator.read_node::<NirBranchNode>(self.root)?;
            if root_node.len() != 1 {
                break;
            }
            let branch = root_node.branches()[0];
            self.free_branch_polygon(&branch)?;
            self.allocator.free(self.root, size_of::<NirBranchNode>());
            self.set_parent(branch.child, NodeHandle::NULL)?;
            self.root = branch.child;
            self.height -= 1;
        }
        Ok(())
    }

    fn collect_point(
        &self,
        handle: NodeHandle,
        point: &Point,
        out: &mut Vec<Point>,
    ) -> IndexResult<()> {
        if Self::is_leaf(handle) {
            let leaf = self.allocator.read_node::<NirLeafNode>(handle)?;
            out.extend(leaf.points().iter().filter(|p| *p == point));
            return Ok(());
        }
        let branch_node = self.allocator.read_node::<NirBranchNode>(handle)?;
        for branch in branch_node.branches() {
            if branch.bounding_box().contains_point(point)
                && self.branch_polygon(branch)?.contains_point(point)
            {
                self.collect_point(branch.child, point, out)?;
            }
        }
        Ok(())
    }

    fn collect_rectangle(
        &self,
        handle: NodeHandle,
        rect: &Rectangle,
        out: &mut Vec<Point>,
    ) -> IndexResult<()> {
        if Self::is_leaf(handle) {
            let leaf = self.allocator.read_node::<NirLeafNode>(handle)?;
            out.extend(leaf.points().iter().filter(|p| rect.contains_point(p)));
            return Ok(());
        }
        let branch_node = self.allocator.read_node::<NirBranchNode>(handle)?;
        for branch in branch_node.branches() {
            if branch.bounding_box().intersects_rectangle(rect)
                && self.branch_polygon(branch)?.intersects_rectangle(rect)
            {
                self.collect_rectangle(branch.child, rect, out)?;
            }
        }
        Ok(())
    }

    fn for_each_point(
        &self,
        handle: NodeHandle,
        f: &mut impl FnMut(&Point),
    ) -> IndexResult<()> {
        if Self::is_leaf(handle) {
            let leaf = self.allocator.read_node::<NirLeafNode>(handle)?;
            for point in leaf.points() {
                f(point);
            }
            return Ok(());
        }
        let branch_node = self.allocator.read_node::<NirBranchNode>(handle)?;
        for branch in branch_node.branches() {
            self.for_each_point(branch.child, f)?;
        }
        Ok(())
    }

    fn count_entries(&self, handle: NodeHandle) -> IndexResult<usize> {
        let mut count = 0;
        self.for_each_point(handle, &mut |_| count += 1)?;
        Ok(count)
    }

    fn measure_height(&self) -> IndexResult<u32> {
        let mut height = 1;
        let mut current = self.root;
        while !Self::is_leaf(current) {
            let branch_node = self.allocator.read_node::<NirBranchNode>(current)?;
            if branch_node.is_empty() {
                break;
            }
            current = branch_node.branches()[0].child;
            height += 1;
        }
        Ok(height)
    }

    fn validate_node(
        &self,
        handle: NodeHandle,
        expected_parent: NodeHandle,
        region: Option<&IsotheticPolygon>,
        depth: u32,
        leaf_depth: &mut Option<u32>,
    ) -> IndexResult<bool> {
        if Self::is_leaf(handle) {
            let leaf = self.allocator.read_node::<NirLeafNode>(handle)?;
            if leaf.parent != expected_parent {
                return Ok(false);
            }
            if let Some(region) = region {
                if !leaf.points().iter().all(|p| region.contains_point(p)) {
                    return Ok(false);
                }
            }
            match leaf_depth {
                Some(expected) => return Ok(*expected == depth),
                None => *leaf_depth = Some(depth),
            }
            return Ok(true);
        }

        let branch_node = self.allocator.read_node::<NirBranchNode>(handle)?;
        if branch_node.parent != expected_parent || branch_node.is_empty() {
            return Ok(false);
        }
        for branch in branch_node.branches() {
            let polygon = self.branch_polygon(branch)?;
            if !polygon.valid() {
                return Ok(false);
            }
            // The inline summary must agree with the stored polygon.
            if !branch.poly_handle.is_null()
                && branch.polygon.bounding_box() != polygon.bounding_box
            {
                return Ok(false);
            }
            if !self.validate_node(branch.child, handle, Some(&polygon), depth + 1, leaf_depth)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl SpatialIndex for NirTree {
    fn insert(&mut self, point: Point) -> IndexResult<()> {
        let leaf = self.choose_leaf(&point)?;
        let mut leaf_node = self.allocator.read_node::<NirLeafNode>(leaf)?;
        if leaf_node.is_full() {
            self.split_leaf(leaf, leaf_node, point)?;
        } else {
            leaf_node.push(point);
            self.allocator.write_node(leaf, &leaf_node)?;
        }
        self.entry_count += 1;
        Ok(())
    }

    fn remove(&mut self, point: Point) -> IndexResult<bool> {
        let Some(leaf) = self.find_leaf(self.root, &point)? else {
            return Ok(false);
        };
        let mut leaf_node = self.allocator.read_node::<NirLeafNode>(leaf)?;
        let index = leaf_node
            .position_of(&point)
            .ok_or_else(|| IndexError::Corrupt(format!("point vanished from leaf {leaf}")))?;
        leaf_node.remove_at(index);
        self.allocator.write_node(leaf, &leaf_node)?;
        self.entry_count -= 1;

        if leaf_node.is_empty() {
            self.condense(leaf)?;
        } else {
            self.tighten_leaf_region(leaf, leaf_node.points())?;
        }
        Ok(true)
    }

    fn search_point(&self, point: &Point) -> IndexResult<Vec<Point>> {
        let mut out = Vec::new();
        self.collect_point(self.root, point, &mut out)?;
        Ok(out)
    }

    fn search_rectangle(&self, rect: &Rectangle) -> IndexResult<Vec<Point>> {
        let mut out = Vec::new();
        self.collect_rectangle(self.root, rect, &mut out)?;
        Ok(out)
    }

    fn exhaustive_search(&self, point: &Point) -> IndexResult<Vec<Point>> {
        let mut out = Vec::new();
        self.for_each_point(self.root, &mut |p| {
            if p == point {
                out.push(*p);
            }
        })?;
        Ok(out)
    }

    fn checksum(&self) -> IndexResult<u32> {
        let mut sum = 0u32;
        self.for_each_point(self.root, &mut |p| sum = checksum_point(sum, p))?;
        Ok(sum)
    }

    fn validate(&self) -> IndexResult<bool> {
        let mut leaf_depth = None;
        self.validate_node(self.root, NodeHandle::NULL, None, 1, &mut leaf_depth)
    }

    fn len(&self) -> usize {
        self.entry_count
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn checkpoint(&self) -> IndexResult<()> {
        self.allocator.pool().writeback_all_pages()?;
        meta::write_root(&self.backing_path, self.root)
    }
}
