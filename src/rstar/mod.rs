//! Disk-resident R*-tree over points.
//!
//! Nodes are allocated from the shared slot allocator and addressed by
//! handles; every node access happens under a pinned handle for the
//! duration of the access. Splits use the R* axis and distribution
//! selection from [`node::rstar_split`]. Forced reinsertion is not
//! implemented; underfull nodes are only collapsed when they empty out.

pub mod node;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{IndexError, IndexResult};
use crate::geometry::{Point, Rectangle};
use crate::index::{checksum_point, SpatialIndex, TreeStats};
use crate::storage::alloc::NodeAllocator;
use crate::storage::buffer_pool::BufferPool;
use crate::storage::handle::{NodeHandle, NodeType};
use crate::storage::meta;

use node::{rstar_split, RStarBranch, RStarBranchNode, RStarLeafNode};

pub struct RStarTree {
    allocator: NodeAllocator,
    root: NodeHandle,
    backing_path: PathBuf,
    entry_count: usize,
    height: u32,
}

impl RStarTree {
    /// Open a tree over `path` with the given in-memory budget in bytes.
    ///
    /// A fresh backing file gets a new empty root; a file with pages
    /// recovers its root from the metadata sidecar.
    pub fn open(path: impl AsRef<Path>, memory_budget: usize) -> IndexResult<RStarTree> {
        let path = path.as_ref();
        let pool = Rc::new(BufferPool::new(path, memory_budget)?);
        let preexisting = pool.get_preexisting_page_count();
        let mut allocator = NodeAllocator::new(pool);

        if preexisting == 0 {
            let (pin, root) = allocator.create_node::<RStarLeafNode>(NodeType::RStarLeaf)?;
            *pin.borrow_mut() = RStarLeafNode::new(NodeHandle::NULL);
            drop(pin);
            return Ok(RStarTree {
                allocator,
                root,
                backing_path: path.to_path_buf(),
                entry_count: 0,
                height: 1,
            });
        }

        let root = meta::read_root(path)?;
        let mut tree = RStarTree {
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
        handle.node_type == NodeType::RStarLeaf.tag()
    }

    /// Tight bounding box of a node's live entries.
    fn node_box(&self, handle: NodeHandle) -> IndexResult<Rectangle> {
        if Self::is_leaf(handle) {
            Ok(self.allocator.read_node::<RStarLeafNode>(handle)?.bounding_box())
        } else {
            Ok(self
                .allocator
                .read_node::<RStarBranchNode>(handle)?
                .bounding_box())
        }
    }

    fn parent_of(&self, handle: NodeHandle) -> IndexResult<NodeHandle> {
        if Self::is_leaf(handle) {
            Ok(self.allocator.read_node::<RStarLeafNode>(handle)?.parent)
        } else {
            Ok(self.allocator.read_node::<RStarBranchNode>(handle)?.parent)
        }
    }

    fn set_parent(&self, child: NodeHandle, parent: NodeHandle) -> IndexResult<()> {
        if Self::is_leaf(child) {
            let mut node = self.allocator.read_node::<RStarLeafNode>(child)?;
            node.parent = parent;
            self.allocator.write_node(child, &node)
        } else {
            let mut node = self.allocator.read_node::<RStarBranchNode>(child)?;
            node.parent = parent;
            self.allocator.write_node(child, &node)
        }
    }

    /// Refresh the bounding boxes stored for `handle` in each ancestor.
    fn adjust_upward(&self, handle: NodeHandle) -> IndexResult<()> {
        let mut child = handle;
        let mut parent = self.parent_of(child)?;
        while !parent.is_null() {
            let child_box = self.node_box(child)?;
            let mut parent_node = self.allocator.read_node::<RStarBranchNode>(parent)?;
            let index = parent_node.position_of_child(child).ok_or_else(|| {
                IndexError::Corrupt(format!("node {child} missing from parent {parent}"))
            })?;
            parent_node.set_branch_box(index, child_box);
            self.allocator.write_node(parent, &parent_node)?;
            child = parent;
            parent = parent_node.parent;
        }
        Ok(())
    }

    /// Descend to the leaf whose bounding box grows least for `point`.
    fn choose_leaf(&self, point: &Point) -> IndexResult<NodeHandle> {
        let mut current = self.root;
        while !Self::is_leaf(current) {
            let branch_node = self.allocator.read_node::<RStarBranchNode>(current)?;
            let mut best = 0;
            let mut best_expansion = f64::INFINITY;
            let mut best_area = f64::INFINITY;
            for (index, branch) in branch_node.branches().iter().enumerate() {
                let expansion = branch.bounding_box.expansion_area(point);
                let area = branch.bounding_box.area();
                if expansion < best_expansion
                    || (expansion == best_expansion && area < best_area)
                {
                    best_expansion = expansion;
                    best_area = area;
                    best = index;
                }
            }
            current = branch_node.branches()[best].child;
        }
        Ok(current)
    }

    fn split_leaf(
        &mut self,
        handle: NodeHandle,
        node: RStarLeafNode,
        point: Point,
    ) -> IndexResult<()> {
        let mut entries: Vec<Point> = node.points().to_vec();
        entries.push(point);
        let (left, right) = rstar_split(&entries, |p| Rectangle::at_point(*p));

        let mut left_node = RStarLeafNode::new(node.parent);
        for p in &left {
            left_node.push(*p);
        }
        self.allocator.write_node(handle, &left_node)?;

        let (pin, sibling) = self
            .allocator
            .create_node::<RStarLeafNode>(NodeType::RStarLeaf)?;
        let mut right_node = RStarLeafNode::new(node.parent);
        for p in &right {
            right_node.push(*p);
        }
        *pin.borrow_mut() = right_node;
        drop(pin);

        self.insert_into_parent(
            handle,
            left_node.bounding_box(),
            sibling,
            right_node.bounding_box(),
            node.parent,
        )
    }

    fn split_branch(
        &mut self,
        handle: NodeHandle,
        node: RStarBranchNode,
        extra: RStarBranch,
    ) -> IndexResult<()> {
        let mut entries: Vec<RStarBranch> = node.branches().to_vec();
        entries.push(extra);
        let (left, right) = rstar_split(&entries, |b| b.bounding_box);

        let mut left_node = RStarBranchNode::new(node.parent);
        for branch in &left {
            left_node.push(*branch);
        }
        self.allocator.write_node(handle, &left_node)?;

        let (pin, sibling) = self
            .allocator
            .create_node::<RStarBranchNode>(NodeType::RStarBranch)?;
        let mut right_node = RStarBranchNode::new(node.parent);
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

        self.insert_into_parent(
            handle,
            left_node.bounding_box(),
            sibling,
            right_node.bounding_box(),
            node.parent,
        )
    }

    /// Register a freshly split pair with their parent, growing the root
    /// when the split reached it.
    fn insert_into_parent(
        &mut self,
        old_child: NodeHandle,
        old_box: Rectangle,
        new_child: NodeHandle,
        new_box: Rectangle,
        parent: NodeHandle,
    ) -> IndexResult<()> {
        if parent.is_null() {
            let (pin, new_root) = self
                .allocator
                .create_node::<RStarBranchNode>(NodeType::RStarBranch)?;
            let mut root_node = RStarBranchNode::new(NodeHandle::NULL);
            root_node.push(RStarBranch {
                bounding_box: old_box,
                child: old_child,
            });
            root_node.push(RStarBranch {
                bounding_box: new_box,
                child: new_child,
            });
            *pin.borrow_mut() = root_node;
            drop(pin);
            self.set_parent(old_child, new_root)?;
            self.set_parent(new_child, new_root)?;
            self.root = new_root;
            self.height += 1;
            return Ok(());
        }

        let mut parent_node = self.allocator.read_node::<RStarBranchNode>(parent)?;
        let index = parent_node.position_of_child(old_child).ok_or_else(|| {
            IndexError::Corrupt(format!("node {old_child} missing from parent {parent}"))
        })?;
        parent_node.set_branch_box(index, old_box);

        let new_branch = RStarBranch {
            bounding_box: new_box,
            child: new_child,
        };
        if parent_node.is_full() {
            self.split_branch(parent, parent_node, new_branch)
        } else {
            parent_node.push(new_branch);
            self.allocator.write_node(parent, &parent_node)?;
            self.set_parent(new_child, parent)?;
            self.adjust_upward(parent)
        }
    }

    /// Leaf that actually stores `point`, if any. Multiple branches may
    /// cover the point, so every covering subtree is probed.
    fn find_leaf(&self, handle: NodeHandle, point: &Point) -> IndexResult<Option<NodeHandle>> {
        if Self::is_leaf(handle) {
            let node = self.allocator.read_node::<RStarLeafNode>(handle)?;
            return Ok(node.position_of(point).map(|_| handle));
        }
        let node = self.allocator.read_node::<RStarBranchNode>(handle)?;
        for branch in node.branches() {
            if branch.bounding_box.contains_point(point) {
                if let Some(leaf) = self.find_leaf(branch.child, point)? {
                    return Ok(Some(leaf));
                }
            }
        }
        Ok(None)
    }

    /// Drop empty nodes along the path from `handle` to the root, then
    /// refresh ancestor boxes and collapse a single-child root.
    fn condense(&mut self, handle: NodeHandle) -> IndexResult<()> {
        let mut current = handle;
        loop {
            let (is_empty, parent) = if Self::is_leaf(current) {
                let node = self.allocator.read_node::<RStarLeafNode>(current)?;
                (node.is_empty(), node.parent)
            } else {
                let node = self.allocator.read_node::<RStarBranchNode>(current)?;
                (node.is_empty(), node.parent)
            };

            if !is_empty {
                self.adjust_upward(current)?;
                break;
            }
            if parent.is_null() {
                // An empty root leaf is the empty tree; an empty root
                // branch degenerates back to a fresh leaf root.
                if !Self::is_leaf(current) {
                    self.allocator
                        .free(current, std::mem::size_of::<RStarBranchNode>());
                    let (pin, root) = self
                        .allocator
                        .create_node::<RStarLeafNode>(NodeType::RStarLeaf)?;
                    *pin.borrow_mut() = RStarLeafNode::new(NodeHandle::NULL);
                    drop(pin);
                    self.root = root;
                    self.height = 1;
                }
                return Ok(());
            }

            let mut parent_node = self.allocator.read_node::<RStarBranchNode>(parent)?;
            let index = parent_node.position_of_child(current).ok_or_else(|| {
                IndexError::Corrupt(format!("node {current} missing from parent {parent}"))
            })?;
            parent_node.remove_at(index);
            self.allocator.write_node(parent, &parent_node)?;

            let size = if Self::is_leaf(current) {
                std::mem::size_of::<RStarLeafNode>()
            } else {
                std::mem::size_of::<RStarBranchNode>()
            };
            self.allocator.free(current, size);
            current = parent;
        }

        // Collapse chains of single-child roots left behind by removals.
        while !Self::is_leaf(self.root) {
            let root_node = self.allocator.read_node::<RStarBranchNode>(self.root)?;
            if root_node.len() != 1 {
                break;
            }
            let child = root_node.branches()[0].child;
            self.allocator
                .free(self.root, std::mem::size_of::<RStarBranchNode>());
            self.set_parent(child, NodeHandle::NULL)?;
            self.root = child;
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
            let node = self.allocator.read_node::<RStarLeafNode>(handle)?;
            out.extend(node.points().iter().filter(|p| *p == point));
            return Ok(());
        }
        let node = self.allocator.read_node::<RStarBranchNode>(handle)?;
        for branch in node.branches() {
            if branch.bounding_box.contains_point(point) {
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
            let node = self.allocator.read_node::<RStarLeafNode>(handle)?;
            out.extend(node.points().iter().filter(|p| rect.contains_point(p)));
            return Ok(());
        }
        let node = self.allocator.read_node::<RStarBranchNode>(handle)?;
        for branch in node.branches() {
            if branch.bounding_box.intersects_rectangle(rect) {
                self.collect_rectangle(branch.child, rect, out)?;
            }
        }
        Ok(())
    }

    /// Visit every leaf point with no pruning at all.
    fn for_each_point(
        &self,
        handle: NodeHandle,
        f: &mut impl FnMut(&Point),
    ) -> IndexResult<()> {
        if Self::is_leaf(handle) {
            let node = self.allocator.read_node::<RStarLeafNode>(handle)?;
            for point in node.points() {
                f(point);
            }
            return Ok(());
        }
        let node = self.allocator.read_node::<RStarBranchNode>(handle)?;
        for branch in node.branches() {
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
            let node = self.allocator.read_node::<RStarBranchNode>(current)?;
            if node.is_empty() {
                break;
            }
            current = node.branches()[0].child;
            height += 1;
        }
        Ok(height)
    }

    fn validate_node(
        &self,
        handle: NodeHandle,
        expected_parent: NodeHandle,
        clip: Option<&Rectangle>,
        depth: u32,
        leaf_depth: &mut Option<u32>,
    ) -> IndexResult<bool> {
        if Self::is_leaf(handle) {
            let node = self.allocator.read_node::<RStarLeafNode>(handle)?;
            if node.parent != expected_parent {
                return Ok(false);
            }
            if let Some(bounds) = clip {
                if !node.points().iter().all(|p| bounds.contains_point(p)) {
                    return Ok(false);
                }
            }
            match leaf_depth {
                Some(expected) => return Ok(*expected == depth),
                None => *leaf_depth = Some(depth),
            }
            return Ok(true);
        }

        let node = self.allocator.read_node::<RStarBranchNode>(handle)?;
        if node.parent != expected_parent {
            return Ok(false);
        }
        if node.is_empty() {
            return Ok(false);
        }
        for branch in node.branches() {
            let child_box = self.node_box(branch.child)?;
            if !branch.bounding_box.contains_rectangle(&child_box) {
                return Ok(false);
            }
            if !self.validate_node(
                branch.child,
                handle,
                Some(&branch.bounding_box),
                depth + 1,
                leaf_depth,
            )? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl SpatialIndex for RStarTree {
    fn insert(&mut self, point: Point) -> IndexResult<()> {
        let leaf = self.choose_leaf(&point)?;
        let mut node = self.allocator.read_node::<RStarLeafNode>(leaf)?;
        if node.is_full() {
            self.split_leaf(leaf, node, point)?;
        } else {
            node.push(point);
            self.allocator.write_node(leaf, &node)?;
            self.adjust_upward(leaf)?;
        }
        self.entry_count += 1;
        Ok(())
    }

    fn remove(&mut self, point: Point) -> IndexResult<bool> {
        let Some(leaf) = self.find_leaf(self.root, &point)? else {
            return Ok(false);
        };
        let mut node = self.allocator.read_node::<RStarLeafNode>(leaf)?;
        let index = node.position_of(&point).ok_or_else(|| {
            IndexError::Corrupt(format!("point vanished from leaf {leaf}"))
        })?;
        node.remove_at(index);
        self.allocator.write_node(leaf, &node)?;
        self.entry_count -= 1;
        self.condense(leaf)?;
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
