//! In-memory R-tree over projected node boxes
//!
//! Insertion descends by least enlargement. An overflowing node is split in
//! half along the axis where its children's centers are most spread out.

use super::bbox::BoundingBox;

/// Default fan-out
pub const MAX_ENTRIES_PER_NODE: usize = 16;

/// One indexed node box
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: String,
    pub bbox: BoundingBox,
}

impl Entry {
    /// Rough heap plus inline footprint
    fn footprint(&self) -> usize {
        std::mem::size_of::<Entry>() + self.id.capacity()
    }
}

#[derive(Debug)]
struct Child {
    bbox: BoundingBox,
    node: Box<TreeNode>,
}

#[derive(Debug)]
enum TreeNode {
    Leaf(Vec<Entry>),
    Internal(Vec<Child>),
}

impl TreeNode {
    fn bbox(&self) -> Option<BoundingBox> {
        match self {
            TreeNode::Leaf(entries) => entries.iter().map(|e| e.bbox).reduce(|a, b| a.union(&b)),
            TreeNode::Internal(children) => {
                children.iter().map(|c| c.bbox).reduce(|a, b| a.union(&b))
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            TreeNode::Leaf(entries) => entries.len(),
            TreeNode::Internal(children) => children.len(),
        }
    }

    /// Insert; returns a new sibling if this node had to split
    fn insert(&mut self, entry: Entry, max: usize) -> Option<Child> {
        match self {
            TreeNode::Leaf(entries) => {
                entries.push(entry);
                if entries.len() <= max {
                    return None;
                }
                let mut all = std::mem::take(entries);
                let axis = split_axis(all.iter().map(|e| e.bbox));
                sort_on_axis(&mut all, axis, |e| e.bbox);
                let right = all.split_off(all.len() / 2);
                *entries = all;
                let node = TreeNode::Leaf(right);
                node.bbox().map(|bbox| Child { bbox, node: Box::new(node) })
            }
            TreeNode::Internal(children) => {
                let target = choose_subtree(children, &entry.bbox);
                let child = &mut children[target];
                child.bbox = child.bbox.union(&entry.bbox);
                if let Some(sibling) = child.node.insert(entry, max) {
                    if let Some(bbox) = child.node.bbox() {
                        child.bbox = bbox;
                    }
                    children.push(sibling);
                }
                if children.len() <= max {
                    return None;
                }
                let mut all = std::mem::take(children);
                let axis = split_axis(all.iter().map(|c| c.bbox));
                sort_on_axis(&mut all, axis, |c| c.bbox);
                let right = all.split_off(all.len() / 2);
                *children = all;
                let node = TreeNode::Internal(right);
                node.bbox().map(|bbox| Child { bbox, node: Box::new(node) })
            }
        }
    }

    /// Remove the entry with `id` whose box is `bbox`; true if found
    fn remove(&mut self, id: &str, bbox: &BoundingBox) -> bool {
        match self {
            TreeNode::Leaf(entries) => {
                let before = entries.len();
                entries.retain(|e| e.id != id);
                entries.len() != before
            }
            TreeNode::Internal(children) => {
                let mut removed = false;
                for child in children.iter_mut() {
                    if child.bbox.intersects(bbox) && child.node.remove(id, bbox) {
                        removed = true;
                        if let Some(b) = child.node.bbox() {
                            child.bbox = b;
                        }
                        break;
                    }
                }
                children.retain(|c| c.node.len() > 0);
                removed
            }
        }
    }

    fn search<'a>(&'a self, query: &BoundingBox, out: &mut Vec<&'a Entry>) {
        match self {
            TreeNode::Leaf(entries) => {
                out.extend(entries.iter().filter(|e| e.bbox.intersects(query)));
            }
            TreeNode::Internal(children) => {
                for child in children.iter().filter(|c| c.bbox.intersects(query)) {
                    child.node.search(query, out);
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf(_) => 1,
            TreeNode::Internal(children) => {
                1 + children.iter().map(|c| c.node.depth()).max().unwrap_or(0)
            }
        }
    }

    fn footprint(&self) -> usize {
        std::mem::size_of::<TreeNode>()
            + match self {
                TreeNode::Leaf(entries) => entries.iter().map(Entry::footprint).sum::<usize>(),
                TreeNode::Internal(children) => children
                    .iter()
                    .map(|c| std::mem::size_of::<Child>() + c.node.footprint())
                    .sum::<usize>(),
            }
    }
}

/// Child whose box grows least; ties go to the smaller box
fn choose_subtree(children: &[Child], bbox: &BoundingBox) -> usize {
    let mut best = 0;
    let mut best_cost = (f64::INFINITY, f64::INFINITY);
    for (i, child) in children.iter().enumerate() {
        let cost = (child.bbox.enlargement(bbox), child.bbox.volume());
        if cost.0 < best_cost.0 || (cost.0 == best_cost.0 && cost.1 < best_cost.1) {
            best = i;
            best_cost = cost;
        }
    }
    best
}

/// Axis with the largest spread of box centers
fn split_axis(boxes: impl Iterator<Item = BoundingBox>) -> usize {
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for b in boxes {
        let c = b.center();
        for axis in 0..3 {
            lo[axis] = lo[axis].min(c.axis(axis));
            hi[axis] = hi[axis].max(c.axis(axis));
        }
    }
    (0..3)
        .max_by(|&a, &b| (hi[a] - lo[a]).total_cmp(&(hi[b] - lo[b])))
        .unwrap_or(0)
}

fn sort_on_axis<T>(items: &mut [T], axis: usize, bbox: impl Fn(&T) -> BoundingBox) {
    items.sort_by(|a, b| bbox(a).center().axis(axis).total_cmp(&bbox(b).center().axis(axis)));
}

// ============================================================================
// TREE
// ============================================================================

/// R-tree keyed by node id
#[derive(Debug)]
pub struct RTree {
    root: TreeNode,
    len: usize,
    max_entries: usize,
}

impl Default for RTree {
    fn default() -> Self {
        Self::new(MAX_ENTRIES_PER_NODE)
    }
}

impl RTree {
    pub fn new(max_entries: usize) -> Self {
        Self {
            root: TreeNode::Leaf(Vec::new()),
            len: 0,
            // A split needs at least two per side
            max_entries: max_entries.max(4),
        }
    }

    /// Build by repeated insertion
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>, max_entries: usize) -> Self {
        let mut tree = Self::new(max_entries);
        for entry in entries {
            tree.insert(entry);
        }
        tree
    }

    pub fn insert(&mut self, entry: Entry) {
        if let Some(sibling) = self.root.insert(entry, self.max_entries) {
            let old = std::mem::replace(&mut self.root, TreeNode::Internal(Vec::new()));
            let mut children = Vec::with_capacity(2);
            if let Some(bbox) = old.bbox() {
                children.push(Child { bbox, node: Box::new(old) });
            }
            children.push(sibling);
            self.root = TreeNode::Internal(children);
        }
        self.len += 1;
    }

    /// Remove an entry; `bbox` must be the box it was inserted with
    pub fn remove(&mut self, id: &str, bbox: &BoundingBox) -> bool {
        let removed = self.root.remove(id, bbox);
        if removed {
            self.len -= 1;
            // Collapse a root left with a single child
            loop {
                match &mut self.root {
                    TreeNode::Internal(children) if children.len() == 1 => {
                        if let Some(only) = children.pop() {
                            self.root = *only.node;
                        }
                    }
                    TreeNode::Internal(children) if children.is_empty() => {
                        self.root = TreeNode::Leaf(Vec::new());
                    }
                    _ => break,
                }
            }
        }
        removed
    }

    /// Entries whose boxes intersect `query`
    pub fn search(&self, query: &BoundingBox) -> Vec<&Entry> {
        let mut out = Vec::new();
        self.root.search(query, &mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Estimated memory held by the tree
    pub fn memory_bytes(&self) -> usize {
        std::mem::size_of::<RTree>() + self.root.footprint()
    }

    /// Footprint one more entry would add, ignoring node overhead
    pub fn entry_cost(id: &str) -> usize {
        std::mem::size_of::<Entry>() + std::mem::size_of::<Child>() / 4 + id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Point3;

    fn unit_box(x: f64, y: f64, z: f64) -> BoundingBox {
        BoundingBox::new(Point3::new(x, y, z), Point3::new(x + 1.0, y + 1.0, z + 1.0))
    }

    fn grid(n: usize) -> RTree {
        let mut tree = RTree::default();
        for i in 0..n {
            let (x, y) = ((i % 20) as f64 * 2.0, (i / 20) as f64 * 2.0);
            tree.insert(Entry { id: format!("n{}", i), bbox: unit_box(x, y, 0.0) });
        }
        tree
    }

    #[test]
    fn test_search_matches_brute_force() {
        let tree = grid(400);
        assert_eq!(tree.len(), 400);
        assert!(tree.depth() > 1);

        let query = BoundingBox::from_ranges((3.0, 9.5), (3.0, 7.0), (-1.0, 1.0));
        let mut found: Vec<String> = tree.search(&query).iter().map(|e| e.id.clone()).collect();
        found.sort();

        let mut expected: Vec<String> = (0..400)
            .filter(|i| {
                let (x, y) = ((i % 20) as f64 * 2.0, (i / 20) as f64 * 2.0);
                unit_box(x, y, 0.0).intersects(&query)
            })
            .map(|i| format!("n{}", i))
            .collect();
        expected.sort();
        assert_eq!(found, expected);
        assert!(!found.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut tree = grid(100);
        let bbox = unit_box(0.0, 0.0, 0.0);
        assert!(tree.remove("n0", &bbox));
        assert!(!tree.remove("n0", &bbox));
        assert_eq!(tree.len(), 99);
        assert!(tree.search(&bbox).iter().all(|e| e.id != "n0"));

        for i in 1..100 {
            let (x, y) = ((i % 20) as f64 * 2.0, (i / 20) as f64 * 2.0);
            assert!(tree.remove(&format!("n{}", i), &unit_box(x, y, 0.0)));
        }
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_memory_grows_with_entries() {
        let small = grid(10).memory_bytes();
        let large = grid(500).memory_bytes();
        assert!(large > small);
    }
}
