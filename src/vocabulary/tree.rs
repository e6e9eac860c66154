//! Tree-accelerated vocabulary.
//!
//! Bags are stored flat (so ids match the naive variant) and indexed by a
//! tree whose nodes carry a center and a covering radius: every bag
//! centroid below a node lies within `cover` of its `center`. A query at
//! acceptance radius `r` skips a subtree when
//!
//! ```text
//! |f - center| - cover > sqrt(r + PRUNE_SLACK)
//! ```
//!
//! which by the triangle inequality cannot discard a true hit. Leaves that
//! grow past `max_leaf_bags` are split with a capped k-means.

use crate::config::VocabularyConfig;
use crate::features::descriptor_distance;
use crate::graph::NodeId;

use super::{Bag, BagId, Vocabulary};

/// Slack on the squared pruning bound. Descriptors are unit-norm only to
/// f32 precision, so `2 - 2·dot` and the squared distance differ slightly.
const PRUNE_SLACK: f64 = 1e-5;

#[derive(Debug, Clone)]
struct TreeNode {
    /// Empty until the first bag arrives.
    center: Vec<f64>,
    /// Max distance from `center` to any bag centroid in the subtree.
    cover: f64,
    children: Vec<usize>,
    /// Bags held by a leaf.
    bags: Vec<BagId>,
    /// Bag count that triggers a split of this leaf.
    capacity: usize,
}

impl TreeNode {
    fn leaf(center: Vec<f64>, capacity: usize) -> Self {
        Self {
            center,
            cover: 0.0,
            children: Vec::new(),
            bags: Vec::new(),
            capacity,
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Statistics about the index shape.
#[derive(Debug, Default, Clone)]
pub struct TreeStats {
    pub nodes: usize,
    pub leaves: usize,
    pub depth: usize,
    pub splits: usize,
}

/// Vocabulary indexed by a covering-radius tree.
#[derive(Debug, Clone)]
pub struct TreeVocabulary {
    bags: Vec<Bag>,
    nodes: Vec<TreeNode>,
    config: VocabularyConfig,
    dim: Option<usize>,
    splits: usize,
}

impl TreeVocabulary {
    pub fn new(config: VocabularyConfig) -> Self {
        let root = TreeNode::leaf(Vec::new(), config.max_leaf_bags.max(2));
        Self {
            bags: Vec::new(),
            nodes: vec![root],
            config,
            dim: None,
            splits: 0,
        }
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            nodes: self.nodes.len(),
            splits: self.splits,
            ..Default::default()
        };
        let mut stack = vec![(0usize, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            stats.depth = stats.depth.max(depth);
            let node = &self.nodes[idx];
            if node.is_leaf() {
                stats.leaves += 1;
            }
            stack.extend(node.children.iter().map(|&c| (c, depth + 1)));
        }
        stats
    }

    /// Route a freshly created bag to the closest leaf, widening covers on
    /// the way down, then split the leaf if it overflowed.
    fn index_bag(&mut self, bag: BagId) {
        let point: Vec<f64> = self.bags[bag.0].centroid.iter().map(|&x| x as f64).collect();

        let mut idx = 0;
        loop {
            let node = &mut self.nodes[idx];
            if node.center.is_empty() {
                node.center = point.clone();
            }
            node.cover = node.cover.max(euclidean(&node.center, &point));
            if node.is_leaf() {
                break;
            }
            let children = node.children.clone();
            idx = children
                .into_iter()
                .min_by(|&a, &b| {
                    let da = euclidean(&self.nodes[a].center, &point);
                    let db = euclidean(&self.nodes[b].center, &point);
                    da.total_cmp(&db)
                })
                .unwrap_or(idx);
        }

        let leaf = &mut self.nodes[idx];
        leaf.bags.push(bag);
        if leaf.bags.len() > leaf.capacity {
            self.split(idx);
        }
    }

    /// Split a leaf into up to `kmeans_children` children.
    fn split(&mut self, idx: usize) {
        let members = std::mem::take(&mut self.nodes[idx].bags);
        let points: Vec<Vec<f64>> = members
            .iter()
            .map(|b| self.bags[b.0].centroid.iter().map(|&x| x as f64).collect())
            .collect();

        let assignment = kmeans(
            &points,
            self.config.kmeans_children.max(2),
            self.config.kmeans_max_iterations,
        );
        let k = assignment.iter().copied().max().map_or(0, |m| m + 1);

        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); k];
        for (member, &cluster) in assignment.iter().enumerate() {
            groups[cluster].push(member);
        }
        groups.retain(|g| !g.is_empty());

        if groups.len() < 2 {
            // all members coincide; grow the leaf instead
            let node = &mut self.nodes[idx];
            node.bags = members;
            node.capacity *= 2;
            return;
        }

        let capacity = self.config.max_leaf_bags.max(2);
        let mut children = Vec::with_capacity(groups.len());
        for group in groups {
            let center = mean(group.iter().map(|&m| points[m].as_slice()));
            let mut child = TreeNode::leaf(center, capacity);
            for &m in &group {
                child.cover = child.cover.max(euclidean(&child.center, &points[m]));
                child.bags.push(members[m]);
            }
            children.push(self.nodes.len());
            self.nodes.push(child);
        }
        self.nodes[idx].children = children;
        self.splits += 1;
        tracing::debug!(
            node = idx,
            bags = members.len(),
            children = self.nodes[idx].children.len(),
            "split vocabulary leaf"
        );
    }
}

impl Vocabulary for TreeVocabulary {
    fn bags(&self) -> &[Bag] {
        &self.bags
    }

    fn radius(&self) -> f64 {
        self.config.radius
    }

    fn dim(&self) -> Option<usize> {
        self.dim
    }

    fn search(&self, descriptor: &[f32]) -> Vec<BagId> {
        if self.bags.is_empty() {
            return Vec::new();
        }
        let point: Vec<f64> = descriptor.iter().map(|&x| x as f64).collect();
        let bound = (self.config.radius.max(0.0) + PRUNE_SLACK).sqrt();

        let mut hits = Vec::new();
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.center.is_empty() {
                continue;
            }
            if euclidean(&node.center, &point) - node.cover > bound {
                continue;
            }
            if node.is_leaf() {
                hits.extend(node.bags.iter().copied().filter(|b| {
                    descriptor_distance(descriptor, &self.bags[b.0].centroid) < self.config.radius
                }));
            } else {
                // closest child popped first
                let mut children = node.children.clone();
                children.sort_by(|&a, &b| {
                    let da = euclidean(&self.nodes[a].center, &point);
                    let db = euclidean(&self.nodes[b].center, &point);
                    db.total_cmp(&da)
                });
                stack.extend(children);
            }
        }
        hits.sort();
        hits
    }

    fn bags_mut(&mut self) -> &mut [Bag] {
        &mut self.bags
    }

    fn register(&mut self, bag: BagId, place: NodeId) {
        if let Some(bag) = self.bags.get_mut(bag.0) {
            bag.register(place);
        }
    }

    fn create_bag(&mut self, descriptor: &[f32], place: NodeId) -> BagId {
        self.dim.get_or_insert(descriptor.len());
        self.bags.push(Bag::new(descriptor, place));
        let id = BagId(self.bags.len() - 1);
        self.index_bag(id);
        id
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn mean<'a>(points: impl Iterator<Item = &'a [f64]>) -> Vec<f64> {
    let mut sum: Vec<f64> = Vec::new();
    let mut n = 0usize;
    for p in points {
        if sum.is_empty() {
            sum = vec![0.0; p.len()];
        }
        for (s, x) in sum.iter_mut().zip(p) {
            *s += x;
        }
        n += 1;
    }
    if n > 0 {
        for s in &mut sum {
            *s /= n as f64;
        }
    }
    sum
}

/// Lloyd's k-means with round-robin initialization.
///
/// Returns the cluster index of every point. Stops when assignments are
/// stable or after `max_iterations`.
fn kmeans(points: &[Vec<f64>], k: usize, max_iterations: usize) -> Vec<usize> {
    let k = k.min(points.len()).max(1);
    let mut assignment: Vec<usize> = (0..points.len()).map(|i| i % k).collect();

    for _ in 0..max_iterations {
        let centers: Vec<Vec<f64>> = (0..k)
            .map(|c| {
                mean(
                    points
                        .iter()
                        .zip(&assignment)
                        .filter(|(_, a)| **a == c)
                        .map(|(p, _)| p.as_slice()),
                )
            })
            .collect();

        let mut changed = false;
        for (p, a) in points.iter().zip(assignment.iter_mut()) {
            let best = centers
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.is_empty())
                .min_by(|(_, x), (_, y)| euclidean(x, p).total_cmp(&euclidean(y, p)))
                .map(|(i, _)| i)
                .unwrap_or(*a);
            if best != *a {
                *a = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::tests::random_unit_descriptors;

    fn config(max_leaf_bags: usize) -> VocabularyConfig {
        VocabularyConfig {
            radius: 0.30,
            max_leaf_bags,
            kmeans_children: 3,
            kmeans_max_iterations: 50,
        }
    }

    #[test]
    fn test_kmeans_separates_clusters() {
        let points = vec![
            vec![0.0, 0.0],
            vec![10.0, 10.0],
            vec![0.1, 0.0],
            vec![10.1, 10.0],
        ];
        let a = kmeans(&points, 2, 100);
        assert_eq!(a[0], a[2]);
        assert_eq!(a[1], a[3]);
        assert_ne!(a[0], a[1]);
    }

    #[test]
    fn test_leaves_split() {
        let mut vocab = TreeVocabulary::new(config(8));
        for (i, d) in random_unit_descriptors(400, 4, 3).iter().enumerate() {
            vocab.insert_feature(d, NodeId::new(i as u32)).unwrap();
        }
        let stats = vocab.stats();
        assert!(stats.splits > 0);
        assert!(stats.depth > 1);
        assert!(stats.leaves >= 2);
    }

    #[test]
    fn test_covers_hold_every_bag() {
        let mut vocab = TreeVocabulary::new(config(6));
        for (i, d) in random_unit_descriptors(300, 5, 9).iter().enumerate() {
            vocab.insert_feature(d, NodeId::new(i as u32)).unwrap();
        }
        // every bag is reachable from the root through nodes covering it
        for (b, bag) in vocab.bags().iter().enumerate() {
            let point: Vec<f64> = bag.centroid.iter().map(|&x| x as f64).collect();
            let mut stack = vec![0usize];
            let mut found = false;
            while let Some(idx) = stack.pop() {
                let node = &vocab.nodes[idx];
                if node.bags.contains(&BagId(b)) {
                    found = true;
                }
                stack.extend(node.children.iter().copied());
            }
            assert!(found, "bag {} not indexed", b);
            assert!(euclidean(&vocab.nodes[0].center, &point) <= vocab.nodes[0].cover + 1e-12);
        }
    }

    #[test]
    fn test_identical_descriptors_do_not_split_forever() {
        let mut vocab = TreeVocabulary::new(VocabularyConfig {
            radius: -1.0,
            max_leaf_bags: 4,
            kmeans_children: 2,
            kmeans_max_iterations: 10,
        });
        for i in 0..20 {
            vocab.insert_feature(&[1.0, 0.0], NodeId::new(i)).unwrap();
        }
        assert_eq!(vocab.len(), 20);
        assert_eq!(vocab.stats().splits, 0);
    }
}
