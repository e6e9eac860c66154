//! Online visual vocabulary for place recognition.
//!
//! Descriptors are clustered accretively into "bags" (visual words): a
//! descriptor within `radius` of one or more bag centroids is registered in
//! each of them; otherwise it founds a new bag whose centroid it becomes.
//! Centroids never move, so a bag is fully described by its first descriptor
//! plus the list of places that hit it.
//!
//! # Key Types
//!
//! - [`Bag`]: centroid, hit count and contributing places
//! - [`Vocabulary`]: insertion and voting interface
//! - [`NaiveVocabulary`]: exhaustive scan, batched as one matrix product
//! - [`TreeVocabulary`]: metric tree over bag centroids, same decisions

mod naive;
mod tree;

use crate::error::{Error, Result};
use crate::features::FeatureSet;
use crate::graph::NodeId;

pub use naive::NaiveVocabulary;
pub use tree::TreeVocabulary;

/// Index of a bag within its vocabulary. Assigned sequentially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BagId(pub usize);

impl std::fmt::Display for BagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "W{}", self.0)
    }
}

/// A visual word.
#[derive(Debug, Clone, PartialEq)]
pub struct Bag {
    /// Unit-norm centroid (the founding descriptor).
    pub centroid: Vec<f32>,

    /// Number of registrations, founding one included.
    pub count: usize,

    /// Place of every registration, in order. May repeat.
    pub places: Vec<NodeId>,
}

impl Bag {
    pub fn new(descriptor: &[f32], place: NodeId) -> Self {
        Self {
            centroid: descriptor.to_vec(),
            count: 1,
            places: vec![place],
        }
    }

    pub fn register(&mut self, place: NodeId) {
        self.places.push(place);
        self.count += 1;
    }
}

/// Result of inserting one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    /// True when at least one existing bag was within radius.
    pub matched: bool,

    /// Bags hit (ascending), or the single bag just created.
    pub bags: Vec<BagId>,
}

/// Accretive clustering of descriptors into bags.
pub trait Vocabulary: Send {
    /// All bags, indexed by [`BagId`].
    fn bags(&self) -> &[Bag];

    /// Acceptance radius on `2 - 2·dot`.
    fn radius(&self) -> f64;

    /// Descriptor dimension, fixed by the first bag.
    fn dim(&self) -> Option<usize>;

    /// Bags within radius of `descriptor`, ascending. Does not mutate.
    fn search(&self, descriptor: &[f32]) -> Vec<BagId>;

    fn bags_mut(&mut self) -> &mut [Bag];

    /// Record a registration of `place` in an existing bag.
    fn register(&mut self, bag: BagId, place: NodeId);

    /// Found a new bag from `descriptor`.
    fn create_bag(&mut self, descriptor: &[f32], place: NodeId) -> BagId;

    fn len(&self) -> usize {
        self.bags().len()
    }

    fn is_empty(&self) -> bool {
        self.bags().is_empty()
    }

    /// Fail with `MalformedInput` if `dim` disagrees with the vocabulary.
    fn check_dim(&self, dim: usize) -> Result<()> {
        match self.dim() {
            Some(expected) if expected != dim => Err(Error::MalformedInput(format!(
                "descriptor dimension {} does not match vocabulary dimension {}",
                dim, expected
            ))),
            _ => Ok(()),
        }
    }

    /// Insert one descriptor seen at `place`.
    fn insert_feature(&mut self, descriptor: &[f32], place: NodeId) -> Result<InsertOutcome> {
        self.check_dim(descriptor.len())?;
        let hits = self.search(descriptor);
        if hits.is_empty() {
            let bag = self.create_bag(descriptor, place);
            return Ok(InsertOutcome {
                matched: false,
                bags: vec![bag],
            });
        }
        for &bag in &hits {
            self.register(bag, place);
        }
        Ok(InsertOutcome {
            matched: true,
            bags: hits,
        })
    }

    /// Insert a whole feature set seen at `place`.
    ///
    /// Every descriptor is searched against the bags that existed before the
    /// call; unmatched descriptors then each found a new bag.
    fn insert_batch(&mut self, features: &FeatureSet, place: NodeId) -> Result<Vec<InsertOutcome>> {
        if features.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dim(features.dim())?;
        let hits: Vec<Vec<BagId>> = features.iter().map(|d| self.search(d)).collect();
        Ok(commit_batch(self, features, hits, place))
    }

    /// Rewrite place ids after the map was merged or renumbered.
    ///
    /// Registrations whose place maps to `None` are forgotten; bag counts
    /// keep counting them so word weights stay stable.
    fn remap_places(&mut self, map: &dyn Fn(NodeId) -> Option<NodeId>) {
        for bag in self.bags_mut() {
            bag.places = bag.places.iter().filter_map(|&p| map(p)).collect();
        }
    }

    /// Similarity of the current observation to every place.
    fn vote(&self, matched: &[BagId], n_places: usize) -> Vec<f64> {
        vote(self.bags(), matched, n_places)
    }
}

/// Apply precomputed batch hits: register matches, then found new bags.
pub(crate) fn commit_batch<V: Vocabulary + ?Sized>(
    vocab: &mut V,
    features: &FeatureSet,
    hits: Vec<Vec<BagId>>,
    place: NodeId,
) -> Vec<InsertOutcome> {
    for bags in &hits {
        for &bag in bags {
            vocab.register(bag, place);
        }
    }

    let mut outcomes = Vec::with_capacity(hits.len());
    let mut created = 0;
    for (i, bags) in hits.into_iter().enumerate() {
        if bags.is_empty() {
            let bag = vocab.create_bag(features.descriptor(i), place);
            created += 1;
            outcomes.push(InsertOutcome {
                matched: false,
                bags: vec![bag],
            });
        } else {
            outcomes.push(InsertOutcome {
                matched: true,
                bags,
            });
        }
    }

    tracing::debug!(
        place = %place,
        features = features.len(),
        created,
        total = vocab.len(),
        "vocabulary update"
    );
    outcomes
}

/// Matched bags of a batch, one entry per hit.
pub fn matched_bags(outcomes: &[InsertOutcome]) -> Vec<BagId> {
    outcomes
        .iter()
        .filter(|o| o.matched)
        .flat_map(|o| o.bags.iter().copied())
        .collect()
}

/// Fraction of descriptors that matched an existing bag.
pub fn matched_ratio(outcomes: &[InsertOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    outcomes.iter().filter(|o| o.matched).count() as f64 / outcomes.len() as f64
}

/// Inverse-frequency vote over places.
///
/// Every registration of every matched bag adds `1 / bag.count` to its
/// place. Places at or beyond `n_places` are ignored.
pub fn vote(bags: &[Bag], matched: &[BagId], n_places: usize) -> Vec<f64> {
    let mut sim = vec![0.0; n_places];
    for bag_id in matched {
        let Some(bag) = bags.get(bag_id.0) else {
            continue;
        };
        let idf = 1.0 / bag.count as f64;
        for place in &bag.places {
            if let Some(slot) = sim.get_mut(place.index()) {
                *slot += idf;
            }
        }
    }
    sim
}
