//! Exhaustive vocabulary search.

use nalgebra::DMatrix;

use crate::error::Result;
use crate::features::{FeatureSet, descriptor_distance};
use crate::graph::NodeId;

use super::{Bag, BagId, InsertOutcome, Vocabulary, commit_batch};

/// Flat list of bags, scanned in full for every query.
#[derive(Debug, Clone, Default)]
pub struct NaiveVocabulary {
    bags: Vec<Bag>,
    radius: f64,
    dim: Option<usize>,
}

impl NaiveVocabulary {
    pub fn new(radius: f64) -> Self {
        Self {
            bags: Vec::new(),
            radius,
            dim: None,
        }
    }

    /// `dim × n_bags` matrix of centroids.
    fn centroid_matrix(&self, dim: usize) -> DMatrix<f64> {
        DMatrix::from_fn(dim, self.bags.len(), |r, c| self.bags[c].centroid[r] as f64)
    }
}

impl Vocabulary for NaiveVocabulary {
    fn bags(&self) -> &[Bag] {
        &self.bags
    }

    fn radius(&self) -> f64 {
        self.radius
    }

    fn dim(&self) -> Option<usize> {
        self.dim
    }

    fn search(&self, descriptor: &[f32]) -> Vec<BagId> {
        self.bags
            .iter()
            .enumerate()
            .filter(|(_, bag)| descriptor_distance(descriptor, &bag.centroid) < self.radius)
            .map(|(i, _)| BagId(i))
            .collect()
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
        BagId(self.bags.len() - 1)
    }

    /// One matrix product of all descriptors against all centroids.
    fn insert_batch(&mut self, features: &FeatureSet, place: NodeId) -> Result<Vec<InsertOutcome>> {
        if features.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dim(features.dim())?;

        let hits: Vec<Vec<BagId>> = if self.bags.is_empty() {
            vec![Vec::new(); features.len()]
        } else {
            let f = features.matrix().map(|x| x as f64);
            let dots = f.transpose() * self.centroid_matrix(features.dim());
            dots.row_iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .filter(|(_, dot)| 2.0 - 2.0 * **dot < self.radius)
                        .map(|(j, _)| BagId(j))
                        .collect()
                })
                .collect()
        };

        Ok(commit_batch(self, features, hits, place))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_against_existing_bags_only() {
        let mut vocab = NaiveVocabulary::new(0.3);
        // two identical descriptors in one batch both found their own bag
        let fs = FeatureSet::from_descriptors(2, &[vec![1.0, 0.0], vec![1.0, 0.0]]).unwrap();
        let out = vocab.insert_batch(&fs, NodeId::new(0)).unwrap();
        assert!(out.iter().all(|o| !o.matched));
        assert_eq!(vocab.len(), 2);

        // the next batch hits both
        let fs = FeatureSet::from_descriptors(2, &[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let out = vocab.insert_batch(&fs, NodeId::new(1)).unwrap();
        assert!(out[0].matched);
        assert_eq!(out[0].bags, vec![BagId(0), BagId(1)]);
        assert!(!out[1].matched);
        assert_eq!(vocab.bags()[0].places, vec![NodeId::new(0), NodeId::new(1)]);
        assert_eq!(vocab.len(), 3);
    }

    #[test]
    fn test_empty_batch() {
        let mut vocab = NaiveVocabulary::new(0.3);
        let out = vocab.insert_batch(&FeatureSet::empty(4), NodeId::new(0)).unwrap();
        assert!(out.is_empty());
        assert_eq!(vocab.dim(), None);
    }
}
