//! Feature sets and the evidence carried by map edges.
//!
//! Descriptor extraction and image handling live outside this crate. What
//! arrives here is a [`FeatureSet`] of unit-norm descriptors, and what the
//! map stores per edge is an opaque [`Evidence`] record.
//!
//! # Key Types
//!
//! - [`FeatureSet`]: column-major descriptor matrix (one descriptor per column)
//! - [`Evidence`]: reference features plus image and pose blobs of an edge
//! - [`FeatureMatcher`]: collaborator producing match sets and psi-distances

mod matcher;

use nalgebra::{DMatrix, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use matcher::{FeatureMatch, FeatureMatcher, MatchSet, NearestNeighborMatcher};

/// Squared euclidean distance between two unit-norm descriptors.
///
/// For unit vectors `|a - b|² = 2 - 2·dot(a, b)`. Accumulated in f64 so that
/// every caller gets bit-identical values for the same pair.
#[inline]
pub fn descriptor_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| *x as f64 * *y as f64)
        .sum();
    2.0 - 2.0 * dot
}

/// A set of descriptors observed at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// `dim × len` matrix, column `i` is descriptor `i`.
    descriptors: DMatrix<f32>,
}

impl FeatureSet {
    /// Wrap a `dim × len` descriptor matrix.
    pub fn new(descriptors: DMatrix<f32>) -> Self {
        Self { descriptors }
    }

    /// Empty set of the given dimension.
    pub fn empty(dim: usize) -> Self {
        Self {
            descriptors: DMatrix::zeros(dim, 0),
        }
    }

    /// Build a set from individual descriptors, all of dimension `dim`.
    pub fn from_descriptors(dim: usize, descriptors: &[Vec<f32>]) -> Result<Self> {
        let mut data = Vec::with_capacity(dim * descriptors.len());
        for (i, d) in descriptors.iter().enumerate() {
            if d.len() != dim {
                return Err(Error::MalformedInput(format!(
                    "descriptor {} has dimension {}, expected {}",
                    i,
                    d.len(),
                    dim
                )));
            }
            data.extend_from_slice(d);
        }
        Ok(Self {
            descriptors: DMatrix::from_vec(dim, descriptors.len(), data),
        })
    }

    /// Descriptor dimension.
    pub fn dim(&self) -> usize {
        self.descriptors.nrows()
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descriptor `i` as a contiguous slice.
    pub fn descriptor(&self, i: usize) -> &[f32] {
        let dim = self.dim();
        &self.descriptors.as_slice()[i * dim..(i + 1) * dim]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.len()).map(move |i| self.descriptor(i))
    }

    /// The underlying `dim × len` matrix.
    pub fn matrix(&self) -> &DMatrix<f32> {
        &self.descriptors
    }

    /// Scale every descriptor to unit norm. Zero descriptors are left as is.
    pub fn normalize(&mut self) {
        for mut col in self.descriptors.column_iter_mut() {
            let norm = col.norm();
            if norm > f32::EPSILON {
                col /= norm;
            }
        }
    }

    /// Fail with `MalformedInput` unless `other` has the same dimension.
    pub fn check_compatible(&self, other: &FeatureSet) -> Result<()> {
        if self.dim() != other.dim() && !self.is_empty() && !other.is_empty() {
            return Err(Error::MalformedInput(format!(
                "descriptor dimension mismatch: {} vs {}",
                self.dim(),
                other.dim()
            )));
        }
        Ok(())
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self::empty(0)
    }
}

/// Camera pose recorded with an edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub utime: i64,
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

/// Sensor evidence owned by an edge. Passed through unopened by the graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Reference features of the edge's start place.
    pub features: FeatureSet,

    /// Encoded camera images (one per camera), opaque bytes.
    pub images: Vec<Vec<u8>>,

    /// Encoded upward-facing image, if recorded.
    pub up_image: Option<Vec<u8>>,

    pub pose: Option<Pose>,
}

impl Evidence {
    /// Evidence holding only reference features.
    pub fn from_features(features: FeatureSet) -> Self {
        Self {
            features,
            ..Default::default()
        }
    }

    /// Encode into the opaque blob stored in map files.
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(blob)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_of_unit_vectors() {
        let a = [1.0f32, 0.0, 0.0];
        let b = [0.0f32, 1.0, 0.0];
        assert!(descriptor_distance(&a, &a).abs() < 1e-12);
        assert!((descriptor_distance(&a, &b) - 2.0).abs() < 1e-12);
        let c = [-1.0f32, 0.0, 0.0];
        assert!((descriptor_distance(&a, &c) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_descriptors_checks_dimension() {
        let ok = FeatureSet::from_descriptors(2, &[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok.dim(), 2);
        assert_eq!(ok.descriptor(1), &[0.0, 1.0]);

        let err = FeatureSet::from_descriptors(2, &[vec![1.0, 0.0, 0.0]]).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn test_normalize() {
        let mut fs = FeatureSet::from_descriptors(2, &[vec![3.0, 4.0], vec![0.0, 0.0]]).unwrap();
        fs.normalize();
        assert!((fs.descriptor(0)[0] - 0.6).abs() < 1e-6);
        assert!((fs.descriptor(0)[1] - 0.8).abs() < 1e-6);
        assert_eq!(fs.descriptor(1), &[0.0, 0.0]);
    }

    #[test]
    fn test_check_compatible() {
        let a = FeatureSet::from_descriptors(2, &[vec![1.0, 0.0]]).unwrap();
        let b = FeatureSet::from_descriptors(3, &[vec![1.0, 0.0, 0.0]]).unwrap();
        assert!(a.check_compatible(&a).is_ok());
        assert!(a.check_compatible(&b).is_err());
        assert!(a.check_compatible(&FeatureSet::empty(3)).is_ok());
    }

    #[test]
    fn test_evidence_blob() {
        let features = FeatureSet::from_descriptors(2, &[vec![1.0, 0.0]]).unwrap();
        let evidence = Evidence {
            features,
            images: vec![vec![1, 2, 3]],
            up_image: None,
            pose: Some(Pose {
                utime: 42,
                position: Vector3::new(1.0, 2.0, 3.0),
                orientation: UnitQuaternion::identity(),
            }),
        };
        let blob = evidence.to_blob().unwrap();
        assert_eq!(Evidence::from_blob(&blob).unwrap(), evidence);
        assert!(Evidence::from_blob(&blob[..blob.len() / 2]).is_err());
    }
}
