//! Feature matching collaborator.

use crate::error::Result;

use super::{FeatureSet, descriptor_distance};

/// One correspondence between two feature sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    /// Index in the source set.
    pub src: usize,
    /// Index in the destination set.
    pub dst: usize,
    pub distance: f64,
}

pub type MatchSet = Vec<FeatureMatch>;

/// Pairwise matching between feature sets.
///
/// The localization core only needs the psi-distance; the default
/// implementation derives it from [`FeatureMatcher::match_sets`].
pub trait FeatureMatcher: Send {
    /// Match every descriptor of `a` against `b`.
    fn match_sets(&self, a: &FeatureSet, b: &FeatureSet) -> Result<MatchSet>;

    /// Fraction of `a` left unmatched by `b`, in [0, 1].
    fn psi_distance(&self, a: &FeatureSet, b: &FeatureSet) -> Result<f64> {
        if a.is_empty() {
            return Ok(1.0);
        }
        let matches = self.match_sets(a, b)?;
        Ok(1.0 - matches.len() as f64 / a.len() as f64)
    }
}

/// Brute-force nearest-neighbor matcher with a ratio test.
#[derive(Debug, Clone)]
pub struct NearestNeighborMatcher {
    /// Accept a match only below this squared distance.
    pub max_distance: f64,
    /// Lowe ratio between best and second-best squared distances.
    pub ratio: f64,
}

impl Default for NearestNeighborMatcher {
    fn default() -> Self {
        Self {
            max_distance: 0.30,
            ratio: 0.8,
        }
    }
}

impl FeatureMatcher for NearestNeighborMatcher {
    fn match_sets(&self, a: &FeatureSet, b: &FeatureSet) -> Result<MatchSet> {
        a.check_compatible(b)?;

        let mut matches = Vec::new();
        for (src, da) in a.iter().enumerate() {
            let mut best: Option<(usize, f64)> = None;
            let mut second = f64::INFINITY;
            for (dst, db) in b.iter().enumerate() {
                let d = descriptor_distance(da, db);
                match best {
                    Some((_, bd)) if d >= bd => second = second.min(d),
                    Some((_, bd)) => {
                        second = bd;
                        best = Some((dst, d));
                    }
                    None => best = Some((dst, d)),
                }
            }
            if let Some((dst, d)) = best {
                let distinctive = second.is_infinite() || d < self.ratio * second;
                if d < self.max_distance && distinctive {
                    matches.push(FeatureMatch {
                        src,
                        dst,
                        distance: d,
                    });
                }
            }
        }
        Ok(matches)
    }
}
