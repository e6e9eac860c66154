//! Local-alignment search for loop closures.
//!
//! A revisit shows up in the similarity matrix as a run of high cells along
//! a diagonal: `(i, j), (i+1, j+1), ...` when the route is driven the same
//! way again, or `(i, j), (i+1, j-1), ...` when it is driven backwards. A
//! Smith-Waterman style DP accumulates such runs into peaks, and components
//! are read back by backtracking from the peaks.
//!
//! # Orientation
//!
//! The DP scans the lower triangle (`j < i`). The reversed pass runs on a
//! row-reversed copy and its result is flipped back, so both surfaces are
//! indexed like the input matrix.

use nalgebra::DMatrix;

use crate::config::AlignmentConfig;

use super::similarity::SimilarityMatrix;

/// Scores at or below this are treated as empty.
const SCORE_EPS: f64 = 1e-6;

/// Move taken to reach a cell of the alignment surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpointer {
    #[default]
    None,
    Diag,
    Left,
    Up,
}

/// DP score surface plus backpointers, in input index space.
#[derive(Debug, Clone)]
pub struct AlignmentMatrix {
    pub scores: DMatrix<f64>,
    pub backptr: DMatrix<Backpointer>,
    pub reversed: bool,
}

impl AlignmentMatrix {
    pub fn size(&self) -> usize {
        self.scores.nrows()
    }

    /// Highest cell, first in row-major order on ties.
    pub fn peak(&self) -> Option<(usize, usize, f64)> {
        argmax(&self.scores)
    }
}

/// Run the alignment DP over `matrix`.
///
/// Cells below `threshold` score zero. Gap moves (`Left`, `Up`) pay
/// `gap_penalty`. With `reversed`, rows are flipped before the scan and the
/// result is flipped back.
pub fn compute_alignment_matrix(
    matrix: &DMatrix<f64>,
    threshold: f64,
    gap_penalty: f64,
    reversed: bool,
) -> AlignmentMatrix {
    let n = matrix.nrows().min(matrix.ncols());
    let src = if reversed {
        flip_rows(matrix)
    } else {
        matrix.clone()
    };

    let mut scores = DMatrix::<f64>::zeros(n, n);
    let mut backptr = DMatrix::from_element(n, n, Backpointer::None);

    for i in 0..n {
        let jmax = if reversed { n - 1 - i } else { i };
        for j in 0..jmax {
            let m = src[(i, j)];
            if m < threshold {
                continue;
            }
            if i == 0 || j == 0 {
                scores[(i, j)] = m;
                backptr[(i, j)] = Backpointer::Diag;
                continue;
            }

            let diag = scores[(i - 1, j - 1)];
            let left = scores[(i, j - 1)];
            let up = scores[(i - 1, j)];
            let (score, bp) = if left > diag.max(up) {
                (left + m - gap_penalty, Backpointer::Left)
            } else if up > diag.max(left) {
                (up + m - gap_penalty, Backpointer::Up)
            } else {
                (diag + m, Backpointer::Diag)
            };

            // local alignment never goes negative
            if score > 0.0 {
                scores[(i, j)] = score;
                backptr[(i, j)] = bp;
            }
        }
    }

    if reversed {
        scores = flip_rows(&scores);
        backptr = flip_rows(&backptr);
    }

    AlignmentMatrix {
        scores,
        backptr,
        reversed,
    }
}

/// Run both orientations.
pub fn compute_both(matrix: &DMatrix<f64>, config: &AlignmentConfig) -> (AlignmentMatrix, AlignmentMatrix) {
    let fwd = compute_alignment_matrix(matrix, config.similarity_threshold, config.gap_penalty, false);
    let rev = compute_alignment_matrix(matrix, config.similarity_threshold, config.gap_penalty, true);
    (fwd, rev)
}

// ─────────────────────────────────────────────────────────────────────────────
// Components
// ─────────────────────────────────────────────────────────────────────────────

/// One validated run of place correspondences.
///
/// `pairs` are `(i, j)` indices into the similarity matrix in backtracking
/// order, i.e. starting at the peak.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub pairs: Vec<(usize, usize)>,
    pub score: f64,
    pub reverse: bool,
}

impl Component {
    pub fn new(pairs: Vec<(usize, usize)>, score: f64, reverse: bool) -> Self {
        Self {
            pairs,
            score,
            reverse,
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Smallest and largest index touched by the component.
    pub fn span(&self) -> Option<(usize, usize)> {
        let lo = self.pairs.iter().map(|&(i, j)| i.min(j)).min()?;
        let hi = self.pairs.iter().map(|&(i, j)| i.max(j)).max()?;
        Some((lo, hi))
    }

    /// Make the correspondence one-to-one: a pair repeating the previous
    /// pair's `j` is dropped, then the same on `i`.
    pub fn cleanup(&mut self) {
        self.pairs.dedup_by_key(|p| p.1);
        self.pairs.dedup_by_key(|p| p.0);
    }

    /// Slope and diagonal-distance checks.
    ///
    /// The head-to-tail direction must lie within `max_slope_error_deg` of
    /// -135° (forward) or 135° (reverse). A forward component must also
    /// stray from the diagonal by more than `min_diag_distance` somewhere.
    pub fn is_valid(&self, min_diag_distance: usize, max_slope_error_deg: f64) -> bool {
        let (Some(&head), Some(&tail)) = (self.pairs.first(), self.pairs.last()) else {
            return false;
        };
        let dx = tail.0 as f64 - head.0 as f64;
        let dy = tail.1 as f64 - head.1 as f64;
        let slope = dx.atan2(dy).to_degrees();
        let expected = if self.reverse { 135.0 } else { -135.0 };
        if (slope - expected).abs() > max_slope_error_deg {
            return false;
        }
        if self.reverse {
            return true;
        }
        self.pairs
            .iter()
            .any(|&(i, j)| i.abs_diff(j) > min_diag_distance)
    }
}

/// Extract, validate and rank components from both alignment surfaces.
///
/// Seeds are the local maxima of either surface, taken highest first until
/// none reaches `alignment_threshold`. Every visited cell is consumed.
pub fn extract_components(
    fwd: &AlignmentMatrix,
    rev: &AlignmentMatrix,
    config: &AlignmentConfig,
) -> Vec<Component> {
    let surfaces = [fwd, rev];
    let mut masks = [
        local_max_mask(&fwd.scores, config.search_radius, config.alignment_threshold),
        local_max_mask(&rev.scores, config.search_radius, config.alignment_threshold),
    ];

    let mut components = Vec::new();
    let mut discarded = 0usize;
    loop {
        let best = masks
            .iter()
            .enumerate()
            .filter_map(|(k, m)| argmax(m).map(|(i, j, v)| (k, i, j, v)))
            .fold(None, |acc: Option<(usize, usize, usize, f64)>, cand| match acc {
                Some(a) if a.3 >= cand.3 => Some(a),
                _ => Some(cand),
            });
        let Some((k, i, j, peak)) = best else {
            break;
        };
        if peak < config.alignment_threshold {
            break;
        }

        masks[k][(i, j)] = 0.0;
        let surface = surfaces[k];
        let pairs = backtrack(surface, &mut masks[k], i, j, config);
        let component = Component::new(pairs, peak, surface.reversed);

        if component.len() < config.min_seq_length
            || !component.is_valid(config.min_diag_distance, config.max_slope_error_deg)
        {
            discarded += 1;
            continue;
        }
        components.push(component);
    }

    components.sort_by(|a, b| b.score.total_cmp(&a.score));
    tracing::debug!(
        components = components.len(),
        discarded,
        "extracted alignment components"
    );
    components
}

fn backtrack(
    surface: &AlignmentMatrix,
    mask: &mut DMatrix<f64>,
    i: usize,
    j: usize,
    config: &AlignmentConfig,
) -> Vec<(usize, usize)> {
    let n = surface.size() as isize;
    let step_i: isize = if surface.reversed { 1 } else { -1 };
    let (mut i, mut j) = (i as isize, j as isize);
    let mut pairs = Vec::new();

    while (0..n).contains(&i) && (0..n).contains(&j) {
        let cell = (i as usize, j as usize);
        let score = surface.scores[cell];
        let bp = surface.backptr[cell];
        if bp == Backpointer::None || score < config.tail_threshold {
            break;
        }
        if cell.0 > config.min_node_id || cell.1 > config.min_node_id {
            pairs.push(cell);
        }
        mask[cell] = 0.0;

        match bp {
            Backpointer::Diag => {
                i += step_i;
                j -= 1;
            }
            Backpointer::Left => j -= 1,
            Backpointer::Up => i += step_i,
            Backpointer::None => break,
        }
    }
    pairs
}

/// Keep cells that no neighbor within `radius` beats, and that reach
/// `threshold`. Everything else is zero.
fn local_max_mask(scores: &DMatrix<f64>, radius: usize, threshold: f64) -> DMatrix<f64> {
    let n = scores.nrows();
    DMatrix::from_fn(n, n, |i, j| {
        let v = scores[(i, j)];
        if v < threshold || v <= SCORE_EPS {
            return 0.0;
        }
        let (i0, i1) = (i.saturating_sub(radius), (i + radius).min(n - 1));
        let (j0, j1) = (j.saturating_sub(radius), (j + radius).min(n - 1));
        for ii in i0..=i1 {
            for jj in j0..=j1 {
                if scores[(ii, jj)] > v + SCORE_EPS {
                    return 0.0;
                }
            }
        }
        v
    })
}

fn argmax(m: &DMatrix<f64>) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            let v = m[(i, j)];
            if best.is_none_or(|b| v > b.2) {
                best = Some((i, j, v));
            }
        }
    }
    best.filter(|b| b.2 > SCORE_EPS)
}

fn flip_rows<T: nalgebra::Scalar>(m: &DMatrix<T>) -> DMatrix<T> {
    let n = m.nrows();
    DMatrix::from_fn(n, m.ncols(), |i, j| m[(n - 1 - i, j)].clone())
}

// ─────────────────────────────────────────────────────────────────────────────
// LoopClosureAligner
// ─────────────────────────────────────────────────────────────────────────────

/// Alignment plus extraction with fixed parameters.
#[derive(Debug, Clone, Default)]
pub struct LoopClosureAligner {
    config: AlignmentConfig,
}

impl LoopClosureAligner {
    pub fn new(config: AlignmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Align both ways, extract, and make every component one-to-one.
    pub fn align(&self, matrix: &SimilarityMatrix) -> Vec<Component> {
        let (fwd, rev) = compute_both(matrix.matrix(), &self.config);
        let mut components = extract_components(&fwd, &rev, &self.config);
        for c in &mut components {
            c.cleanup();
        }
        components.retain(|c| c.len() >= self.config.min_seq_length);
        components
    }
}
