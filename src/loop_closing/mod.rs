//! Loop closing over the place graph.
//!
//! Recognizes that the trajectory has come back to places it already mapped
//! and folds the duplicate places together.
//!
//! # Architecture
//!
//! The pipeline consists of:
//! 1. **Similarity** (`similarity.rs`): one vote row per new place, appended by the worker
//! 2. **Alignment** (`aligner.rs`): forward and reversed local-alignment DP, component extraction
//! 3. **Merge** (`merger.rs`): components applied to the [`PlaceGraph`](crate::graph::PlaceGraph)
//! 4. **Batch** (`detector.rs`): detect + merge + renumber over the whole history
//!
//! Batch recomputation needs exclusive access to the graph. It runs on the
//! localization worker between observations, or offline from the CLI.
//!
//! # Example
//!
//! ```ignore
//! use rust_topoloc::loop_closing::LoopClosureDetector;
//!
//! let detector = LoopClosureDetector::new(config.alignment.clone());
//! let report = detector.batch_recompute(&mut graph, &matrix)?;
//! println!("{} places merged", report.merge.merged);
//! ```

pub mod aligner;
pub mod detector;
pub mod merger;
pub mod similarity;

pub use aligner::{
    AlignmentMatrix, Backpointer, Component, LoopClosureAligner, compute_alignment_matrix,
    extract_components,
};
pub use detector::{LoopClosureDetector, RecomputeReport};
pub use merger::{GraphMerger, MergeReport, synthesize_component};
pub use similarity::SimilarityMatrix;
