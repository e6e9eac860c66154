//! Place graph - topological map of places and traversals.
//!
//! This module contains:
//! - [`Node`] - a mapped place with its belief pair
//! - [`Edge`] - a directed traversal carrying sensor [`Evidence`](crate::features::Evidence)
//! - [`PlaceGraph`] - arena owning both, with merge/renumber/symmetry repair
//!
//! # Architecture
//!
//! Nodes and edges never hold references to each other. A node lists the
//! ids of its outgoing edges; an edge names its endpoints by [`NodeId`].
//! Path search lives in `path`, the binary map format in `persist`.
//!
//! The soft invariant maintained by loop closure is that every closed edge
//! `a -> b` has a sibling `b -> a` whose motion type is the complement.
//!
//! # Example
//!
//! ```ignore
//! use rust_topoloc::graph::{MotionType, PlaceGraph};
//!
//! let mut graph = PlaceGraph::new();
//! let (first, open) = graph.add_new_place(t0, false, None, MotionType::Forward, evidence0)?;
//! let (second, _) = graph.add_new_place(t1, false, Some(open), MotionType::Forward, evidence1)?;
//!
//! let path = graph.shortest_path(second, first)?;
//! graph.save("map.bin")?;
//! ```

pub mod edge;
pub mod node;
mod path;
mod persist;
pub mod place_graph;
pub mod types;

pub use edge::Edge;
pub use node::Node;
pub use place_graph::PlaceGraph;
pub use types::{EdgeId, MotionType, NodeId};
