//! Core ID types and motion labels for the place graph.

use serde::{Deserialize, Serialize};

/// Identifier of a place (node) in the graph.
///
/// NodeIds are assigned sequentially as places are created and become dense
/// after a renumbering pass. They are the only way nodes and edges refer to
/// each other, which keeps ownership inside [`PlaceGraph`](super::PlaceGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new NodeId with the given value.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Index form, for addressing similarity-matrix rows.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Identifier of a directed edge. Never reused within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u64);

impl EdgeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// How the walker moved along an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MotionType {
    #[default]
    Forward,
    Left,
    Right,
    Up,
    Down,
    Unknown,
}

impl MotionType {
    /// Motion seen when traversing the same edge the other way.
    pub fn reversed(self) -> Self {
        match self {
            MotionType::Left => MotionType::Right,
            MotionType::Right => MotionType::Left,
            MotionType::Up => MotionType::Down,
            MotionType::Down => MotionType::Up,
            other => other,
        }
    }

    /// Wire encoding used in map files.
    pub fn to_i32(self) -> i32 {
        match self {
            MotionType::Forward => 0,
            MotionType::Left => 1,
            MotionType::Right => 2,
            MotionType::Up => 3,
            MotionType::Down => 4,
            MotionType::Unknown => -1,
        }
    }

    /// Decode the wire value. Unrecognized codes map to `Unknown`.
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => MotionType::Forward,
            1 => MotionType::Left,
            2 => MotionType::Right,
            3 => MotionType::Up,
            4 => MotionType::Down,
            _ => MotionType::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        assert_eq!(format!("{}", NodeId::new(7)), "N7");
        assert_eq!(NodeId::new(7).index(), 7);
    }

    #[test]
    fn test_reversed_is_involution() {
        for m in [
            MotionType::Forward,
            MotionType::Left,
            MotionType::Right,
            MotionType::Up,
            MotionType::Down,
            MotionType::Unknown,
        ] {
            assert_eq!(m.reversed().reversed(), m);
            assert_eq!(MotionType::from_i32(m.to_i32()), m);
        }
        assert_eq!(MotionType::Left.reversed(), MotionType::Right);
        assert_eq!(MotionType::Up.reversed(), MotionType::Down);
        assert_eq!(MotionType::Forward.reversed(), MotionType::Forward);
    }

    #[test]
    fn test_unknown_motion_code() {
        assert_eq!(MotionType::from_i32(17), MotionType::Unknown);
    }
}
