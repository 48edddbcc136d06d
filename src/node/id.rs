//! Node identity and roles
//!
//! The cluster has exactly three members. `node1` is the central node and
//! holds every record; `node2` holds even keys and `node3` holds odd keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeId {
    Node1,
    Node2,
    Node3,
}

/// What a node stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    /// Holds the full data set
    Central,
    /// Holds the records whose key is even
    FragmentEven,
    /// Holds the records whose key is odd
    FragmentOdd,
}

impl NodeId {
    /// Every member, in a fixed order.
    pub const ALL: [NodeId; 3] = [NodeId::Node1, NodeId::Node2, NodeId::Node3];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::Node1 => "node1",
            NodeId::Node2 => "node2",
            NodeId::Node3 => "node3",
        }
    }

    pub fn role(&self) -> NodeRole {
        match self {
            NodeId::Node1 => NodeRole::Central,
            NodeId::Node2 => NodeRole::FragmentEven,
            NodeId::Node3 => NodeRole::FragmentOdd,
        }
    }

    pub fn is_central(&self) -> bool {
        self.role() == NodeRole::Central
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            NodeId::Node1 => 0,
            NodeId::Node2 => 1,
            NodeId::Node3 => 2,
        }
    }
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Central => "central",
            NodeRole::FragmentEven => "fragment-even",
            NodeRole::FragmentOdd => "fragment-odd",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a string does not name a cluster member.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node: {0}")]
pub struct UnknownNode(pub String);

impl FromStr for NodeId {
    type Err = UnknownNode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "node1" => Ok(NodeId::Node1),
            "node2" => Ok(NodeId::Node2),
            "node3" => Ok(NodeId::Node3),
            other => Err(UnknownNode(other.to_string())),
        }
    }
}
