//! Fragmentation router
//!
//! Pure functions deciding which fragment owns a key and where a write
//! must be replicated. Ownership is by key parity: even keys live on
//! `node2`, odd keys on `node3`, and `node1` holds everything.

use crate::errors::{FragError, FragResult};
use crate::node::NodeId;

/// Fragment node that owns `key`.
///
/// Uses euclidean remainder so negative keys follow the same parity rule.
pub fn owner_of(key: i64) -> NodeId {
    if key.rem_euclid(2) == 0 {
        NodeId::Node2
    } else {
        NodeId::Node3
    }
}

/// Node that must receive a write performed on `source`.
///
/// Central writes go to the owning fragment; fragment writes go to central.
pub fn replication_target(source: NodeId, key: i64) -> NodeId {
    if source.is_central() {
        owner_of(key)
    } else {
        NodeId::Node1
    }
}

/// The two nodes that hold a copy of `key`: central first, then the owner.
pub fn replicas_of(key: i64) -> [NodeId; 2] {
    [NodeId::Node1, owner_of(key)]
}

/// Parses a caller-supplied key, rejecting anything that is not an integer.
pub fn parse_key(raw: &str) -> FragResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| FragError::invalid_request(format!("key is not an integer: {:?}", raw)))
}

/// Lock manager resource name for a record key.
pub fn resource_for(key: i64) -> String {
    format!("record:{}", key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_by_parity() {
        assert_eq!(owner_of(0), NodeId::Node2);
        assert_eq!(owner_of(2), NodeId::Node2);
        assert_eq!(owner_of(1), NodeId::Node3);
        assert_eq!(owner_of(132711), NodeId::Node3);
    }

    #[test]
    fn test_owner_handles_negative_keys() {
        assert_eq!(owner_of(-3), NodeId::Node3);
        assert_eq!(owner_of(-4), NodeId::Node2);
    }

    #[test]
    fn test_replication_target_from_central() {
        assert_eq!(replication_target(NodeId::Node1, 10), NodeId::Node2);
        assert_eq!(replication_target(NodeId::Node1, 11), NodeId::Node3);
    }

    #[test]
    fn test_replication_target_from_fragment() {
        assert_eq!(replication_target(NodeId::Node2, 10), NodeId::Node1);
        assert_eq!(replication_target(NodeId::Node3, 11), NodeId::Node1);
    }

    #[test]
    fn test_every_key_lives_on_exactly_two_nodes() {
        for key in -5..20 {
            let [central, owner] = replicas_of(key);
            assert_eq!(central, NodeId::Node1);
            assert_ne!(owner, NodeId::Node1);
            assert_eq!(owner, owner_of(key));
        }
    }

    #[test]
    fn test_parse_key_rejects_non_numeric() {
        assert_eq!(parse_key(" 42 ").unwrap(), 42);
        let err = parse_key("tt0000042").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
