//! Committed version chains
//!
//! Each key keeps every committed version ordered by commit sequence.
//! A version whose row is `None` is a tombstone.
//!
//! Visibility under a read view: consider versions with
//! `commit_seq <= upper_bound`, take the one with the largest sequence,
//! and treat a tombstone as absent.

use super::row::Row;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Version {
    pub commit_seq: u64,
    pub row: Option<Row>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    /// Appends a newer version. Sequences are assigned by the engine in
    /// increasing order, so the chain stays sorted.
    pub fn push(&mut self, commit_seq: u64, row: Option<Row>) {
        debug_assert!(self.latest_commit() < commit_seq);
        self.versions.push(Version { commit_seq, row });
    }

    /// Newest committed row, `None` when absent or deleted.
    pub fn latest(&self) -> Option<&Row> {
        self.versions.last().and_then(|v| v.row.as_ref())
    }

    /// Sequence of the newest committed version, 0 if none.
    pub fn latest_commit(&self) -> u64 {
        self.versions.last().map_or(0, |v| v.commit_seq)
    }

    /// Row visible to a reader whose view ends at `upper_bound`.
    pub fn visible_at(&self, upper_bound: u64) -> Option<&Row> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.commit_seq <= upper_bound)
            .and_then(|v| v.row.as_ref())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.versions.len()
    }
}
