//! In-process transactional row store
//!
//! One `MemoryEngine` backs each node. Committed data lives in per-key
//! version chains; uncommitted writes are held as write intents, at most
//! one per key. A second writer on a held key fails immediately with
//! `WriteConflict` instead of waiting.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::errors::{EngineError, EngineResult};
use super::row::Row;
use super::version::VersionChain;
use crate::node::NodeId;
use crate::transaction::IsolationLevel;

/// Uncommitted write held by a transaction.
#[derive(Debug, Clone)]
struct WriteIntent {
    txn: u64,
    row: Option<Row>,
}

#[derive(Debug, Default)]
struct EngineState {
    /// Last assigned commit sequence
    commit_seq: u64,
    next_txn: u64,
    chains: BTreeMap<i64, VersionChain>,
    intents: HashMap<i64, WriteIntent>,
}

impl EngineState {
    fn latest(&self, key: i64) -> Option<&Row> {
        self.chains.get(&key).and_then(VersionChain::latest)
    }

    fn latest_commit(&self, key: i64) -> u64 {
        self.chains.get(&key).map_or(0, VersionChain::latest_commit)
    }

    /// Row as the writer sees it: own pending write first, then latest committed.
    fn current(&self, txn: &EngineTxn, key: i64) -> Option<Row> {
        match txn.writes.get(&key) {
            Some(own) => own.clone(),
            None => self.latest(key).cloned(),
        }
    }

    fn claim(&mut self, txn: &mut EngineTxn, key: i64, row: Option<Row>) -> EngineResult<()> {
        if let Some(intent) = self.intents.get(&key) {
            if intent.txn != txn.id {
                return Err(EngineError::WriteConflict {
                    key,
                    holder: intent.txn,
                });
            }
        }
        self.intents.insert(
            key,
            WriteIntent {
                txn: txn.id,
                row: row.clone(),
            },
        );
        txn.writes.insert(key, row);
        Ok(())
    }

    fn release_intents(&mut self, txn: &EngineTxn) {
        for key in txn.writes.keys() {
            if self.intents.get(key).map(|i| i.txn) == Some(txn.id) {
                self.intents.remove(key);
            }
        }
    }
}

/// Per-transaction bookkeeping, owned by the connection running it.
#[derive(Debug)]
pub struct EngineTxn {
    id: u64,
    isolation: IsolationLevel,
    /// Commit sequence visible at begin
    read_view: u64,
    writes: BTreeMap<i64, Option<Row>>,
    reads: BTreeSet<i64>,
    active: bool,
}

impl EngineTxn {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn read_view(&self) -> u64 {
        self.read_view
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn ensure_active(&self) -> EngineResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(EngineError::TxnNotActive(self.id))
        }
    }
}

/// The row store behind one node.
#[derive(Debug)]
pub struct MemoryEngine {
    node: NodeId,
    state: Mutex<EngineState>,
}

impl MemoryEngine {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a transaction whose read view is the current commit sequence.
    pub fn begin(&self, isolation: IsolationLevel) -> EngineTxn {
        let mut state = self.state();
        state.next_txn += 1;
        EngineTxn {
            id: state.next_txn,
            isolation,
            read_view: state.commit_seq,
            writes: BTreeMap::new(),
            reads: BTreeSet::new(),
            active: true,
        }
    }

    /// Reads `key` under the transaction's isolation level.
    pub fn read(&self, txn: &mut EngineTxn, key: i64) -> EngineResult<Option<Row>> {
        txn.ensure_active()?;
        if let Some(own) = txn.writes.get(&key) {
            return Ok(own.clone());
        }
        txn.reads.insert(key);

        let state = self.state();
        let row = match txn.isolation {
            IsolationLevel::ReadUncommitted => match state.intents.get(&key) {
                Some(intent) => intent.row.clone(),
                None => state.latest(key).cloned(),
            },
            IsolationLevel::ReadCommitted => state.latest(key).cloned(),
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable => state
                .chains
                .get(&key)
                .and_then(|c| c.visible_at(txn.read_view))
                .cloned(),
        };
        Ok(row)
    }

    /// Inserts a new row. Fails with `DuplicateKey` when the row exists.
    pub fn insert(&self, txn: &mut EngineTxn, key: i64, row: Row) -> EngineResult<()> {
        txn.ensure_active()?;
        let mut state = self.state();
        if state.current(txn, key).is_some() {
            return Err(EngineError::DuplicateKey(key));
        }
        state.claim(txn, key, Some(row))
    }

    /// Replaces an existing row. Returns false when no row was affected.
    pub fn update(&self, txn: &mut EngineTxn, key: i64, row: Row) -> EngineResult<bool> {
        txn.ensure_active()?;
        let mut state = self.state();
        if state.current(txn, key).is_none() {
            return Ok(false);
        }
        state.claim(txn, key, Some(row))?;
        Ok(true)
    }

    /// Deletes a row and returns what it held, or `None` when absent.
    pub fn delete(&self, txn: &mut EngineTxn, key: i64) -> EngineResult<Option<Row>> {
        txn.ensure_active()?;
        let mut state = self.state();
        let before = match state.current(txn, key) {
            Some(row) => row,
            None => return Ok(None),
        };
        state.claim(txn, key, None)?;
        Ok(Some(before))
    }

    /// Publishes the transaction's writes under a fresh commit sequence.
    ///
    /// SERIALIZABLE transactions are validated first: if any key they read
    /// or wrote was committed by someone else after their read view, the
    /// transaction is rolled back and `SerializationFailure` is returned.
    pub fn commit(&self, txn: &mut EngineTxn) -> EngineResult<u64> {
        txn.ensure_active()?;
        let mut state = self.state();

        if txn.isolation == IsolationLevel::Serializable {
            let stale = txn
                .reads
                .iter()
                .chain(txn.writes.keys())
                .copied()
                .find(|k| state.latest_commit(*k) > txn.read_view);
            if let Some(key) = stale {
                state.release_intents(txn);
                txn.writes.clear();
                txn.active = false;
                return Err(EngineError::SerializationFailure { key });
            }
        }

        txn.active = false;
        if txn.writes.is_empty() {
            return Ok(state.commit_seq);
        }

        state.commit_seq += 1;
        let seq = state.commit_seq;
        state.release_intents(txn);
        for (key, row) in std::mem::take(&mut txn.writes) {
            state.chains.entry(key).or_default().push(seq, row);
        }
        Ok(seq)
    }

    /// Discards the transaction's writes. Safe to call more than once.
    pub fn rollback(&self, txn: &mut EngineTxn) {
        if !txn.active {
            return;
        }
        let mut state = self.state();
        state.release_intents(txn);
        txn.writes.clear();
        txn.active = false;
    }

    /// Latest committed row, outside any transaction.
    pub fn committed(&self, key: i64) -> Option<Row> {
        self.state().latest(key).cloned()
    }

    /// Keys that currently hold a committed row.
    pub fn committed_keys(&self) -> Vec<i64> {
        self.state()
            .chains
            .iter()
            .filter(|(_, chain)| chain.latest().is_some())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Number of uncommitted write intents, for leak checks.
    pub fn pending_intents(&self) -> usize {
        self.state().intents.len()
    }
}
