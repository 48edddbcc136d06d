//! Resource lock table
//!
//! Maps a resource name to its current holders. Acquisition never blocks:
//! it either succeeds immediately or reports `false` and the caller
//! decides whether to retry.
//!
//! Rules:
//! - a READ succeeds iff every current holder is a reader
//! - a WRITE succeeds iff there are no holders or only readers; the
//!   readers are displaced and the writer becomes the sole holder
//!
//! Readers do not block a later writer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::observability::{Event, Logger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    Read,
    Write,
}

impl LockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Read => "read",
            LockMode::Write => "write",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHolder {
    pub mode: LockMode,
    pub tx_id: String,
}

#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<HashMap<String, Vec<LockHolder>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Vec<LockHolder>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tries to take `mode` on `resource` for `tx_id`. Never waits.
    pub fn acquire(&self, resource: &str, mode: LockMode, tx_id: &str) -> bool {
        let mut table = self.table();
        let holders = table.entry(resource.to_string()).or_default();
        let only_readers = holders.iter().all(|h| h.mode == LockMode::Read);

        let granted = match mode {
            LockMode::Write if only_readers => {
                holders.clear();
                holders.push(LockHolder {
                    mode,
                    tx_id: tx_id.to_string(),
                });
                true
            }
            LockMode::Read if only_readers => {
                if !holders.iter().any(|h| h.tx_id == tx_id) {
                    holders.push(LockHolder {
                        mode,
                        tx_id: tx_id.to_string(),
                    });
                }
                true
            }
            _ => false,
        };
        drop(table);

        if !granted {
            Logger::event(
                Event::LockConflict,
                &[("mode", mode.as_str()), ("resource", resource), ("tx_id", tx_id)],
            );
        }
        granted
    }

    /// Drops every hold `tx_id` has on `resource`. Idempotent.
    pub fn release(&self, resource: &str, tx_id: &str) {
        let mut table = self.table();
        if let Some(holders) = table.get_mut(resource) {
            holders.retain(|h| h.tx_id != tx_id);
            if holders.is_empty() {
                table.remove(resource);
            }
        }
    }

    /// Current holders of `resource`, empty when unlocked.
    pub fn list_locks(&self, resource: &str) -> Vec<LockHolder> {
        self.table().get(resource).cloned().unwrap_or_default()
    }

    /// Number of resources with at least one holder.
    pub fn locked_resources(&self) -> usize {
        self.table().len()
    }

    /// Like `acquire`, but returns a guard that releases on drop.
    pub fn try_lock(
        self: &Arc<Self>,
        resource: &str,
        mode: LockMode,
        tx_id: &str,
    ) -> Option<LockGuard> {
        if self.acquire(resource, mode, tx_id) {
            Some(LockGuard {
                manager: Arc::clone(self),
                resource: resource.to_string(),
                tx_id: tx_id.to_string(),
            })
        } else {
            None
        }
    }
}

/// Scoped hold on a resource; released however the scope is left.
#[derive(Debug)]
pub struct LockGuard {
    manager: Arc<LockManager>,
    resource: String,
    tx_id: String,
}

impl LockGuard {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.manager.release(&self.resource, &self.tx_id);
    }
}
