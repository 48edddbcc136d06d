//! Application-level lock manager
//!
//! Coordinates writers across nodes by resource name. It is an explicit
//! object: share it behind an `Arc` with whatever needs to lock, and give
//! every test its own instance.

mod manager;

pub use manager::{LockGuard, LockHolder, LockManager, LockMode};
