//! Resources shared by the decorators.
//!
//! - Concurrency limiters keyed by owner name
//! - Lockers and the in-process lock table
//! - Result caches
//! - Transaction demarcation and the timeout guard

mod cache;
mod limiter;
mod locker;
mod transaction;

pub use cache::{Cache, CacheEntry, InMemoryCache};
pub use limiter::{LimiterPermit, LimiterRegistry};
pub use locker::{InMemoryLocker, LockGuard, LockTable, LockToken, Locker};
pub use transaction::{
    LocalTransactionManager, Propagation, TimeoutGuard, TransactionDefinition, TransactionHandle,
    TransactionManager, TransactionScope,
};
