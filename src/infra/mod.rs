//! Infrastructure adapters for queues, status cells and document stores.

pub mod queue;
pub mod store;

pub use queue::{InMemoryQueue, InMemoryStatusBoard};
#[cfg(feature = "redis-backend")]
pub use queue::{RedisQueue, RedisStatusBoard};
pub use store::{InMemoryStore, JsonlStore};
