//! Queue and status-cell backends.

pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use memory::{InMemoryQueue, InMemoryStatusBoard};
#[cfg(feature = "redis-backend")]
pub use self::redis::{RedisQueue, RedisStatusBoard};
