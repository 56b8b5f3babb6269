//! # taskfab-store
//!
//! Concrete `Store` adapters beyond `taskfab_shared::InMemoryStore`.
//! Currently ships a Redis-backed adapter, gated behind the `redis-backend`
//! feature so the default build and the test harness carry no dependency on
//! a running Redis instance.

#[cfg(feature = "redis-backend")]
pub mod redis_store;

#[cfg(feature = "redis-backend")]
pub use redis_store::RedisStore;
