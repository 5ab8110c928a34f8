//! Redis storage layer for sign-in nonces and sessions.
//!
//! All functions are async and generic over `redis::AsyncCommands`.
//! Data is serialized to JSON for storage in Redis.

pub mod session;
