pub mod auth;
pub mod challenge;
pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod storage;
