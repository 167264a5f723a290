//! Repowatch library — re-exports modules for integration tests.

pub mod bus;
pub mod config;
pub mod github;
pub mod ipc;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod store;
pub mod window;
