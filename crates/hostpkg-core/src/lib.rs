pub mod adapters;
pub mod config;
pub mod execution;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod reconcile;
pub mod sqlite;
