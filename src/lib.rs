//! Chart ingestion library: resolution, dedup, staging and relational load.

pub mod assembler;
pub mod catalog;
pub mod chart_files;
pub mod config;
pub mod export;
pub mod ledger;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod safety;
pub mod schema;
pub mod spotify;
pub mod staging;
