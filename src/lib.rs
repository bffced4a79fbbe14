pub mod chart;
pub mod config;
pub mod enrich;
pub mod error;
pub mod export;
pub mod fetch;
pub mod pipeline;
pub mod process;
pub mod schema;
