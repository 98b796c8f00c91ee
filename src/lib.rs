pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod platform;
pub mod scripts;
pub mod select;
pub mod shutdown;
pub mod stats;
pub mod workspace;
