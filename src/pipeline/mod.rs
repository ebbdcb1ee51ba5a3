// Pipeline: processing phases, step orchestration, and the export boundary

pub mod export;
pub mod orchestrator;
pub mod pipeline_config;
pub mod processing;
pub mod steps;
