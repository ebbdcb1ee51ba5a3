pub mod common;
pub mod config;
pub mod domain;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod source;
