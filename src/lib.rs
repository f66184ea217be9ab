pub mod catalog;
pub mod config;
pub mod llm;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod protocol;
pub mod record;
pub mod stages;
pub mod ws;
