//! Infrastructure layer: vendor adapters and process-level setup

pub mod llm;
pub mod logging;
