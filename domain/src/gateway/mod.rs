//! Clients for the external services this platform depends on.

pub mod llm;
pub mod object_storage;
pub mod volcengine_asr;
