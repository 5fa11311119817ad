pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod storage;
pub mod uploader;
