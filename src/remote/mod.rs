pub mod client;
pub mod orchestrator;
pub mod request;
pub mod staging;
