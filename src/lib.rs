pub mod errors;
pub mod host;
pub mod credentials;
pub mod remote;
pub mod rewrite;
pub mod commands;

// Re-export common items at crate root for embedders/tests
pub use commands::{Decompiler, ServiceConfig};
pub use errors::RdecError;
pub use host::{AnalysisView, HostUi};
pub use remote::orchestrator::{CancelFlag, JobOrchestrator, JobState, PollConfig};
pub use remote::request::{Architecture, Endianness, JobMode, JobRequest, RequestBuilder};
pub use rewrite::{PseudocodeRewriter, SymbolSource};
