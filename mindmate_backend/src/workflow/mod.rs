pub mod analysis;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod response;
pub mod summarizer;
pub mod summary_cache;
pub mod trigger;
pub mod types;

pub use error::WorkflowError;
pub use orchestrator::{MindMateWorkflow, WorkflowState};
