//! Stream lifecycle: registry, state machine, pipeline and orchestrator

pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod segments;
pub mod state;
pub mod types;

pub use orchestrator::{OrchestratorError, StreamOrchestrator};
pub use pipeline::PipelineDriver;
pub use registry::{RegistryError, StreamRegistry};
pub use segments::{SegmentError, validate_file_name};
pub use state::StreamState;
pub use types::{PipelineError, StreamId, StreamRecord};
