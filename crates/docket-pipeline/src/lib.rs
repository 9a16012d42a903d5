pub mod orchestrator;
pub mod pipeline;
pub mod queue;

pub use orchestrator::{BatchRun, ExtractionRun, Orchestrator};
pub use pipeline::DocumentPipeline;
pub use queue::{BatchQueue, JobProcessor};
