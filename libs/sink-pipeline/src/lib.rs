pub mod error;
mod endpoint;
mod sink;
mod source;

pub use error::PipelineError;
pub use endpoint::Endpoint;
pub use sink::Printer;
pub use source::{MessageStream, SinkOutcome, run_record_sink, spawn_record_sink};
