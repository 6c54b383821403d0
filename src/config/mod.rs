pub mod pipeline;

pub use pipeline::{CategorySources, PipelineConfig};
