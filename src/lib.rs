//! Tweet Sentiment — windowed lexicon sentiment over a partitioned tweet stream.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stats;
pub mod window;

pub use config::{LatePolicy, PipelineConfig, SinkConfig};
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use window::{RuntimeHandle, SentimentRuntime, WindowEvent};
