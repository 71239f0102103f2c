pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod jobs;
pub mod memory;
pub mod ops;
pub mod workflow;
pub mod writer;

pub use config::{CategoricalEncoding, OutputCompression, PreprocConfig};
pub use error::{PreprocError, Result};
pub use jobs::{process_criteo, run_all, JobSummary};
pub use writer::ShufflePolicy;
