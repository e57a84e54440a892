pub mod settings;

pub use settings::{Config, FileOutputConfig, OutputConfig};
