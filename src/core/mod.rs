pub mod dominance;
pub mod engine;
pub mod parser;
pub mod pipeline;
pub mod summary;

pub use crate::domain::model::{DominanceSnapshot, ModelRecord, ParsedReport};
pub use crate::domain::ports::{
    ConfigProvider, MetadataProvider, Pipeline, ReportSource, Storage,
};
pub use crate::utils::error::Result;
