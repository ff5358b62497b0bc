pub mod command;
pub mod metadata;
pub mod report_source;
