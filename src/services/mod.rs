pub mod analytics;
pub mod merge;
pub mod migration;
pub mod recorder;
