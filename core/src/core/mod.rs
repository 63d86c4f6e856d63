pub mod extractor;
pub mod registry;
pub mod runner;
