pub mod archive;
pub mod collector;
pub mod config;
pub mod download;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod orchestrator;
pub mod selection;
pub mod site;

#[cfg(test)]
pub mod testing;
