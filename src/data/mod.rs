pub mod cache;
pub mod extractor_api;
pub mod historical;
pub mod markets_api;
pub mod news_api;
pub mod sources;
pub mod types;
