pub mod config;
pub mod constants;
pub mod dates;
pub mod error;
pub mod export;
pub mod fetch;
pub mod layer;
pub mod logging;
pub mod lookup;
pub mod pipeline;
pub mod remote;
pub mod scrapers;
pub mod storage;
pub mod types;
