pub mod config;
pub mod contract;
pub mod country;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod reshape;
pub mod source;
pub mod table;
