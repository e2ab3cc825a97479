pub mod clean;
pub mod config;
pub mod load;
pub mod metrics;
pub mod scan;
pub mod store;
