pub mod analyzers;
pub mod config;
pub mod error;
pub mod features;
pub mod load;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod store;
pub mod transform;
