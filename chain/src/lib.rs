pub mod config;
pub mod node_config;

pub use config::{Network, NetworkParams, MAX_FUTURE_BLOCK_TIME, MEDIAN_TIME_SPAN};
pub use node_config::{ConfigError, NodeConfig};
