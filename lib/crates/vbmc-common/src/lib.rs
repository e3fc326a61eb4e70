pub mod config;
pub mod error;
pub mod rpc;
pub mod types;

pub use config::{AppConfig, ConfigError, IpmiConfig, LogConfig};
pub use error::{BmcError, BmcResult};
pub use rpc::{Message, Request, Response, WireError};
pub use types::*;
