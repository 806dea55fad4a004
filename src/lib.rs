pub mod adapter;
pub mod broker;
pub mod config;
pub mod connector;
pub mod context;
pub mod descriptor;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod executor;
#[cfg(test)]
mod mock;
pub mod prelude;
pub mod registry;
pub mod utils;
