pub mod config;
pub mod connector;
pub mod draft;
pub mod error_translator;
pub mod gate;
pub mod platform_api;
pub mod provider;
pub mod registry_gate;
pub mod schema;
pub mod session;
pub mod utils;

extern crate log;

#[cfg(test)]
mod test_utils;
