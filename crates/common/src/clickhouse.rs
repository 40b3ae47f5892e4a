mod client;
mod config;
mod uplink_repository;

pub use client::*;
pub use config::*;
pub use uplink_repository::*;
