pub mod domain;
pub mod mqtt;
mod uplink_ingester;

pub use uplink_ingester::*;
