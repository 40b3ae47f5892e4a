mod extract;
mod ingest_clock;
mod uplink_handler;
mod uplink_ingestor;

pub use extract::*;
pub use ingest_clock::*;
pub use uplink_handler::*;
pub use uplink_ingestor::*;
