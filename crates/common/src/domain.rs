mod result;
mod uplink;

pub use result::*;
pub use uplink::*;
