mod session;
mod subscriber;
mod topic;

pub use session::*;
pub use subscriber::*;
pub use topic::*;

pub use rumqttc::QoS;
