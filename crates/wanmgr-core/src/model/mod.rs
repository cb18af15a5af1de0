//! Data model: interface records, global config, lease payloads and status enums.

pub mod interface;
pub mod lease;
pub mod status;
pub mod wan_config;

pub use interface::{IpState, MaptState, PhyInfo, PppState, WanInfo, WanInterface};
pub use lease::{Ipv4Data, Ipv4LeaseEvent, Ipv6Data, Ipv6LeaseEvent, MaptParams};
pub use status::*;
pub use wan_config::WanConfig;
