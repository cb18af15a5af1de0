//! Collaborator traits for the WAN manager
//!
//! This module defines the abstract interfaces the state machine drives.
//! All of them stand for things outside this crate's scope:
//!
//! - [`SystemNetworkConfigurator`]: addresses, routes, resolver, MAP-T
//! - [`DhcpClientControl`], [`PppControl`], [`HealthCheckService`]: helper processes
//! - [`LinkLayerManager`]: physical/link owners and the WAN status surface
//! - [`StatusStore`]: volatile and persistent key/value status
//!
//! [`Platform`] bundles one implementation of each so constructors take a
//! single argument.

pub mod link;
pub mod network;
pub mod process;
pub mod status_store;

pub use link::{CellularIpInfo, LinkLayerManager};
pub use network::SystemNetworkConfigurator;
pub use process::{DhcpClientControl, HealthCheckService, PppControl};
pub use status_store::StatusStore;

use std::sync::Arc;

use crate::ipc::IhcTransport;

/// The set of collaborators an interface state machine runs against
#[derive(Clone)]
pub struct Platform {
    pub network: Arc<dyn SystemNetworkConfigurator>,
    pub dhcp: Arc<dyn DhcpClientControl>,
    pub ppp: Arc<dyn PppControl>,
    pub health_check: Arc<dyn HealthCheckService>,
    pub link: Arc<dyn LinkLayerManager>,
    pub status: Arc<dyn StatusStore>,
    pub ihc_transport: Arc<dyn IhcTransport>,
}
