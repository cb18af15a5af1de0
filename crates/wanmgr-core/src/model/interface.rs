//! The WAN interface record
//!
//! One record exists per configured WAN interface for the lifetime of the
//! process. The owning interface task mutates it while holding the record
//! lock; the policy loop and the IPC bridge touch it through the same lock.

use serde::{Deserialize, Serialize};

use crate::config::InterfaceConfig;
use crate::model::lease::{Ipv4Data, Ipv4LeaseEvent, Ipv6Data, Ipv6LeaseEvent, MaptParams};
use crate::model::status::{
    DsliteStatus, FamilyStatus, InterfaceKind, InterfaceStatusUpdate, IpcpStatus, LinkStatus,
    MaptStatus, PhyStatus, PppLinkType, SelectionStatus, WanStatus,
};
use crate::sm::WanState;

/// Physical layer view of the interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhyInfo {
    pub status: PhyStatus,
    /// Data-model path of the owning link (".../Ethernet...", ".../Cellular...")
    pub path: String,
}

/// WAN layer configuration and status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WanInfo {
    pub enable: bool,
    pub status: WanStatus,
    pub link_status: LinkStatus,
    /// Layer-3 interface name; empty until the link manager provides it
    pub name: String,
    pub enable_dhcp: bool,
    pub enable_mapt: bool,
    pub enable_dslite: bool,
    pub enable_ipoe: bool,
    pub enable_xlat: bool,
    /// Link manager asked for a full refresh of the WAN stack
    pub refresh: bool,
    /// EnableDHCP was toggled at runtime
    pub refresh_dhcp: bool,
    pub active_link: bool,
}

/// Per-family IP state, pending payloads and client pids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpState {
    pub path: String,

    pub ipv4_status: FamilyStatus,
    pub ipv4_changed: bool,
    pub ipv4_renewed: bool,
    pub ipv4: Ipv4Data,
    pub dhcp4c_pid: Option<u32>,
    /// Staged DHCPv4 payload; at most one outstanding
    pub pending_v4: Option<Ipv4LeaseEvent>,

    pub ipv6_status: FamilyStatus,
    pub ipv6_changed: bool,
    pub ipv6_renewed: bool,
    pub ipv6: Ipv6Data,
    pub dhcp6c_pid: Option<u32>,
    /// Staged DHCPv6 payload; at most one outstanding
    pub pending_v6: Option<Ipv6LeaseEvent>,
}

/// PPP sub-state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PppState {
    pub enable: bool,
    pub link_type: PppLinkType,
    pub ipcp_status: IpcpStatus,
    pub ipv6cp_status: IpcpStatus,
    pub path: String,
}

/// MAP-T sub-state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaptState {
    pub status: MaptStatus,
    /// New rule parameters arrived while MAP-T was configured
    pub changed: bool,
    pub params: Option<MaptParams>,
}

/// A WAN interface record
#[derive(Debug, Clone, Default)]
pub struct WanInterface {
    pub index: usize,
    pub instance_number: u32,
    /// Configured name, stable across restarts of the interface task
    pub name: String,
    pub base_interface: String,
    pub kind: InterfaceKind,
    pub phy: PhyInfo,
    pub wan: WanInfo,
    pub selection_status: SelectionStatus,
    pub ip: IpState,
    pub ppp: PppState,
    pub mapt: MaptState,
    pub dslite_status: DsliteStatus,
    /// Last state stored by the interface task
    pub current_state: WanState,
}

impl WanInterface {
    /// Build a record from its configuration
    pub fn from_config(index: usize, config: &InterfaceConfig) -> Self {
        Self {
            index,
            instance_number: index as u32 + 1,
            name: config.name.clone(),
            base_interface: config.base_interface.clone(),
            kind: config.kind,
            phy: PhyInfo {
                status: PhyStatus::Down,
                path: config.phy_path.clone(),
            },
            wan: WanInfo {
                enable: config.enable,
                name: config.name.clone(),
                enable_dhcp: config.enable_dhcp,
                enable_mapt: config.enable_mapt,
                enable_dslite: config.enable_dslite,
                enable_ipoe: config.enable_ipoe,
                enable_xlat: config.enable_xlat,
                active_link: config.active_link,
                ..Default::default()
            },
            ppp: PppState {
                enable: config.enable_ppp,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn is_ppp(&self) -> bool {
        self.ppp.enable
    }

    pub fn is_remote(&self) -> bool {
        self.kind == InterfaceKind::Remote
    }

    pub fn is_cellular(&self) -> bool {
        self.kind == InterfaceKind::Cellular || self.phy.path.contains("Cellular")
    }

    pub fn is_ethernet(&self) -> bool {
        self.phy.path.contains("Ethernet")
    }

    pub fn is_active(&self) -> bool {
        self.selection_status == SelectionStatus::Active
    }

    /// Apply a connection status update to the record
    ///
    /// Status-store side effects of `Ipv6Down` are applied by the caller.
    pub fn update_status(&mut self, update: InterfaceStatusUpdate) {
        match update {
            InterfaceStatusUpdate::ConnectionUp => {
                self.ip.ipv4_status = FamilyStatus::Up;
            }
            InterfaceStatusUpdate::ConnectionDown => {
                self.ip.ipv4_status = FamilyStatus::Down;
                self.ip.ipv4_changed = false;
                self.ip.ipv4_renewed = false;
                self.ip.ipv4.ip.clear();
            }
            InterfaceStatusUpdate::Ipv6Up => {
                self.ip.ipv6_status = FamilyStatus::Up;
            }
            InterfaceStatusUpdate::Ipv6Down => {
                self.ip.ipv6_status = FamilyStatus::Down;
                self.ip.ipv6_changed = false;
                self.ip.ipv6_renewed = false;
                self.mapt.status = MaptStatus::Down;
                self.mapt.changed = false;
                self.ip.ipv6.address.clear();
                self.ip.ipv6.pd_if_address.clear();
                self.ip.ipv6.site_prefix.clear();
                self.ip.ipv6.nameserver.clear();
                self.ip.ipv6.nameserver1.clear();
            }
            InterfaceStatusUpdate::MaptStart => {
                self.mapt.status = MaptStatus::Up;
            }
            InterfaceStatusUpdate::MaptStop => {
                self.mapt.status = MaptStatus::Down;
                self.mapt.changed = false;
            }
        }
    }

    /// Forget everything learnt from DHCP for both families
    pub fn clear_dhcp_data(&mut self) {
        self.ip = IpState::default();
    }

    /// Forget the IPv4 lease, pid and any staged payload
    pub fn clear_ipv4(&mut self) {
        self.ip.ipv4_status = FamilyStatus::Down;
        self.ip.ipv4_changed = false;
        self.ip.ipv4_renewed = false;
        self.ip.ipv4 = Ipv4Data::default();
        self.ip.dhcp4c_pid = None;
        self.ip.pending_v4 = None;
    }

    /// Forget the IPv6 lease, pid and any staged payload
    pub fn clear_ipv6(&mut self) {
        self.ip.ipv6_status = FamilyStatus::Down;
        self.ip.ipv6_changed = false;
        self.ip.ipv6_renewed = false;
        self.ip.ipv6 = Ipv6Data::default();
        self.ip.dhcp6c_pid = None;
        self.ip.pending_v6 = None;
    }
}
