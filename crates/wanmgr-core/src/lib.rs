// # wanmgr-core
//
// Core library for the broadband WAN manager.
//
// ## Architecture Overview
//
// This library brings WAN interfaces up and down and keeps the rest of the
// gateway informed:
// - **SharedWanStore**: Interface records and global configuration behind bounded locks
// - **IpcBridge**: Stages DHCP leases and acts on health-check events
// - **InterfaceStateMachine**: Per-interface lifecycle from link up to dual stack and MAP-T
// - **InterfaceRunner**: One task per interface driving its state machine
// - **PolicyDispatchLoop**: Selects interfaces according to the configured policy
// - **WanManager**: Engine tying the above together
//
// ## Design Principles
//
// 1. **Separation of Concerns**: System side effects go through collaborator traits
// 2. **Single Owner per Record**: A record is mutated only under its lock, one lock at a time
// 3. **One Guard, One Dispatch**: Deconfiguration preconditions are checked once per tick
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Published State**: Every transition is reflected in the status store

pub mod config;
pub mod controller;
pub mod dns;
pub mod engine;
pub mod error;
pub mod events;
pub mod ihc;
pub mod ipc;
pub mod keys;
pub mod model;
pub mod runner;
pub mod sm;
pub mod state;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{InterfaceConfig, IpcConfig, ManagerConfig, MaptRefreshConfig, StatusStoreConfig};
pub use controller::{FixedModePolicy, PolicyContext, PolicyDispatchLoop, PolicyRunner};
pub use engine::WanManager;
pub use error::{Error, Result};
pub use events::{EventSink, WanEvent};
pub use ipc::{IpcBridge, IpcMessage, IpcSource, IhcTransport};
pub use runner::InterfaceRunner;
pub use sm::{InterfaceStateMachine, WanController, WanState};
pub use state::{FileStatusStore, MemoryStatusStore};
pub use store::SharedWanStore;
pub use traits::{
    DhcpClientControl, HealthCheckService, LinkLayerManager, Platform, PppControl, StatusStore,
    SystemNetworkConfigurator,
};
