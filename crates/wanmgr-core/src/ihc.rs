//! IPoE health-check settings
//!
//! The health-check process reads its parameters from persistent keys.
//! This module loads and saves them and keeps the forced-renew action
//! counter used by the IPC bridge.

use serde::{Deserialize, Serialize};

use crate::keys;
use crate::traits::StatusStore;

/// Forced VLAN renews allowed before further requests are refused
pub const MAX_FORCED_RENEWS: u32 = 5;

/// Persisted IPoE health-check parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IhcSettings {
    pub enable: bool,
    /// Seconds between echo probes while the path is healthy
    pub regular_interval: u32,
    /// Failed probes before the path is declared down
    pub retry_limit: u32,
    /// Seconds between probes while retrying
    pub retry_interval: u32,
}

impl IhcSettings {
    /// Load the settings, treating missing or malformed keys as zero/false
    pub async fn load(status: &dyn StatusStore) -> Self {
        Self {
            enable: parse_flag(&status.get_persistent_or_empty(keys::IHC_ENABLE).await),
            regular_interval: parse_u32(
                &status
                    .get_persistent_or_empty(keys::IHC_REGULAR_INTERVAL)
                    .await,
            ),
            retry_limit: parse_u32(&status.get_persistent_or_empty(keys::IHC_RETRY_LIMIT).await),
            retry_interval: parse_u32(
                &status
                    .get_persistent_or_empty(keys::IHC_RETRY_INTERVAL)
                    .await,
            ),
        }
    }

    /// Persist the interval and retry parameters and commit
    ///
    /// The enable flag has its own setter, [`set_enable`].
    pub async fn save(&self, status: &dyn StatusStore) -> crate::Result<()> {
        status
            .set_persistent(keys::IHC_RETRY_INTERVAL, &self.retry_interval.to_string())
            .await?;
        status
            .set_persistent(keys::IHC_RETRY_LIMIT, &self.retry_limit.to_string())
            .await?;
        status
            .set_persistent(
                keys::IHC_REGULAR_INTERVAL,
                &self.regular_interval.to_string(),
            )
            .await?;
        status.commit().await
    }
}

/// Persist the health-check enable flag
pub async fn set_enable(status: &dyn StatusStore, enable: bool) -> crate::Result<()> {
    status
        .set_persistent(keys::IHC_ENABLE, if enable { "1" } else { "0" })
        .await?;
    status.commit().await
}

/// Number of forced renews performed so far
pub async fn action_count(status: &dyn StatusStore) -> u32 {
    parse_u32(&status.get_persistent_or_empty(keys::IHC_ACTIONS).await)
}

/// Increment the forced-renew counter
pub async fn record_action(status: &dyn StatusStore) -> crate::Result<u32> {
    let count = action_count(status).await.saturating_add(1);
    status
        .set_persistent(keys::IHC_ACTIONS, &count.to_string())
        .await?;
    Ok(count)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true")
}

fn parse_u32(value: &str) -> u32 {
    value.trim().parse().unwrap_or(0)
}
