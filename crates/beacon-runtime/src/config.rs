//! Runtime configuration from the environment.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BEACON_ORGANIZATION_ID` | - | Organization id; without it the saved profile is restored |
//! | `BEACON_PROFILE_ID` | - | Profile (site) id, required with an organization id |
//! | `BEACON_DATA_SOURCE` | - | Data source, required with an organization id |
//! | `BEACON_CHANNEL` | `RUST` | Initial channel |
//! | `BEACON_REQUEST_TIMEOUT_SECS` | `60` | Network timeout |
//! | `BEACON_IN_APP_ENABLED` | `true` | Run targeting checks after page views |
//! | `BEACON_DATA_DIR` | `./beacon-data` | Storage directory |
//! | `BEACON_APP_VERSION` | - | Host application version |
//! | `BEACON_PRINT_METRICS` | `false` | Print metrics to stdout on exit |

use anyhow::{bail, Context, Result};
use beacon_tracking::{DeviceInfo, ProfileConfig};
use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = "./beacon-data";

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// `None` means: restore the profile saved by a previous run
    pub profile: Option<ProfileConfig>,
    pub device: DeviceInfo,
    pub data_dir: PathBuf,
    pub print_metrics: bool,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let profile = match var("BEACON_ORGANIZATION_ID") {
            None => None,
            Some(organization_id) => {
                let profile_id =
                    var("BEACON_PROFILE_ID").context("BEACON_PROFILE_ID is required")?;
                let data_source =
                    var("BEACON_DATA_SOURCE").context("BEACON_DATA_SOURCE is required")?;

                let mut profile = ProfileConfig::new(organization_id, profile_id, data_source);
                if let Some(channel) = var("BEACON_CHANNEL") {
                    profile = profile.with_channel(channel);
                }
                if let Some(timeout) = var("BEACON_REQUEST_TIMEOUT_SECS") {
                    let seconds = timeout
                        .parse()
                        .with_context(|| format!("invalid BEACON_REQUEST_TIMEOUT_SECS: {timeout}"))?;
                    profile = profile.with_request_timeout(seconds);
                }
                if let Some(flag) = var("BEACON_IN_APP_ENABLED") {
                    let enabled = parse_flag("BEACON_IN_APP_ENABLED", &flag)?;
                    profile = profile.with_in_app_notifications(enabled);
                }
                Some(profile)
            }
        };

        let print_metrics = match var("BEACON_PRINT_METRICS") {
            Some(flag) => parse_flag("BEACON_PRINT_METRICS", &flag)?,
            None => false,
        };

        Ok(Self {
            profile,
            device: DeviceInfo {
                app_version: var("BEACON_APP_VERSION"),
                user_agent: Some(format!("beacon-runtime/{}", env!("CARGO_PKG_VERSION"))),
                advertising_id: None,
            },
            data_dir: var("BEACON_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            print_metrics,
        })
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("invalid {key}: {other}"),
    }
}
