use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mdbeta_core::BlockPos;
use mdbeta_server::SessionSettings;
use mdbeta_world::BlockCatalog;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind: SocketAddr,
    /// Half-width of each client's visibility square, in chunks.
    pub view_radius: i32,
    /// Soft cap on chunks held per session.
    pub window_capacity: usize,
    pub ping_interval_secs: u64,
    pub time_interval_secs: u64,
    /// Taxicab pickup radius in 1/32-block units.
    pub pickup_radius: i64,
    /// World spawn block as [x, y, z].
    pub spawn: [i32; 3],
    pub ticks_per_second: u32,
    pub growth_min_secs: u64,
    pub growth_max_secs: u64,
    /// JSON block catalog; the stock beta table when unset.
    pub catalog: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 25565)),
            view_radius: 10,
            window_capacity: 600,
            ping_interval_secs: 5,
            time_interval_secs: 10,
            pickup_radius: 64,
            spawn: [0, 64, 0],
            ticks_per_second: 20,
            growth_min_secs: 15,
            growth_max_secs: 60,
            catalog: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `path`, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ServerConfig>(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    ServerConfig::default()
                }
            },
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    warn!(
                        "Server config not found at {}. Using defaults",
                        path.display()
                    );
                } else {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                }
                ServerConfig::default()
            }
        }
    }

    pub fn block_catalog(&self) -> BlockCatalog {
        match &self.catalog {
            Some(path) => BlockCatalog::load_from_path(path),
            None => BlockCatalog::beta(),
        }
    }

    pub fn spawn_pos(&self) -> BlockPos {
        let [x, y, z] = self.spawn;
        BlockPos::new(x, y, z)
    }

    /// Per-session tunables. Intervals are at least one second and the growth
    /// range is never empty.
    pub fn to_settings(&self) -> SessionSettings {
        let growth_min = self.growth_min_secs.max(1);
        let growth_max = self.growth_max_secs.max(growth_min);
        SessionSettings {
            view_radius: self.view_radius.max(1),
            window_capacity: self.window_capacity,
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
            time_interval: Duration::from_secs(self.time_interval_secs.max(1)),
            pickup_radius: self.pickup_radius,
            growth_delay_secs: growth_min..=growth_max,
        }
    }
}
