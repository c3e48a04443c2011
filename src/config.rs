use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use color_eyre::eyre::{Result, WrapErr};
use serde::Deserialize;
use tracing::info;

use crate::network::manager::ManagerSettings;
use crate::network::sim::SimBehavior;

// ─── Embedded Default ────────────────────────────────────────────────────
/// Baked into the binary at compile time, always available as the base layer.
const DEFAULT_CONFIG_TOML: &str = include_str!("../default_config.toml");

// ─── CLI Arguments (override layer) ─────────────────────────────────────
#[derive(Args, Debug, Clone, Default)]
pub struct CliArgs {
    /// WiFi interface to use (overrides config file)
    #[arg(short, long, global = true)]
    pub interface: Option<String>,

    /// Log level filter (overrides config file)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Path to a custom config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log file path (logs go to stderr if not specified)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Print the default config to stdout and exit
    #[arg(long)]
    pub print_default_config: bool,
}

// ─── TOML Structs ───────────────────────────────────────────────────────

/// Root configuration, parsed from TOML, then overridden by CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub disconnect: DisconnectConfig,
    #[serde(default)]
    pub ap: ApConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// WiFi interface
    pub interface: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DisconnectConfig {
    /// Link state sampling period while confirming a disconnect
    pub poll_interval_ms: u64,

    /// Deadline for the engine to report DISCONNECTED
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApConfig {
    /// Default station inactivity timeout for AP profiles
    pub sta_inactivity_timeout_secs: u32,

    /// Station limit set on enable; runtime changes may not exceed it
    pub max_num_sta: u32,
}

/// Timing of the simulated engine. A missing key means "never".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub associate_after_ms: Option<u64>,
    #[serde(default)]
    pub disconnect_after_ms: Option<u64>,
}

// ─── Defaults ───────────────────────────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".into(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DisconnectConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            timeout_ms: 5000,
        }
    }
}

impl Default for ApConfig {
    fn default() -> Self {
        Self {
            sta_inactivity_timeout_secs: 300,
            max_num_sta: 4,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            associate_after_ms: Some(2000),
            disconnect_after_ms: Some(50),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

// ─── Path Resolution ────────────────────────────────────────────────────

impl Config {
    /// Standard config file path: ~/.config/nexus-wpas/config.toml
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nexus-wpas")
            .join("config.toml")
    }

    pub fn interface(&self) -> &str {
        self.general.interface.trim()
    }

    /// Manager tunables from the `[disconnect]` and `[ap]` sections
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            // A zero interval would spin
            disconnect_poll_interval: Duration::from_millis(self.disconnect.poll_interval_ms.max(1)),
            disconnect_timeout: Duration::from_millis(self.disconnect.timeout_ms),
            ap_sta_inactivity_timeout: self.ap.sta_inactivity_timeout_secs,
            ap_max_num_sta: self.ap.max_num_sta,
        }
    }

    pub fn sim_behavior(&self) -> SimBehavior {
        SimBehavior {
            associate_after: self.simulation.associate_after_ms.map(Duration::from_millis),
            disconnect_after: self.simulation.disconnect_after_ms.map(Duration::from_millis),
        }
    }
}

// ─── Bootloader ─────────────────────────────────────────────────────────

/// The single entry point for configuration. Called exactly once at startup.
///
/// 1. Resolve config file path (CLI override or default)
/// 2. If the file doesn't exist, create the directory tree and write defaults
/// 3. Parse TOML from disk into Config
/// 4. Apply CLI overrides on top
pub fn load(cli: &CliArgs) -> Result<Config> {
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);

    if !config_path.exists() {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&config_path, DEFAULT_CONFIG_TOML).wrap_err_with(|| {
            format!(
                "Failed to write default config to {}",
                config_path.display()
            )
        })?;
        info!("Created default config at {}", config_path.display());
    }

    let toml_str = std::fs::read_to_string(&config_path)
        .wrap_err_with(|| format!("Failed to read config from {}", config_path.display()))?;

    let mut config = parse(&toml_str).wrap_err_with(|| {
        format!(
            "Failed to parse config at {}.\n\
             Delete the file to regenerate defaults, or run:\n  \
             nexus-wpas --print-default-config > {:?}",
            config_path.display(),
            config_path
        )
    })?;

    // ── CLI overrides ───────────────────────────────────────────────
    if let Some(ref iface) = cli.interface {
        config.general.interface = iface.clone();
    }
    if let Some(ref level) = cli.log_level {
        config.general.log_level = level.clone();
    }

    Ok(config)
}

pub fn parse(toml_str: &str) -> Result<Config> {
    Ok(toml::from_str(toml_str)?)
}

/// Returns the embedded default config TOML string.
pub fn default_config_toml() -> &'static str {
    DEFAULT_CONFIG_TOML
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_matches_struct_defaults() {
        let parsed = parse(default_config_toml()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_missing_sections_fall_back() {
        let config = parse("[general]\ninterface = \"wlp2s0\"\n").unwrap();
        assert_eq!(config.interface(), "wlp2s0");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.disconnect.timeout_ms, 5000);
        assert_eq!(config.ap.max_num_sta, 4);
    }

    #[test]
    fn test_omitted_simulation_timing_means_never() {
        let config = parse("[simulation]\nassociate_after_ms = 100\n").unwrap();
        let behavior = config.sim_behavior();
        assert_eq!(behavior.associate_after, Some(Duration::from_millis(100)));
        assert_eq!(behavior.disconnect_after, None);
    }

    #[test]
    fn test_manager_settings() {
        let config = parse("[disconnect]\npoll_interval_ms = 0\ntimeout_ms = 250\n").unwrap();
        let settings = config.manager_settings();
        assert_eq!(settings.disconnect_poll_interval, Duration::from_millis(1));
        assert_eq!(settings.disconnect_timeout, Duration::from_millis(250));
        assert_eq!(settings.ap_sta_inactivity_timeout, 300);
    }

    #[test]
    fn test_cli_overrides() {
        let dir = std::env::temp_dir().join(format!("nexus-wpas-test-{}", std::process::id()));
        let path = dir.join("config.toml");
        let cli = CliArgs {
            interface: Some("wlan7".into()),
            config: Some(path.clone()),
            ..Default::default()
        };

        let config = load(&cli).unwrap();
        assert!(path.exists());
        assert_eq!(config.interface(), "wlan7");
        assert_eq!(config.general.log_level, "info");

        std::fs::remove_dir_all(dir).ok();
    }
}
