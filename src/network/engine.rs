//! Interface to the external supplicant engine.
//!
//! The engine owns the actual 802.11 handshake. We only talk to it through
//! typed control commands (rendered in the engine's CLI syntax) and a few
//! read-only queries of its live state.

use std::fmt;

use crate::error::WpasResult;
use crate::network::types::*;

/// A field of a network profile, rendered as `<name> <value>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkField {
    Mode(IfaceMode),
    Ssid(String),
    ScanSsid(bool),
    KeyMgmt(Vec<KeyMgmt>),
    Ieee80211w(MfpPolicy),
    ScanFreq(Vec<u32>),
    Proto(Vec<Proto>),
    Psk(String),
    SaePassword(String),
    Frequency(u32),
    Bssid(MacAddr),
    ApMaxInactivity(u32),
}

impl fmt::Display for NetworkField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mode(mode) => write!(f, "mode {}", mode.as_u8()),
            Self::Ssid(ssid) => write!(f, "ssid \"{ssid}\""),
            Self::ScanSsid(on) => write!(f, "scan_ssid {}", u8::from(*on)),
            Self::KeyMgmt(suites) => {
                write!(f, "key_mgmt")?;
                for suite in suites {
                    write!(f, " {}", suite.as_str())?;
                }
                Ok(())
            }
            Self::Ieee80211w(mfp) => write!(f, "ieee80211w {}", mfp.as_u8()),
            Self::ScanFreq(freqs) => {
                write!(f, "scan_freq")?;
                for freq in freqs {
                    write!(f, " {freq}")?;
                }
                Ok(())
            }
            Self::Proto(protos) => {
                write!(f, "proto")?;
                for proto in protos {
                    write!(f, " {}", proto.as_str())?;
                }
                Ok(())
            }
            Self::Psk(psk) => write!(f, "psk \"{psk}\""),
            Self::SaePassword(pw) => write!(f, "sae_password \"{pw}\""),
            Self::Frequency(freq) => write!(f, "frequency {freq}"),
            Self::Bssid(bssid) => write!(f, "bssid {bssid}"),
            Self::ApMaxInactivity(secs) => write!(f, "ap_max_inactivity {secs}"),
        }
    }
}

/// Control commands accepted by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RemoveAllNetworks,
    RemoveNetwork(NetworkId),
    SetNetwork(NetworkId, NetworkField),
    EnableNetwork(NetworkId),
    SelectNetwork(NetworkId),
    Disconnect,
    Disassociate(MacAddr),
    ApScan(u8),
    SetMaxNumSta(u32),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveAllNetworks => write!(f, "remove_network all"),
            Self::RemoveNetwork(id) => write!(f, "remove_network {id}"),
            Self::SetNetwork(id, field) => write!(f, "set_network {id} {field}"),
            Self::EnableNetwork(id) => write!(f, "enable_network {id}"),
            Self::SelectNetwork(id) => write!(f, "select_network {id}"),
            Self::Disconnect => write!(f, "disconnect"),
            Self::Disassociate(mac) => write!(f, "disassociate {mac}"),
            Self::ApScan(value) => write!(f, "ap_scan {value}"),
            Self::SetMaxNumSta(n) => write!(f, "set max_num_sta {n}"),
        }
    }
}

/// The profile the engine is currently using
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentNetwork {
    pub id: NetworkId,
    /// May be empty when the profile was matched by BSSID only
    pub ssid: Vec<u8>,
    pub mode: IfaceMode,
    pub key_mgmt: KeyMgmt,
    pub proto: Proto,
    pub ieee80211w: MfpPolicy,
}

/// Live engine state of one interface
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineSnapshot {
    pub state: LinkState,
    pub bssid: MacAddr,
    pub assoc_freq: u32,
    /// Negotiated suites (station side)
    pub key_mgmt: Option<KeyMgmt>,
    pub proto: Option<Proto>,
    pub current: Option<CurrentNetwork>,
    /// `None` until the driver has reported connection parameters
    pub capabilities: Option<LinkCapabilities>,
}

/// BSS parameters reported by the driver for the current link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnInfo {
    pub beacon_interval: u16,
    pub dtim_period: u8,
    pub twt_capable: bool,
}

/// The external supplicant.
///
/// Every method is addressed by interface name; a `None` / `DeviceNotFound`
/// answer means the engine has no handle for that interface.
pub trait Engine: Send + Sync {
    /// Current link state, the only thing the pollers look at
    fn link_state(&self, ifname: &str) -> Option<LinkState>;

    fn snapshot(&self, ifname: &str) -> Option<EngineSnapshot>;

    /// Create an empty profile slot
    fn add_network(&self, ifname: &str) -> WpasResult<NetworkId>;

    fn command(&self, ifname: &str, cmd: &Command) -> WpasResult<()>;

    /// Hardware channel table for a band, `None` if the radio has none
    fn hw_channels(&self, ifname: &str, band: Band) -> Option<Vec<HwChannel>>;

    /// RSSI of the current link in dBm
    fn signal_poll(&self, ifname: &str) -> WpasResult<i32>;

    fn conn_info(&self, ifname: &str) -> WpasResult<ConnInfo>;

    /// SSID as reported by the CLI `STATUS` command
    fn status_ssid(&self, ifname: &str) -> WpasResult<Vec<u8>>;
}
