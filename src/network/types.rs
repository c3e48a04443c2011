use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WpasError;

/// Maximum SSID length per IEEE 802.11.
pub const SSID_MAX_LEN: usize = 32;
/// Minimum WPA passphrase length.
pub const PSK_MIN_LEN: usize = 8;
/// Maximum WPA passphrase length.
pub const PSK_MAX_LEN: usize = 64;
/// Maximum SAE password length.
pub const SAE_PASSWORD_MAX_LEN: usize = 128;

/// Engine-side identifier of a network profile slot
pub type NetworkId = u32;

/// Security type of a WiFi network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityType {
    #[default]
    Open,
    /// WPA (TKIP era) personal
    WpaPsk,
    /// WPA2 personal
    Psk,
    PskSha256,
    /// WPA3 personal
    Sae,
    /// WPA/WPA2/WPA3 transition mode, everything enabled at once
    WpaAutoPersonal,
    Unknown,
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::WpaPsk => write!(f, "WPA-PSK"),
            Self::Psk => write!(f, "WPA2-PSK"),
            Self::PskSha256 => write!(f, "WPA2-PSK-SHA256"),
            Self::Sae => write!(f, "WPA3-SAE"),
            Self::WpaAutoPersonal => write!(f, "WPA/WPA2/WPA3 Personal"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl FromStr for SecurityType {
    type Err = WpasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" | "none" => Ok(Self::Open),
            "wpa-psk" | "wpa" => Ok(Self::WpaPsk),
            "psk" | "wpa2" | "wpa2-psk" => Ok(Self::Psk),
            "psk-sha256" | "wpa2-psk-sha256" => Ok(Self::PskSha256),
            "sae" | "wpa3" => Ok(Self::Sae),
            "auto" | "wpa-auto-personal" => Ok(Self::WpaAutoPersonal),
            _ => Err(WpasError::InvalidInput(format!("unknown security type: {s}"))),
        }
    }
}

impl SecurityType {
    pub fn needs_password(&self) -> bool {
        !matches!(self, Self::Open)
    }

    /// Map the engine's key management / protocol pair back to a security type
    pub fn from_key_mgmt(key_mgmt: KeyMgmt, proto: Proto) -> Self {
        match key_mgmt {
            KeyMgmt::None => Self::Open,
            KeyMgmt::Psk if proto == Proto::Rsn => Self::Psk,
            KeyMgmt::Psk => Self::WpaPsk,
            KeyMgmt::PskSha256 => Self::PskSha256,
            KeyMgmt::Sae => Self::Sae,
        }
    }
}

/// Key management suites understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyMgmt {
    None,
    Psk,
    PskSha256,
    Sae,
}

impl KeyMgmt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Psk => "WPA-PSK",
            Self::PskSha256 => "WPA-PSK-SHA256",
            Self::Sae => "SAE",
        }
    }
}

/// Protocol suites (WPA1 vs RSN/WPA2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Proto {
    Wpa,
    Rsn,
}

impl Proto {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wpa => "WPA",
            Self::Rsn => "RSN",
        }
    }
}

/// Management frame protection (802.11w) policy, numbered as the engine expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MfpPolicy {
    #[default]
    Disabled,
    Optional,
    Required,
}

impl MfpPolicy {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::Optional => 1,
            Self::Required => 2,
        }
    }
}

impl fmt::Display for MfpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::Optional => write!(f, "Optional"),
            Self::Required => write!(f, "Required"),
        }
    }
}

impl FromStr for MfpPolicy {
    type Err = WpasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" | "0" => Ok(Self::Disabled),
            "optional" | "1" => Ok(Self::Optional),
            "required" | "2" => Ok(Self::Required),
            _ => Err(WpasError::InvalidInput(format!("unknown MFP policy: {s}"))),
        }
    }
}

/// Frequency band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    TwoGhz,
    FiveGhz,
    SixGhz,
}

impl Band {
    pub fn from_mhz(freq: u32) -> Option<Self> {
        match freq {
            2400..=2500 => Some(Self::TwoGhz),
            5000..=5900 => Some(Self::FiveGhz),
            5925..=7125 => Some(Self::SixGhz),
            _ => None,
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TwoGhz => write!(f, "2.4 GHz"),
            Self::FiveGhz => write!(f, "5 GHz"),
            Self::SixGhz => write!(f, "6 GHz"),
        }
    }
}

impl FromStr for Band {
    type Err = WpasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().trim_end_matches("ghz").trim() {
            "2" | "2.4" => Ok(Self::TwoGhz),
            "5" => Ok(Self::FiveGhz),
            "6" => Ok(Self::SixGhz),
            _ => Err(WpasError::InvalidInput(format!("unknown band: {s}"))),
        }
    }
}

/// Requested channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Channel {
    #[default]
    Any,
    Number(u8),
}

impl FromStr for Channel {
    type Err = WpasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("any") {
            return Ok(Self::Any);
        }
        s.parse::<u8>()
            .map(Self::Number)
            .map_err(|_| WpasError::InvalidInput(format!("invalid channel: {s}")))
    }
}

/// One entry of a band's hardware channel table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwChannel {
    pub chan: u8,
    pub freq: u32,
}

/// Compute WiFi channel from frequency in MHz
pub fn channel_from_frequency(freq: u32) -> u32 {
    match freq {
        2484 => 14,
        f if (2412..=2472).contains(&f) => (f - 2407) / 5,
        // 5 GHz: channel = (freq - 5000) / 5
        f if (5000..=5900).contains(&f) => (f - 5000) / 5,
        // 6 GHz: channel = (freq - 5950) / 5
        f if (5925..=7125).contains(&f) => (f - 5950) / 5,
        _ => 0,
    }
}

/// Global operating classes tried, in order, when a channel is given without a band.
/// 81 and 82 cover 2.4 GHz, 128 is the widest 5 GHz class.
pub const GLOBAL_OP_CLASSES: [u8; 3] = [81, 82, 128];

/// Channel to frequency within one global operating class
pub fn op_class_chan_to_freq(op_class: u8, chan: u8) -> Option<u32> {
    let chan = chan as u32;
    match op_class {
        81 if (1..=13).contains(&chan) => Some(2407 + 5 * chan),
        82 if chan == 14 => Some(2484),
        128 if (36..=177).contains(&chan) => Some(5000 + 5 * chan),
        _ => None,
    }
}

/// Resolve a bare channel number using the first global operating class that knows it
pub fn chan_to_freq(chan: u8) -> Option<u32> {
    GLOBAL_OP_CLASSES
        .iter()
        .find_map(|&op_class| op_class_chan_to_freq(op_class, chan))
}

/// 48-bit MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    pub const UNSPECIFIED: MacAddr = MacAddr([0; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Group bit set (broadcast included)
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = WpasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WpasError::InvalidInput(format!("invalid MAC address: {s}"));
        let mut bytes = [0u8; 6];
        let mut parts = s.trim().split(|c: char| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

/// Engine link state, in handshake order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum LinkState {
    #[default]
    Disconnected,
    InterfaceDisabled,
    Inactive,
    Scanning,
    Authenticating,
    Associating,
    Associated,
    FourWayHandshake,
    GroupHandshake,
    Completed,
}

impl LinkState {
    pub fn is_associated(&self) -> bool {
        *self >= Self::Associated
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::InterfaceDisabled => "INTERFACE_DISABLED",
            Self::Inactive => "INACTIVE",
            Self::Scanning => "SCANNING",
            Self::Authenticating => "AUTHENTICATING",
            Self::Associating => "ASSOCIATING",
            Self::Associated => "ASSOCIATED",
            Self::FourWayHandshake => "4WAY_HANDSHAKE",
            Self::GroupHandshake => "GROUP_HANDSHAKE",
            Self::Completed => "COMPLETED",
        };
        write!(f, "{s}")
    }
}

/// Operating mode of a network profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IfaceMode {
    Station,
    Ibss,
    AccessPoint,
}

impl IfaceMode {
    /// Value of the engine's `mode` network field
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Station => 0,
            Self::Ibss => 1,
            Self::AccessPoint => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Station => "STA",
            Self::Ibss => "IBSS",
            Self::AccessPoint => "AP",
        }
    }
}

/// WiFi generation of the current link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkMode {
    #[default]
    Unknown,
    Legacy,
    Ieee80211b,
    Ieee80211a,
    Ieee80211g,
    Ieee80211n,
    Ieee80211ac,
    Ieee80211ax,
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Legacy => write!(f, "WIFI 0 (802.11)"),
            Self::Ieee80211b => write!(f, "WIFI 1 (802.11b)"),
            Self::Ieee80211a => write!(f, "WIFI 2 (802.11a)"),
            Self::Ieee80211g => write!(f, "WIFI 3 (802.11g)"),
            Self::Ieee80211n => write!(f, "WIFI 4 (802.11n/HT)"),
            Self::Ieee80211ac => write!(f, "WIFI 5 (802.11ac/VHT)"),
            Self::Ieee80211ax => write!(f, "WIFI 6 (802.11ax/HE)"),
        }
    }
}

/// PHY capabilities negotiated for the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkCapabilities {
    pub he: bool,
    pub vht: bool,
    pub ht: bool,
    pub g: bool,
    pub a: bool,
    pub b: bool,
}

impl LinkCapabilities {
    /// Highest generation wins
    pub fn link_mode(&self) -> LinkMode {
        if self.he {
            LinkMode::Ieee80211ax
        } else if self.vht {
            LinkMode::Ieee80211ac
        } else if self.ht {
            LinkMode::Ieee80211n
        } else if self.g {
            LinkMode::Ieee80211g
        } else if self.a {
            LinkMode::Ieee80211a
        } else if self.b {
            LinkMode::Ieee80211b
        } else {
            LinkMode::Legacy
        }
    }
}

/// A connect / AP-enable request from upper-layer network management
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub ssid: String,
    pub security: SecurityType,
    /// Passphrase for every PSK flavour, also the SAE fallback
    pub psk: String,
    pub sae_password: Option<String>,
    pub band: Option<Band>,
    pub channel: Channel,
    /// All-zero means "any BSSID"
    pub bssid: MacAddr,
    pub mfp: MfpPolicy,
    /// Connect timeout in seconds, 0 = wait forever
    pub timeout_secs: u32,
    /// AP mode only; falls back to the configured default
    pub ap_inactivity_timeout: Option<u32>,
}

impl ConnectRequest {
    pub fn open(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            ..Default::default()
        }
    }

    pub fn secured(ssid: impl Into<String>, security: SecurityType, psk: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            security,
            psk: psk.into(),
            ..Default::default()
        }
    }

    pub fn with_band(mut self, band: Band) -> Self {
        self.band = Some(band);
        self
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = Channel::Number(channel);
        self
    }

    pub fn with_bssid(mut self, bssid: MacAddr) -> Self {
        self.bssid = bssid;
        self
    }

    pub fn with_sae_password(mut self, password: impl Into<String>) -> Self {
        self.sae_password = Some(password.into());
        self
    }

    pub fn with_mfp(mut self, mfp: MfpPolicy) -> Self {
        self.mfp = mfp;
        self
    }

    pub fn with_timeout(mut self, secs: u32) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Point-in-time view of an interface, built from live engine state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: LinkState,
    pub band: Option<Band>,
    pub channel: u32,
    pub security: SecurityType,
    pub mfp: MfpPolicy,
    pub bssid: MacAddr,
    pub ssid: String,
    pub iface_mode: Option<IfaceMode>,
    pub link_mode: LinkMode,
    /// dBm, `None` when it could not be read
    pub rssi: Option<i32>,
    pub beacon_interval: u16,
    pub dtim_period: u8,
    pub twt_capable: bool,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Completed
    }
}

/// Runtime AP parameters; unset fields are left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApConfigParams {
    pub max_inactivity: Option<u32>,
    pub max_num_sta: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_and_display() {
        let mac: MacAddr = "02:00:5E:10:00:01".parse().unwrap();
        assert_eq!(mac.0, [0x02, 0x00, 0x5e, 0x10, 0x00, 0x01]);
        assert_eq!(mac.to_string(), "02:00:5e:10:00:01");
        assert!("02:00:5e:10:00".parse::<MacAddr>().is_err());
        assert!("02:00:5e:10:00:01:02".parse::<MacAddr>().is_err());
        assert!("zz:00:5e:10:00:01".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_classification() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(MacAddr::BROADCAST.is_multicast());
        assert!(MacAddr([0x01, 0x00, 0x5e, 0, 0, 1]).is_multicast());
        assert!(!MacAddr([0x02, 0, 0, 0, 0, 1]).is_multicast());
        assert!(MacAddr::default().is_unspecified());
    }

    #[test]
    fn test_chan_to_freq_global_classes() {
        assert_eq!(chan_to_freq(1), Some(2412));
        assert_eq!(chan_to_freq(6), Some(2437));
        assert_eq!(chan_to_freq(13), Some(2472));
        assert_eq!(chan_to_freq(14), Some(2484));
        assert_eq!(chan_to_freq(36), Some(5180));
        assert_eq!(chan_to_freq(165), Some(5825));
        assert_eq!(chan_to_freq(0), None);
        assert_eq!(chan_to_freq(20), None);
        assert_eq!(chan_to_freq(200), None);
    }

    #[test]
    fn test_channel_from_frequency() {
        assert_eq!(channel_from_frequency(2412), 1);
        assert_eq!(channel_from_frequency(2437), 6);
        assert_eq!(channel_from_frequency(2484), 14);
        assert_eq!(channel_from_frequency(5180), 36);
        assert_eq!(channel_from_frequency(1000), 0);
    }

    #[test]
    fn test_security_from_key_mgmt() {
        assert_eq!(
            SecurityType::from_key_mgmt(KeyMgmt::Psk, Proto::Rsn),
            SecurityType::Psk
        );
        assert_eq!(
            SecurityType::from_key_mgmt(KeyMgmt::Psk, Proto::Wpa),
            SecurityType::WpaPsk
        );
        assert_eq!(
            SecurityType::from_key_mgmt(KeyMgmt::Sae, Proto::Rsn),
            SecurityType::Sae
        );
        assert_eq!(
            SecurityType::from_key_mgmt(KeyMgmt::None, Proto::Rsn),
            SecurityType::Open
        );
    }

    #[test]
    fn test_link_mode_prefers_newest_generation() {
        let caps = LinkCapabilities {
            he: false,
            vht: true,
            ht: true,
            g: true,
            a: false,
            b: true,
        };
        assert_eq!(caps.link_mode(), LinkMode::Ieee80211ac);
        assert_eq!(LinkCapabilities::default().link_mode(), LinkMode::Legacy);
    }

    #[test]
    fn test_parse_cli_values() {
        assert_eq!("2.4GHz".parse::<Band>().unwrap(), Band::TwoGhz);
        assert_eq!("5".parse::<Band>().unwrap(), Band::FiveGhz);
        assert_eq!("any".parse::<Channel>().unwrap(), Channel::Any);
        assert_eq!("11".parse::<Channel>().unwrap(), Channel::Number(11));
        assert_eq!("wpa3".parse::<SecurityType>().unwrap(), SecurityType::Sae);
        assert!("wep".parse::<SecurityType>().is_err());
    }

    #[test]
    fn test_link_state_order() {
        assert!(LinkState::Completed.is_associated());
        assert!(LinkState::Associated.is_associated());
        assert!(!LinkState::Associating.is_associated());
    }
}
