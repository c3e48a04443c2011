//! Network devices and the optional driver offload surface.
//!
//! Everything in [`WifiOffload`] is forwarded verbatim to the driver. A
//! driver implements only what its hardware can do; the defaults answer
//! `NotSupported`.

use serde::{Deserialize, Serialize};

use crate::error::{WpasError, WpasResult};
use crate::network::types::{Band, MacAddr, SecurityType};

/// A network interface as seen by the orchestrator
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    /// Administrative (user-requested) up state of the interface
    fn is_admin_up(&self) -> bool;

    fn offload(&self) -> Option<&dyn WifiOffload> {
        None
    }
}

/// Get-or-set request for driver parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access<T> {
    Get,
    Set(T),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanParams {
    /// Directed probe SSIDs, empty = passive/broadcast scan
    pub ssids: Vec<String>,
    /// Empty = all bands
    pub bands: Vec<Band>,
    pub dwell_time_active_ms: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub ssid: String,
    pub bssid: MacAddr,
    pub channel: u8,
    pub band: Band,
    pub security: SecurityType,
    pub rssi: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WifiStats {
    pub bytes_rx: u64,
    pub bytes_tx: u64,
    pub pkts_rx: u64,
    pub pkts_tx: u64,
    pub broadcast_rx: u64,
    pub broadcast_tx: u64,
    pub multicast_rx: u64,
    pub multicast_tx: u64,
    pub beacons_rx: u64,
    pub beacons_miss: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerSaveWakeup {
    Dtim,
    ListenInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSaveParams {
    pub enabled: bool,
    pub listen_interval: u16,
    pub wakeup_mode: PowerSaveWakeup,
    pub timeout_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSaveConfig {
    pub params: PowerSaveParams,
    pub num_twt_flows: u8,
}

/// Target wake time (802.11ax extended scheduling) flow request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TwtParams {
    Setup {
        flow_id: u8,
        wake_interval_us: u32,
        interval_us: u64,
    },
    Teardown {
        flow_id: u8,
    },
    TeardownAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegDomain {
    /// ISO 3166-1 alpha-2
    pub country: String,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioMode {
    Station,
    Monitor,
    Promiscuous,
    AccessPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PacketFilter {
    pub management: bool,
    pub data: bool,
    pub control: bool,
    pub buffer_size: u16,
}

/// Hardware offload entry points. All optional.
pub trait WifiOffload: Send + Sync {
    fn scan(&self, _params: &ScanParams) -> WpasResult<Vec<ScanResult>> {
        Err(not_supported("Scan"))
    }

    fn get_stats(&self) -> WpasResult<WifiStats> {
        Err(not_supported("Get stats"))
    }

    fn reset_stats(&self) -> WpasResult<()> {
        Err(not_supported("Reset stats"))
    }

    fn set_power_save(&self, _params: &PowerSaveParams) -> WpasResult<()> {
        Err(not_supported("Set power save"))
    }

    fn get_power_save_config(&self) -> WpasResult<PowerSaveConfig> {
        Err(not_supported("Get power save config"))
    }

    fn set_twt(&self, _params: &TwtParams) -> WpasResult<()> {
        Err(not_supported("Set TWT"))
    }

    fn reg_domain(&self, _op: Access<RegDomain>) -> WpasResult<RegDomain> {
        Err(not_supported("Regulatory domain"))
    }

    fn mode(&self, _op: Access<RadioMode>) -> WpasResult<RadioMode> {
        Err(not_supported("Setting mode"))
    }

    fn filter(&self, _op: Access<PacketFilter>) -> WpasResult<PacketFilter> {
        Err(not_supported("Setting filter"))
    }

    fn channel(&self, _op: Access<u16>) -> WpasResult<u16> {
        Err(not_supported("Setting channel"))
    }

    fn set_rts_threshold(&self, _threshold: u32) -> WpasResult<()> {
        Err(not_supported("Set RTS"))
    }
}

fn not_supported(what: &str) -> WpasError {
    WpasError::NotSupported(format!("{what} not supported"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScanOnly;

    impl WifiOffload for ScanOnly {
        fn scan(&self, _params: &ScanParams) -> WpasResult<Vec<ScanResult>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_unimplemented_capabilities_report_not_supported() {
        let drv = ScanOnly;
        assert!(drv.scan(&ScanParams::default()).unwrap().is_empty());
        assert!(matches!(drv.get_stats(), Err(WpasError::NotSupported(_))));
        assert!(matches!(
            drv.set_rts_threshold(2347),
            Err(WpasError::NotSupported(_))
        ));
        assert!(matches!(
            drv.channel(Access::Get),
            Err(WpasError::NotSupported(_))
        ));
    }
}
