use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{WpasError, WpasResult};
use crate::event::{EventBus, MgmtEvent, Outcome};
use crate::network::confirm::{self, DISCONNECT_POLL_INTERVAL, DISCONNECT_TIMEOUT};
use crate::network::control::{OperationControl, PollerState, RequestedOp};
use crate::network::engine::{Command, Engine, EngineSnapshot, NetworkField};
use crate::network::offload::{
    Access, Device, PacketFilter, PowerSaveConfig, PowerSaveParams, RadioMode, RegDomain,
    ScanParams, ScanResult, TwtParams, WifiOffload, WifiStats,
};
use crate::network::profile;
use crate::network::types::*;

/// Tunables of the manager, normally taken from the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub disconnect_poll_interval: Duration,
    pub disconnect_timeout: Duration,
    /// Default `ap_max_inactivity` for new AP profiles, seconds
    pub ap_sta_inactivity_timeout: u32,
    /// Station limit set on AP enable, also the ceiling for runtime changes
    pub ap_max_num_sta: u32,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            disconnect_poll_interval: DISCONNECT_POLL_INTERVAL,
            disconnect_timeout: DISCONNECT_TIMEOUT,
            ap_sta_inactivity_timeout: 300,
            ap_max_num_sta: 4,
        }
    }
}

/// High-level facade over the supplicant engine.
/// All connection management for one radio goes through this struct.
pub struct WifiManager {
    engine: Arc<dyn Engine>,
    control: OperationControl,
    events: EventBus,
    settings: ManagerSettings,
}

impl WifiManager {
    pub fn new(engine: Arc<dyn Engine>, events: EventBus, settings: ManagerSettings) -> Self {
        Self {
            control: OperationControl::new(engine.clone(), events.clone()),
            engine,
            events,
            settings,
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Requested operation of the control record, if any was ever armed
    pub async fn requested_operation(&self) -> Option<RequestedOp> {
        self.control.lock().await.requested_op()
    }

    pub async fn poller_state(&self) -> PollerState {
        self.control.lock().await.poller_state()
    }

    // ── Station Operations ────────────────────────────────────────────

    /// Start connecting. Returns once the profile is selected; the outcome
    /// arrives later as a `ConnectResult` notification.
    ///
    /// Any previous connect is cancelled and its profile cleared, even when
    /// the new request turns out to be invalid.
    pub async fn connect(&self, device: &Arc<dyn Device>, req: &ConnectRequest) -> WpasResult<()> {
        let ifname = device.name();
        ensure_admin_up(device.as_ref())?;

        let mut guard = self.control.lock_drained().await;
        let snap = self.snapshot(ifname)?;
        ensure_mode(ifname, &snap, IfaceMode::Station)?;

        profile::add_and_config_network(
            self.engine.as_ref(),
            ifname,
            req,
            IfaceMode::Station,
            self.settings.ap_sta_inactivity_timeout,
        )
        .map_err(|e| {
            error!("Failed to add and configure network for STA mode: {}", e);
            e
        })?;

        guard.arm(device.clone(), RequestedOp::Connect, req.timeout_secs);
        info!("Connecting to {} on {}", req.ssid, ifname);
        Ok(())
    }

    /// Disconnect and wait for the engine to confirm it
    pub async fn disconnect(&self, device: &Arc<dyn Device>) -> WpasResult<()> {
        self.disconnect_network(device, IfaceMode::Station).await
    }

    /// Build a status view from live engine state
    pub async fn status(&self, device: &Arc<dyn Device>) -> WpasResult<ConnectionStatus> {
        let ifname = device.name();
        let _st = self.control.lock().await;
        let snap = self.snapshot(ifname)?;

        let mut status = ConnectionStatus {
            state: snap.state,
            ..Default::default()
        };
        if !snap.state.is_associated() {
            return Ok(status);
        }

        let Some(current) = snap.current.as_ref() else {
            error!("Failed to get current network for {}", ifname);
            return Err(WpasError::EngineCommandFailed(format!(
                "no current network on {ifname}"
            )));
        };

        // An AP reports what it was configured with, a station what it negotiated
        let (key_mgmt, proto) = if current.mode == IfaceMode::AccessPoint {
            (current.key_mgmt, current.proto)
        } else {
            (
                snap.key_mgmt.unwrap_or(current.key_mgmt),
                snap.proto.unwrap_or(current.proto),
            )
        };

        status.bssid = snap.bssid;
        status.band = Band::from_mhz(snap.assoc_freq);
        status.channel = channel_from_frequency(snap.assoc_freq);
        status.security = SecurityType::from_key_mgmt(key_mgmt, proto);
        status.mfp = current.ieee80211w;
        status.iface_mode = Some(current.mode);
        status.link_mode = snap
            .capabilities
            .map(|caps| caps.link_mode())
            .unwrap_or_default();

        let ssid = if current.ssid.is_empty() {
            self.engine.status_ssid(ifname).unwrap_or_else(|e| {
                warn!("Failed to read SSID from status: {}", e);
                Vec::new()
            })
        } else {
            current.ssid.clone()
        };
        status.ssid = String::from_utf8_lossy(&ssid).into_owned();

        if current.mode == IfaceMode::Station {
            match self.engine.signal_poll(ifname) {
                Ok(rssi) => status.rssi = Some(rssi),
                Err(e) => warn!("Failed to read signal info from the supplicant: {}", e),
            }
        }

        match self.engine.conn_info(ifname) {
            Ok(info) => {
                status.beacon_interval = info.beacon_interval;
                status.dtim_period = info.dtim_period;
                status.twt_capable = info.twt_capable;
            }
            Err(e) => warn!("Failed to get connection info: {}", e),
        }

        Ok(status)
    }

    // ── Access Point Operations ───────────────────────────────────────

    /// Switch the engine to AP mode and start the access point profile
    pub async fn ap_enable(&self, device: &Arc<dyn Device>, req: &ConnectRequest) -> WpasResult<()> {
        let ifname = device.name();
        ensure_admin_up(device.as_ref())?;

        let _guard = self.control.lock_drained().await;
        let snap = self.snapshot(ifname)?;
        if snap.state != LinkState::Disconnected {
            error!("AP needs {} to be disconnected, state is {}", ifname, snap.state);
            return Err(WpasError::Busy(format!("{ifname} is {}", snap.state)));
        }

        self.run(ifname, Command::ApScan(2))?;
        self.run(ifname, Command::SetMaxNumSta(self.settings.ap_max_num_sta))?;

        if let Err(e) = profile::add_and_config_network(
            self.engine.as_ref(),
            ifname,
            req,
            IfaceMode::AccessPoint,
            self.settings.ap_sta_inactivity_timeout,
        ) {
            error!("Failed to add and configure network for AP mode: {}", e);
            if let Err(restore) = self.run(ifname, Command::ApScan(1)) {
                warn!("Failed to restore ap_scan on {}: {}", ifname, restore);
            }
            return Err(e);
        }

        info!("AP {} enabled on {}", req.ssid, ifname);
        Ok(())
    }

    /// Tear the access point down and go back to station scanning
    pub async fn ap_disable(&self, device: &Arc<dyn Device>) -> WpasResult<()> {
        let ifname = device.name();
        self.disconnect_network(device, IfaceMode::AccessPoint)
            .await
            .map_err(|e| {
                error!("Failed to disable AP on {}: {}", ifname, e);
                e
            })?;

        let _st = self.control.lock().await;
        self.run(ifname, Command::ApScan(1))?;
        info!("AP disabled on {}", ifname);
        Ok(())
    }

    /// Kick one station off the access point
    pub async fn ap_sta_disconnect(&self, device: &Arc<dyn Device>, mac: MacAddr) -> WpasResult<()> {
        let ifname = device.name();
        if mac.is_unspecified() {
            return Err(WpasError::InvalidInput("station MAC address is required".into()));
        }

        let _st = self.control.lock().await;
        self.snapshot(ifname)?;
        self.run(ifname, Command::Disassociate(mac))?;
        info!("Disassociated {} from {}", mac, ifname);
        Ok(())
    }

    /// Change runtime parameters of the running access point
    pub async fn ap_config_params(
        &self,
        device: &Arc<dyn Device>,
        params: &ApConfigParams,
    ) -> WpasResult<()> {
        let ifname = device.name();
        let _st = self.control.lock().await;
        let snap = self.snapshot(ifname)?;
        let Some(current) = snap.current else {
            error!("AP is not operational on {}", ifname);
            return Err(WpasError::InvalidInput(format!("no AP running on {ifname}")));
        };

        if let Some(secs) = params.max_inactivity {
            self.run(
                ifname,
                Command::SetNetwork(current.id, NetworkField::ApMaxInactivity(secs)),
            )?;
            info!("Set station max inactivity to {}s", secs);
        }

        if let Some(max) = params.max_num_sta {
            if max > self.settings.ap_max_num_sta {
                error!(
                    "Maximum number of stations ({}) above the limit ({})",
                    max, self.settings.ap_max_num_sta
                );
                return Err(WpasError::InvalidInput(format!(
                    "max_num_sta {max} exceeds {}",
                    self.settings.ap_max_num_sta
                )));
            }
            self.run(ifname, Command::SetMaxNumSta(max))?;
            info!("Set maximum number of stations to {}", max);
        }

        Ok(())
    }

    // ── Driver Pass-Throughs ──────────────────────────────────────────

    pub fn scan(&self, device: &Arc<dyn Device>, params: &ScanParams) -> WpasResult<Vec<ScanResult>> {
        offload(device.as_ref(), "Scan")?.scan(params)
    }

    pub fn get_stats(&self, device: &Arc<dyn Device>) -> WpasResult<WifiStats> {
        offload(device.as_ref(), "Get stats")?.get_stats()
    }

    pub fn reset_stats(&self, device: &Arc<dyn Device>) -> WpasResult<()> {
        offload(device.as_ref(), "Reset stats")?.reset_stats()
    }

    pub fn set_power_save(&self, device: &Arc<dyn Device>, params: &PowerSaveParams) -> WpasResult<()> {
        offload(device.as_ref(), "Set power save")?.set_power_save(params)
    }

    pub fn get_power_save_config(&self, device: &Arc<dyn Device>) -> WpasResult<PowerSaveConfig> {
        offload(device.as_ref(), "Get power save config")?.get_power_save_config()
    }

    pub fn set_twt(&self, device: &Arc<dyn Device>, params: &TwtParams) -> WpasResult<()> {
        offload(device.as_ref(), "Set TWT")?.set_twt(params)
    }

    pub fn reg_domain(&self, device: &Arc<dyn Device>, op: Access<RegDomain>) -> WpasResult<RegDomain> {
        offload(device.as_ref(), "Regulatory domain")?.reg_domain(op)
    }

    pub fn mode(&self, device: &Arc<dyn Device>, op: Access<RadioMode>) -> WpasResult<RadioMode> {
        offload(device.as_ref(), "Setting mode")?.mode(op)
    }

    pub fn filter(&self, device: &Arc<dyn Device>, op: Access<PacketFilter>) -> WpasResult<PacketFilter> {
        offload(device.as_ref(), "Setting filter")?.filter(op)
    }

    pub fn channel(&self, device: &Arc<dyn Device>, op: Access<u16>) -> WpasResult<u16> {
        offload(device.as_ref(), "Setting channel")?.channel(op)
    }

    pub fn set_rts_threshold(&self, device: &Arc<dyn Device>, threshold: u32) -> WpasResult<()> {
        offload(device.as_ref(), "Set RTS")?.set_rts_threshold(threshold)
    }

    // ── Helpers ───────────────────────────────────────────────────────

    /// Shared teardown of station and AP links, reports the outcome on the
    /// bus once the engine confirmed (or failed to).
    async fn disconnect_network(&self, device: &Arc<dyn Device>, mode: IfaceMode) -> WpasResult<()> {
        let ifname = device.name();
        {
            let mut guard = self.control.lock_drained().await;
            let snap = self.snapshot(ifname)?;
            ensure_mode(ifname, &snap, mode)?;

            guard.arm(device.clone(), RequestedOp::Disconnect, 0);
            self.run(ifname, Command::Disconnect).map_err(|e| {
                error!("Disconnect failed on {}: {}", ifname, e);
                e
            })?;
        }

        let result = confirm::wait_for_disconnect_complete(
            self.engine.as_ref(),
            ifname,
            self.settings.disconnect_poll_interval,
            self.settings.disconnect_timeout,
        )
        .await;

        let outcome = match &result {
            Ok(()) => Outcome::Success,
            Err(WpasError::Timeout(_)) => Outcome::Timeout,
            Err(_) => Outcome::Failure,
        };
        let event = match mode {
            IfaceMode::AccessPoint => MgmtEvent::ApDisableResult(outcome),
            _ => MgmtEvent::DisconnectComplete(outcome),
        };
        self.events.publish(ifname, event);

        if result.is_ok() {
            info!("Disconnected {} ({})", ifname, mode.label());
        }
        result
    }

    fn snapshot(&self, ifname: &str) -> WpasResult<EngineSnapshot> {
        self.engine.snapshot(ifname).ok_or_else(|| {
            error!("Interface {} not found", ifname);
            WpasError::DeviceNotFound(ifname.to_string())
        })
    }

    fn run(&self, ifname: &str, cmd: Command) -> WpasResult<()> {
        self.engine.command(ifname, &cmd).map_err(|e| {
            error!("Failed to execute wpa_cli command: {}: {}", cmd, e);
            e
        })
    }
}

fn ensure_admin_up(device: &dyn Device) -> WpasResult<()> {
    if device.is_admin_up() {
        Ok(())
    } else {
        error!("Interface {} is down", device.name());
        Err(WpasError::InterfaceDown(device.name().to_string()))
    }
}

/// An existing profile in another mode owns the interface
fn ensure_mode(ifname: &str, snap: &EngineSnapshot, mode: IfaceMode) -> WpasResult<()> {
    match &snap.current {
        Some(current) if current.mode != mode => {
            error!(
                "Interface {} is in {} mode, not {}",
                ifname,
                current.mode.label(),
                mode.label()
            );
            Err(WpasError::Busy(format!(
                "{ifname} is in {} mode",
                current.mode.label()
            )))
        }
        _ => Ok(()),
    }
}

fn offload<'d>(device: &'d dyn Device, what: &str) -> WpasResult<&'d dyn WifiOffload> {
    device.offload().ok_or_else(|| {
        error!("{} not supported by {}", what, device.name());
        WpasError::NotSupported(format!("{what} not supported"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::sim::{SimDevice, SimEngine};

    const IFACE: &str = "wlan0";

    #[tokio::test]
    async fn test_status_of_idle_interface() {
        let engine = Arc::new(SimEngine::new(IFACE));
        let (events, _rx) = EventBus::channel();
        let mgr = WifiManager::new(engine, events, ManagerSettings::default());
        let device: Arc<dyn Device> = Arc::new(SimDevice::new(IFACE));

        let status = mgr.status(&device).await.unwrap();
        assert_eq!(status.state, LinkState::Disconnected);
        assert!(status.ssid.is_empty());
        assert_eq!(status.iface_mode, None);
        assert_eq!(status.rssi, None);
    }

    #[tokio::test]
    async fn test_ap_sta_disconnect_needs_a_mac() {
        let engine = Arc::new(SimEngine::new(IFACE));
        let (events, _rx) = EventBus::channel();
        let mgr = WifiManager::new(engine.clone(), events, ManagerSettings::default());
        let device: Arc<dyn Device> = Arc::new(SimDevice::new(IFACE));

        let err = mgr
            .ap_sta_disconnect(&device, MacAddr::UNSPECIFIED)
            .await
            .unwrap_err();
        assert!(matches!(err, WpasError::InvalidInput(_)));

        let mac: MacAddr = "aa:bb:cc:dd:ee:01".parse().unwrap();
        mgr.ap_sta_disconnect(&device, mac).await.unwrap();
        assert_eq!(engine.disassociated(), vec![mac]);
    }

    #[test]
    fn test_missing_offload_is_not_supported() {
        let engine = Arc::new(SimEngine::new(IFACE));
        let (events, _rx) = EventBus::channel();
        let mgr = WifiManager::new(engine, events, ManagerSettings::default());
        let device: Arc<dyn Device> = Arc::new(SimDevice::without_offload(IFACE));

        assert!(matches!(
            mgr.get_stats(&device),
            Err(WpasError::NotSupported(_))
        ));
        assert!(matches!(
            mgr.set_rts_threshold(&device, 2347),
            Err(WpasError::NotSupported(_))
        ));
    }
}
