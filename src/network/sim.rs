//! In-process simulated supplicant and driver.
//!
//! Backs the demo binary and the test suites. Link state is derived lazily
//! from tokio time, so tests running on a paused clock see deterministic
//! handshakes without any background task.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{WpasError, WpasResult};
use crate::network::engine::*;
use crate::network::offload::*;
use crate::network::types::*;

/// Timing of the simulated handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimBehavior {
    /// Time from `select_network` to COMPLETED, `None` = never associates
    pub associate_after: Option<Duration>,
    /// Time from `disconnect` to DISCONNECTED, `None` = stuck
    pub disconnect_after: Option<Duration>,
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self {
            associate_after: Some(Duration::from_secs(2)),
            disconnect_after: Some(Duration::from_millis(50)),
        }
    }
}

#[derive(Debug, Clone)]
struct SimNetwork {
    ssid: String,
    mode: IfaceMode,
    key_mgmt: Vec<KeyMgmt>,
    proto: Vec<Proto>,
    ieee80211w: MfpPolicy,
    scan_freq: Vec<u32>,
    frequency: Option<u32>,
    bssid: Option<MacAddr>,
    ap_max_inactivity: Option<u32>,
    enabled: bool,
}

impl Default for SimNetwork {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            mode: IfaceMode::Station,
            key_mgmt: vec![KeyMgmt::Psk],
            proto: vec![Proto::Wpa, Proto::Rsn],
            ieee80211w: MfpPolicy::Disabled,
            scan_freq: Vec::new(),
            frequency: None,
            bssid: None,
            ap_max_inactivity: None,
            enabled: false,
        }
    }
}

impl SimNetwork {
    fn apply(&mut self, field: &NetworkField) {
        match field {
            NetworkField::Mode(mode) => self.mode = *mode,
            NetworkField::Ssid(ssid) => self.ssid = ssid.clone(),
            NetworkField::ScanSsid(_) | NetworkField::Psk(_) | NetworkField::SaePassword(_) => {}
            NetworkField::KeyMgmt(suites) => self.key_mgmt = suites.clone(),
            NetworkField::Ieee80211w(mfp) => self.ieee80211w = *mfp,
            NetworkField::ScanFreq(freqs) => self.scan_freq = freqs.clone(),
            NetworkField::Proto(protos) => self.proto = protos.clone(),
            NetworkField::Frequency(freq) => self.frequency = Some(*freq),
            NetworkField::Bssid(bssid) => self.bssid = Some(*bssid),
            NetworkField::ApMaxInactivity(secs) => self.ap_max_inactivity = Some(*secs),
        }
    }

    /// Strongest configured suite, what a peer would negotiate
    fn best_key_mgmt(&self) -> KeyMgmt {
        [KeyMgmt::Sae, KeyMgmt::PskSha256, KeyMgmt::Psk]
            .into_iter()
            .find(|k| self.key_mgmt.contains(k))
            .unwrap_or(KeyMgmt::None)
    }

    fn best_proto(&self) -> Proto {
        if self.proto.contains(&Proto::Rsn) {
            Proto::Rsn
        } else {
            Proto::Wpa
        }
    }

    fn channel_freq(&self) -> u32 {
        self.frequency
            .or_else(|| self.scan_freq.first().copied())
            .unwrap_or(2437)
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Connecting { since: Instant },
    Disconnecting { since: Instant, from: LinkState },
}

#[derive(Debug)]
struct SimState {
    ifname: String,
    present: bool,
    next_id: NetworkId,
    networks: BTreeMap<NetworkId, SimNetwork>,
    selected: Option<NetworkId>,
    phase: Phase,
    behavior: SimBehavior,
    forced: Option<LinkState>,
    log: Vec<Command>,
    fail_matching: Option<String>,
    reject_add: bool,
    tables: HashMap<Band, Vec<HwChannel>>,
    ap_scan: u8,
    max_num_sta: Option<u32>,
    disassociated: Vec<MacAddr>,
    signal: Option<i32>,
    conn_info: Option<ConnInfo>,
}

impl SimState {
    fn check_iface(&self, ifname: &str) -> WpasResult<()> {
        if self.present && self.ifname == ifname {
            Ok(())
        } else {
            Err(WpasError::DeviceNotFound(ifname.to_string()))
        }
    }

    fn link_state(&self) -> LinkState {
        if let Some(state) = self.forced {
            return state;
        }
        let now = Instant::now();
        match self.phase {
            Phase::Idle => LinkState::Disconnected,
            Phase::Connecting { since } => {
                let elapsed = now.duration_since(since);
                match self.behavior.associate_after {
                    Some(after) if elapsed >= after => LinkState::Completed,
                    Some(after) if elapsed >= after / 2 => LinkState::Associating,
                    _ => LinkState::Scanning,
                }
            }
            Phase::Disconnecting { since, from } => match self.behavior.disconnect_after {
                Some(after) if now.duration_since(since) >= after => LinkState::Disconnected,
                _ => from,
            },
        }
    }

    fn current_network(&self) -> Option<(NetworkId, &SimNetwork)> {
        if self.link_state() == LinkState::Disconnected {
            return None;
        }
        let id = self.selected?;
        self.networks.get(&id).map(|n| (id, n))
    }

    fn network_mut(&mut self, id: NetworkId) -> WpasResult<&mut SimNetwork> {
        self.networks
            .get_mut(&id)
            .ok_or_else(|| WpasError::EngineCommandFailed(format!("no network with id {id}")))
    }

    fn execute(&mut self, cmd: &Command) -> WpasResult<()> {
        match cmd {
            Command::RemoveAllNetworks => {
                self.networks.clear();
                self.selected = None;
                self.phase = Phase::Idle;
            }
            Command::RemoveNetwork(id) => {
                if self.networks.remove(id).is_none() {
                    return Err(WpasError::EngineCommandFailed(format!("no network with id {id}")));
                }
                if self.selected == Some(*id) {
                    self.selected = None;
                    self.phase = Phase::Idle;
                }
            }
            Command::SetNetwork(id, field) => self.network_mut(*id)?.apply(field),
            Command::EnableNetwork(id) => self.network_mut(*id)?.enabled = true,
            Command::SelectNetwork(id) => {
                self.network_mut(*id)?;
                self.selected = Some(*id);
                self.forced = None;
                self.phase = Phase::Connecting {
                    since: Instant::now(),
                };
            }
            Command::Disconnect => {
                let from = self.link_state();
                self.forced = None;
                self.phase = if from == LinkState::Disconnected {
                    Phase::Idle
                } else {
                    Phase::Disconnecting {
                        since: Instant::now(),
                        from,
                    }
                };
            }
            Command::Disassociate(mac) => self.disassociated.push(*mac),
            Command::ApScan(value) => self.ap_scan = *value,
            Command::SetMaxNumSta(n) => self.max_num_sta = Some(*n),
        }
        Ok(())
    }
}

fn band_table(band: Band) -> Option<Vec<HwChannel>> {
    match band {
        Band::TwoGhz => Some(
            (1..=13u8)
                .map(|chan| HwChannel {
                    chan,
                    freq: 2407 + 5 * chan as u32,
                })
                .collect(),
        ),
        Band::FiveGhz => Some(
            [36u8, 40, 44, 48, 52, 56, 60, 64, 100, 104, 108, 112, 116, 120, 124, 128, 132, 136,
             140, 144, 149, 153, 157, 161, 165]
                .into_iter()
                .map(|chan| HwChannel {
                    chan,
                    freq: 5000 + 5 * chan as u32,
                })
                .collect(),
        ),
        Band::SixGhz => None,
    }
}

/// Simulated supplicant serving a single interface
#[derive(Debug)]
pub struct SimEngine {
    inner: Mutex<SimState>,
}

impl SimEngine {
    pub fn new(ifname: &str) -> Self {
        Self::with_behavior(ifname, SimBehavior::default())
    }

    pub fn with_behavior(ifname: &str, behavior: SimBehavior) -> Self {
        let tables = [Band::TwoGhz, Band::FiveGhz, Band::SixGhz]
            .into_iter()
            .filter_map(|band| band_table(band).map(|t| (band, t)))
            .collect();

        Self {
            inner: Mutex::new(SimState {
                ifname: ifname.to_string(),
                present: true,
                next_id: 0,
                networks: BTreeMap::new(),
                selected: None,
                phase: Phase::Idle,
                behavior,
                forced: None,
                log: Vec::new(),
                fail_matching: None,
                reject_add: false,
                tables,
                ap_scan: 1,
                max_num_sta: None,
                disassociated: Vec::new(),
                signal: Some(-52),
                conn_info: Some(ConnInfo {
                    beacon_interval: 100,
                    dtim_period: 2,
                    twt_capable: false,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_behavior(&self, behavior: SimBehavior) {
        self.state().behavior = behavior;
    }

    /// Pin the link state until the next select/disconnect
    pub fn force_link_state(&self, state: Option<LinkState>) {
        self.state().forced = state;
    }

    /// Make the engine forget the interface entirely
    pub fn remove_interface(&self) {
        self.state().present = false;
    }

    /// Fail every command whose rendering contains `pattern`
    pub fn fail_commands_matching(&self, pattern: Option<&str>) {
        self.state().fail_matching = pattern.map(str::to_string);
    }

    pub fn reject_add_network(&self, reject: bool) {
        self.state().reject_add = reject;
    }

    pub fn set_signal(&self, rssi: Option<i32>) {
        self.state().signal = rssi;
    }

    pub fn set_conn_info(&self, info: Option<ConnInfo>) {
        self.state().conn_info = info;
    }

    /// Every command received, in order, failed ones included
    pub fn commands(&self) -> Vec<Command> {
        self.state().log.clone()
    }

    pub fn clear_commands(&self) {
        self.state().log.clear();
    }

    pub fn networks(&self) -> Vec<NetworkId> {
        self.state().networks.keys().copied().collect()
    }

    pub fn selected_network(&self) -> Option<NetworkId> {
        self.state().selected
    }

    pub fn ap_scan(&self) -> u8 {
        self.state().ap_scan
    }

    pub fn max_num_sta(&self) -> Option<u32> {
        self.state().max_num_sta
    }

    pub fn ap_max_inactivity(&self, id: NetworkId) -> Option<u32> {
        self.state().networks.get(&id).and_then(|n| n.ap_max_inactivity)
    }

    pub fn disassociated(&self) -> Vec<MacAddr> {
        self.state().disassociated.clone()
    }
}

impl Engine for SimEngine {
    fn link_state(&self, ifname: &str) -> Option<LinkState> {
        let st = self.state();
        st.check_iface(ifname).ok()?;
        Some(st.link_state())
    }

    fn snapshot(&self, ifname: &str) -> Option<EngineSnapshot> {
        let st = self.state();
        st.check_iface(ifname).ok()?;
        let state = st.link_state();

        let mut snap = EngineSnapshot {
            state,
            ..Default::default()
        };
        if let Some((id, net)) = st.current_network() {
            snap.current = Some(CurrentNetwork {
                id,
                ssid: net.ssid.as_bytes().to_vec(),
                mode: net.mode,
                key_mgmt: net.best_key_mgmt(),
                proto: net.best_proto(),
                ieee80211w: net.ieee80211w,
            });
            if state.is_associated() {
                snap.bssid = net.bssid.unwrap_or(MacAddr([0x02, 0, 0, 0, 0, 0x01]));
                snap.assoc_freq = net.channel_freq();
                snap.key_mgmt = Some(net.best_key_mgmt());
                snap.proto = Some(net.best_proto());
                snap.capabilities = Some(LinkCapabilities {
                    ht: true,
                    g: true,
                    b: true,
                    ..Default::default()
                });
            }
        }
        Some(snap)
    }

    fn add_network(&self, ifname: &str) -> WpasResult<NetworkId> {
        let mut st = self.state();
        st.check_iface(ifname)?;
        if st.reject_add {
            return Err(WpasError::EngineCommandFailed("add_network".into()));
        }
        let id = st.next_id;
        st.next_id += 1;
        st.networks.insert(id, SimNetwork::default());
        Ok(id)
    }

    fn command(&self, ifname: &str, cmd: &Command) -> WpasResult<()> {
        let mut st = self.state();
        st.check_iface(ifname)?;
        st.log.push(cmd.clone());
        debug!("sim: {}", cmd);

        let rendered = cmd.to_string();
        if let Some(pattern) = &st.fail_matching {
            if rendered.contains(pattern.as_str()) {
                return Err(WpasError::EngineCommandFailed(rendered));
            }
        }
        st.execute(cmd)
    }

    fn hw_channels(&self, ifname: &str, band: Band) -> Option<Vec<HwChannel>> {
        let st = self.state();
        st.check_iface(ifname).ok()?;
        st.tables.get(&band).cloned()
    }

    fn signal_poll(&self, ifname: &str) -> WpasResult<i32> {
        let st = self.state();
        st.check_iface(ifname)?;
        match (st.link_state().is_associated(), st.signal) {
            (true, Some(rssi)) => Ok(rssi),
            _ => Err(WpasError::EngineCommandFailed("SIGNAL_POLL".into())),
        }
    }

    fn conn_info(&self, ifname: &str) -> WpasResult<ConnInfo> {
        let st = self.state();
        st.check_iface(ifname)?;
        st.conn_info
            .ok_or_else(|| WpasError::EngineCommandFailed("get_conn_info".into()))
    }

    fn status_ssid(&self, ifname: &str) -> WpasResult<Vec<u8>> {
        let st = self.state();
        st.check_iface(ifname)?;
        Ok(st
            .current_network()
            .map(|(_, n)| n.ssid.as_bytes().to_vec())
            .unwrap_or_default())
    }
}

/// Simulated driver: scan, statistics, power save, regulatory domain and RTS.
/// TWT, mode, filter and channel control are left unimplemented.
#[derive(Debug)]
pub struct SimOffload {
    stats: Mutex<WifiStats>,
    power_save: Mutex<PowerSaveParams>,
    reg_domain: Mutex<RegDomain>,
    rts_threshold: Mutex<Option<u32>>,
}

impl Default for SimOffload {
    fn default() -> Self {
        Self {
            stats: Mutex::new(WifiStats {
                bytes_rx: 48_213,
                bytes_tx: 12_877,
                pkts_rx: 311,
                pkts_tx: 97,
                beacons_rx: 1_204,
                ..Default::default()
            }),
            power_save: Mutex::new(PowerSaveParams {
                enabled: false,
                listen_interval: 10,
                wakeup_mode: PowerSaveWakeup::Dtim,
                timeout_ms: 50,
            }),
            reg_domain: Mutex::new(RegDomain {
                country: "00".into(),
                force: false,
            }),
            rts_threshold: Mutex::new(None),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl SimOffload {
    pub fn rts_threshold(&self) -> Option<u32> {
        *lock(&self.rts_threshold)
    }
}

impl WifiOffload for SimOffload {
    fn scan(&self, params: &ScanParams) -> WpasResult<Vec<ScanResult>> {
        let results = vec![
            ScanResult {
                ssid: "nexus-lab".into(),
                bssid: MacAddr([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]),
                channel: 6,
                band: Band::TwoGhz,
                security: SecurityType::Psk,
                rssi: -48,
            },
            ScanResult {
                ssid: "nexus-lab-5g".into(),
                bssid: MacAddr([0x02, 0x11, 0x22, 0x33, 0x44, 0x56]),
                channel: 36,
                band: Band::FiveGhz,
                security: SecurityType::Sae,
                rssi: -61,
            },
        ];
        Ok(results
            .into_iter()
            .filter(|r| params.bands.is_empty() || params.bands.contains(&r.band))
            .filter(|r| params.ssids.is_empty() || params.ssids.contains(&r.ssid))
            .collect())
    }

    fn get_stats(&self) -> WpasResult<WifiStats> {
        Ok(*lock(&self.stats))
    }

    fn reset_stats(&self) -> WpasResult<()> {
        *lock(&self.stats) = WifiStats::default();
        Ok(())
    }

    fn set_power_save(&self, params: &PowerSaveParams) -> WpasResult<()> {
        *lock(&self.power_save) = *params;
        Ok(())
    }

    fn get_power_save_config(&self) -> WpasResult<PowerSaveConfig> {
        Ok(PowerSaveConfig {
            params: *lock(&self.power_save),
            num_twt_flows: 0,
        })
    }

    fn reg_domain(&self, op: Access<RegDomain>) -> WpasResult<RegDomain> {
        let mut current = lock(&self.reg_domain);
        if let Access::Set(domain) = op {
            if domain.country.len() != 2 {
                return Err(WpasError::InvalidInput(format!(
                    "invalid country code: {}",
                    domain.country
                )));
            }
            *current = domain;
        }
        Ok(current.clone())
    }

    fn set_rts_threshold(&self, threshold: u32) -> WpasResult<()> {
        *lock(&self.rts_threshold) = Some(threshold);
        Ok(())
    }
}

/// Simulated network interface
#[derive(Debug)]
pub struct SimDevice {
    name: String,
    admin_up: AtomicBool,
    offload: Option<SimOffload>,
}

impl SimDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            admin_up: AtomicBool::new(true),
            offload: Some(SimOffload::default()),
        }
    }

    /// A device whose driver exposes no offload API at all
    pub fn without_offload(name: &str) -> Self {
        Self {
            offload: None,
            ..Self::new(name)
        }
    }

    pub fn set_admin_up(&self, up: bool) {
        self.admin_up.store(up, Ordering::Relaxed);
    }

    pub fn sim_offload(&self) -> Option<&SimOffload> {
        self.offload.as_ref()
    }
}

impl Device for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_admin_up(&self) -> bool {
        self.admin_up.load(Ordering::Relaxed)
    }

    fn offload(&self) -> Option<&dyn WifiOffload> {
        self.offload.as_ref().map(|o| o as &dyn WifiOffload)
    }
}
