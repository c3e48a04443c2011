//! Network profile construction.
//!
//! Turns a [`ConnectRequest`] into the ordered `set_network` sequence the
//! engine expects, on a freshly created slot. Existing profiles are cleared
//! before anything else, so a rejected request never leaves an older profile
//! selected. Either the new profile ends up enabled and selected, or no
//! profile is left at all.

use tracing::{debug, error, warn};

use crate::error::{WpasError, WpasResult};
use crate::network::engine::{Command, Engine, NetworkField};
use crate::network::types::*;

/// Check everything that can be checked without talking to the engine
pub fn validate(req: &ConnectRequest, mode: IfaceMode) -> WpasResult<()> {
    if req.ssid.is_empty() {
        return Err(WpasError::InvalidInput("SSID cannot be empty".into()));
    }
    if req.ssid.len() > SSID_MAX_LEN {
        error!("SSID too long (max {} characters)", SSID_MAX_LEN);
        return Err(WpasError::InvalidInput(format!(
            "SSID too long: {} bytes (max {})",
            req.ssid.len(),
            SSID_MAX_LEN
        )));
    }

    match req.security {
        SecurityType::Open => {}
        SecurityType::Unknown => return Err(WpasError::UnsupportedSecurity(req.security)),
        security => {
            // SoftAP: only open and WPA2-PSK for now
            if mode == IfaceMode::AccessPoint && security != SecurityType::Psk {
                error!("Unsupported security type for AP: {}", security);
                return Err(WpasError::UnsupportedSecurity(security));
            }
            // With an SAE password only that one is checked
            match req.sae_password.as_deref() {
                Some(sae) => check_secret(sae, SAE_PASSWORD_MAX_LEN)?,
                None => check_secret(&req.psk, PSK_MAX_LEN)?,
            }
        }
    }

    if req.bssid.is_broadcast() || req.bssid.is_multicast() {
        error!("Invalid BSSID. Configuration of multicast or broadcast MAC is not allowed.");
        return Err(WpasError::InvalidInput(format!(
            "BSSID {} is a group address",
            req.bssid
        )));
    }

    Ok(())
}

fn check_secret(secret: &str, max: usize) -> WpasResult<()> {
    if (PSK_MIN_LEN..=max).contains(&secret.len()) {
        return Ok(());
    }
    error!(
        "Passphrase should be in range ({}-{}) characters",
        PSK_MIN_LEN, max
    );
    Err(WpasError::InvalidInput(format!(
        "passphrase length {} outside {}..={}",
        secret.len(),
        PSK_MIN_LEN,
        max
    )))
}

/// Look a channel up in a band's hardware table
pub fn band_channel_frequency(table: &[HwChannel], chan: u8) -> Option<u32> {
    table.iter().find(|c| c.chan == chan).map(|c| c.freq)
}

/// Clear every profile on the engine, then create, configure, enable and
/// select a new one. Returns the new profile id.
pub fn add_and_config_network(
    engine: &dyn Engine,
    ifname: &str,
    req: &ConnectRequest,
    mode: IfaceMode,
    ap_inactivity_default: u32,
) -> WpasResult<NetworkId> {
    let writer = ProfileWriter { engine, ifname };
    writer.run(Command::RemoveAllNetworks)?;

    validate(req, mode)?;

    let id = engine.add_network(ifname).map_err(|e| {
        error!("Failed to add network: {}", e);
        e
    })?;
    debug!("Network added: {}", id);

    match writer.configure(id, req, mode, ap_inactivity_default) {
        Ok(()) => Ok(id),
        Err(e) => {
            if let Err(rm) = writer.run(Command::RemoveNetwork(id)) {
                warn!("Failed to remove partially configured network {}: {}", id, rm);
            }
            Err(e)
        }
    }
}

struct ProfileWriter<'a> {
    engine: &'a dyn Engine,
    ifname: &'a str,
}

impl ProfileWriter<'_> {
    fn run(&self, cmd: Command) -> WpasResult<()> {
        self.engine.command(self.ifname, &cmd).map_err(|e| {
            error!("Failed to execute wpa_cli command: {}", cmd);
            e
        })
    }

    fn set(&self, id: NetworkId, field: NetworkField) -> WpasResult<()> {
        self.run(Command::SetNetwork(id, field))
    }

    fn configure(
        &self,
        id: NetworkId,
        req: &ConnectRequest,
        mode: IfaceMode,
        ap_inactivity_default: u32,
    ) -> WpasResult<()> {
        let is_ap = mode == IfaceMode::AccessPoint;
        if is_ap {
            self.set(id, NetworkField::Mode(mode))?;
        }

        self.set(id, NetworkField::Ssid(req.ssid.clone()))?;
        self.set(id, NetworkField::ScanSsid(true))?;
        self.set(id, NetworkField::KeyMgmt(vec![KeyMgmt::None]))?;
        self.set(id, NetworkField::Ieee80211w(MfpPolicy::Disabled))?;

        let band_table = match req.band {
            Some(band) => {
                let table = self
                    .engine
                    .hw_channels(self.ifname, band)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        error!("Unsupported or invalid band: {}", band);
                        WpasError::UnsupportedBand(band)
                    })?;
                let freqs = table.iter().map(|c| c.freq).collect();
                self.set(id, NetworkField::ScanFreq(freqs))?;
                Some(table)
            }
            None => None,
        };

        if req.security != SecurityType::Open {
            self.configure_security(id, req)?;
        }

        if let Channel::Number(chan) = req.channel {
            let freq = match &band_table {
                Some(table) => band_channel_frequency(table, chan),
                None => chan_to_freq(chan),
            }
            .ok_or_else(|| {
                error!("Invalid channel {}", chan);
                WpasError::InvalidChannel(chan)
            })?;

            if is_ap {
                self.set(id, NetworkField::Frequency(freq))?;
            } else {
                self.set(id, NetworkField::ScanFreq(vec![freq]))?;
            }
        }

        if !req.bssid.is_unspecified() {
            self.set(id, NetworkField::Bssid(req.bssid))?;
        }

        if is_ap {
            let inactivity = req.ap_inactivity_timeout.unwrap_or(ap_inactivity_default);
            self.set(id, NetworkField::ApMaxInactivity(inactivity))?;
        }

        self.run(Command::EnableNetwork(id))?;
        self.run(Command::SelectNetwork(id))
    }

    fn configure_security(&self, id: NetworkId, req: &ConnectRequest) -> WpasResult<()> {
        // Everything except WPA-PSK lives under RSN
        if req.security != SecurityType::WpaPsk {
            self.set(id, NetworkField::Proto(vec![Proto::Rsn]))?;
        }

        match req.security {
            SecurityType::Sae => {
                let password = req.sae_password.as_ref().unwrap_or(&req.psk);
                self.set(id, NetworkField::SaePassword(password.clone()))?;
                self.set(id, NetworkField::KeyMgmt(vec![KeyMgmt::Sae]))?;
            }
            SecurityType::PskSha256 => {
                self.set(id, NetworkField::Psk(req.psk.clone()))?;
                self.set(id, NetworkField::KeyMgmt(vec![KeyMgmt::PskSha256]))?;
            }
            SecurityType::Psk | SecurityType::WpaPsk => {
                self.set(id, NetworkField::Psk(req.psk.clone()))?;
                self.set(id, NetworkField::KeyMgmt(vec![KeyMgmt::Psk]))?;
                if req.security == SecurityType::WpaPsk {
                    self.set(id, NetworkField::Proto(vec![Proto::Wpa]))?;
                }
            }
            SecurityType::WpaAutoPersonal => {
                if let Some(sae) = &req.sae_password {
                    self.set(id, NetworkField::SaePassword(sae.clone()))?;
                }
                if !req.psk.is_empty() {
                    self.set(id, NetworkField::Psk(req.psk.clone()))?;
                }
                self.set(
                    id,
                    NetworkField::KeyMgmt(vec![KeyMgmt::Psk, KeyMgmt::PskSha256, KeyMgmt::Sae]),
                )?;
                self.set(id, NetworkField::Proto(vec![Proto::Wpa, Proto::Rsn]))?;
            }
            SecurityType::Open | SecurityType::Unknown => {
                error!("Unsupported security type: {}", req.security);
                return Err(WpasError::UnsupportedSecurity(req.security));
            }
        }

        if req.mfp != MfpPolicy::default() {
            self.set(id, NetworkField::Ieee80211w(req.mfp))?;
        }

        Ok(())
    }
}
