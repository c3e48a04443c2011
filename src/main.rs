use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use nexus_wpas::config::{self, CliArgs, Config};
use nexus_wpas::event::{EventBus, MgmtEvent, Notification};
use nexus_wpas::network::offload::Device;
use nexus_wpas::network::sim::{SimDevice, SimEngine};
use nexus_wpas::network::types::*;
use nexus_wpas::WifiManager;

/// nexus-wpas — drive a supplicant-backed WiFi interface (simulated engine)
#[derive(Parser, Debug)]
#[command(name = "nexus-wpas", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    args: CliArgs,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Connect and wait for the outcome
    Connect(NetworkArgs),
    /// Connect, print status, disconnect
    Cycle(NetworkArgs),
    /// Enable an access point, adjust it, tear it down
    Ap(ApArgs),
    /// Print the interface status
    Status,
}

#[derive(Args, Debug)]
struct NetworkArgs {
    /// Network name
    ssid: String,

    /// open, wpa, wpa2, psk-sha256, sae, auto
    #[arg(short, long, default_value = "open")]
    security: SecurityType,

    /// Passphrase
    #[arg(short, long, default_value = "")]
    psk: String,

    /// 2.4, 5 or 6
    #[arg(short, long)]
    band: Option<Band>,

    /// Channel number or "any"
    #[arg(long, default_value = "any")]
    channel: Channel,

    /// Pin the connection to one access point
    #[arg(long)]
    bssid: Option<MacAddr>,

    /// Connect timeout in seconds (0 = wait forever)
    #[arg(short, long, default_value_t = 10)]
    timeout: u32,
}

#[derive(Args, Debug)]
struct ApArgs {
    ssid: String,

    /// WPA2 passphrase (8-64 characters)
    #[arg(short, long)]
    psk: String,

    #[arg(long, default_value = "any")]
    channel: Channel,

    /// Runtime station limit applied once the AP is up
    #[arg(long)]
    max_num_sta: Option<u32>,
}

impl NetworkArgs {
    fn request(&self) -> ConnectRequest {
        ConnectRequest {
            ssid: self.ssid.clone(),
            security: self.security,
            psk: self.psk.clone(),
            band: self.band,
            channel: self.channel,
            bssid: self.bssid.unwrap_or(MacAddr::UNSPECIFIED),
            timeout_secs: self.timeout,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    install_panic_hook();

    if cli.args.print_default_config {
        print!("{}", config::default_config_toml());
        return Ok(());
    }

    let config = config::load(&cli.args)?;
    init_logging(&config.general.log_level, cli.args.log_file.as_deref())?;
    info!("nexus-wpas starting on {}", config.interface());

    let engine = Arc::new(SimEngine::with_behavior(config.interface(), config.sim_behavior()));
    let device: Arc<dyn Device> = Arc::new(SimDevice::new(config.interface()));
    let (events, mut rx) = EventBus::channel();
    let manager = WifiManager::new(engine, events, config.manager_settings());

    let out = Output { json: cli.json };
    match cli.command.unwrap_or(Cmd::Status) {
        Cmd::Connect(args) => {
            connect(&manager, &device, &args, &mut rx, &out).await?;
            out.status(&manager.status(&device).await?)?;
        }
        Cmd::Cycle(args) => {
            connect(&manager, &device, &args, &mut rx, &out).await?;
            out.status(&manager.status(&device).await?)?;
            let result = manager.disconnect(&device).await;
            out.drain(&mut rx)?;
            result.wrap_err("Disconnect failed")?;
        }
        Cmd::Ap(args) => run_ap(&manager, &device, &args, &mut rx, &out, &config).await?,
        Cmd::Status => out.status(&manager.status(&device).await?)?,
    }

    info!("nexus-wpas exiting");
    Ok(())
}

async fn connect(
    manager: &WifiManager,
    device: &Arc<dyn Device>,
    args: &NetworkArgs,
    rx: &mut UnboundedReceiver<Notification>,
    out: &Output,
) -> Result<()> {
    manager
        .connect(device, &args.request())
        .await
        .wrap_err_with(|| format!("Failed to connect to {}", args.ssid))?;

    // Timeout 0 waits forever; Ctrl-C is the way out
    loop {
        let notification = tokio::select! {
            n = rx.recv() => n.ok_or_else(|| eyre!("event bus closed"))?,
            _ = tokio::signal::ctrl_c() => return Err(eyre!("interrupted")),
        };
        out.notification(&notification)?;
        if let MgmtEvent::ConnectResult(outcome) = notification.event {
            return match outcome {
                nexus_wpas::Outcome::Success => Ok(()),
                other => Err(eyre!("connect ended with {:?}", other)),
            };
        }
    }
}

async fn run_ap(
    manager: &WifiManager,
    device: &Arc<dyn Device>,
    args: &ApArgs,
    rx: &mut UnboundedReceiver<Notification>,
    out: &Output,
    config: &Config,
) -> Result<()> {
    let mut req = ConnectRequest::secured(&args.ssid, SecurityType::Psk, &args.psk);
    req.channel = args.channel;
    manager
        .ap_enable(device, &req)
        .await
        .wrap_err_with(|| format!("Failed to enable AP {}", args.ssid))?;

    // Let the simulated AP come up before reading its status
    if let Some(after) = config.sim_behavior().associate_after {
        tokio::time::sleep(after + Duration::from_millis(10)).await;
    }
    out.status(&manager.status(device).await?)?;

    if let Some(max) = args.max_num_sta {
        let params = ApConfigParams {
            max_num_sta: Some(max),
            ..Default::default()
        };
        manager.ap_config_params(device, &params).await?;
    }

    let result = manager.ap_disable(device).await;
    out.drain(rx)?;
    result.wrap_err("Failed to disable AP")?;
    Ok(())
}

struct Output {
    json: bool,
}

impl Output {
    fn status(&self, status: &ConnectionStatus) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(status)?);
            return Ok(());
        }
        println!("state:     {}", status.state);
        if !status.state.is_associated() {
            return Ok(());
        }
        println!("ssid:      {}", status.ssid);
        println!("bssid:     {}", status.bssid);
        if let Some(band) = status.band {
            println!("band:      {}", band);
        }
        println!("channel:   {}", status.channel);
        println!("security:  {}", status.security);
        println!("mfp:       {}", status.mfp);
        if let Some(mode) = status.iface_mode {
            println!("mode:      {}", mode.label());
        }
        println!("link mode: {}", status.link_mode);
        if let Some(rssi) = status.rssi {
            println!("rssi:      {} dBm", rssi);
        }
        println!(
            "beacon:    {} TU, dtim {}, twt {}",
            status.beacon_interval, status.dtim_period, status.twt_capable
        );
        Ok(())
    }

    fn notification(&self, n: &Notification) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(n)?);
        } else {
            println!(
                "[{}] {}: {:?}",
                n.at.format("%H:%M:%S%.3f"),
                n.iface,
                n.event
            );
        }
        Ok(())
    }

    /// Print whatever is already queued
    fn drain(&self, rx: &mut UnboundedReceiver<Notification>) -> Result<()> {
        while let Ok(n) = rx.try_recv() {
            self.notification(&n)?;
        }
        Ok(())
    }
}

fn install_panic_hook() {
    color_eyre::install().ok();
}

/// Initialize tracing to stderr, or to a file when one is given
fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(path) = log_file {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
        let appender = tracing_appender::rolling::never(dir, name);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(appender)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}
