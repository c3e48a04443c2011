use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{error, warn};

use crate::error::{WpasError, WpasResult};
use crate::network::engine::Engine;
use crate::network::types::LinkState;

/// Default sampling period of the disconnect confirmer
pub const DISCONNECT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Default deadline of the disconnect confirmer
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Wait until the engine reports DISCONNECTED for `ifname`.
///
/// Must not be called with the control lock held: the poller needs it.
pub async fn wait_for_disconnect_complete(
    engine: &dyn Engine,
    ifname: &str,
    poll_interval: Duration,
    deadline: Duration,
) -> WpasResult<()> {
    let started = Instant::now();
    loop {
        let Some(state) = engine.link_state(ifname) else {
            error!("Failed to get wpa_s handle for {}", ifname);
            return Err(WpasError::DeviceNotFound(ifname.to_string()));
        };
        if state == LinkState::Disconnected {
            return Ok(());
        }
        if started.elapsed() >= deadline {
            warn!("Failed to disconnect from network, still {}", state);
            return Err(WpasError::Timeout(format!(
                "{} not disconnected after {}ms",
                ifname,
                deadline.as_millis()
            )));
        }
        sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::engine::Command;
    use crate::network::sim::{SimBehavior, SimEngine};

    const IFACE: &str = "wlan0";

    fn connected_engine(disconnect_after: Option<Duration>) -> SimEngine {
        let engine = SimEngine::with_behavior(
            IFACE,
            SimBehavior {
                associate_after: Some(Duration::ZERO),
                disconnect_after,
            },
        );
        let id = engine.add_network(IFACE).unwrap();
        engine.command(IFACE, &Command::SelectNetwork(id)).unwrap();
        engine
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_disconnected_returns_immediately() {
        let engine = SimEngine::new(IFACE);
        let started = Instant::now();

        wait_for_disconnect_complete(&engine, IFACE, DISCONNECT_POLL_INTERVAL, DISCONNECT_TIMEOUT)
            .await
            .unwrap();
        assert!(started.elapsed() <= DISCONNECT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_engine() {
        let engine = connected_engine(Some(Duration::from_millis(120)));
        engine.command(IFACE, &Command::Disconnect).unwrap();
        let started = Instant::now();

        wait_for_disconnect_complete(&engine, IFACE, DISCONNECT_POLL_INTERVAL, DISCONNECT_TIMEOUT)
            .await
            .unwrap();
        let took = started.elapsed();
        assert!(took >= Duration::from_millis(120));
        assert!(took <= Duration::from_millis(120) + DISCONNECT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_engine_times_out_at_deadline() {
        let engine = connected_engine(None);
        engine.command(IFACE, &Command::Disconnect).unwrap();
        let started = Instant::now();

        let err = wait_for_disconnect_complete(
            &engine,
            IFACE,
            DISCONNECT_POLL_INTERVAL,
            DISCONNECT_TIMEOUT,
        )
        .await
        .unwrap_err();
        let took = started.elapsed();

        assert!(matches!(err, WpasError::Timeout(_)));
        assert!(took >= DISCONNECT_TIMEOUT);
        assert!(took <= DISCONNECT_TIMEOUT + DISCONNECT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_interface() {
        let engine = SimEngine::new(IFACE);
        let err = wait_for_disconnect_complete(&engine, "wlan9", DISCONNECT_POLL_INTERVAL, DISCONNECT_TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err, WpasError::DeviceNotFound("wlan9".into()));
    }
}
