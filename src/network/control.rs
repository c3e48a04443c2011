//! Operation control state and the connect status poller.
//!
//! One [`OperationControl`] exists per manager. Its mutex is the single lock
//! that serializes the control record, every engine command issued by the
//! public API, and each poller tick.
//!
//! Rearming always drains first: the running poller is flagged for
//! termination, woken, and joined before the new operation is written. A
//! second lock, held from the start of the drain until the arm guard is
//! dropped, keeps concurrent rearms in line, so a stale tick can never
//! observe or mutate a newer operation.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::event::{EventBus, MgmtEvent, Outcome};
use crate::network::engine::{Command, Engine};
use crate::network::offload::Device;
use crate::network::types::LinkState;

/// Delay between two poller ticks. The timeout counter counts ticks, so
/// this is also the unit of `timeout_secs`.
pub const OP_STATUS_POLLING_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestedOp {
    Connect,
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PollerState {
    #[default]
    Stopped,
    Running,
}

struct PollerHandle {
    task: JoinHandle<()>,
    /// Lets the drain run the pending tick right away
    wake: Arc<Notify>,
}

/// The shared control record
#[derive(Default)]
pub struct ControlState {
    device: Option<Arc<dyn Device>>,
    requested_op: Option<RequestedOp>,
    poller_state: PollerState,
    timeout_secs: u32,
    terminate: bool,
    elapsed_secs: u32,
    poller: Option<PollerHandle>,
}

impl ControlState {
    pub fn requested_op(&self) -> Option<RequestedOp> {
        self.requested_op
    }

    pub fn poller_state(&self) -> PollerState {
        self.poller_state
    }

    pub fn timeout_secs(&self) -> u32 {
        self.timeout_secs
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device.as_deref().map(|d| d.name())
    }

    fn reset_poller(&mut self) {
        self.elapsed_secs = 0;
        self.poller_state = PollerState::Stopped;
    }
}

enum Tick {
    Reschedule,
    Stop,
}

pub struct OperationControl {
    state: Arc<Mutex<ControlState>>,
    /// Held across drain and arm; pollers never take it
    arming: Mutex<()>,
    engine: Arc<dyn Engine>,
    events: EventBus,
}

/// Lock held after a successful drain. Dropping it without arming leaves
/// the previous operation recorded but no poller running. Commands that
/// belong to the armed operation are issued before the guard is dropped.
pub struct ArmGuard<'a> {
    guard: MutexGuard<'a, ControlState>,
    control: &'a OperationControl,
    _arming: MutexGuard<'a, ()>,
}

impl OperationControl {
    pub fn new(engine: Arc<dyn Engine>, events: EventBus) -> Self {
        Self {
            state: Arc::new(Mutex::new(ControlState::default())),
            arming: Mutex::new(()),
            engine,
            events,
        }
    }

    /// Plain access to the control record, no draining
    pub async fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().await
    }

    /// Take the lock with no poller left alive.
    ///
    /// The state lock is released while joining, so the poller can run its
    /// final tick. Other drainers queue on `arming` until the returned guard
    /// is dropped.
    pub async fn lock_drained(&self) -> ArmGuard<'_> {
        let arming = self.arming.lock().await;
        loop {
            let mut st = self.state.lock().await;
            let Some(poller) = st.poller.take() else {
                st.terminate = false;
                return ArmGuard {
                    guard: st,
                    control: self,
                    _arming: arming,
                };
            };

            st.terminate = true;
            drop(st);

            debug!("Draining status poller");
            poller.wake.notify_one();
            if let Err(e) = poller.task.await {
                warn!("Status poller ended abnormally: {}", e);
                self.state.lock().await.reset_poller();
            }
        }
    }

    fn spawn_poller(&self, st: &mut ControlState) {
        let wake = Arc::new(Notify::new());
        let task = tokio::spawn(poll_status(
            self.state.clone(),
            self.engine.clone(),
            self.events.clone(),
            wake.clone(),
        ));
        st.poller_state = PollerState::Running;
        st.poller = Some(PollerHandle { task, wake });
    }
}

impl ArmGuard<'_> {
    /// Record the new operation; a Connect also starts a fresh poller
    pub fn arm(&mut self, device: Arc<dyn Device>, op: RequestedOp, timeout_secs: u32) {
        info!(
            "Arming {:?} on {} (timeout {}s)",
            op,
            device.name(),
            timeout_secs
        );
        let st = &mut *self.guard;
        st.device = Some(device);
        st.requested_op = Some(op);
        st.timeout_secs = timeout_secs;
        st.reset_poller();

        if op == RequestedOp::Connect {
            self.control.spawn_poller(st);
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.guard
    }
}

async fn poll_status(
    state: Arc<Mutex<ControlState>>,
    engine: Arc<dyn Engine>,
    events: EventBus,
    wake: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(OP_STATUS_POLLING_INTERVAL) => {}
            _ = wake.notified() => {}
        }

        let mut st = state.lock().await;
        match tick(&mut st, engine.as_ref(), &events) {
            Tick::Reschedule => continue,
            Tick::Stop => {
                st.reset_poller();
                return;
            }
        }
    }
}

/// One poller step, run with the control lock held
fn tick(st: &mut ControlState, engine: &dyn Engine, events: &EventBus) -> Tick {
    if st.terminate {
        debug!("Status poller terminated");
        return Tick::Stop;
    }

    let Some(ifname) = st.device_name().map(str::to_string) else {
        return Tick::Stop;
    };
    let is_connect = st.requested_op == Some(RequestedOp::Connect);

    let Some(link) = engine.link_state(&ifname) else {
        error!("Interface {} not found", ifname);
        if is_connect {
            events.publish(&ifname, MgmtEvent::ConnectResult(Outcome::Failure));
        }
        return Tick::Stop;
    };

    if is_connect && link != LinkState::Completed {
        st.elapsed_secs += 1;
        if st.timeout_secs > 0 && st.elapsed_secs > st.timeout_secs {
            error!(
                "Connection timed out, timeout: {} seconds",
                st.timeout_secs
            );
            if let Err(e) = engine.command(&ifname, &Command::Disconnect) {
                error!("Failed to execute wpa_cli command: {}: {}", Command::Disconnect, e);
            }
            events.publish(&ifname, MgmtEvent::ConnectResult(Outcome::Timeout));
            return Tick::Stop;
        }
        return Tick::Reschedule;
    }

    if is_connect {
        info!("Connected on {} after {}s", ifname, st.elapsed_secs);
        events.publish(&ifname, MgmtEvent::ConnectResult(Outcome::Success));
    }
    Tick::Stop
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Notification;
    use crate::network::sim::{SimBehavior, SimDevice, SimEngine};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::sleep;

    const IFACE: &str = "wlan0";

    fn setup(
        behavior: SimBehavior,
    ) -> (
        Arc<SimEngine>,
        OperationControl,
        UnboundedReceiver<Notification>,
        Arc<dyn Device>,
    ) {
        let engine = Arc::new(SimEngine::with_behavior(IFACE, behavior));
        let (bus, rx) = EventBus::channel();
        let control = OperationControl::new(engine.clone(), bus);
        let device: Arc<dyn Device> = Arc::new(SimDevice::new(IFACE));
        (engine, control, rx, device)
    }

    fn never_associates() -> SimBehavior {
        SimBehavior {
            associate_after: None,
            ..Default::default()
        }
    }

    fn start_connecting(engine: &SimEngine) {
        let id = engine.add_network(IFACE).unwrap();
        engine.command(IFACE, &Command::SelectNetwork(id)).unwrap();
    }

    fn drain_events(rx: &mut UnboundedReceiver<Notification>) -> Vec<MgmtEvent> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n.event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_stops_on_completion() {
        let (engine, control, mut rx, device) = setup(SimBehavior {
            associate_after: Some(Duration::from_millis(2500)),
            ..Default::default()
        });
        start_connecting(&engine);
        control
            .lock_drained()
            .await
            .arm(device, RequestedOp::Connect, 10);
        assert_eq!(control.lock().await.poller_state(), PollerState::Running);

        sleep(Duration::from_millis(3500)).await;

        assert_eq!(control.lock().await.poller_state(), PollerState::Stopped);
        assert_eq!(
            drain_events(&mut rx),
            vec![MgmtEvent::ConnectResult(Outcome::Success)]
        );
        assert!(!engine.commands().contains(&Command::Disconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_once_after_third_tick() {
        let (engine, control, mut rx, device) = setup(never_associates());
        start_connecting(&engine);
        control
            .lock_drained()
            .await
            .arm(device, RequestedOp::Connect, 3);

        sleep(Duration::from_millis(3500)).await;
        assert!(drain_events(&mut rx).is_empty());
        assert_eq!(control.lock().await.poller_state(), PollerState::Running);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(
            drain_events(&mut rx),
            vec![MgmtEvent::ConnectResult(Outcome::Timeout)]
        );
        assert_eq!(control.lock().await.poller_state(), PollerState::Stopped);
        assert!(engine.commands().contains(&Command::Disconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_waits_forever() {
        let (engine, control, mut rx, device) = setup(never_associates());
        start_connecting(&engine);
        control
            .lock_drained()
            .await
            .arm(device, RequestedOp::Connect, 0);

        sleep(Duration::from_secs(120)).await;
        assert!(drain_events(&mut rx).is_empty());
        assert_eq!(control.lock().await.poller_state(), PollerState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_drains_previous_poller() {
        let (engine, control, mut rx, device) = setup(never_associates());
        start_connecting(&engine);
        control
            .lock_drained()
            .await
            .arm(device.clone(), RequestedOp::Connect, 3);
        sleep(Duration::from_millis(2500)).await;

        let mut guard = control.lock_drained().await;
        assert_eq!(guard.state().poller_state(), PollerState::Stopped);
        guard.arm(device, RequestedOp::Connect, 10);
        drop(guard);

        // The first poller would have timed out at t=4s
        sleep(Duration::from_secs(5)).await;
        assert!(drain_events(&mut rx).is_empty());
        assert_eq!(control.lock().await.timeout_secs(), 10);
        assert_eq!(control.lock().await.poller_state(), PollerState::Running);
        assert!(!engine.commands().contains(&Command::Disconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_does_not_wait_a_full_interval() {
        let (engine, control, _rx, device) = setup(never_associates());
        start_connecting(&engine);
        control
            .lock_drained()
            .await
            .arm(device, RequestedOp::Connect, 30);

        let before = tokio::time::Instant::now();
        let guard = control.lock_drained().await;
        assert!(before.elapsed() < OP_STATUS_POLLING_INTERVAL);
        assert_eq!(guard.state().poller_state(), PollerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_arm_has_no_poller() {
        let (_engine, control, _rx, device) = setup(SimBehavior::default());
        control
            .lock_drained()
            .await
            .arm(device, RequestedOp::Disconnect, 0);

        let st = control.lock().await;
        assert_eq!(st.requested_op(), Some(RequestedOp::Disconnect));
        assert_eq!(st.poller_state(), PollerState::Stopped);
        assert_eq!(st.device_name(), Some(IFACE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_rearms_leave_one_poller() {
        let (engine, control, mut rx, device) = setup(never_associates());
        let control = Arc::new(control);
        start_connecting(&engine);
        control
            .lock_drained()
            .await
            .arm(device.clone(), RequestedOp::Connect, 100);

        // Both rearms queue up behind a held lock
        let held = control.lock().await;
        let rearms: Vec<_> = (0..2)
            .map(|_| {
                let control = control.clone();
                let device = device.clone();
                tokio::spawn(async move {
                    control
                        .lock_drained()
                        .await
                        .arm(device, RequestedOp::Connect, 100);
                })
            })
            .collect();
        sleep(Duration::from_millis(10)).await;
        drop(held);
        for rearm in rearms {
            rearm.await.unwrap();
        }

        sleep(Duration::from_millis(60_500)).await;
        assert!(drain_events(&mut rx).is_empty());
        assert!(!engine.commands().contains(&Command::Disconnect));

        let st = control.lock().await;
        assert_eq!(st.poller_state(), PollerState::Running);
        // One tick per second, not two
        assert_eq!(st.elapsed_secs, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_device_reports_failure() {
        let (engine, control, mut rx, device) = setup(never_associates());
        start_connecting(&engine);
        control
            .lock_drained()
            .await
            .arm(device, RequestedOp::Connect, 5);
        engine.remove_interface();

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(
            drain_events(&mut rx),
            vec![MgmtEvent::ConnectResult(Outcome::Failure)]
        );
        assert_eq!(control.lock().await.poller_state(), PollerState::Stopped);
    }
}
