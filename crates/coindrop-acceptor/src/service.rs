//! Coin acceptor service: lifecycle, poll loop and wiring.
//!
//! The service owns the adapter, the decoder, the diverter controller and the
//! availability manager and wires them to the event channel and the property
//! store. After [`initialize`](CoinAcceptorService::initialize) it is started
//! with [`start`](CoinAcceptorService::start), which spawns the poll timer
//! and the poll loop and returns a [`ServiceHandle`] for receiving events and
//! issuing control commands.
//!
//! # Poll loop
//!
//! The device handle is owned exclusively by the poll task. On every wake it
//! first applies mechanism commands queued by control callers, then reads one
//! record outside the state lock, decodes it under the lock when the acceptor
//! is accepting or a coin is still in transit, publishes the resulting
//! events, acknowledges the record, and applies any now-due diverter change.
//! Control callers (enable, disable, divert requests) never touch the device:
//! they mutate state under the lock and nudge the wait handle so their
//! queued commands are applied promptly.
//!
//! A decoder desynchronization aborts the pass, discards its events and
//! disables the acceptor with the `Error` reason; an operator enable resets
//! the decode state and clears the condition.

use crate::adapter::CoinAcceptorAdapter;
use crate::availability::{AvailabilityManager, MechanismAction};
use crate::decoder::PulseDecoder;
use crate::diverter::DiverterController;
use crate::properties::{AcceptorProperties, PropertyStore};
use coindrop_channel::{DeviceBus, DeviceDescriptor};
use coindrop_core::{
    AcceptState, CoinEvent, DisabledReasons, DiverterTarget, EnableReason, Error, Result,
};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the coin acceptor service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Constructed; no device I/O has happened.
    Uninitialized,

    /// Device opened and configured, run loop not yet started.
    Initializing,

    /// Poll loop running.
    Running,

    /// Stop requested, tasks draining.
    Stopping,

    /// Run loop exited (or never started, when disabled by configuration).
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Mechanism command queued for the poll task to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MechanismCommand {
    /// Energize or release the reject mechanism.
    Reject(bool),

    /// Energize (hopper) or release (cashbox) the diverter solenoid.
    Diverter(bool),
}

/// Engine state guarded by the service mutex.
///
/// Mutations here are pure computation; no I/O and no await points happen
/// while the lock is held.
#[derive(Debug)]
struct EngineState {
    decoder: PulseDecoder,
    diverter: DiverterController,
    availability: AvailabilityManager,
    commands: VecDeque<MechanismCommand>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<EngineState>,
    wakeup: Notify,
}

/// The coin acceptor service orchestrator.
pub struct CoinAcceptorService {
    descriptor: DeviceDescriptor,
    properties: AcceptorProperties,
    adapter: Option<CoinAcceptorAdapter>,
    shared: Arc<Shared>,
    ready: Arc<Notify>,
    event_tx: mpsc::Sender<CoinEvent>,
    event_rx: Option<mpsc::Receiver<CoinEvent>>,
    run_state: RunState,
}

impl CoinAcceptorService {
    /// Create a service for the given device descriptor, reading its
    /// configuration snapshot from the property store.
    pub fn new(descriptor: DeviceDescriptor, store: &impl PropertyStore) -> Self {
        let properties = AcceptorProperties::load(store);
        let initial_target = if properties.hopper_enabled {
            DiverterTarget::Hopper
        } else {
            DiverterTarget::Cashbox
        };
        let (event_tx, event_rx) = mpsc::channel(100);

        Self {
            descriptor,
            properties,
            adapter: None,
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState {
                    decoder: PulseDecoder::new(properties.token_value),
                    diverter: DiverterController::new(initial_target),
                    availability: AvailabilityManager::new(),
                    commands: VecDeque::new(),
                }),
                wakeup: Notify::new(),
            }),
            ready: Arc::new(Notify::new()),
            event_tx,
            event_rx: Some(event_rx),
            run_state: RunState::Uninitialized,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.run_state
    }

    /// The configuration snapshot loaded at construction.
    pub fn properties(&self) -> &AcceptorProperties {
        &self.properties
    }

    /// The outstanding disable reasons.
    pub fn disabled_reasons(&self) -> DisabledReasons {
        self.lock_state().availability.disabled_reasons()
    }

    /// Discover and open the device, apply the configured diverter target and
    /// start device polling.
    ///
    /// When acceptance is disabled by configuration the device's internal
    /// polling is stopped instead and the service ends in
    /// [`RunState::Stopped`]: the run loop will never start.
    ///
    /// # Errors
    ///
    /// Returns the discovery/open error when the device is missing. The
    /// service stays uninitialized and disabled with the `Device` reason; the
    /// surrounding process keeps running.
    pub async fn initialize(&mut self, bus: &impl DeviceBus) -> Result<()> {
        if self.run_state != RunState::Uninitialized {
            return Err(Error::InvalidStateTransition {
                from: self.run_state.to_string(),
                to: RunState::Initializing.to_string(),
            });
        }
        self.run_state = RunState::Initializing;

        let mut adapter = CoinAcceptorAdapter::new(self.descriptor.clone());
        if let Err(e) = adapter.initialize(bus).await {
            error!(error = %e, "coin acceptor initialization failed");
            self.lock_state().availability.disable(DisabledReasons::DEVICE);
            self.run_state = RunState::Uninitialized;
            return Err(e);
        }

        if !self.properties.acceptor_enabled {
            info!("coin acceptance disabled by configuration, run loop will not start");
            adapter.stop_polling().await;
            {
                let mut state = self.lock_state();
                state.availability.set_initialized(true);
                state.availability.disable(DisabledReasons::CONFIGURATION);
            }
            self.adapter = Some(adapter);
            self.run_state = RunState::Stopped;
            return Ok(());
        }

        let initial_target = {
            let mut state = self.lock_state();
            state.availability.set_initialized(true);
            state.decoder.reset();
            state.diverter.confirmed_target()
        };

        // Mechanical baseline: configured diverter target, reject engaged
        // until an enable request arrives, device polling running.
        adapter.diverter_mechanism(initial_target == DiverterTarget::Hopper).await;
        adapter.reject_mechanism(true).await;
        adapter.start_polling().await;

        info!(target = %initial_target, "coin acceptor initialized");
        self.adapter = Some(adapter);
        Ok(())
    }

    /// Spawn the poll timer and poll loop tasks, consuming the service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] unless the service was
    /// successfully initialized (and not disabled by configuration).
    pub fn start(mut self) -> Result<ServiceHandle> {
        if self.run_state != RunState::Initializing {
            return Err(Error::InvalidStateTransition {
                from: self.run_state.to_string(),
                to: RunState::Running.to_string(),
            });
        }
        let adapter = self.adapter.take().ok_or(Error::NotInitialized)?;

        let (state_tx, stop_rx) = watch::channel(RunState::Running);
        let mut tasks = JoinSet::new();

        let interval = Duration::from_millis(self.descriptor.poll_interval_ms);
        tasks.spawn(timer_task(Arc::clone(&self.shared), stop_rx.clone(), interval));
        tasks.spawn(poll_task(
            adapter,
            Arc::clone(&self.shared),
            Arc::clone(&self.ready),
            self.event_tx.clone(),
            stop_rx,
        ));

        info!("coin acceptor service running");
        Ok(ServiceHandle {
            shared: Arc::clone(&self.shared),
            ready: Arc::clone(&self.ready),
            event_rx: self.event_rx.take().expect("event receiver already taken"),
            event_tx: self.event_tx.clone(),
            state_tx,
            tasks,
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.shared.state.lock().expect("engine state poisoned")
    }
}

/// Handle to a running coin acceptor service.
///
/// Receives published domain events and carries the control surface the
/// platform's business logic calls from arbitrary tasks. Control methods are
/// synchronous: they mutate engine state under the mutex, queue mechanism
/// commands for the poll task and nudge its wait handle.
#[derive(Debug)]
pub struct ServiceHandle {
    shared: Arc<Shared>,
    ready: Arc<Notify>,
    event_rx: mpsc::Receiver<CoinEvent>,
    event_tx: mpsc::Sender<CoinEvent>,
    state_tx: watch::Sender<RunState>,
    tasks: JoinSet<()>,
}

impl ServiceHandle {
    /// Current lifecycle state. [`RunState::Running`] from
    /// [`start`](CoinAcceptorService::start) until
    /// [`shutdown`](ServiceHandle::shutdown) begins.
    pub fn state(&self) -> RunState {
        *self.state_tx.borrow()
    }

    /// Signal that the platform's components are ready. The poll loop waits
    /// for this exactly once before processing records.
    pub fn notify_ready(&self) {
        self.ready.notify_one();
    }

    /// Receive the next published domain event.
    ///
    /// Returns `None` once the service tasks have terminated and the channel
    /// is drained.
    pub async fn recv(&mut self) -> Option<CoinEvent> {
        self.event_rx.recv().await
    }

    /// True while no disable reason is outstanding.
    pub fn is_enabled(&self) -> bool {
        self.lock_state().availability.is_enabled()
    }

    /// The outstanding disable reasons.
    pub fn disabled_reasons(&self) -> DisabledReasons {
        self.lock_state().availability.disabled_reasons()
    }

    /// Attempt to enable the acceptor, remedying `reason`'s subset of
    /// disable reasons. Returns whether the acceptor is enabled afterwards.
    ///
    /// A successful enable resets the decode state; if a latched hardware
    /// fault was cleared by that reset, a fault-cleared event is published.
    pub fn enable(&self, reason: EnableReason) -> bool {
        let (enabled, cleared_fault) = {
            let mut state = self.lock_state();
            let (enabled, action) = state.availability.enable(reason);
            push_mechanism(&mut state, action);

            let mut cleared_fault = false;
            if enabled {
                state.diverter.set_accept_state(AcceptState::Accept);
                cleared_fault = state.decoder.reset();
            }
            (enabled, cleared_fault)
        };

        if cleared_fault && self.event_tx.try_send(CoinEvent::HardwareFaultCleared).is_err() {
            warn!("event channel full, fault-cleared event dropped");
        }
        self.shared.wakeup.notify_one();
        enabled
    }

    /// Add disable reasons. Idempotent: reasons already applied cause no
    /// mechanism change.
    pub fn disable(&self, reasons: DisabledReasons) {
        {
            let mut state = self.lock_state();
            let action = state.availability.disable(reasons);
            if action == MechanismAction::RejectOn {
                state.diverter.set_accept_state(AcceptState::Reject);
            }
            push_mechanism(&mut state, action);
        }
        self.shared.wakeup.notify_one();
    }

    /// Request a diverter target change, applied once no coin is in transit.
    pub fn request_divert(&self, target: DiverterTarget) {
        self.lock_state().diverter.request_divert(target);
        self.shared.wakeup.notify_one();
    }

    /// Stop the service and wait for its tasks to exit.
    ///
    /// Stop is level-triggered: the run state flips to
    /// [`RunState::Stopping`] once and both tasks observe it, whether they
    /// are sleeping, waiting for the ready signal or mid-read.
    pub async fn shutdown(mut self) {
        info!("coin acceptor service stopping");
        let _ = self.state_tx.send(RunState::Stopping);
        self.ready.notify_one();
        self.shared.wakeup.notify_one();

        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result
                && !e.is_cancelled()
            {
                warn!(error = %e, "service task terminated abnormally");
            }
        }
        info!("coin acceptor service stopped");
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.shared.state.lock().expect("engine state poisoned")
    }
}

fn push_mechanism(state: &mut EngineState, action: MechanismAction) {
    match action {
        MechanismAction::RejectOn => state.commands.push_back(MechanismCommand::Reject(true)),
        MechanismAction::RejectOff => state.commands.push_back(MechanismCommand::Reject(false)),
        MechanismAction::None => {}
    }
}

async fn timer_task(
    shared: Arc<Shared>,
    mut stop_rx: watch::Receiver<RunState>,
    interval: Duration,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => shared.wakeup.notify_one(),
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() != RunState::Running {
                    break;
                }
            }
        }
    }
}

async fn poll_task(
    mut adapter: CoinAcceptorAdapter,
    shared: Arc<Shared>,
    ready: Arc<Notify>,
    event_tx: mpsc::Sender<CoinEvent>,
    mut stop_rx: watch::Receiver<RunState>,
) {
    // Wait once for the components-ready signal before touching records.
    tokio::select! {
        _ = ready.notified() => debug!("ready signal received, poll loop active"),
        _ = stop_rx.changed() => {}
    }

    while *stop_rx.borrow() == RunState::Running {
        tokio::select! {
            _ = shared.wakeup.notified() => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        apply_commands(&mut adapter, &shared).await;

        match adapter.read().await {
            Ok(Some(record)) => {
                let mut events = Vec::new();
                {
                    let mut guard = shared.state.lock().expect("engine state poisoned");
                    let state = &mut *guard;

                    let accepting = state.diverter.accept_state() == AcceptState::Accept;
                    if accepting || state.diverter.coin_in_transit() {
                        if let Err(e) =
                            state.decoder.decode(&record, &mut state.diverter, &mut events)
                        {
                            error!(error = %e, "decode pass aborted, disabling acceptor");
                            events.clear();
                            let action = state.availability.disable(DisabledReasons::ERROR);
                            if action == MechanismAction::RejectOn {
                                state.diverter.set_accept_state(AcceptState::Reject);
                            }
                            push_mechanism(state, action);
                        }
                    }

                    if let Some(target) = state.diverter.due_action() {
                        debug!(%target, "applying deferred diverter change");
                        state.diverter.confirm(target);
                        state
                            .commands
                            .push_back(MechanismCommand::Diverter(target == DiverterTarget::Hopper));
                        state.commands.push_back(MechanismCommand::Reject(
                            state.diverter.accept_state() == AcceptState::Reject,
                        ));
                    }
                }

                for event in events {
                    if event_tx.send(event).await.is_err() {
                        debug!("event receiver dropped");
                    }
                }
                adapter.ack_read(record.change_id).await;
                apply_commands(&mut adapter, &shared).await;
            }
            Ok(None) => {} // Nothing to report yet.
            Err(e) => {
                error!(error = %e, "device read failed, disabling acceptor");
                let mut guard = shared.state.lock().expect("engine state poisoned");
                let state = &mut *guard;
                let action = state.availability.disable(DisabledReasons::DEVICE);
                if action == MechanismAction::RejectOn {
                    state.diverter.set_accept_state(AcceptState::Reject);
                }
                break;
            }
        }
    }

    adapter.cleanup().await;
}

/// Drain and apply queued mechanism commands, one at a time, re-taking the
/// lock between commands so control callers are never blocked on device I/O.
async fn apply_commands(adapter: &mut CoinAcceptorAdapter, shared: &Shared) {
    loop {
        let command = {
            shared
                .state
                .lock()
                .expect("engine state poisoned")
                .commands
                .pop_front()
        };
        let Some(command) = command else { break };
        let ok = match command {
            MechanismCommand::Reject(on) => adapter.reject_mechanism(on).await,
            MechanismCommand::Diverter(on) => adapter.diverter_mechanism(on).await,
        };
        if !ok {
            warn!(?command, "mechanism command failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::MemoryProperties;
    use coindrop_channel::mock::MockBus;
    use coindrop_core::constants::PROP_ACCEPTOR_ENABLED;

    fn descriptor() -> DeviceDescriptor {
        DeviceDescriptor::standard()
            .with_poll_interval_ms(5)
            .with_wait_period_ms(10)
    }

    fn enabled_properties() -> MemoryProperties {
        MemoryProperties::new().with_flag(PROP_ACCEPTOR_ENABLED, true)
    }

    #[test]
    fn test_new_service_is_uninitialized() {
        let service = CoinAcceptorService::new(descriptor(), &MemoryProperties::new());
        assert_eq!(service.state(), RunState::Uninitialized);
        assert_eq!(service.disabled_reasons(), DisabledReasons::SERVICE);
    }

    #[test]
    fn test_start_before_initialize_fails() {
        let service = CoinAcceptorService::new(descriptor(), &enabled_properties());
        let err = service.start().unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_initialize_missing_device() {
        let bus = MockBus::new();
        let mut service = CoinAcceptorService::new(descriptor(), &enabled_properties());

        let err = service.initialize(&bus).await.unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
        assert_eq!(service.state(), RunState::Uninitialized);
        assert!(service.disabled_reasons().contains(DisabledReasons::DEVICE));
    }

    #[tokio::test]
    async fn test_initialize_applies_mechanical_baseline() {
        let bus = MockBus::new();
        let descriptor = descriptor();
        let device = bus.install(&descriptor);
        let mut service = CoinAcceptorService::new(descriptor, &enabled_properties());

        service.initialize(&bus).await.unwrap();
        assert_eq!(service.state(), RunState::Initializing);
        assert!(device.is_polling());
        assert!(device.reject_engaged());
        // Hopper enabled by default: diverter solenoid energized.
        assert!(device.diverter_engaged());
    }

    #[tokio::test]
    async fn test_initialize_twice_fails() {
        let bus = MockBus::new();
        let descriptor = descriptor();
        let _device = bus.install(&descriptor);
        let mut service = CoinAcceptorService::new(descriptor, &enabled_properties());

        service.initialize(&bus).await.unwrap();
        let err = service.initialize(&bus).await.unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_config_disabled_stops_polling_and_never_starts() {
        let bus = MockBus::new();
        let descriptor = descriptor();
        let device = bus.install(&descriptor);
        // Acceptance disabled by configuration (the default).
        let mut service = CoinAcceptorService::new(descriptor, &MemoryProperties::new());

        service.initialize(&bus).await.unwrap();
        assert_eq!(service.state(), RunState::Stopped);
        assert!(!device.is_polling());
        assert!(
            service
                .disabled_reasons()
                .contains(DisabledReasons::CONFIGURATION)
        );

        let err = service.start().unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_handle_enable_and_disable() {
        let bus = MockBus::new();
        let descriptor = descriptor();
        let _device = bus.install(&descriptor);
        let mut service = CoinAcceptorService::new(descriptor, &enabled_properties());
        service.initialize(&bus).await.unwrap();
        let handle = service.start().unwrap();

        assert!(!handle.is_enabled());
        assert!(handle.enable(EnableReason::Service));
        assert!(handle.is_enabled());

        handle.disable(DisabledReasons::OPERATOR.union(DisabledReasons::SYSTEM));
        assert!(!handle.is_enabled());

        // Operator enable leaves the system disable outstanding.
        assert!(!handle.enable(EnableReason::Operator));
        assert_eq!(handle.disabled_reasons(), DisabledReasons::SYSTEM);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_handle_reports_running_until_shutdown() {
        let bus = MockBus::new();
        let descriptor = descriptor();
        let _device = bus.install(&descriptor);
        let mut service = CoinAcceptorService::new(descriptor, &enabled_properties());
        service.initialize(&bus).await.unwrap();

        let handle = service.start().unwrap();
        assert_eq!(handle.state(), RunState::Running);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_clean_without_ready_signal() {
        let bus = MockBus::new();
        let descriptor = descriptor();
        let _device = bus.install(&descriptor);
        let mut service = CoinAcceptorService::new(descriptor, &enabled_properties());
        service.initialize(&bus).await.unwrap();

        // Never readied; shutdown must still unblock the poll task.
        let handle = service.start().unwrap();
        handle.shutdown().await;
    }
}
