//! Pad thread - owns the ports and drives every backend
//!
//! A single dedicated thread polls all live backends on a fixed tick and
//! aggregates the number of connected ports. Control calls from other threads
//! only flip atomic flags or write single atomic fields; the actual
//! reconfiguration always runs on the pad thread itself, so the polling
//! schedule never stalls on a caller.
//!
//! # Loop states
//!
//! ```text
//!             enabled                 reset requested
//! Disabled ◄───────────► Polling ◄──────────────────► Reloading
//!    │      !enabled        │         (one tick)
//!    └──────────┬───────────┘
//!               ▼ active cleared
//!            Stopped
//! ```
//!
//! # Worker lifecycle
//!
//! The worker itself is a statum machine: `Created ──initialize──► Running
//! ──run_polling_loop──► Finished`. The first reconfiguration happens in
//! `initialize`, on the constructing thread, before the pad thread starts.

use super::error::PadError;
use super::handler::{HandlerFactory, HandlerKind};
use super::keyboard_handler::GuiContext;
use super::null_handler::NullPadHandler;
use super::pad_state::{Pad, PadInfo, PadInfoBlock, PadSetting, INFO_INTERCEPTED, MAX_PORTS};
use super::registry::{HandlerRegistry, PlatformHandlerFactory};
use crate::config::{ConfigSource, InputConfig, PlayerConfig, TomlConfigSource};
use chrono::Local;
use statum::{machine, state};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock, TryLockError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Settings for the pad thread
#[derive(Clone, Debug)]
pub struct PadThreadSettings {
    /// Sleep between two ticks, also used while disabled
    pub tick_interval_ms: u64,
    /// Whether polling starts enabled
    pub start_enabled: bool,
    /// Period of the throughput log line
    pub stats_interval_secs: i64,
}

impl Default for PadThreadSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1,
            start_enabled: true,
            stats_interval_secs: 10,
        }
    }
}

/// Observable state of the polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Stopped = 0,
    Disabled = 1,
    Reloading = 2,
    Polling = 3,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoopState::Disabled,
            2 => LoopState::Reloading,
            3 => LoopState::Polling,
            _ => LoopState::Stopped,
        }
    }
}

/// Collaborators the pad thread loads profiles and backends from
pub struct PadBackends {
    config_source: Box<dyn ConfigSource>,
    factory: Box<dyn HandlerFactory>,
    gui: Option<GuiContext>,
}

impl PadBackends {
    pub fn new(config_source: impl ConfigSource + 'static) -> Self {
        Self {
            config_source: Box::new(config_source),
            factory: Box::new(PlatformHandlerFactory),
            gui: None,
        }
    }

    pub fn with_factory(mut self, factory: impl HandlerFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    /// GUI context handed to the keyboard backend when it is created
    pub fn with_gui(mut self, gui: GuiContext) -> Self {
        self.gui = Some(gui);
        self
    }
}

impl Default for PadBackends {
    fn default() -> Self {
        Self::new(TomlConfigSource::from_default_dir())
    }
}

#[derive(Debug)]
struct PortSlot {
    pad: Arc<Pad>,
    handler: HandlerKind,
}

/// State shared between the pad thread and control callers
#[derive(Debug)]
pub(crate) struct Shared {
    active: AtomicBool,
    enabled: AtomicBool,
    reset: AtomicBool,
    loop_state: AtomicU8,
    session: Mutex<String>,
    info: PadInfoBlock,
    ports: RwLock<Vec<PortSlot>>,
    // Serializes reconfigurations
    reconfigure_lock: Mutex<()>,
    reconfigurations: AtomicU64,
}

impl Shared {
    fn new(session: &str, enabled: bool) -> Self {
        Self {
            active: AtomicBool::new(false),
            enabled: AtomicBool::new(enabled),
            reset: AtomicBool::new(false),
            loop_state: AtomicU8::new(LoopState::Stopped as u8),
            session: Mutex::new(session.to_string()),
            info: PadInfoBlock::default(),
            ports: RwLock::new(Vec::new()),
            reconfigure_lock: Mutex::new(()),
            reconfigurations: AtomicU64::new(0),
        }
    }

    fn session(&self) -> String {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn loop_state(&self) -> LoopState {
        LoopState::from_u8(self.loop_state.load(Ordering::SeqCst))
    }

    fn set_loop_state(&self, state: LoopState) {
        self.loop_state.store(state as u8, Ordering::SeqCst);
    }

    fn set_enabled(&self, enabled: bool) {
        debug!("Pad polling {}", if enabled { "enabled" } else { "disabled" });
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn reset(&self, session: &str) {
        info!("Pad reset requested for session '{}'", session);
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = session.to_string();
        self.reset
            .store(self.active.load(Ordering::SeqCst), Ordering::SeqCst);
    }

    fn set_rumble(&self, port: usize, large_motor: u8, small_motor: bool) {
        let ports = match self.ports.try_read() {
            Ok(ports) => ports,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Ports are being rebuilt, dropping rumble for port {}", port);
                return;
            }
        };
        let Some(slot) = ports.get(port) else {
            return;
        };

        let motors = slot.pad.vibrate_motors();
        if motors.len() >= 2 {
            motors[0].set_value(large_motor);
            motors[1].set_value(if small_motor { 255 } else { 0 });
        }
    }

    fn set_intercepted(&self, intercepted: bool) {
        self.info.set_system_flag(INFO_INTERCEPTED, intercepted);
    }

    fn pad(&self, port: usize) -> Option<Arc<Pad>> {
        let ports = self.ports.read().unwrap_or_else(|e| e.into_inner());
        ports.get(port).map(|slot| Arc::clone(&slot.pad))
    }

    fn bound_handler(&self, port: usize) -> Option<HandlerKind> {
        let ports = self.ports.read().unwrap_or_else(|e| e.into_inner());
        ports.get(port).map(|slot| slot.handler)
    }
}

#[state]
#[derive(Debug, Clone)]
pub(crate) enum WorkerState {
    Created,
    Running,
    Finished,
}

#[machine]
pub(crate) struct PadWorker<S: WorkerState> {
    shared: Arc<Shared>,
    registry: HandlerRegistry,
    factory: Box<dyn HandlerFactory>,
    config_source: Box<dyn ConfigSource>,
    gui: Option<GuiContext>,
    settings: PadThreadSettings,
}

impl<S: WorkerState> PadWorker<S> {
    /// Rebuilds the registry and every port for the current session.
    ///
    /// Capability and device type of each port carry over; status restarts
    /// disconnected. A port whose backend is missing or refuses the device
    /// ends up on the null backend.
    fn reconfigure(&mut self) {
        let shared = Arc::clone(&self.shared);
        let _guard = shared
            .reconfigure_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let session = shared.session();
        info!("Reconfiguring pads for session '{}'", session);

        let pad_settings: Vec<PadSetting> = {
            let ports = shared.ports.read().unwrap_or_else(|e| e.into_inner());
            (0..MAX_PORTS)
                .map(|port| {
                    ports
                        .get(port)
                        .map(|slot| slot.pad.setting())
                        .unwrap_or_default()
                })
                .collect()
        };

        shared.info.reset_connections();
        self.registry.clear();

        let config = match self.config_source.load(&session) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load input profile for '{}': {}", session, e);
                InputConfig::default()
            }
        };

        self.registry.insert(Box::new(NullPadHandler::new()));

        let mut slots = Vec::with_capacity(MAX_PORTS);
        for (port, setting) in pad_settings.iter().enumerate() {
            let player = config.player(port);
            let pad = Arc::new(Pad::from_setting(setting));
            let handler = self.bind_port(port, &player, &pad);
            slots.push(PortSlot { pad, handler });
        }

        *shared.ports.write().unwrap_or_else(|e| e.into_inner()) = slots;
        let count = shared.reconfigurations.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Pads reconfigured ({} handlers live, reconfiguration #{})",
            self.registry.len(),
            count
        );
    }

    /// Binds `pad` to the configured backend, falling back to the null backend
    fn bind_port(&mut self, port: usize, player: &PlayerConfig, pad: &Arc<Pad>) -> HandlerKind {
        let result = match self.registry.get_or_create(
            player.handler,
            self.factory.as_ref(),
            self.gui.as_ref(),
        ) {
            Some(handler) => handler.bind_pad_to_device(Arc::clone(pad), &player.device),
            None => Err(PadError::HandlerUnavailable(player.handler)),
        };

        match result {
            Ok(()) => {
                debug!(
                    "Port {} bound to '{}' on {}",
                    port, player.device, player.handler
                );
                player.handler
            }
            Err(e) => {
                error!(
                    "Failed to bind device '{}' to handler {} on port {}: {}",
                    player.device, player.handler, port, e
                );
                if let Some(null) = self.registry.get_mut(HandlerKind::Null) {
                    if let Err(e) = null.bind_pad_to_device(Arc::clone(pad), &player.device) {
                        error!("Null handler refused port {}: {}", port, e);
                    }
                }
                HandlerKind::Null
            }
        }
    }
}

impl PadWorker<Created> {
    fn create(
        shared: Arc<Shared>,
        backends: PadBackends,
        settings: PadThreadSettings,
    ) -> Self {
        debug!("Creating pad worker with settings: {:?}", settings);
        Self::new(
            shared,
            HandlerRegistry::new(),
            backends.factory,
            backends.config_source,
            backends.gui,
            settings,
        )
    }

    /// Runs the initial reconfiguration and becomes ready to poll
    fn initialize(mut self) -> PadWorker<Running> {
        self.reconfigure();
        self.transition()
    }
}

impl PadWorker<Running> {
    fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.settings.tick_interval_ms)
    }

    /// Polls until the owner clears `active`
    fn run_polling_loop(mut self) -> PadWorker<Finished> {
        info!("Starting pad polling loop");
        let interval = self.tick_interval();

        // For throughput logging
        let mut tick_count: u64 = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(self.settings.stats_interval_secs);

        while self.shared.active.load(Ordering::SeqCst) {
            if !self.shared.enabled.load(Ordering::SeqCst) {
                self.shared.set_loop_state(LoopState::Disabled);
                std::thread::sleep(interval);
                continue;
            }

            if self.shared.reset.swap(false, Ordering::SeqCst) {
                self.shared.set_loop_state(LoopState::Reloading);
                self.reconfigure();
            }

            self.shared.set_loop_state(LoopState::Polling);
            let connected = self.registry.poll_all();
            self.shared.info.set_now_connect(connected);
            tick_count += 1;

            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Pad thread stats: {} ticks in last {} seconds, {} ports connected",
                    tick_count,
                    log_interval.num_seconds(),
                    connected
                );
                tick_count = 0;
                last_log_time = now;
            }

            std::thread::sleep(interval);
        }

        info!("Pad polling loop finished");
        self.transition()
    }
}

impl PadWorker<Finished> {
    /// Releases every backend
    fn shutdown(mut self) {
        debug!("Releasing {} pad handlers", self.registry.len());
        self.registry.clear();
        self.shared.set_loop_state(LoopState::Stopped);
    }
}

/// Owner of the pad thread
///
/// Dropping it stops the thread and waits for it to exit.
#[derive(Debug)]
pub struct PadThread {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl PadThread {
    /// Loads the profile for `session`, binds all ports and starts polling.
    ///
    /// The initial reconfiguration runs on the calling thread, so ports are
    /// bound by the time this returns.
    pub fn spawn(
        session: &str,
        settings: Option<PadThreadSettings>,
        backends: PadBackends,
    ) -> Result<Self, PadError> {
        let settings = settings.unwrap_or_default();
        info!(
            "Starting pad thread for session '{}' with settings: {:?}",
            session, settings
        );

        let shared = Arc::new(Shared::new(session, settings.start_enabled));
        let worker = PadWorker::create(Arc::clone(&shared), backends, settings).initialize();

        shared.active.store(true, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name("pad thread".to_string())
            .spawn(move || {
                worker.run_polling_loop().shutdown();
            });

        match spawned {
            Ok(thread) => {
                info!("Pad thread started");
                Ok(Self {
                    shared,
                    thread: Some(thread),
                })
            }
            Err(e) => {
                error!("Failed to spawn pad thread: {}", e);
                shared.active.store(false, Ordering::SeqCst);
                Err(PadError::ThreadSpawn(e))
            }
        }
    }

    /// Handle for control calls from other threads
    pub fn control(&self) -> PadControl {
        PadControl {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.set_enabled(enabled);
    }

    /// Switches to `session` and requests a reconfiguration on the next tick
    pub fn reset(&self, session: &str) {
        self.shared.reset(session);
    }

    /// Sets the motors of `port`. Unknown ports and pads without two motors
    /// are ignored.
    pub fn set_rumble(&self, port: usize, large_motor: u8, small_motor: bool) {
        self.shared.set_rumble(port, large_motor, small_motor);
    }

    pub fn set_intercepted(&self, intercepted: bool) {
        self.shared.set_intercepted(intercepted);
    }

    pub fn info(&self) -> PadInfo {
        self.shared.info.snapshot()
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    pub fn loop_state(&self) -> LoopState {
        self.shared.loop_state()
    }

    pub fn session(&self) -> String {
        self.shared.session()
    }

    /// Number of completed reconfigurations, including the initial one
    pub fn reconfigurations(&self) -> u64 {
        self.shared.reconfigurations.load(Ordering::SeqCst)
    }

    /// Current pad of `port`; replaced on every reconfiguration
    pub fn pad(&self, port: usize) -> Option<Arc<Pad>> {
        self.shared.pad(port)
    }

    /// Backend kind `port` is bound to
    pub fn bound_handler(&self, port: usize) -> Option<HandlerKind> {
        self.shared.bound_handler(port)
    }

    /// Stops polling and waits for the thread to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        info!("Stopping pad thread");
        self.shared.active.store(false, Ordering::SeqCst);
        if thread.join().is_err() {
            error!("Pad thread panicked before shutdown");
        }
        self.shared.set_loop_state(LoopState::Stopped);
        info!("Pad thread stopped");
    }
}

impl Drop for PadThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cloneable control handle for other threads
///
/// Holds a weak reference; once the [`PadThread`] is gone every call is a
/// no-op.
#[derive(Debug, Clone)]
pub struct PadControl {
    shared: Weak<Shared>,
}

impl PadControl {
    fn with_shared(&self, op: impl FnOnce(&Shared)) {
        match self.shared.upgrade() {
            Some(shared) => op(&shared),
            None => warn!("Pad thread is gone, ignoring control call"),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.with_shared(|shared| shared.set_enabled(enabled));
    }

    pub fn reset(&self, session: &str) {
        self.with_shared(|shared| shared.reset(session));
    }

    pub fn set_rumble(&self, port: usize, large_motor: u8, small_motor: bool) {
        self.with_shared(|shared| shared.set_rumble(port, large_motor, small_motor));
    }

    pub fn set_intercepted(&self, intercepted: bool) {
        self.with_shared(|shared| shared.set_intercepted(intercepted));
    }

    pub fn info(&self) -> Option<PadInfo> {
        self.shared.upgrade().map(|shared| shared.info.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pad::pad_state::{DEFAULT_CAPABILITY, DEV_TYPE_STANDARD, STATUS_DISCONNECTED};

    fn null_backends() -> PadBackends {
        PadBackends::new(InputConfig::default())
    }

    #[test]
    fn constructor_binds_all_ports_before_returning() {
        let thread = PadThread::spawn("A", None, null_backends()).unwrap();

        assert_eq!(thread.reconfigurations(), 1);
        for port in 0..MAX_PORTS {
            let pad = thread.pad(port).expect("every port exists");
            assert_eq!(pad.port_status(), STATUS_DISCONNECTED);
            assert_eq!(pad.device_capability(), DEFAULT_CAPABILITY);
            assert_eq!(pad.device_type(), DEV_TYPE_STANDARD);
            assert_eq!(thread.bound_handler(port), Some(HandlerKind::Null));
        }
        assert!(thread.pad(MAX_PORTS).is_none());
        thread.shutdown();
    }

    #[test]
    fn reset_is_ignored_when_not_active() {
        let shared = Shared::new("A", true);
        shared.reset("B");
        assert_eq!(shared.session(), "B");
        assert!(!shared.reset.load(Ordering::SeqCst));
    }

    #[test]
    fn rumble_on_pad_without_motors_is_ignored() {
        let thread = PadThread::spawn("A", None, null_backends()).unwrap();
        thread.set_rumble(0, 200, true);
        assert!(thread.pad(0).unwrap().vibrate_motors().is_empty());
    }

    #[test]
    fn loop_state_round_trips_through_u8() {
        for state in [
            LoopState::Stopped,
            LoopState::Disabled,
            LoopState::Reloading,
            LoopState::Polling,
        ] {
            assert_eq!(LoopState::from_u8(state as u8), state);
        }
        assert_eq!(LoopState::from_u8(200), LoopState::Stopped);
    }

    #[test]
    fn null_backend_is_registered_first_on_every_reconfiguration() {
        let config = InputConfig::from_players(vec![
            PlayerConfig {
                handler: HandlerKind::Keyboard,
                device: "Keyboard".into(),
            },
            PlayerConfig {
                handler: HandlerKind::Ds4,
                device: "Wireless Controller".into(),
            },
        ]);
        let shared = Arc::new(Shared::new("A", true));
        let mut worker = PadWorker::create(
            Arc::clone(&shared),
            PadBackends::new(config),
            PadThreadSettings::default(),
        );

        for round in 1..=2u64 {
            worker.reconfigure();
            assert_eq!(shared.reconfigurations.load(Ordering::SeqCst), round);
            assert_eq!(worker.registry.kinds().first(), Some(&HandlerKind::Null));
            assert!(worker.registry.contains(HandlerKind::Null));
            assert!(!worker.registry.contains(HandlerKind::Ds4));
            assert_eq!(shared.bound_handler(0), Some(HandlerKind::Null));
            assert_eq!(shared.bound_handler(1), Some(HandlerKind::Null));
        }
    }

    #[test]
    fn control_handle_outlives_thread_safely() {
        let thread = PadThread::spawn("A", None, null_backends()).unwrap();
        let control = thread.control();
        control.set_intercepted(true);
        assert!(thread.info().is_intercepted());

        drop(thread);
        assert!(!control.is_alive());
        assert!(control.info().is_none());
        control.set_rumble(0, 10, false);
        control.reset("B");
    }
}
