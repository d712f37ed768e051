//! Control loop driver
//!
//! One tick per temperature-update period: pull a sample, average it, run the
//! calculator and ramp limiter, command the fan when the change is worth
//! sending, then let the learner update the offset tables. UI messages are
//! drained at the start of each tick so a whole tick always sees one
//! consistent configuration snapshot.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, warn};

use bs2_core::constants::{control, device, timing};
use bs2_core::{
    apply_ramp_limit, calculate_target_rpm, learn_curve_offsets, normalize_app_config,
    sanitize_curve, AppConfig, CurvePoint, LearnSample, SmartControlConfig,
};
use bs2_error::Result;

use crate::temperature::TemperatureProvider;
use crate::transport::{report_transport_error, FanTransport};

/// Persistence seam for the configuration document
pub trait ConfigStore: Send {
    fn load(&mut self) -> Result<AppConfig>;
    fn save(&mut self, config: &AppConfig) -> Result<()>;
}

/// JSON file store at a fixed path
#[derive(Debug)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn at_default_path() -> Self {
        Self::new(bs2_core::constants::paths::config_file_path())
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&mut self) -> Result<AppConfig> {
        bs2_core::load_config_from(&self.path)
    }

    fn save(&mut self, config: &AppConfig) -> Result<()> {
        bs2_core::save_config_to(&self.path, config)
    }
}

/// Sending half of the control-message queue.
///
/// Every send wakes the sleeping loop so the message applies on the next
/// tick instead of waiting out the rest of the poll interval.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<ControlMessage>,
    wake: Arc<Notify>,
}

impl ControlHandle {
    pub fn send(&self, message: ControlMessage) {
        if self.tx.send(message).is_err() {
            debug!("CONTROL: message dropped, loop already stopped");
            return;
        }
        self.wake.notify_one();
    }
}

/// Receiving half of the control-message queue, owned by the loop
#[derive(Debug)]
pub struct ControlQueue {
    messages: mpsc::UnboundedReceiver<ControlMessage>,
    wake: Arc<Notify>,
}

/// Create the message queue connecting front-ends to the control loop
pub fn control_channel() -> (ControlHandle, ControlQueue) {
    let (tx, messages) = mpsc::unbounded_channel();
    let wake = Arc::new(Notify::new());
    (
        ControlHandle { tx, wake: wake.clone() },
        ControlQueue { messages, wake },
    )
}

/// Inbound UI control messages, drained at the start of each tick
#[derive(Debug, Clone)]
pub enum ControlMessage {
    SetAutoControl(bool),
    SetCustomSpeed { enabled: bool, rpm: i32 },
    SetFanCurve(Vec<CurvePoint>),
    UpdateSmartControl(SmartControlPatch),
    ResetLearning,
    Shutdown,
}

/// Field-wise patch for the smart-control tunables.
///
/// Unset fields keep their current value; the patched config is fully
/// re-normalized before use, so out-of-range patches fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmartControlPatch {
    pub enabled: Option<bool>,
    pub target_temp: Option<i32>,
    pub aggressiveness: Option<i32>,
    pub hysteresis: Option<i32>,
    pub min_rpm_change: Option<i32>,
    pub ramp_up_limit: Option<i32>,
    pub ramp_down_limit: Option<i32>,
    pub learn_rate: Option<i32>,
    pub learn_window: Option<i32>,
    pub learn_delay: Option<i32>,
    pub overheat_weight: Option<i32>,
    pub rpm_delta_weight: Option<i32>,
    pub noise_weight: Option<i32>,
    pub trend_gain: Option<i32>,
    pub max_learn_offset: Option<i32>,
}

impl SmartControlPatch {
    pub fn apply(&self, cfg: &mut SmartControlConfig) {
        if let Some(enabled) = self.enabled {
            cfg.enabled = enabled;
        }
        if let Some(target_temp) = self.target_temp {
            cfg.target_temp = target_temp;
        }
        if let Some(aggressiveness) = self.aggressiveness {
            cfg.aggressiveness = aggressiveness;
        }
        if let Some(hysteresis) = self.hysteresis {
            cfg.hysteresis = hysteresis;
        }
        if let Some(min_rpm_change) = self.min_rpm_change {
            cfg.min_rpm_change = min_rpm_change;
        }
        if let Some(ramp_up_limit) = self.ramp_up_limit {
            cfg.ramp_up_limit = ramp_up_limit;
        }
        if let Some(ramp_down_limit) = self.ramp_down_limit {
            cfg.ramp_down_limit = ramp_down_limit;
        }
        if let Some(learn_rate) = self.learn_rate {
            cfg.learn_rate = learn_rate;
        }
        if let Some(learn_window) = self.learn_window {
            cfg.learn_window = learn_window;
        }
        if let Some(learn_delay) = self.learn_delay {
            cfg.learn_delay = learn_delay;
        }
        if let Some(overheat_weight) = self.overheat_weight {
            cfg.overheat_weight = overheat_weight;
        }
        if let Some(rpm_delta_weight) = self.rpm_delta_weight {
            cfg.rpm_delta_weight = rpm_delta_weight;
        }
        if let Some(noise_weight) = self.noise_weight {
            cfg.noise_weight = noise_weight;
        }
        if let Some(trend_gain) = self.trend_gain {
            cfg.trend_gain = trend_gain;
        }
        if let Some(max_learn_offset) = self.max_learn_offset {
            cfg.max_learn_offset = max_learn_offset;
        }
    }
}

/// What the loop is doing this tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Idle,
    Active,
    SuspendedByCustomRpm,
}

/// Per-tick snapshot published to observers
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub state: LoopState,
    pub avg_temp: i32,
    pub last_target_rpm: i32,
    pub current_rpm: Option<u16>,
    pub learned_offsets: Vec<i32>,
    pub learned_offsets_heat: Vec<i32>,
    pub learned_offsets_cool: Vec<i32>,
    pub rate_heat: Vec<i32>,
    pub rate_cool: Vec<i32>,
}

/// The control loop: owns the configuration, the sample buffers, and the
/// last-tick state. Single consumer of the message queue.
pub struct ControlLoop<P, T, S> {
    provider: P,
    transport: T,
    store: S,
    config: AppConfig,
    last_avg_temp: i32,
    last_target_rpm: i32,
    raw_samples: VecDeque<i32>,
    recent_avg_temps: VecDeque<i32>,
    sensor_failures: u32,
    last_good_temp: Option<i32>,
    last_custom_rpm_sent: Option<i32>,
    queue: ControlQueue,
    telemetry: watch::Sender<TelemetrySnapshot>,
    shutdown_requested: bool,
}

impl<P, T, S> ControlLoop<P, T, S>
where
    P: TemperatureProvider,
    T: FanTransport,
    S: ConfigStore,
{
    /// Load and normalize the configuration, persisting any repairs
    pub fn new(
        mut store: S,
        provider: P,
        transport: T,
        queue: ControlQueue,
        telemetry: watch::Sender<TelemetrySnapshot>,
    ) -> Self {
        let config = store.load().unwrap_or_else(|e| {
            warn!("STORE: load failed ({}), starting from defaults", e);
            AppConfig::default()
        });
        let (config, changed) = normalize_app_config(config);
        if changed {
            info!("STORE: configuration repaired at load");
            if let Err(e) = store.save(&config) {
                warn!("STORE: failed to persist repaired configuration: {}", e);
            }
        }

        Self {
            provider,
            transport,
            store,
            config,
            last_avg_temp: 0,
            last_target_rpm: 0,
            raw_samples: VecDeque::new(),
            recent_avg_temps: VecDeque::new(),
            sensor_failures: 0,
            last_good_temp: None,
            last_custom_rpm_sent: None,
            queue,
            telemetry,
            shutdown_requested: false,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn last_target_rpm(&self) -> i32 {
        self.last_target_rpm
    }

    /// State the next tick will run in
    pub fn current_state(&self) -> LoopState {
        if self.config.custom_speed_enabled {
            LoopState::SuspendedByCustomRpm
        } else if self.config.auto_control && self.config.smart_control.enabled {
            LoopState::Active
        } else {
            LoopState::Idle
        }
    }

    /// Run until shutdown, one tick per update period
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) {
        info!("Control loop starting");
        loop {
            if shutdown.load(Ordering::SeqCst) || self.shutdown_requested {
                break;
            }
            self.tick();
            if self.shutdown_requested {
                break;
            }
            let secs = self
                .config
                .temp_update_rate
                .clamp(timing::MIN_UPDATE_RATE_SECS, timing::MAX_UPDATE_RATE_SECS)
                as u64;
            // Sleep out the period, but let a queued message cut it short so
            // control changes and shutdown apply immediately
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = self.queue.wake.notified() => {
                    debug!("Control loop woken by a queued message");
                }
            }
        }
        info!("Control loop stopped");
    }

    /// One end-to-end control iteration
    pub fn tick(&mut self) {
        self.drain_messages();
        if self.shutdown_requested {
            return;
        }

        let avg_temp = match self.sample_average() {
            Some(avg) => avg,
            None => {
                // Sensor out beyond the reuse window: leave the fan alone
                self.publish_telemetry(self.current_state());
                return;
            }
        };

        self.push_recent(avg_temp);

        let state = self.current_state();
        match state {
            LoopState::SuspendedByCustomRpm => self.run_suspended(),
            LoopState::Idle => {
                debug!("CONTROL: idle, {}°C", avg_temp);
            }
            LoopState::Active => self.run_active(avg_temp),
        }

        self.last_avg_temp = avg_temp;
        self.publish_telemetry(state);
    }

    /// Pull one reading and fold it into the raw-sample average.
    ///
    /// A failed read reuses the last good temperature for up to
    /// `temp_sample_count` consecutive ticks, then gives up until a good
    /// sample returns.
    fn sample_average(&mut self) -> Option<i32> {
        let reading = self.provider.sample();
        let effective = reading.effective();

        let raw = if reading.success && effective > 0 {
            self.sensor_failures = 0;
            self.last_good_temp = Some(effective);
            effective
        } else {
            self.sensor_failures += 1;
            let reuse_window = self.config.temp_sample_count.max(1) as u32;
            match self.last_good_temp {
                Some(last) if self.sensor_failures <= reuse_window => {
                    debug!(
                        "SENSOR: read failed ({}/{}), reusing {}°C",
                        self.sensor_failures, reuse_window, last
                    );
                    last
                }
                _ => {
                    warn!(
                        "SENSOR: no temperature for {} ticks: {}",
                        self.sensor_failures,
                        if reading.error.is_empty() { "unknown" } else { &reading.error }
                    );
                    return None;
                }
            }
        };

        self.raw_samples.push_back(raw);
        while self.raw_samples.len() > timing::MAX_SAMPLE_COUNT as usize {
            self.raw_samples.pop_front();
        }

        let count = (self.config.temp_sample_count.max(1) as usize).min(self.raw_samples.len());
        let sum: i32 = self.raw_samples.iter().rev().take(count).sum();
        Some(sum / count as i32)
    }

    fn push_recent(&mut self, avg_temp: i32) {
        self.recent_avg_temps.push_back(avg_temp);
        let cap = (self.config.smart_control.learn_window + self.config.smart_control.learn_delay)
            .max(0) as usize
            + control::SAMPLE_FIFO_SLACK;
        while self.recent_avg_temps.len() > cap {
            self.recent_avg_temps.pop_front();
        }
    }

    /// Fixed-speed override: submit once per value, never run the calculator
    fn run_suspended(&mut self) {
        let rpm = self.config.custom_speed_rpm.clamp(0, device::MAX_RPM);
        if self.last_custom_rpm_sent == Some(rpm) {
            return;
        }
        match self.transport.set_target_rpm(rpm as u16) {
            Ok(()) => {
                info!("CONTROL: custom speed {} RPM", rpm);
                self.last_custom_rpm_sent = Some(rpm);
                self.last_target_rpm = rpm;
            }
            Err(e) => report_transport_error("custom speed command", &e),
        }
    }

    /// Calculator, ramp limiter, dead-band gate, learner
    fn run_active(&mut self, avg_temp: i32) {
        if self.config.fan_curve.is_empty() {
            debug!("CONTROL: empty curve, leaving fan untouched");
            return;
        }

        let sc = &self.config.smart_control;
        let target = calculate_target_rpm(avg_temp, self.last_avg_temp, &self.config.fan_curve, sc);
        let emitted =
            apply_ramp_limit(target, self.last_target_rpm, sc.ramp_up_limit, sc.ramp_down_limit);

        if (emitted - self.last_target_rpm).abs() >= sc.min_rpm_change {
            match self.transport.set_target_rpm(emitted.clamp(0, device::MAX_RPM) as u16) {
                Ok(()) => debug!(
                    "CONTROL: {} -> {} RPM at {}°C (raw target {})",
                    self.last_target_rpm, emitted, avg_temp, target
                ),
                // Next tick recomputes from scratch; no retry within this one
                Err(e) => report_transport_error("speed command", &e),
            }
        }

        let recent: Vec<i32> = self.recent_avg_temps.iter().copied().collect();
        let sample = LearnSample {
            avg_temp,
            last_avg_temp: self.last_avg_temp,
            target_rpm: emitted,
            last_target_rpm: self.last_target_rpm,
        };
        let outcome =
            learn_curve_offsets(sample, &recent, &self.config.fan_curve, &self.config.smart_control);
        if outcome.changed {
            outcome.apply_to(&mut self.config.smart_control);
            self.persist("learned state");
        }

        self.last_target_rpm = emitted;
    }

    fn drain_messages(&mut self) {
        let mut dirty = false;
        while let Ok(message) = self.queue.messages.try_recv() {
            dirty |= self.handle_message(message);
        }
        if dirty {
            let (config, _) = normalize_app_config(self.config.clone());
            self.config = config;
            self.persist("configuration");
        }
    }

    /// Apply one message; returns whether the configuration was touched
    pub fn handle_message(&mut self, message: ControlMessage) -> bool {
        match message {
            ControlMessage::SetAutoControl(enabled) => {
                info!("CONTROL: auto control {}", if enabled { "on" } else { "off" });
                self.config.auto_control = enabled;
                true
            }
            ControlMessage::SetCustomSpeed { enabled, rpm } => {
                info!("CONTROL: custom speed {} ({} RPM)", if enabled { "on" } else { "off" }, rpm);
                self.config.custom_speed_enabled = enabled;
                self.config.custom_speed_rpm = rpm;
                if !enabled {
                    self.last_custom_rpm_sent = None;
                }
                true
            }
            ControlMessage::SetFanCurve(points) => {
                if let Err(e) = bs2_core::validate_curve_points(&points) {
                    warn!("CONTROL: repairing submitted curve: {}", e);
                }
                let repaired = sanitize_curve(points);
                info!("CONTROL: fan curve replaced ({} points)", repaired.len());
                self.config.fan_curve = repaired;
                true
            }
            ControlMessage::UpdateSmartControl(patch) => {
                patch.apply(&mut self.config.smart_control);
                true
            }
            ControlMessage::ResetLearning => {
                info!("CONTROL: learning reset");
                self.config.smart_control.reset_learning();
                true
            }
            ControlMessage::Shutdown => {
                info!("CONTROL: shutdown requested");
                self.shutdown_requested = true;
                false
            }
        }
    }

    fn persist(&mut self, what: &str) {
        if let Err(e) = self.store.save(&self.config) {
            warn!("STORE: failed to persist {}: {}", what, e);
        }
    }

    fn publish_telemetry(&mut self, state: LoopState) {
        let sc = &self.config.smart_control;
        let snapshot = TelemetrySnapshot {
            state,
            avg_temp: self.last_avg_temp,
            last_target_rpm: self.last_target_rpm,
            current_rpm: self.transport.current_rpm(),
            learned_offsets: sc.learned_offsets.clone(),
            learned_offsets_heat: sc.learned_offsets_heat.clone(),
            learned_offsets_cool: sc.learned_offsets_cool.clone(),
            rate_heat: sc.learned_rate_heat.clone(),
            rate_cool: sc.learned_rate_cool.clone(),
        };
        // Receivers may come and go; a lagging UI must never stall the loop
        let _ = self.telemetry.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use bs2_core::TempReading;

    /// Provider fed from a script; `None` entries are failed reads
    struct ScriptedProvider {
        script: VecDeque<Option<i32>>,
    }

    impl ScriptedProvider {
        fn new(script: &[Option<i32>]) -> Self {
            Self {
                script: script.iter().copied().collect(),
            }
        }

        fn steady(temps: &[i32]) -> Self {
            Self::new(&temps.iter().map(|&t| Some(t)).collect::<Vec<_>>())
        }
    }

    impl TemperatureProvider for ScriptedProvider {
        fn sample(&mut self) -> TempReading {
            match self.script.pop_front().flatten() {
                Some(temp) => TempReading {
                    cpu: temp,
                    gpu: temp,
                    max: temp,
                    success: true,
                    error: String::new(),
                },
                None => TempReading {
                    cpu: 0,
                    gpu: 0,
                    max: 0,
                    success: false,
                    error: "scripted failure".to_string(),
                },
            }
        }
    }

    /// Transport that records every submitted RPM
    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<u16>>>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<u16> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl FanTransport for RecordingTransport {
        fn set_target_rpm(&mut self, rpm: u16) -> Result<()> {
            self.sent.lock().unwrap().push(rpm);
            Ok(())
        }

        fn send_preset(
            &mut self,
            _gear: bs2_protocol::Gear,
            _level: bs2_protocol::Level,
        ) -> Result<()> {
            Ok(())
        }

        fn current_rpm(&mut self) -> Option<u16> {
            self.sent.lock().unwrap().last().copied()
        }
    }

    /// Store that remembers every save
    #[derive(Clone)]
    struct MemoryStore {
        initial: AppConfig,
        saved: Arc<Mutex<Vec<AppConfig>>>,
    }

    impl MemoryStore {
        fn new(initial: AppConfig) -> Self {
            Self {
                initial,
                saved: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn saved(&self) -> Vec<AppConfig> {
            self.saved.lock().unwrap().clone()
        }
    }

    impl ConfigStore for MemoryStore {
        fn load(&mut self) -> Result<AppConfig> {
            Ok(self.initial.clone())
        }

        fn save(&mut self, config: &AppConfig) -> Result<()> {
            self.saved.lock().unwrap().push(config.clone());
            Ok(())
        }
    }

    struct TestRig {
        control: ControlLoop<ScriptedProvider, RecordingTransport, MemoryStore>,
        transport: RecordingTransport,
        store: MemoryStore,
        messages: ControlHandle,
        telemetry: watch::Receiver<TelemetrySnapshot>,
    }

    fn rig(config: AppConfig, provider: ScriptedProvider) -> TestRig {
        let transport = RecordingTransport::default();
        let store = MemoryStore::new(config);
        let (message_tx, queue) = control_channel();
        let (telemetry_tx, telemetry_rx) = watch::channel(TelemetrySnapshot::default());
        let control = ControlLoop::new(
            store.clone(),
            provider,
            transport.clone(),
            queue,
            telemetry_tx,
        );
        TestRig {
            control,
            transport,
            store,
            messages: message_tx,
            telemetry: telemetry_rx,
        }
    }

    fn active_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auto_control = true;
        config
    }

    #[test]
    fn test_idle_sends_nothing() {
        let mut config = AppConfig::default();
        config.auto_control = false;
        let mut rig = rig(config, ScriptedProvider::steady(&[50, 55, 60]));
        for _ in 0..3 {
            rig.control.tick();
        }
        assert!(rig.transport.sent().is_empty());
        assert_eq!(rig.control.current_state(), LoopState::Idle);
    }

    #[test]
    fn test_active_emissions_are_ramp_limited() {
        let mut rig = rig(active_config(), ScriptedProvider::steady(&[50; 9]));
        for _ in 0..9 {
            rig.control.tick();
        }
        let sent = rig.transport.sent();
        assert!(!sent.is_empty());
        // Ramp up from zero in 220 RPM steps
        assert_eq!(sent[0], 220);
        for window in sent.windows(2) {
            assert!((window[1] as i32 - window[0] as i32).abs() <= 220);
        }
    }

    #[test]
    fn test_dead_band_suppresses_small_changes() {
        // Dead-band above the ramp limit: no change is ever big enough
        let mut config = active_config();
        config.smart_control.min_rpm_change = 400;
        config.smart_control.ramp_up_limit = 220;
        let mut rig = rig(config, ScriptedProvider::steady(&[50; 6]));
        for _ in 0..6 {
            rig.control.tick();
        }
        assert!(rig.transport.sent().is_empty());
        // The ramp state still advances so a later big change stays bounded
        assert!(rig.control.last_target_rpm() > 0);
    }

    #[test]
    fn test_custom_speed_takes_precedence_and_sends_once() {
        let mut config = active_config();
        config.custom_speed_enabled = true;
        config.custom_speed_rpm = 2500;
        let mut rig = rig(config, ScriptedProvider::steady(&[70; 4]));
        for _ in 0..4 {
            rig.control.tick();
        }
        assert_eq!(rig.control.current_state(), LoopState::SuspendedByCustomRpm);
        assert_eq!(rig.transport.sent(), vec![2500]);
    }

    #[test]
    fn test_custom_speed_resends_on_change() {
        let mut config = active_config();
        config.custom_speed_enabled = true;
        config.custom_speed_rpm = 2500;
        let mut rig = rig(config, ScriptedProvider::steady(&[70; 4]));
        rig.control.tick();
        rig.messages
            .send(ControlMessage::SetCustomSpeed { enabled: true, rpm: 3000 });
        rig.control.tick();
        rig.control.tick();
        assert_eq!(rig.transport.sent(), vec![2500, 3000]);
    }

    #[test]
    fn test_custom_speed_clamped_to_device_limit() {
        let mut config = active_config();
        config.custom_speed_enabled = true;
        config.custom_speed_rpm = 99_000;
        let mut rig = rig(config, ScriptedProvider::steady(&[70; 2]));
        rig.control.tick();
        assert_eq!(rig.transport.sent(), vec![4000]);
    }

    #[test]
    fn test_disabling_custom_speed_resumes_active() {
        let mut config = active_config();
        config.custom_speed_enabled = true;
        config.custom_speed_rpm = 2000;
        let mut rig = rig(config, ScriptedProvider::steady(&[70; 3]));
        rig.control.tick();
        rig.messages
            .send(ControlMessage::SetCustomSpeed { enabled: false, rpm: 2000 });
        rig.control.tick();
        assert_eq!(rig.control.current_state(), LoopState::Active);
        // Resumed control ramps from the custom speed, not from zero
        let sent = rig.transport.sent();
        assert!(sent.len() >= 2);
        assert!((sent[1] as i32 - 2000).abs() <= 220);
    }

    #[test]
    fn test_sensor_failure_reuses_last_good_within_window() {
        let mut config = active_config();
        config.temp_sample_count = 2;
        let script = [Some(60), None, None, Some(62)];
        let mut rig = rig(config, ScriptedProvider::new(&script));
        for _ in 0..4 {
            rig.control.tick();
        }
        // Failed ticks reuse 60°C: commands keep flowing on every tick
        assert_eq!(rig.transport.sent().len(), 4);
    }

    #[test]
    fn test_sensor_outage_beyond_window_suppresses_control() {
        let mut config = active_config();
        config.temp_sample_count = 1;
        let script = [Some(60), None, None, None];
        let mut rig = rig(config, ScriptedProvider::new(&script));
        for _ in 0..4 {
            rig.control.tick();
        }
        // Tick 1 commands, tick 2 reuses, ticks 3-4 are suppressed
        assert_eq!(rig.transport.sent().len(), 2);
    }

    #[test]
    fn test_reset_learning_message_zeroes_and_persists() {
        let mut config = active_config();
        config.smart_control.learned_offsets_heat[4] = 150;
        config.smart_control.learned_rate_heat[3] = 40;
        let mut rig = rig(config, ScriptedProvider::steady(&[50; 2]));
        rig.messages.send(ControlMessage::ResetLearning);
        rig.control.tick();

        let sc = &rig.control.config().smart_control;
        assert!(sc.learned_offsets_heat.iter().all(|&v| v == 0));
        assert!(sc.learned_rate_heat.iter().all(|&v| v == 0));
        assert!(!rig.store.saved().is_empty());
    }

    #[test]
    fn test_set_fan_curve_repairs_and_resizes() {
        let mut rig = rig(active_config(), ScriptedProvider::steady(&[50; 2]));
        let unsorted = vec![
            CurvePoint { temperature: 80, rpm: 9000 },
            CurvePoint { temperature: 30, rpm: 1000 },
            CurvePoint { temperature: 55, rpm: 2000 },
        ];
        rig.messages.send(ControlMessage::SetFanCurve(unsorted));
        rig.control.tick();

        let config = rig.control.config();
        assert_eq!(config.fan_curve.len(), 3);
        assert_eq!(config.fan_curve[0].temperature, 30);
        assert_eq!(config.fan_curve[2].rpm, 4000);
        assert_eq!(config.smart_control.learned_offsets_heat.len(), 3);
        assert_eq!(config.smart_control.learned_offsets.len(), 3);
    }

    #[test]
    fn test_smart_control_patch_is_normalized() {
        let mut rig = rig(active_config(), ScriptedProvider::steady(&[50; 2]));
        let patch = SmartControlPatch {
            target_temp: Some(75),
            aggressiveness: Some(99), // out of range, falls back to default
            ..Default::default()
        };
        rig.messages.send(ControlMessage::UpdateSmartControl(patch));
        rig.control.tick();

        let sc = &rig.control.config().smart_control;
        assert_eq!(sc.target_temp, 75);
        assert_eq!(sc.aggressiveness, 5);
    }

    #[test]
    fn test_learning_persists_through_store() {
        let mut rig = rig(active_config(), ScriptedProvider::steady(&[72; 14]));
        for _ in 0..14 {
            rig.control.tick();
        }
        let saved = rig.store.saved();
        assert!(!saved.is_empty());
        let last = saved.last().unwrap();
        assert!(last.smart_control.learned_offsets_heat.iter().any(|&v| v != 0));
    }

    #[test]
    fn test_telemetry_reflects_last_tick() {
        let mut rig = rig(active_config(), ScriptedProvider::steady(&[55; 3]));
        for _ in 0..3 {
            rig.control.tick();
        }
        let snapshot = rig.telemetry.borrow();
        assert_eq!(snapshot.state, LoopState::Active);
        assert_eq!(snapshot.avg_temp, 55);
        assert_eq!(snapshot.last_target_rpm, rig.control.last_target_rpm());
        assert_eq!(snapshot.learned_offsets.len(), 14);
        assert_eq!(snapshot.current_rpm.map(i32::from), Some(rig.control.last_target_rpm()));
    }

    #[test]
    fn test_shutdown_message_stops_processing() {
        let mut rig = rig(active_config(), ScriptedProvider::steady(&[60; 2]));
        rig.messages.send(ControlMessage::Shutdown);
        rig.control.tick();
        assert!(rig.transport.sent().is_empty());
    }

    #[test]
    fn test_empty_curve_suppresses_emission() {
        let mut config = active_config();
        config.fan_curve.clear();
        let mut rig = rig(config, ScriptedProvider::steady(&[60; 3]));
        for _ in 0..3 {
            rig.control.tick();
        }
        assert!(rig.transport.sent().is_empty());
    }

    #[test]
    fn test_loaded_config_is_repaired_and_persisted() {
        let mut config = active_config();
        config.temp_update_rate = 999;
        config.smart_control.target_temp = 5;
        let rig = rig(config, ScriptedProvider::steady(&[]));
        assert_eq!(rig.control.config().temp_update_rate, 2);
        assert_eq!(rig.control.config().smart_control.target_temp, 68);
        assert!(!rig.store.saved().is_empty());
    }
}
