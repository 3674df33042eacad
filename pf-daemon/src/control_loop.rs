//! Fan control loop
//!
//! Reads the sensors, runs the thermal engine and forwards the duty cycle to
//! the actuator once per interval until shutdown is signaled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pf_core::constants::sensors::MAX_DEVICES;
use pf_core::constants::timing;
use pf_core::{CycleReport, DutySink, SensorSnapshot, SensorSource, ThermalEngine, ThermalReading, ThermalState};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Process-wide shutdown request, set from the signal handler
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake the control loop
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) {
        while !self.is_triggered() {
            self.notify.notified().await;
        }
    }
}

/// Everything one control cycle needs, owned by the loop
pub struct ControlContext<S, A> {
    sensors: Arc<S>,
    engine: ThermalEngine,
    state: ThermalState,
    actuator: A,
    max_devices: usize,
    interval: Duration,
    /// Duty last accepted by the actuator; `None` forces the next write
    last_forwarded: Option<f64>,
    cycle: u64,
    consecutive_write_errors: u32,
}

impl<S, A> ControlContext<S, A>
where
    S: SensorSource + 'static,
    A: DutySink,
{
    pub fn new(sensors: Arc<S>, engine: ThermalEngine, actuator: A, interval: Duration) -> Self {
        Self {
            sensors,
            engine,
            state: ThermalState::new(),
            actuator,
            max_devices: MAX_DEVICES,
            interval,
            last_forwarded: None,
            cycle: 0,
            consecutive_write_errors: 0,
        }
    }

    pub fn state(&self) -> &ThermalState {
        &self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Run the engine on one set of readings and forward the result
    pub fn apply_readings(&mut self, snapshot: &SensorSnapshot, now: Instant) -> CycleReport {
        self.cycle += 1;
        let report = self
            .engine
            .compute_duty_cycle(&mut self.state, snapshot.cpu, &snapshot.devices, now);
        self.forward(report.duty);
        self.log_cycle(&report);
        report
    }

    /// One full cycle: read sensors off the executor, then apply
    pub async fn run_cycle(&mut self) -> CycleReport {
        let snapshot = self.read_sensors().await;
        self.apply_readings(&snapshot, Instant::now())
    }

    /// Drive the fan to 0 and release the actuator
    pub fn finish(&mut self) {
        if let Err(e) = self.actuator.set_duty_cycle(0.0) {
            warn!("Failed to stop fan before shutdown: {}", e);
        }
        self.actuator.shutdown();
    }

    async fn read_sensors(&self) -> SensorSnapshot {
        let sensors = self.sensors.clone();
        let max_devices = self.max_devices;
        match tokio::task::spawn_blocking(move || sensors.read_snapshot(max_devices)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Sensor read task failed: {}", e);
                SensorSnapshot {
                    cpu: ThermalReading::unavailable(),
                    devices: Vec::new(),
                }
            }
        }
    }

    fn forward(&mut self, duty: f64) {
        if self.last_forwarded == Some(duty) {
            return;
        }
        match self.actuator.set_duty_cycle(duty) {
            Ok(()) => {
                if self.consecutive_write_errors > 0 {
                    debug!("Fan writes recovered after {} errors", self.consecutive_write_errors);
                    self.consecutive_write_errors = 0;
                }
                self.last_forwarded = Some(duty);
            }
            Err(e) => {
                self.consecutive_write_errors += 1;
                if self.consecutive_write_errors == 1
                    || self.consecutive_write_errors % timing::MAX_CONSECUTIVE_ERRORS == 0
                {
                    error!(
                        "Failed to set fan duty {:.0}% (count: {}): {}",
                        duty * 100.0,
                        self.consecutive_write_errors,
                        e
                    );
                }
                self.last_forwarded = None;
            }
        }
    }

    fn log_cycle(&self, report: &CycleReport) {
        let tags = report.tags().join(" ");
        if report.changed() || (self.cycle - 1) % timing::SUMMARY_EVERY_CYCLES == 0 {
            info!(
                cycle = self.cycle,
                "CPU {:.1}°C ({:+.1}) -> {:.0}% | drives {:.1}°C ({:+.1}) -> {:.0}% | fan {:.0}% {}",
                report.cpu_avg,
                report.cpu_trend,
                report.cpu_target * 100.0,
                report.device_avg,
                report.device_trend,
                report.device_target * 100.0,
                report.duty * 100.0,
                tags
            );
        } else {
            debug!(
                cycle = self.cycle,
                cpu_raw = report.cpu_raw,
                device_raw = report.device_raw,
                target = report.target,
                duty = report.duty,
                stable_cycles = self.state.stable_cycles(),
                "Control cycle {}",
                tags
            );
        }
    }
}

/// Run control cycles until shutdown, then stop the fan
pub async fn run_control_loop<S, A>(ctx: &mut ControlContext<S, A>, shutdown: Arc<ShutdownSignal>)
where
    S: SensorSource + 'static,
    A: DutySink,
{
    info!("Fan control loop starting (interval {}ms)", ctx.interval().as_millis());

    loop {
        if shutdown.is_triggered() {
            info!("Fan control loop shutting down");
            break;
        }

        ctx.run_cycle().await;

        tokio::select! {
            _ = tokio::time::sleep(ctx.interval()) => {}
            _ = shutdown.wait() => {
                debug!("Control loop woken up by shutdown signal");
            }
        }
    }

    ctx.finish();
    info!(
        "Fan control loop stopped after {} cycles (last duty {:.0}%)",
        ctx.cycles(),
        ctx.state().last_duty_cycle() * 100.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::eq;
    use pf_core::{Config, Result};
    use pf_error::PentafanError;

    mock! {
        pub Sensors {}
        impl SensorSource for Sensors {
            fn read_cpu_temperature(&self) -> ThermalReading;
            fn read_device_temperatures(&self, max: usize) -> Vec<ThermalReading>;
        }
    }

    mock! {
        pub Sink {}
        impl DutySink for Sink {
            fn set_duty_cycle(&mut self, duty: f64) -> Result<()>;
            fn shutdown(&mut self);
        }
    }

    fn cool_snapshot() -> SensorSnapshot {
        SensorSnapshot {
            cpu: ThermalReading::valid(30.0),
            devices: vec![ThermalReading::valid(28.0)],
        }
    }

    fn context(sink: MockSink) -> ControlContext<MockSensors, MockSink> {
        ControlContext::new(
            Arc::new(MockSensors::new()),
            ThermalEngine::from_config(&Config::default()),
            sink,
            Duration::from_millis(10),
        )
    }

    #[test]
    fn test_unchanged_duty_forwarded_once() {
        let mut sink = MockSink::new();
        sink.expect_set_duty_cycle().with(eq(0.0)).times(1).returning(|_| Ok(()));

        let mut ctx = context(sink);
        let now = Instant::now();
        for _ in 0..5 {
            let report = ctx.apply_readings(&cool_snapshot(), now);
            assert_eq!(report.duty, 0.0);
        }
        assert_eq!(ctx.cycles(), 5);
    }

    #[test]
    fn test_failed_write_retried_next_cycle() {
        let mut sink = MockSink::new();
        let mut calls = 0;
        sink.expect_set_duty_cycle().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(PentafanError::pwm_write("/sys/class/pwm/pwmchip0/pwm0/duty_cycle", "busy"))
            } else {
                Ok(())
            }
        });

        let mut ctx = context(sink);
        let now = Instant::now();
        for _ in 0..4 {
            ctx.apply_readings(&cool_snapshot(), now);
        }
    }

    #[test]
    fn test_rising_duty_forwarded_each_cycle() {
        let mut sink = MockSink::new();
        sink.expect_set_duty_cycle().times(3).returning(|_| Ok(()));

        let mut ctx = context(sink);
        let hot = SensorSnapshot {
            cpu: ThermalReading::valid(90.0),
            devices: vec![],
        };
        let now = Instant::now();
        let mut last = 0.0;
        for _ in 0..3 {
            let report = ctx.apply_readings(&hot, now);
            assert!(report.duty > last);
            last = report.duty;
        }
        assert_eq!(ctx.state().last_duty_cycle(), last);
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown_and_zeroes_fan() {
        let mut sensors = MockSensors::new();
        sensors
            .expect_read_cpu_temperature()
            .returning(|| ThermalReading::valid(60.0));
        sensors
            .expect_read_device_temperatures()
            .returning(|_| vec![ThermalReading::valid(40.0)]);

        let mut sink = MockSink::new();
        sink.expect_set_duty_cycle().returning(|_| Ok(()));
        sink.expect_shutdown().times(1).return_const(());

        let mut ctx = ControlContext::new(
            Arc::new(sensors),
            ThermalEngine::from_config(&Config::default()),
            sink,
            Duration::from_millis(10),
        );

        let shutdown = Arc::new(ShutdownSignal::new());
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        });

        run_control_loop(&mut ctx, shutdown).await;
        assert!(ctx.cycles() >= 1);
    }

    #[tokio::test]
    async fn test_no_cycles_after_early_shutdown() {
        let mut sink = MockSink::new();
        sink.expect_set_duty_cycle().with(eq(0.0)).times(1).returning(|_| Ok(()));
        sink.expect_shutdown().times(1).return_const(());

        // No sensor expectations: any read would panic
        let mut ctx = context(sink);
        let shutdown = Arc::new(ShutdownSignal::new());
        shutdown.trigger();

        run_control_loop(&mut ctx, shutdown).await;
        assert_eq!(ctx.cycles(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_signal_wakes_waiter() {
        let shutdown = Arc::new(ShutdownSignal::new());
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter not woken")
            .unwrap();
        assert!(shutdown.is_triggered());
    }
}
