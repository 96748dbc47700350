/// Trap duty cycle: sense, transmit, sleep, repeat.
///
/// ```text
///   ┌──────────┐  read sensor  ┌──────────────┐  send once  ┌──────────┐
///   │ Sensing  │──────────────▶│ Transmitting │────────────▶│ Sleeping │
///   └──────────┘               └──────────────┘             └────┬─────┘
///        ▲                timer or sensor edge                   │
///        └───────────────────────────────────────────────────────┘
/// ```
///
/// The timer wake bounds how stale the dashboard's view can get; the sensor
/// edge wake reports a firing immediately. The edge is only armed while the
/// sensor is idle: arming it on an already-asserted level would wake the node
/// straight back up.
///
/// Nothing survives a sleep. On hardware the sleep is a deep sleep that
/// resets the chip, and the firmware builds a fresh [`TrapNode`] that starts
/// at [`DutyCycleState::Sensing`].
use core::time::Duration;

use crate::codec;
use crate::identity::TrapIdentity;
use crate::platform::{
    EdgeTrigger, SendError, Sensor, SleepController, SleepError, Transport, WakePlan, WakeReason,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyCycleState {
    Sensing,
    Transmitting,
    Sleeping,
}

/// Wake sources for a sleep starting with the sensor in the given state.
pub fn plan_sleep(sensor_triggered: bool, wake_interval: Duration) -> WakePlan {
    WakePlan {
        timer: wake_interval,
        edge: if sensor_triggered {
            None
        } else {
            Some(EdgeTrigger::SensorAsserted)
        },
    }
}

/// Timer-only plan used after the sleep controller failed.
pub fn fallback_plan(fallback_sleep: Duration) -> WakePlan {
    WakePlan {
        timer: fallback_sleep,
        edge: None,
    }
}

/// How the `Sleeping` state ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// Normal wake from the planned sources
    Woke(WakeReason),
    /// Planned sleep failed; woke from the bounded fallback sleep
    FellBack(WakeReason),
    /// Both sleeps failed; the cycle restarts immediately
    Failed(SleepError),
}

/// Result of a single state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Sensed { triggered: bool },
    Transmitted(Result<(), SendError>),
    Slept { plan: WakePlan, outcome: SleepOutcome },
}

/// Summary of one full cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub triggered: bool,
    pub sent: Result<(), SendError>,
    pub plan: WakePlan,
    pub outcome: SleepOutcome,
}

/// Duty-cycle timing for a trap node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycleConfig {
    /// Dashboard to report to
    pub peer: TrapIdentity,
    /// Timer wake period
    pub wake_interval: Duration,
    /// Bounded sleep used when the planned sleep fails
    pub fallback_sleep: Duration,
}

pub struct TrapNode<S, T, P> {
    sensor: S,
    transport: T,
    sleeper: P,
    config: DutyCycleConfig,
    state: DutyCycleState,
    triggered: bool,
}

impl<S, T, P> TrapNode<S, T, P>
where
    S: Sensor,
    T: Transport,
    P: SleepController,
{
    /// Cold start: no prior state, first step is `Sensing`.
    pub fn new(sensor: S, transport: T, sleeper: P, config: DutyCycleConfig) -> Self {
        Self {
            sensor,
            transport,
            sleeper,
            config,
            state: DutyCycleState::Sensing,
            triggered: false,
        }
    }

    pub fn state(&self) -> DutyCycleState {
        self.state
    }

    pub fn config(&self) -> &DutyCycleConfig {
        &self.config
    }

    /// Perform the current state's work and advance to the next state.
    pub fn step(&mut self) -> Step {
        match self.state {
            DutyCycleState::Sensing => {
                self.triggered = self.sensor.is_triggered();
                log::debug!("Sensor reads {}", if self.triggered { "triggered" } else { "idle" });
                self.state = DutyCycleState::Transmitting;
                Step::Sensed {
                    triggered: self.triggered,
                }
            }
            DutyCycleState::Transmitting => {
                let payload = codec::encode(self.triggered);
                let result = self.transport.send(self.config.peer, &payload);
                match result {
                    Ok(()) => log::debug!("Sent status to {}", self.config.peer),
                    // No retry: the dashboard's timeout covers a lost report.
                    Err(e) => log::warn!("Status send to {} failed: {}", self.config.peer, e),
                }
                self.state = DutyCycleState::Sleeping;
                Step::Transmitted(result)
            }
            DutyCycleState::Sleeping => {
                // Re-read at the moment of sleeping; the level may have
                // changed since `Sensing`.
                let asserted = self.sensor.is_triggered();
                let plan = plan_sleep(asserted, self.config.wake_interval);
                let outcome = self.sleep(&plan);
                self.state = DutyCycleState::Sensing;
                Step::Slept { plan, outcome }
            }
        }
    }

    fn sleep(&mut self, plan: &WakePlan) -> SleepOutcome {
        log::debug!(
            "Sleeping {}s (edge wake {})",
            plan.timer.as_secs(),
            if plan.edge.is_some() { "armed" } else { "off" }
        );
        match self.sleeper.sleep(plan) {
            Ok(reason) => SleepOutcome::Woke(reason),
            Err(e) => {
                log::error!("Sleep failed ({}), falling back to {}s timer", e, self.config.fallback_sleep.as_secs());
                match self.sleeper.sleep(&fallback_plan(self.config.fallback_sleep)) {
                    Ok(reason) => SleepOutcome::FellBack(reason),
                    Err(e) => {
                        log::error!("Fallback sleep failed: {}", e);
                        SleepOutcome::Failed(e)
                    }
                }
            }
        }
    }

    /// Run from the current state until the node is back at `Sensing`.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut triggered = self.triggered;
        let mut sent = Ok(());
        loop {
            match self.step() {
                Step::Sensed { triggered: t } => triggered = t,
                Step::Transmitted(r) => sent = r,
                Step::Slept { plan, outcome } => {
                    return CycleReport {
                        triggered,
                        sent,
                        plan,
                        outcome,
                    }
                }
            }
        }
    }

    /// Cycle forever. With a deep-sleep controller the first sleep never
    /// returns and this is a single pass.
    pub fn run(&mut self) -> ! {
        loop {
            let report = self.run_cycle();
            log::debug!("Cycle done: {:?}", report.outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    const PEER: TrapIdentity = TrapIdentity::new([0x94, 0xB5, 0x55, 0x8E, 0x2A, 0x20]);
    const INTERVAL: Duration = Duration::from_secs(900);
    const FALLBACK: Duration = Duration::from_secs(60);

    /// Sensor returning a scripted sequence of readings; repeats the last.
    struct ScriptedSensor {
        readings: VecDeque<bool>,
        last: bool,
    }

    impl ScriptedSensor {
        fn new(readings: &[bool]) -> Self {
            Self {
                readings: readings.iter().copied().collect(),
                last: false,
            }
        }
    }

    impl Sensor for ScriptedSensor {
        fn is_triggered(&mut self) -> bool {
            if let Some(r) = self.readings.pop_front() {
                self.last = r;
            }
            self.last
        }
    }

    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Rc<RefCell<Vec<(TrapIdentity, Vec<u8>)>>>,
        fail: Option<SendError>,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, peer: TrapIdentity, payload: &[u8]) -> Result<(), SendError> {
            self.sent.borrow_mut().push((peer, payload.to_vec()));
            match self.fail {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSleeper {
        plans: Rc<RefCell<Vec<WakePlan>>>,
        results: Rc<RefCell<VecDeque<Result<WakeReason, SleepError>>>>,
    }

    impl SleepController for RecordingSleeper {
        fn sleep(&mut self, plan: &WakePlan) -> Result<WakeReason, SleepError> {
            self.plans.borrow_mut().push(*plan);
            self.results
                .borrow_mut()
                .pop_front()
                .unwrap_or(Ok(WakeReason::Timer))
        }
    }

    fn config() -> DutyCycleConfig {
        DutyCycleConfig {
            peer: PEER,
            wake_interval: INTERVAL,
            fallback_sleep: FALLBACK,
        }
    }

    fn node(
        readings: &[bool],
        transport: RecordingTransport,
        sleeper: RecordingSleeper,
    ) -> TrapNode<ScriptedSensor, RecordingTransport, RecordingSleeper> {
        TrapNode::new(ScriptedSensor::new(readings), transport, sleeper, config())
    }

    // ── Wake source planning ────────────────────────────────────────

    #[test]
    fn asserted_sensor_arms_timer_only() {
        let plan = plan_sleep(true, INTERVAL);
        assert_eq!(plan.timer, INTERVAL);
        assert_eq!(plan.edge, None);
    }

    #[test]
    fn idle_sensor_arms_timer_and_edge() {
        let plan = plan_sleep(false, INTERVAL);
        assert_eq!(plan.timer, INTERVAL);
        assert_eq!(plan.edge, Some(EdgeTrigger::SensorAsserted));
    }

    // ── State machine ───────────────────────────────────────────────

    #[test]
    fn starts_sensing_and_walks_states_in_order() {
        let mut n = node(&[true], RecordingTransport::default(), RecordingSleeper::default());
        assert_eq!(n.state(), DutyCycleState::Sensing);

        assert_eq!(n.step(), Step::Sensed { triggered: true });
        assert_eq!(n.state(), DutyCycleState::Transmitting);

        assert_eq!(n.step(), Step::Transmitted(Ok(())));
        assert_eq!(n.state(), DutyCycleState::Sleeping);

        assert!(matches!(n.step(), Step::Slept { .. }));
        assert_eq!(n.state(), DutyCycleState::Sensing);
    }

    #[test]
    fn transmits_encoded_status_to_dashboard() {
        let transport = RecordingTransport::default();
        let mut n = node(&[true], transport.clone(), RecordingSleeper::default());
        n.run_cycle();

        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, PEER);
        assert_eq!(sent[0].1, codec::encode(true).to_vec());
    }

    #[test]
    fn triggered_cycle_sleeps_on_timer_only() {
        let sleeper = RecordingSleeper::default();
        let mut n = node(&[true, true], RecordingTransport::default(), sleeper.clone());
        let report = n.run_cycle();

        assert!(report.triggered);
        assert_eq!(report.plan, plan_sleep(true, INTERVAL));
        assert_eq!(sleeper.plans.borrow().as_slice(), &[plan_sleep(true, INTERVAL)]);
    }

    #[test]
    fn idle_cycle_arms_both_sources() {
        let sleeper = RecordingSleeper::default();
        let mut n = node(&[false, false], RecordingTransport::default(), sleeper.clone());
        let report = n.run_cycle();

        assert!(!report.triggered);
        assert_eq!(report.plan.edge, Some(EdgeTrigger::SensorAsserted));
        assert_eq!(report.outcome, SleepOutcome::Woke(WakeReason::Timer));
    }

    #[test]
    fn sensor_firing_between_send_and_sleep_disarms_edge() {
        let mut n = node(&[false, true], RecordingTransport::default(), RecordingSleeper::default());
        let report = n.run_cycle();
        assert!(!report.triggered);
        assert_eq!(report.plan.edge, None);
    }

    #[test]
    fn send_failure_still_sleeps_without_retry() {
        let transport = RecordingTransport {
            fail: Some(SendError::Driver(-1)),
            ..Default::default()
        };
        let sleeper = RecordingSleeper::default();
        let mut n = node(&[false], transport.clone(), sleeper.clone());
        let report = n.run_cycle();

        assert_eq!(report.sent, Err(SendError::Driver(-1)));
        assert_eq!(transport.sent.borrow().len(), 1);
        assert_eq!(sleeper.plans.borrow().len(), 1);
        assert_eq!(n.state(), DutyCycleState::Sensing);
    }

    #[test]
    fn sleep_failure_falls_back_to_bounded_timer() {
        let sleeper = RecordingSleeper::default();
        sleeper
            .results
            .borrow_mut()
            .extend([Err(SleepError::WakeSourceUnavailable), Ok(WakeReason::Timer)]);
        let mut n = node(&[false], RecordingTransport::default(), sleeper.clone());
        let report = n.run_cycle();

        assert_eq!(report.outcome, SleepOutcome::FellBack(WakeReason::Timer));
        let plans = sleeper.plans.borrow();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[1], fallback_plan(FALLBACK));
        assert_eq!(plans[1].edge, None);
    }

    #[test]
    fn double_sleep_failure_restarts_cycle() {
        let sleeper = RecordingSleeper::default();
        sleeper
            .results
            .borrow_mut()
            .extend([Err(SleepError::Interrupted), Err(SleepError::Interrupted)]);
        let mut n = node(&[false], RecordingTransport::default(), sleeper.clone());
        let report = n.run_cycle();

        assert_eq!(report.outcome, SleepOutcome::Failed(SleepError::Interrupted));
        assert_eq!(n.state(), DutyCycleState::Sensing);
    }

    #[test]
    fn each_cycle_reads_fresh_state() {
        let transport = RecordingTransport::default();
        let sleeper = RecordingSleeper::default();
        sleeper
            .results
            .borrow_mut()
            .extend([Ok(WakeReason::SensorEdge), Ok(WakeReason::Timer)]);
        let mut n = node(&[false, false, true, true], transport.clone(), sleeper.clone());

        let first = n.run_cycle();
        let second = n.run_cycle();
        assert_eq!(first.outcome, SleepOutcome::Woke(WakeReason::SensorEdge));
        assert!(second.triggered);

        let payloads: Vec<Vec<u8>> = transport.sent.borrow().iter().map(|(_, p)| p.clone()).collect();
        assert_eq!(payloads, vec![vec![0u8], vec![1u8]]);
    }
}
