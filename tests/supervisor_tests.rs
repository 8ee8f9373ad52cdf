//! End-to-end tests of the supervisory loop over the simulated driver

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bldc_supervisor::hal::{MockClock, MockDeviceHandle, MockLink, RpmReading};
use bldc_supervisor::{
    command_channel, CancelToken, CommandSender, Config, ControlState, Direction, MotorDriver,
    RegisterTransport, ReversalConfig, Supervisor, SupervisorConfig, SupervisorOutcome,
    TransportError,
};

const SPEED: u16 = 0x0001;
const DIRECTION: u16 = 0x0002;
const ENABLE: u16 = 0x0003;
const BRAKE: u16 = 0x0004;

struct Rig {
    supervisor: Supervisor<MockLink, Arc<MockClock>>,
    device: MockDeviceHandle,
    tx: CommandSender,
    cancel: CancelToken,
}

fn config(window: usize, max_reversals: u32) -> Config {
    Config::default()
        .with_reversal(
            ReversalConfig::default()
                .with_stall_window(window)
                .with_settle_ms(0)
                .with_spin_up_ms(0)
                .with_max_reversals(max_reversals),
        )
        .with_supervisor(SupervisorConfig::default().with_poll_interval_ms(1))
}

fn rig(config: Config, link: MockLink) -> Rig {
    let device = link.device();
    let transport = Arc::new(RegisterTransport::new(
        link,
        config.link.unit_id,
        Duration::from_millis(200),
    ));
    let driver = MotorDriver::new(transport, config.registers);
    let (tx, rx) = command_channel((&config.speed).into());
    let cancel = CancelToken::new();
    let supervisor = Supervisor::new(
        driver,
        &config,
        rx,
        cancel.clone(),
        Arc::new(MockClock::new()),
    )
    .unwrap();
    Rig {
        supervisor,
        device,
        tx,
        cancel,
    }
}

fn cycle_until(rig: &mut Rig, target: ControlState) {
    for _ in 0..50 {
        if rig.supervisor.state() == target {
            return;
        }
        rig.supervisor.cycle();
    }
    panic!(
        "never reached {target}, stuck in {}",
        rig.supervisor.state()
    );
}

fn wait_for(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

// ============================================================================
// Reversal and Budget
// ============================================================================

#[test]
fn direction_alternates_on_every_stall() {
    let mut rig = rig(config(2, 4), MockLink::new());

    let outcome = rig.supervisor.run();

    assert!(matches!(
        outcome,
        SupervisorOutcome::BudgetExhausted { reversals: 4, .. }
    ));
    let directions = rig.device.lock().writes_to(DIRECTION);
    assert_eq!(directions, vec![0, 1, 0, 1]);
    assert!(directions.windows(2).all(|w| w[0] != w[1]));
}

#[test]
fn exhausted_budget_stops_direction_writes_and_shuts_down() {
    let mut rig = rig(config(3, 2), MockLink::new());

    let outcome = rig.supervisor.run();
    let SupervisorOutcome::BudgetExhausted {
        reversals,
        shutdown,
    } = outcome
    else {
        panic!("unexpected outcome {outcome:?}");
    };

    assert_eq!(reversals, 2);
    assert!(shutdown.is_clean());
    assert_eq!(rig.supervisor.state(), ControlState::BudgetExhausted);
    assert_eq!(rig.device.lock().writes_to(DIRECTION).len(), 2);

    let device = rig.device.lock();
    let tail: Vec<(u16, u16)> = device
        .writes
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(|w| (w.address, w.value))
        .collect();
    assert_eq!(tail, vec![(ENABLE, 0), (BRAKE, 1), (SPEED, 0)]);

    // Nothing more is written once the loop has ended.
    let before = device.writes.len();
    drop(device);
    rig.supervisor.cycle();
    assert_eq!(rig.device.lock().writes.len(), before);
}

#[test]
fn zero_budget_ends_at_first_stall() {
    let mut rig = rig(config(2, 0), MockLink::new());

    let outcome = rig.supervisor.run();

    assert!(matches!(
        outcome,
        SupervisorOutcome::BudgetExhausted { reversals: 0, .. }
    ));
    assert_eq!(rig.device.lock().writes_to(DIRECTION), vec![0]);
    assert_eq!(rig.supervisor.direction(), Direction::Clockwise);
}

#[test]
fn spinning_motor_never_reverses() {
    let mut rig = rig(config(3, 2), MockLink::new().with_running_rpm(1500));

    for _ in 0..40 {
        rig.supervisor.cycle();
    }

    assert_eq!(rig.supervisor.state(), ControlState::Running);
    assert_eq!(rig.supervisor.controller().budget().used(), 0);
    assert_eq!(rig.device.lock().writes_to(DIRECTION), vec![0]);
}

#[test]
fn motor_that_recovers_is_not_reversed_again() {
    let link = MockLink::new().with_running_rpm(900);
    // Three startup cycles, then three zero samples while running.
    link.device().lock().script_rpm_values([0, 0, 0, 0, 0, 0]);
    let mut rig = rig(config(3, 5), link);

    for _ in 0..30 {
        rig.supervisor.cycle();
    }

    assert_eq!(rig.supervisor.controller().budget().used(), 1);
    assert_eq!(rig.supervisor.direction(), Direction::CounterClockwise);
    assert_eq!(rig.supervisor.state(), ControlState::Running);
    assert_eq!(rig.supervisor.telemetry().current_rpm(), Some(900));
}

// ============================================================================
// Transport Faults
// ============================================================================

#[test]
fn failed_rpm_reads_are_not_stall_evidence() {
    let link = MockLink::new().with_running_rpm(1200);
    link.device()
        .lock()
        .script_rpm(std::iter::repeat(RpmReading::Fail(TransportError::Timeout)).take(20));
    let mut rig = rig(config(2, 3), link);

    for _ in 0..20 {
        let report = rig.supervisor.cycle();
        assert!(report.rpm.is_none());
        assert!(!report.sample_fed);
    }

    assert_eq!(rig.supervisor.state(), ControlState::Running);
    assert!(rig.supervisor.detector().is_empty());
    assert_eq!(rig.supervisor.telemetry().current_rpm(), None);
}

#[test]
fn failed_startup_writes_are_retried() {
    let mut rig = rig(config(2, 3), MockLink::new().with_running_rpm(800));
    rig.device
        .lock()
        .fail_writes_to(BRAKE, TransportError::Exception("slave busy".into()));

    for _ in 0..5 {
        rig.supervisor.cycle();
    }
    assert_eq!(rig.supervisor.state(), ControlState::BrakeReleasing);

    rig.device.lock().heal(BRAKE);
    cycle_until(&mut rig, ControlState::Running);
    assert!(rig.device.lock().is_enabled());
}

#[test]
fn intermittent_write_failures_still_complete_reversals() {
    let mut rig = rig(config(2, 3), MockLink::new());
    let mut cycles = 0;

    while !rig.supervisor.state().is_terminal() && cycles < 500 {
        if cycles % 4 == 0 {
            rig.device
                .lock()
                .fail_next_writes(1, TransportError::Timeout);
        }
        rig.supervisor.cycle();
        cycles += 1;
    }

    assert_eq!(rig.supervisor.state(), ControlState::BudgetExhausted);
    assert_eq!(rig.supervisor.controller().budget().used(), 3);
    let directions = rig.device.lock().writes_to(DIRECTION);
    let mut distinct = directions.clone();
    distinct.dedup();
    assert_eq!(distinct, vec![0, 1, 0]);
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn cancellation_shuts_down_from_every_state() {
    let states = [
        ControlState::Idle,
        ControlState::BrakeReleasing,
        ControlState::DirectionSetting,
        ControlState::Running,
        ControlState::StallDetected,
        ControlState::Reversing,
    ];

    for target in states {
        let mut rig = rig(config(2, 5), MockLink::new());
        cycle_until(&mut rig, target);
        let writes_before = rig.device.lock().writes.len();

        rig.cancel.cancel();
        let outcome = rig.supervisor.run();

        let SupervisorOutcome::Cancelled { from, shutdown } = outcome else {
            panic!("{target}: unexpected outcome {outcome:?}");
        };
        assert_eq!(from, target);
        assert!(shutdown.is_clean(), "{target}: {shutdown:?}");
        assert_eq!(rig.supervisor.state(), ControlState::Stopped);

        let device = rig.device.lock();
        let after: Vec<(u16, u16)> = device.writes[writes_before..]
            .iter()
            .map(|w| (w.address, w.value))
            .collect();
        assert_eq!(
            after,
            vec![(ENABLE, 0), (BRAKE, 1), (SPEED, 0)],
            "{target}"
        );
    }
}

#[test]
fn cancel_from_another_thread_stops_the_loop() {
    let rig = rig(config(3, 3), MockLink::new().with_running_rpm(1000));
    let Rig {
        mut supervisor,
        device,
        tx: _tx,
        cancel,
    } = rig;
    let telemetry = supervisor.telemetry();

    let handle = thread::spawn(move || supervisor.run());
    assert!(wait_for(Duration::from_secs(5), || {
        telemetry.state() == ControlState::Running
    }));

    cancel.cancel();
    let outcome = handle.join().unwrap();

    assert!(matches!(
        outcome,
        SupervisorOutcome::Cancelled {
            from: ControlState::Running,
            ..
        }
    ));
    assert_eq!(telemetry.state(), ControlState::Stopped);
    let device = device.lock();
    assert!(!device.is_enabled());
    assert_eq!(device.register(BRAKE), 1);
}

#[test]
fn cancel_interrupts_settle_delay() {
    let cfg = config(2, 3).with_reversal(
        ReversalConfig::default()
            .with_stall_window(2)
            .with_settle_ms(60_000)
            .with_spin_up_ms(0)
            .with_max_reversals(3),
    );
    let Rig {
        mut supervisor,
        device,
        tx: _tx,
        cancel,
    } = rig(cfg, MockLink::new());
    let telemetry = supervisor.telemetry();

    let started = Instant::now();
    let handle = thread::spawn(move || supervisor.run());
    assert!(wait_for(Duration::from_secs(5), || {
        telemetry.state() == ControlState::StallDetected
    }));
    // Let the controller enter the settle wait.
    thread::sleep(Duration::from_millis(20));
    cancel.cancel();
    let outcome = handle.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(matches!(outcome, SupervisorOutcome::Cancelled { .. }));
    assert_eq!(device.lock().writes_to(DIRECTION), vec![0]);
    assert_eq!(telemetry.reversals(), 0);
}

#[test]
fn shutdown_on_dead_bus_terminates() {
    let mut rig = rig(config(2, 3), MockLink::new());
    cycle_until(&mut rig, ControlState::Running);
    {
        let mut device = rig.device.lock();
        for address in [SPEED, DIRECTION, ENABLE, BRAKE] {
            device.fail_writes_to(address, TransportError::Disconnected);
        }
    }
    let calls_before = rig.supervisor.driver().transport().stats().calls;

    rig.cancel.cancel();
    let outcome = rig.supervisor.run();

    let SupervisorOutcome::Cancelled { shutdown, .. } = outcome else {
        panic!("unexpected outcome {outcome:?}");
    };
    assert!(!shutdown.disabled);
    assert!(!shutdown.braked);
    assert_eq!(shutdown.speed_zeroed, Some(false));
    // Default policy: two attempts for each of the three writes.
    let calls = rig.supervisor.driver().transport().stats().calls - calls_before;
    assert_eq!(calls, 6);
}

// ============================================================================
// Operator Commands
// ============================================================================

#[test]
fn operator_speed_reaches_the_driver() {
    let mut rig = rig(config(3, 3), MockLink::new().with_running_rpm(700));
    cycle_until(&mut rig, ControlState::Running);

    rig.tx.submit_speed(40).unwrap();
    rig.tx.submit_speed(250).unwrap();
    let report = rig.supervisor.cycle();

    assert_eq!(report.speed_written, Some(250));
    assert_eq!(rig.device.lock().writes_to(SPEED), vec![100, 250]);
    assert_eq!(rig.device.lock().register(0x0007), 250);
}

#[test]
fn out_of_range_speed_never_written() {
    let mut rig = rig(config(3, 3), MockLink::new().with_running_rpm(700));
    cycle_until(&mut rig, ControlState::Running);

    assert!(rig.tx.submit_speed(301).is_err());
    assert!(rig.tx.submit_speed(-10).is_err());
    rig.supervisor.cycle();

    assert_eq!(rig.device.lock().writes_to(SPEED), vec![100]);
}

#[test]
fn channel_closed_after_run() {
    let mut rig = rig(config(2, 0), MockLink::new());
    rig.supervisor.run();
    assert!(rig.tx.is_closed());
    assert!(rig.tx.submit_speed(10).is_err());
}
