// End-to-end run: declarative documents -> frames -> results
use can_eol_core::{
    frame_queue, CanFrame, Pipeline, PipelineConfig, RuleSet, SignalMap, SignalValue, StateStore,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SIGNALS: &str = r#"
can_signals:
  - can_id: 0x1F1
    parameters:
      - name: Vehicle_Power_Mode
        start_byte: 0
        bit_length: 2
        decode_type: stateEncoded
        values: {0: OFF, 1: ACC, 2: RUN}
      - name: Battery_Voltage
        start_byte: 1
        bit_length: 8
        decode_type: linear
        calculation: {a: 0.1, b: 0.0}
  - can_id: 0x2A0
    parameters:
      - name: Windshield_Wiper_Switch_Status
        start_byte: 0
        start_bit: 4
        bit_length: 3
        decode_type: stateEncoded
        values: {0: OFF, 1: INTERMITTENT, 2: SLOW}
"#;

const RULES: &str = r#"
tests:
  - name: power_mode_cycle
    signal: Vehicle_Power_Mode
    required_states: [OFF, RUN]
    require_final: RUN
  - name: battery_voltage
    signal: Battery_Voltage
    range: {min: 11.5, max: 14.8}
  - name: wiper_positions
    signal: Windshield_Wiper_Switch_Status
    required_states: [OFF, INTERMITTENT, SLOW]
  - name: never_seen
    signal: Door_Ajar
    range: {min: 0, max: 1}
"#;

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
}

fn write_documents(dir: &std::path::Path) -> (Arc<SignalMap>, Arc<RuleSet>) {
    let signals = dir.join("can_decode.yaml");
    let rules = dir.join("can_validation.yaml");
    std::fs::write(&signals, SIGNALS).unwrap();
    std::fs::write(&rules, RULES).unwrap();
    (
        Arc::new(SignalMap::load(&signals).unwrap()),
        Arc::new(RuleSet::load(&rules).unwrap()),
    )
}

#[test]
fn test_full_run() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    let (signal_map, rules) = write_documents(dir.path());

    let config = PipelineConfig::new().with_poll_interval(Duration::from_millis(10));
    let store = Arc::new(StateStore::with_priority_signals(config.priority_signals.clone()));
    let power_mode = store.subscribe_priority();

    let (sender, queue) = frame_queue(config.queue_capacity);
    let mut pipeline =
        Pipeline::start(queue, signal_map, rules, store.clone(), &config).unwrap();

    let frames = vec![
        CanFrame::new(0x1F1, vec![0x00, 120]),
        CanFrame::new(0x2A0, vec![0x00]),
        CanFrame::new(0x2A0, vec![0x10]),
        CanFrame::new(0x7E8, vec![0x02, 0x50, 0x01]),
        CanFrame::new(0x1F1, vec![0x02, 125]),
        CanFrame::new(0x1F1, vec![0x02, 125]),
        // Truncated: only the power mode is present
        CanFrame::new(0x1F1, vec![0x02]),
    ];
    let total = frames.len() as u64;

    let producer = thread::spawn(move || {
        for frame in frames {
            assert!(sender.send(frame));
        }
    });
    producer.join().unwrap();

    wait_until(|| pipeline.stats().frames() == total);
    pipeline.stop().unwrap();

    assert_eq!(pipeline.stats().frames(), total);
    assert_eq!(pipeline.stats().unknown_frames(), 1);

    // Power mode changed OFF -> RUN once, the repeats are suppressed
    let modes: Vec<SignalValue> = power_mode.try_iter().map(|c| c.value).collect();
    assert_eq!(modes, vec![SignalValue::from("OFF"), SignalValue::from("RUN")]);
    let voltage = store.get("Battery_Voltage").and_then(|v| v.as_f64()).unwrap();
    assert!((voltage - 12.5).abs() < 1e-9);

    let summary = pipeline.summary().unwrap();
    let by_name = |name: &str| {
        summary
            .results
            .iter()
            .find(|r| r.rule_name == name)
            .unwrap()
            .clone()
    };

    assert!(by_name("power_mode_cycle").passed);
    assert!(by_name("battery_voltage").passed);

    let wiper = by_name("wiper_positions");
    assert!(!wiper.passed);
    assert!(wiper.reason.contains("SLOW"));

    let never = by_name("never_seen");
    assert!(!never.passed);
    assert!(never.reason.contains("missing"));

    assert_eq!((summary.total, summary.passed, summary.failed), (4, 2, 2));
    let order: Vec<&str> = summary.results.iter().map(|r| r.rule_name.as_str()).collect();
    assert_eq!(
        order,
        vec!["power_mode_cycle", "battery_voltage", "wiper_positions", "never_seen"]
    );
}

#[test]
fn test_nothing_changes_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let (signal_map, rules) = write_documents(dir.path());

    let config = PipelineConfig::new().with_poll_interval(Duration::from_millis(10));
    let store = Arc::new(StateStore::new());
    let changes = store.subscribe();

    let (sender, queue) = frame_queue(16);
    let mut pipeline = Pipeline::start(queue, signal_map, rules, store, &config).unwrap();

    // Keep the bus busy with alternating values so every frame is a change
    let producer = thread::spawn(move || {
        let mut toggle = 0u8;
        for _ in 0..2000 {
            toggle ^= 0x01;
            if !sender.send(CanFrame::new(0x1F1, vec![toggle, toggle])) {
                break;
            }
        }
    });

    wait_until(|| pipeline.stats().frames() > 50);
    pipeline.stop().unwrap();

    let signals_at_stop = pipeline.stats().signals();
    let notified_at_stop = changes.try_iter().count();
    thread::sleep(Duration::from_millis(100));

    assert_eq!(pipeline.stats().signals(), signals_at_stop);
    assert_eq!(changes.try_iter().count(), 0);
    assert!(notified_at_stop > 0);

    // Dropping the pipeline releases the queue; the producer sees the
    // disconnect and ends
    drop(pipeline);
    producer.join().unwrap();
}
