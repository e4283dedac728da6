//! End-to-end polling tests
//!
//! Drives a spawned polling task with recorded bridge responses:
//! 1. Setup frames go out through the mock bridge
//! 2. Responses decode into the parameter table
//! 3. Metrics and CSV sessions follow completed cycles

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use simos_log::testing::{extended_memory_data, extended_memory_echo, service_read_response};
use simos_log::{
    CsvFileSink, EngineConfig, LoggingEngine, LoggingMode, MockBridgeTransport, ParameterDirectory,
    ParameterTable, PollingTask, TaskEvent, TickEvent,
};

const DEFINITIONS: &str = r#"
mode_22:
  - name: Torque
    unit: Nm
    address: "0x437C"
    length: 2
    signed: true
  - name: Engine speed
    unit: rpm
    address: "0xF40C"
  - name: Boost
    unit: hPa
    address: "0x2001"
  - name: Cruise
    unit: "-"
    address: "0x2002"
    length: 1
mode_3e:
  - name: Engine speed
    unit: rpm
    address: "0xD0012400"
  - name: Acceleration
    unit: m/s2
    address: "0xD00141BA"
    length: 4
  - name: Gear
    address: "0xD000F39A"
    length: 1
  - name: Speed
    unit: m/s
    address: "0xD00155B6"
    length: 4
  - name: Cruise
    address: "0xFFFFFFFF"
    length: 1
"#;

/// Wait for the first event matching `pred`
async fn wait_for(
    events: &mut broadcast::Receiver<TaskEvent>,
    pred: impl Fn(&TaskEvent) -> bool,
) -> TaskEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for task event")
}

fn service_read_frame(tick: u32, gate: u8) -> Vec<u8> {
    service_read_response(
        tick,
        &[
            (0x437C, &[0x01, 0x2C]),
            (0xF40C, &[0x0D, 0xAC]),
            (0x2001, &[0x03, 0xE8]),
            (0x2002, &[gate]),
        ],
    )
}

#[tokio::test]
async fn test_service_read_session_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let table = ParameterTable::from_yaml(DEFINITIONS).unwrap();
    let engine = LoggingEngine::new(
        EngineConfig::default(),
        table,
        Box::new(CsvFileSink::new(dir.path())),
    );
    let transport = Arc::new(MockBridgeTransport::new());
    let handle = PollingTask::spawn(engine, transport.clone());
    let mut events = handle.subscribe();

    handle.send(TickEvent::Start).await.unwrap();
    wait_for(&mut events, |e| matches!(e, TaskEvent::FrameSent { step: 0, .. })).await;

    // Priming echo, then four cycles with the gate toggling
    handle
        .send(TickEvent::Frame {
            tick: 0,
            data: service_read_frame(10, 0),
        })
        .await
        .unwrap();
    for (i, gate) in [0u8, 1, 1, 0].into_iter().enumerate() {
        let tick = i as u32 + 1;
        handle
            .send(TickEvent::Frame {
                tick,
                data: service_read_frame(1000 + tick * 100, gate),
            })
            .await
            .unwrap();
    }

    let opened = wait_for(&mut events, |e| matches!(e, TaskEvent::SessionOpened(_))).await;
    wait_for(&mut events, |e| *e == TaskEvent::SessionClosed).await;

    handle.send(TickEvent::Stop).await.unwrap();
    let engine = handle.join().await.unwrap();
    assert_eq!(engine.cycles(), 4);
    assert_eq!(engine.torque(), 300.0);

    let values = engine.directory().values(LoggingMode::ServiceRead);
    assert_eq!(values[2].value, 1000.0);
    assert_eq!(values[1].max, 3500.0);

    let TaskEvent::SessionOpened(name) = opened else {
        unreachable!()
    };
    let content = std::fs::read_to_string(dir.path().join(&name)).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Time,Torque (Nm),Engine speed (rpm),Boost (hPa),SimosTools [R1:Aaron loves:Pops'n'Bangs]",
            "1.2,300,3500,1000,1",
            "1.3,300,3500,1000,1",
        ]
    );
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn test_extended_memory_physics_torque() {
    let table = ParameterTable::from_yaml(DEFINITIONS).unwrap();
    let engine = LoggingEngine::new(
        EngineConfig::default(),
        table,
        Box::new(simos_log::testing::MemorySink::new()),
    );
    let transport = Arc::new(MockBridgeTransport::new());
    let handle = PollingTask::spawn(engine, transport.clone());
    let mut events = handle.subscribe();

    handle
        .send(TickEvent::SelectMode(LoggingMode::ExtendedMemory))
        .await
        .unwrap();
    wait_for(&mut events, |e| {
        *e == TaskEvent::ModeSelected(LoggingMode::ExtendedMemory)
    })
    .await;
    wait_for(&mut events, |e| matches!(e, TaskEvent::FrameSent { step: 0, .. })).await;

    // Four real parameters: 4 * 5 + 1 request bytes
    handle
        .send(TickEvent::Frame {
            tick: 0,
            data: extended_memory_echo(0, 21),
        })
        .await
        .unwrap();
    wait_for(&mut events, |e| matches!(e, TaskEvent::FrameSent { step: 1, .. })).await;

    let mut block = Vec::new();
    block.extend_from_slice(&3000u16.to_le_bytes());
    block.extend_from_slice(&4.0f32.to_le_bytes());
    block.push(1);
    block.extend_from_slice(&0.0f32.to_le_bytes());
    handle
        .send(TickEvent::Frame {
            tick: 1,
            data: extended_memory_data(80, &block),
        })
        .await
        .unwrap();

    let event = wait_for(&mut events, |e| matches!(e, TaskEvent::CycleComplete { .. })).await;
    let TaskEvent::CycleComplete { cycle, metrics } = event else {
        unreachable!()
    };
    assert_eq!(cycle, 1);
    assert!((metrics.torque - 243.70).abs() < 0.01, "{}", metrics.torque);
    assert!((metrics.horsepower - metrics.torque * 3000.0 / 7127.0).abs() < 1e-3);

    handle.send(TickEvent::Stop).await.unwrap();
    let engine = handle.join().await.unwrap();
    assert_eq!(
        engine.directory().value(LoggingMode::ExtendedMemory, 1),
        Some(4.0)
    );

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(&sent[1][8..], &[0x3E, 0x33, 0xB0, 0x01, 0xE7, 0x00]);
}

#[tokio::test]
async fn test_rejected_frames_keep_polling() {
    let table = ParameterTable::from_yaml(DEFINITIONS).unwrap();
    let engine = LoggingEngine::new(
        EngineConfig::default(),
        table,
        Box::new(simos_log::testing::MemorySink::new()),
    );
    let handle = PollingTask::spawn(engine, Arc::new(MockBridgeTransport::new()));
    let mut events = handle.subscribe();

    handle.send(TickEvent::Start).await.unwrap();
    let mut corrupted = service_read_frame(100, 0);
    corrupted[0] = 0xAA;
    handle
        .send(TickEvent::Frame {
            tick: 1,
            data: corrupted,
        })
        .await
        .unwrap();
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, TaskEvent::TickError(_))).await,
        TaskEvent::TickError(simos_log::LogError::HeaderInvalid)
    );

    handle
        .send(TickEvent::Frame {
            tick: 2,
            data: service_read_frame(200, 0),
        })
        .await
        .unwrap();
    wait_for(&mut events, |e| matches!(e, TaskEvent::CycleComplete { .. })).await;

    // Missed ticks below the limit do not stop the task
    for tick in 3..12 {
        handle.send(TickEvent::Missed { tick }).await.unwrap();
    }
    handle
        .send(TickEvent::Frame {
            tick: 12,
            data: service_read_frame(300, 0),
        })
        .await
        .unwrap();
    let event = wait_for(&mut events, |e| {
        matches!(e, TaskEvent::CycleComplete { .. } | TaskEvent::TimedOut)
    })
    .await;
    assert!(matches!(event, TaskEvent::CycleComplete { cycle: 2, .. }));
}
