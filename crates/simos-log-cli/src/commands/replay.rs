//! Replay command - run a recorded capture through the polling task

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use simos_log::{
    CsvFileSink, EngineConfig, LoggingEngine, LoggingMode, MockBridgeTransport, ParameterTable,
    PollingTask, TaskEvent, TickEvent,
};
use tokio::sync::broadcast;
use tracing::warn;

use crate::capture;

/// Summary printed after a replay
#[derive(Debug, Default)]
struct ReplayStats {
    cycles: u64,
    sessions: Vec<String>,
    rejected: usize,
    timed_out: bool,
}

pub async fn replay(
    config: EngineConfig,
    table: ParameterTable,
    mode: LoggingMode,
    capture_path: &Path,
    out: &Path,
) -> Result<()> {
    let events = capture::load(capture_path)?;

    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory: {}", out.display()))?;

    let mut engine = LoggingEngine::new(config, table, Box::new(CsvFileSink::new(out)));
    if engine.mode() != mode {
        engine.select_mode(mode);
    }

    let transport = Arc::new(MockBridgeTransport::new());
    let handle = PollingTask::spawn(engine, transport.clone());
    let printer = tokio::spawn(print_events(handle.subscribe()));

    handle
        .send(TickEvent::Start)
        .await
        .context("Polling task ended early")?;
    for event in events {
        // The task stops by itself on timeout
        if handle.send(event).await.is_err() {
            break;
        }
    }
    let _ = handle.send(TickEvent::Stop).await;

    let engine = handle.join().await.context("Polling task panicked")?;
    let stats = printer.await.context("Event printer panicked")?;

    println!();
    println!("Setup frames sent: {}", transport.sent().len());
    println!("Cycles:            {}", stats.cycles);
    println!("Rejected frames:   {}", stats.rejected);
    println!("Timed out:         {}", if stats.timed_out { "yes" } else { "no" });
    println!(
        "Last metrics:      {:.1} Nm, {:.1} hp",
        engine.torque(),
        engine.horsepower()
    );
    for name in &stats.sessions {
        println!("Session:           {}", out.join(name).display());
    }

    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<TaskEvent>) -> ReplayStats {
    let mut stats = ReplayStats::default();

    loop {
        match events.recv().await {
            Ok(TaskEvent::CycleComplete { cycle, metrics }) => {
                stats.cycles = cycle;
                println!(
                    "cycle {:>5}  torque {:>8.1} Nm  power {:>7.1} hp",
                    cycle, metrics.torque, metrics.horsepower
                );
            }
            Ok(TaskEvent::SessionOpened(name)) => {
                println!("session opened: {}", name);
                stats.sessions.push(name);
            }
            Ok(TaskEvent::SessionClosed) => println!("session closed"),
            Ok(TaskEvent::TickError(e)) => {
                stats.rejected += 1;
                println!("rejected frame: {}", e);
            }
            Ok(TaskEvent::TransportError(e)) => println!("transport error: {}", e),
            Ok(TaskEvent::TimedOut) => {
                stats.timed_out = true;
                println!("bridge timed out");
                break;
            }
            Ok(TaskEvent::Stopped) => break,
            Ok(TaskEvent::FrameSent { .. }) | Ok(TaskEvent::ModeSelected(_)) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    stats
}
