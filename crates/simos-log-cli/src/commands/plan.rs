//! Plan command - show the setup frames for a mode

use anyhow::Result;
use simos_log::{
    EngineConfig, LoggingEngine, LoggingMode, NullSink, ParameterDirectory, ParameterTable,
};

/// Print every setup frame of `mode`
pub fn plan(config: EngineConfig, table: ParameterTable, mode: LoggingMode) -> Result<()> {
    let mut engine = LoggingEngine::new(config, table, Box::new(NullSink));
    if engine.mode() != mode {
        engine.select_mode(mode);
    }

    // Step 0 runs discovery, so the frame count is only final afterwards
    let mut frames = vec![engine.build(0)];
    for step in 1..engine.frame_count() {
        frames.push(engine.build(step));
    }

    let definitions = engine.directory().definitions(mode);
    let enabled = definitions.iter().filter(|d| d.enabled).count();
    let virtual_count = definitions
        .iter()
        .filter(|d| d.enabled && mode.is_virtual(d.address))
        .count();

    println!("Mode:          {}", mode.config_name());
    println!(
        "Parameters:    {} defined, {} enabled, {} virtual",
        definitions.len(),
        enabled,
        virtual_count
    );
    println!("Frames:        {}", frames.len());
    println!("Torque source: {}", engine.torque_source().name());
    println!();

    for (step, frame) in frames.iter().enumerate() {
        if frame.is_empty() {
            println!("{:>3}  (no frame)", step);
        } else {
            println!("{:>3}  {}", step, hex::encode(frame));
        }
    }

    Ok(())
}
