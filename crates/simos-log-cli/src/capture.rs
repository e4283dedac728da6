//! Recorded bridge captures
//!
//! One event per line:
//!
//! ```text
//! # comment
//! 0 f1f2000300000000620000
//! 1 -
//! ```
//!
//! `-` marks a tick where nothing arrived.

use std::path::Path;

use anyhow::{bail, Context, Result};
use simos_log::TickEvent;

/// Parse capture text into tick events
pub fn parse(text: &str) -> Result<Vec<TickEvent>> {
    let mut events = Vec::new();

    for (n, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(tick), Some(body), None) = (parts.next(), parts.next(), parts.next()) else {
            bail!("line {}: expected `<tick> <hex>` or `<tick> -`", n + 1);
        };
        let tick: u32 = tick
            .parse()
            .with_context(|| format!("line {}: invalid tick `{}`", n + 1, tick))?;

        let event = if body == "-" {
            TickEvent::Missed { tick }
        } else {
            let data = hex::decode(body)
                .with_context(|| format!("line {}: invalid hex frame", n + 1))?;
            TickEvent::Frame { tick, data }
        };
        events.push(event);
    }

    Ok(events)
}

pub fn load(path: &Path) -> Result<Vec<TickEvent>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read capture: {}", path.display()))?;
    parse(&text)
}
