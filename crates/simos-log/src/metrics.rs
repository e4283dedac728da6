//! Torque and horsepower derived once per completed cycle

use tracing::{debug, trace};

use crate::config::VehicleConfig;
use crate::directory::PidValue;
use crate::discovery::{DiscoveredPids, TorqueSource};

/// Standard gravity, kg to N
pub const KG_TO_N: f32 = 9.80665;
/// Empirical divisor of the physics torque model
pub const TORQUE_CONSTANT: f32 = 16.3;
/// torque [Nm] * rpm / 7127 = hp
pub const HP_DIVISOR: f32 = 7127.0;

/// Last computed metrics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub torque: f32,
    pub horsepower: f32,
}

pub struct MetricsCalculator {
    vehicle: VehicleConfig,
    source: TorqueSource,
    engine_speed: Option<usize>,
    snapshot: MetricsSnapshot,
}

impl MetricsCalculator {
    pub fn new(vehicle: VehicleConfig) -> Self {
        Self {
            vehicle,
            source: TorqueSource::None,
            engine_speed: None,
            snapshot: MetricsSnapshot::default(),
        }
    }

    /// Bind to the inputs found for the active mode
    pub fn configure(&mut self, found: &DiscoveredPids, source: TorqueSource) {
        self.source = source;
        self.engine_speed = found.engine_speed;
        debug!(source = source.name(), engine_speed = ?found.engine_speed, "Metrics inputs bound");
    }

    /// Forget inputs and cached results
    pub fn reset(&mut self) {
        self.source = TorqueSource::None;
        self.engine_speed = None;
        self.snapshot = MetricsSnapshot::default();
    }

    pub fn is_enabled(&self) -> bool {
        self.vehicle.calculate_hp && self.source != TorqueSource::None
    }

    pub fn source(&self) -> TorqueSource {
        self.source
    }

    pub fn torque(&self) -> f32 {
        self.snapshot.torque
    }

    pub fn horsepower(&self) -> f32 {
        self.snapshot.horsepower
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot
    }

    /// Recompute from the value table of the active mode
    pub fn update(&mut self, values: &[PidValue]) -> MetricsSnapshot {
        if !self.is_enabled() {
            return self.snapshot;
        }

        let value = |index: usize| values.get(index).map(|v| v.value);

        match self.source {
            TorqueSource::None => {}
            TorqueSource::Direct { torque } => {
                self.snapshot.torque = value(torque).unwrap_or(0.0);
            }
            TorqueSource::Physics {
                secondary_signal,
                gear,
                road_speed,
            } => match (value(secondary_signal), value(gear), value(road_speed)) {
                (Some(signal), Some(gear), Some(speed)) => {
                    let gear = gear as i32;
                    // Out-of-range gears keep the previous torque
                    if (1..=7).contains(&gear) {
                        self.snapshot.torque = self.physics_torque(signal, gear, speed);
                    }
                }
                _ => self.snapshot.torque = 0.0,
            },
        }

        self.snapshot.horsepower = match self.engine_speed.and_then(value) {
            Some(rpm) => finite_or_zero(horsepower(self.snapshot.torque, rpm)),
            None => 0.0,
        };

        trace!(
            torque = self.snapshot.torque,
            horsepower = self.snapshot.horsepower,
            "Metrics updated"
        );
        self.snapshot
    }

    /// Torque from longitudinal acceleration, gear and road speed
    pub fn physics_torque(&self, secondary_signal: f32, gear: i32, speed: f32) -> f32 {
        let Some(gear_ratio) = self.vehicle.gear_ratio(gear) else {
            return 0.0;
        };

        let weight = self.vehicle.curb_weight_kg * KG_TO_N;
        let accel = secondary_signal.sqrt();
        let ratio = (gear_ratio * self.vehicle.final_drive).sqrt();
        let drag = 1.0 + (speed as f64 * speed as f64) * self.vehicle.drag_coefficient as f64;

        let torque = weight * accel / ratio / self.vehicle.tire_circumference() / TORQUE_CONSTANT;
        finite_or_zero((torque as f64 * drag) as f32)
    }
}

pub fn horsepower(torque: f32, engine_speed: f32) -> f32 {
    torque * engine_speed / HP_DIVISOR
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(raw: &[f32]) -> Vec<PidValue> {
        raw.iter()
            .map(|&value| PidValue {
                value,
                ..Default::default()
            })
            .collect()
    }

    fn direct() -> MetricsCalculator {
        let mut calc = MetricsCalculator::new(VehicleConfig::default());
        let found = DiscoveredPids {
            torque: Some(0),
            engine_speed: Some(1),
            ..Default::default()
        };
        calc.configure(&found, TorqueSource::select(&found, true));
        calc
    }

    fn physics() -> MetricsCalculator {
        let mut calc = MetricsCalculator::new(VehicleConfig::default());
        let found = DiscoveredPids {
            engine_speed: Some(0),
            secondary_signal: Some(1),
            gear: Some(2),
            road_speed: Some(3),
            ..Default::default()
        };
        calc.configure(&found, TorqueSource::select(&found, true));
        calc
    }

    #[test]
    fn test_horsepower_from_direct_torque() {
        let mut calc = direct();
        let snapshot = calc.update(&values(&[300.0, 3500.0]));
        assert_eq!(snapshot.torque, 300.0);
        assert!((snapshot.horsepower - 147.327).abs() < 1e-3);
        assert_eq!(calc.horsepower(), snapshot.horsepower);
    }

    #[test]
    fn test_disabled_keeps_zero() {
        let vehicle = VehicleConfig {
            calculate_hp: false,
            ..Default::default()
        };
        let mut calc = MetricsCalculator::new(vehicle);
        let found = DiscoveredPids {
            torque: Some(0),
            engine_speed: Some(1),
            ..Default::default()
        };
        calc.configure(&found, TorqueSource::select(&found, true));
        assert!(!calc.is_enabled());
        assert_eq!(calc.update(&values(&[300.0, 3500.0])), MetricsSnapshot::default());
    }

    #[test]
    fn test_missing_inputs_zero() {
        let mut calc = direct();
        calc.update(&values(&[300.0, 3500.0]));
        let snapshot = calc.update(&values(&[]));
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn test_physics_torque() {
        let mut calc = physics();
        let snapshot = calc.update(&values(&[3000.0, 4.0, 1.0, 0.0]));
        assert!((snapshot.torque - 243.70).abs() < 0.01, "{}", snapshot.torque);
        assert!((snapshot.horsepower - snapshot.torque * 3000.0 / 7127.0).abs() < 1e-3);

        let with_drag = calc.update(&values(&[3000.0, 4.0, 1.0, 0.01]));
        assert!((with_drag.torque - 280.26).abs() < 0.01, "{}", with_drag.torque);
    }

    #[test]
    fn test_out_of_range_gear_keeps_previous_torque() {
        let mut calc = physics();
        let first = calc.update(&values(&[3000.0, 4.0, 1.0, 0.0]));
        let neutral = calc.update(&values(&[2000.0, 9.0, 0.0, 0.0]));
        assert_eq!(neutral.torque, first.torque);
        // Horsepower still follows the new engine speed
        assert!((neutral.horsepower - first.torque * 2000.0 / 7127.0).abs() < 1e-3);

        let overflow = calc.update(&values(&[2000.0, 9.0, 8.0, 0.0]));
        assert_eq!(overflow.torque, first.torque);
    }

    #[test]
    fn test_arithmetic_faults_yield_zero() {
        let mut calc = physics();
        calc.update(&values(&[3000.0, 4.0, 1.0, 0.0]));
        // Gear 7 has a zero ratio
        assert_eq!(calc.update(&values(&[3000.0, 4.0, 7.0, 0.0])).torque, 0.0);

        calc.update(&values(&[3000.0, 4.0, 1.0, 0.0]));
        // Negative acceleration has no square root
        let snapshot = calc.update(&values(&[3000.0, -4.0, 1.0, 0.0]));
        assert_eq!(snapshot.torque, 0.0);
        assert_eq!(snapshot.horsepower, 0.0);
    }

    #[test]
    fn test_reset() {
        let mut calc = direct();
        calc.update(&values(&[300.0, 3500.0]));
        calc.reset();
        assert_eq!(calc.snapshot(), MetricsSnapshot::default());
        assert_eq!(calc.source(), TorqueSource::None);
    }
}
