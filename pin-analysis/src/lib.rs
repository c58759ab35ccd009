// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Pin detection over strike-book snapshots.
//!
//! Strikes with concentrated dealer gamma act as price attractors into the
//! close: short-gamma dealers hedge into the move at strikes above spot
//! (upward pull) and against it below spot (downward pull), while gamma
//! parked inside the ATM band can pull either way. The report ranks
//! strikes by absolute dealer gamma and nets the directional pulls into an
//! expected-drift estimate with a crude confidence.

use serde::Serialize;
use strike_book::StrikeLevels;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PinDirection {
    Upward,
    Downward,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExpectedDrift {
    Up,
    Down,
    Balanced,
}

#[derive(Debug, Clone)]
pub struct PinConfig {
    /// Half-width of the band around spot treated as neutral/ATM.
    pub atm_band: f64,
    pub top_n: usize,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            atm_band: 5.0,
            top_n: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrikePin {
    pub strike: f64,
    pub force: f64,
    pub direction: PinDirection,
    pub call_gamma: f64,
    pub put_gamma: f64,
    pub distance_from_spot: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PinReport {
    pub spot: f64,
    /// Top pins by force, strongest first.
    pub pins: Vec<StrikePin>,
    pub net_directional_force: f64,
    pub expected: ExpectedDrift,
    /// Share of total force behind the expected direction, in [0, 1].
    pub confidence: f64,
}

impl PinReport {
    pub fn strongest(&self) -> Option<&StrikePin> {
        self.pins.first()
    }
}

/// Build the pin report for one book snapshot at the current spot.
pub fn analyze(levels: &[StrikeLevels], spot: f64, cfg: &PinConfig) -> PinReport {
    let mut pins: Vec<StrikePin> = levels
        .iter()
        .filter(|level| level.net_gamma != 0.0)
        .map(|level| {
            let distance = level.strike - spot;
            let direction = if distance.abs() <= cfg.atm_band {
                PinDirection::Neutral
            } else if distance > 0.0 {
                PinDirection::Upward
            } else {
                PinDirection::Downward
            };
            StrikePin {
                strike: level.strike,
                force: level.net_gamma.abs(),
                direction,
                call_gamma: level.call_gamma,
                put_gamma: level.put_gamma,
                distance_from_spot: distance,
            }
        })
        .collect();
    pins.sort_by(|a, b| b.force.total_cmp(&a.force));

    let mut upward = 0.0;
    let mut downward = 0.0;
    let mut total = 0.0;
    for pin in &pins {
        total += pin.force;
        match pin.direction {
            PinDirection::Upward => upward += pin.force,
            PinDirection::Downward => downward += pin.force,
            PinDirection::Neutral => {}
        }
    }
    let net = upward - downward;
    let confidence = if total > 0.0 { net.abs() / total } else { 0.0 };
    // A drift call needs a tenth of the book leaning one way; below that
    // the forces are treated as balanced.
    let expected = if total > 0.0 && net > 0.1 * total {
        ExpectedDrift::Up
    } else if total > 0.0 && net < -0.1 * total {
        ExpectedDrift::Down
    } else {
        ExpectedDrift::Balanced
    };

    pins.truncate(cfg.top_n.max(1));
    PinReport {
        spot,
        pins,
        net_directional_force: net,
        expected,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(strike: f64, call_gamma: f64, put_gamma: f64) -> StrikeLevels {
        StrikeLevels {
            strike,
            call_gamma,
            put_gamma,
            net_gamma: call_gamma + put_gamma,
            net_customer_contracts: 0,
        }
    }

    #[test]
    fn classifies_direction_by_strike_location() {
        let levels = vec![
            level(5950.0, -80.0, 0.0), // above spot: upward pull
            level(5850.0, 0.0, -20.0), // below spot: downward pull
            level(5902.0, -5.0, -5.0), // inside the ATM band: neutral
        ];
        let report = analyze(&levels, 5900.0, &PinConfig::default());
        let by_strike: Vec<(f64, PinDirection)> =
            report.pins.iter().map(|p| (p.strike, p.direction)).collect();
        assert!(by_strike.contains(&(5950.0, PinDirection::Upward)));
        assert!(by_strike.contains(&(5850.0, PinDirection::Downward)));
        assert!(by_strike.contains(&(5902.0, PinDirection::Neutral)));
    }

    #[test]
    fn ranks_pins_by_force_and_truncates() {
        let levels: Vec<StrikeLevels> = (0..8)
            .map(|i| level(5800.0 + i as f64 * 25.0, -(i as f64 + 1.0) * 10.0, 0.0))
            .collect();
        let report = analyze(&levels, 5900.0, &PinConfig { atm_band: 5.0, top_n: 3 });
        assert_eq!(report.pins.len(), 3);
        assert!(report.pins[0].force >= report.pins[1].force);
        assert!(report.pins[1].force >= report.pins[2].force);
        assert_eq!(report.strongest().unwrap().strike, 5975.0);
    }

    #[test]
    fn net_force_drives_expected_drift() {
        let upward_heavy = vec![level(5950.0, -100.0, 0.0), level(5850.0, 0.0, -10.0)];
        let report = analyze(&upward_heavy, 5900.0, &PinConfig::default());
        assert_eq!(report.expected, ExpectedDrift::Up);
        assert!(report.net_directional_force > 0.0);
        assert!(report.confidence > 0.5);

        let downward_heavy = vec![level(5950.0, -10.0, 0.0), level(5850.0, 0.0, -100.0)];
        let report = analyze(&downward_heavy, 5900.0, &PinConfig::default());
        assert_eq!(report.expected, ExpectedDrift::Down);
    }

    #[test]
    fn balanced_book_has_no_call() {
        let balanced = vec![level(5950.0, -50.0, 0.0), level(5850.0, 0.0, -50.0)];
        let report = analyze(&balanced, 5900.0, &PinConfig::default());
        assert_eq!(report.expected, ExpectedDrift::Balanced);
        assert!(report.confidence < 0.1);
    }

    #[test]
    fn empty_book_yields_empty_report() {
        let report = analyze(&[], 5900.0, &PinConfig::default());
        assert!(report.pins.is_empty());
        assert_eq!(report.expected, ExpectedDrift::Balanced);
        assert_eq!(report.confidence, 0.0);
        assert!(report.strongest().is_none());
    }
}
