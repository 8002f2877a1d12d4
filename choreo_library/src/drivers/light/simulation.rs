//! Simulation light bus
//!
//! Remembers the last pattern applied to each zone and the full call
//! history, which is all the scenario tests need.

use std::collections::HashMap;

use choreo_core::adapters::{LightBus, LightPattern};
use choreo_core::error::ChoreoResult;

/// Simulated lighting backend
#[derive(Default)]
pub struct SimulationLightBus {
    zones: HashMap<String, (LightPattern, f64)>,
    history: Vec<(String, LightPattern, f64)>,
}

impl SimulationLightBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, zone: &str) -> Option<(LightPattern, f64)> {
        self.zones.get(zone).copied()
    }

    pub fn history(&self) -> &[(String, LightPattern, f64)] {
        &self.history
    }
}

impl LightBus for SimulationLightBus {
    fn set(&mut self, zone: &str, pattern: LightPattern, intensity: f64) -> ChoreoResult<()> {
        let intensity = intensity.clamp(0.0, 1.0);
        self.zones.insert(zone.to_string(), (pattern, intensity));
        self.history.push((zone.to_string(), pattern, intensity));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_tracks_latest_per_zone() {
        let mut lights = SimulationLightBus::new();
        lights.set("dome", LightPattern::Pulse, 0.7).unwrap();
        lights.set("dome", LightPattern::Neutral, 0.0).unwrap();
        lights.set("body", LightPattern::Chase, 1.0).unwrap();

        assert_eq!(lights.current("dome"), Some((LightPattern::Neutral, 0.0)));
        assert_eq!(lights.current("body"), Some((LightPattern::Chase, 1.0)));
        assert_eq!(lights.history().len(), 3);
    }

    #[test]
    fn test_intensity_clamped() {
        let mut lights = SimulationLightBus::new();
        lights.set("dome", LightPattern::Alert, 3.0).unwrap();
        assert_eq!(lights.current("dome"), Some((LightPattern::Alert, 1.0)));
    }
}
