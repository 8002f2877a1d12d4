//! Easing and motion curves
//!
//! Pure, deterministic `f(t) -> value` with `t` clamped to `[0, 1]`.
//! Output is in `[0, 1]` for the standard families; the back/elastic
//! variants briefly exceed 1 and anticipation starts slightly negative
//! before settling. No allocation, no hidden state.
//!
//! Parameterized curves validate their parameters at construction (or via
//! [`Easing::validate`] after deserialization); evaluation is infallible.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{ChoreoError, ChoreoResult};

// Back-family constants
const BACK_C1: f64 = 1.70158;
const BACK_C2: f64 = BACK_C1 * 1.525;
const BACK_C3: f64 = BACK_C1 + 1.0;

// Bounce-family constants
const BOUNCE_N1: f64 = 7.5625;
const BOUNCE_D1: f64 = 2.75;

/// Easing curve selection for one keyframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "curve", rename_all = "snake_case")]
pub enum Easing {
    Linear,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseInCubic,
    EaseOutCubic,
    #[default]
    EaseInOutCubic,
    EaseInQuart,
    EaseOutQuart,
    EaseInOutQuart,
    EaseInBack,
    EaseOutBack,
    EaseInOutBack,
    EaseOutBounce,
    EaseOutElastic,
    /// Reverse deflection for `lead` of the duration, then a rise to the target
    Anticipation {
        #[serde(default = "default_anticipation_lead")]
        lead: f64,
        #[serde(default = "default_anticipation_overshoot")]
        overshoot: f64,
    },
    /// Squash-and-stretch wobble layered onto the rise
    Squash {
        #[serde(default = "default_squash_amount")]
        amount: f64,
    },
    /// Critically-damped settling into the target
    Settle {
        #[serde(default = "default_settle_power")]
        power: f64,
    },
}

fn default_anticipation_lead() -> f64 {
    0.2
}

fn default_anticipation_overshoot() -> f64 {
    0.1
}

fn default_squash_amount() -> f64 {
    0.3
}

fn default_settle_power() -> f64 {
    1.0
}

impl Easing {
    /// Anticipation curve with validated parameters
    pub fn anticipation(lead: f64, overshoot: f64) -> ChoreoResult<Self> {
        let curve = Easing::Anticipation { lead, overshoot };
        curve.validate()?;
        Ok(curve)
    }

    /// Squash curve with validated amount
    pub fn squash(amount: f64) -> ChoreoResult<Self> {
        let curve = Easing::Squash { amount };
        curve.validate()?;
        Ok(curve)
    }

    /// Settle curve with validated power
    pub fn settle(power: f64) -> ChoreoResult<Self> {
        let curve = Easing::Settle { power };
        curve.validate()?;
        Ok(curve)
    }

    /// Reject NaN/out-of-range parameters
    ///
    /// Called by constructors and again on config load, since serde
    /// deserialization bypasses the constructors.
    pub fn validate(&self) -> ChoreoResult<()> {
        match *self {
            Easing::Anticipation { lead, overshoot } => {
                if !lead.is_finite() || !(0.0..1.0).contains(&lead) || lead == 0.0 {
                    return Err(ChoreoError::curve(format!(
                        "anticipation lead {} not in (0, 1)",
                        lead
                    )));
                }
                if !overshoot.is_finite() || overshoot < 0.0 {
                    return Err(ChoreoError::curve(format!(
                        "anticipation overshoot {} negative or NaN",
                        overshoot
                    )));
                }
            }
            Easing::Squash { amount } => {
                if !amount.is_finite() || amount < 0.0 {
                    return Err(ChoreoError::curve(format!(
                        "squash amount {} negative or NaN",
                        amount
                    )));
                }
            }
            Easing::Settle { power } => {
                if !power.is_finite() || power <= 0.0 {
                    return Err(ChoreoError::curve(format!(
                        "settle power {} not positive",
                        power
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Evaluate the curve at `t`; `t` outside `[0, 1]` is clamped
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Easing::Linear => t,
            Easing::EaseInQuad => t * t,
            Easing::EaseOutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - 2.0 * (1.0 - t) * (1.0 - t)
                }
            }
            Easing::EaseInCubic => t * t * t,
            Easing::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
            Easing::EaseInOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - 4.0 * (1.0 - t).powi(3)
                }
            }
            Easing::EaseInQuart => t.powi(4),
            Easing::EaseOutQuart => 1.0 - (1.0 - t).powi(4),
            Easing::EaseInOutQuart => {
                if t < 0.5 {
                    8.0 * t.powi(4)
                } else {
                    1.0 - 8.0 * (1.0 - t).powi(4)
                }
            }
            Easing::EaseInBack => BACK_C3 * t * t * t - BACK_C1 * t * t,
            Easing::EaseOutBack => {
                1.0 + BACK_C3 * (t - 1.0).powi(3) + BACK_C1 * (t - 1.0).powi(2)
            }
            Easing::EaseInOutBack => {
                if t < 0.5 {
                    ((2.0 * t).powi(2) * ((BACK_C2 + 1.0) * 2.0 * t - BACK_C2)) / 2.0
                } else {
                    ((2.0 * t - 2.0).powi(2) * ((BACK_C2 + 1.0) * (t * 2.0 - 2.0) + BACK_C2)
                        + 2.0)
                        / 2.0
                }
            }
            Easing::EaseOutBounce => bounce_out(t),
            Easing::EaseOutElastic => {
                if t == 0.0 || t == 1.0 {
                    t
                } else {
                    let c4 = (2.0 * PI) / 3.0;
                    2f64.powf(-10.0 * t) * ((t * 10.0 - 0.75) * c4).sin() + 1.0
                }
            }
            Easing::Anticipation { lead, overshoot } => {
                if t < lead {
                    -overshoot * (t * PI / lead).sin()
                } else {
                    let u = (t - lead) / (1.0 - lead);
                    -overshoot + (1.0 + overshoot) * (1.0 - (1.0 - u).powi(3))
                }
            }
            Easing::Squash { amount } => t + amount * (t * PI * 2.0).sin() * (1.0 - t),
            Easing::Settle { power } => {
                // Normalized so the endpoint lands exactly on 1
                let raw = |x: f64| 1.0 - (-5.0 * power * x).exp() * (10.0 * power.sqrt() * x).cos();
                raw(t) / raw(1.0)
            }
        }
    }

    /// True for curves that may briefly exceed the [0, 1] output band
    pub fn overshoots(&self) -> bool {
        matches!(
            self,
            Easing::EaseInBack
                | Easing::EaseOutBack
                | Easing::EaseInOutBack
                | Easing::EaseOutElastic
                | Easing::Anticipation { .. }
                | Easing::Squash { .. }
                | Easing::Settle { .. }
        )
    }
}

fn bounce_out(t: f64) -> f64 {
    if t < 1.0 / BOUNCE_D1 {
        BOUNCE_N1 * t * t
    } else if t < 2.0 / BOUNCE_D1 {
        let t = t - 1.5 / BOUNCE_D1;
        BOUNCE_N1 * t * t + 0.75
    } else if t < 2.5 / BOUNCE_D1 {
        let t = t - 2.25 / BOUNCE_D1;
        BOUNCE_N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / BOUNCE_D1;
        BOUNCE_N1 * t * t + 0.984375
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL_CURVES: [Easing; 18] = [
        Easing::Linear,
        Easing::EaseInQuad,
        Easing::EaseOutQuad,
        Easing::EaseInOutQuad,
        Easing::EaseInCubic,
        Easing::EaseOutCubic,
        Easing::EaseInOutCubic,
        Easing::EaseInQuart,
        Easing::EaseOutQuart,
        Easing::EaseInOutQuart,
        Easing::EaseInBack,
        Easing::EaseOutBack,
        Easing::EaseInOutBack,
        Easing::EaseOutBounce,
        Easing::EaseOutElastic,
        Easing::Anticipation {
            lead: 0.2,
            overshoot: 0.1,
        },
        Easing::Squash { amount: 0.3 },
        Easing::Settle { power: 1.0 },
    ];

    #[test]
    fn test_endpoints_pinned() {
        for curve in ALL_CURVES {
            assert_relative_eq!(curve.apply(0.0), 0.0, epsilon = 1e-12);
            assert_relative_eq!(curve.apply(1.0), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_out_of_range_t_clamped() {
        for curve in ALL_CURVES {
            assert_relative_eq!(curve.apply(-3.0), curve.apply(0.0), epsilon = 1e-12);
            assert_relative_eq!(curve.apply(7.5), curve.apply(1.0), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_midpoint_values_match_reference() {
        assert_relative_eq!(Easing::Linear.apply(0.5), 0.5);
        assert_relative_eq!(Easing::EaseInQuad.apply(0.5), 0.25);
        assert_relative_eq!(Easing::EaseOutQuad.apply(0.5), 0.75);
        assert_relative_eq!(Easing::EaseInOutCubic.apply(0.5), 0.5);
        assert_relative_eq!(Easing::EaseInQuart.apply(0.5), 0.0625);
        // Bounce at the first packet boundary
        assert_relative_eq!(
            Easing::EaseOutBounce.apply(1.0 / BOUNCE_D1),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_anticipation_dips_negative_then_rises() {
        let curve = Easing::Anticipation {
            lead: 0.2,
            overshoot: 0.1,
        };
        // Deepest reverse deflection at half the lead window
        assert_relative_eq!(curve.apply(0.1), -0.1, epsilon = 1e-12);
        assert!(curve.apply(0.05) < 0.0);
        assert!(curve.apply(0.6) > 0.0);
        assert_relative_eq!(curve.apply(1.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_back_overshoots_above_one() {
        let peak = (0..100)
            .map(|i| Easing::EaseOutBack.apply(i as f64 / 100.0))
            .fold(f64::MIN, f64::max);
        assert!(peak > 1.0);
        assert!(Easing::EaseOutBack.overshoots());
        assert!(!Easing::EaseInOutCubic.overshoots());
    }

    #[test]
    fn test_invalid_params_rejected_at_construction() {
        assert!(Easing::anticipation(0.0, 0.1).is_err());
        assert!(Easing::anticipation(1.5, 0.1).is_err());
        assert!(Easing::anticipation(f64::NAN, 0.1).is_err());
        assert!(Easing::anticipation(0.2, -0.5).is_err());
        assert!(Easing::squash(f64::NAN).is_err());
        assert!(Easing::squash(-1.0).is_err());
        assert!(Easing::settle(0.0).is_err());
        assert!(Easing::settle(-2.0).is_err());
        assert!(Easing::anticipation(0.2, 0.1).is_ok());
        assert!(Easing::settle(2.0).is_ok());
    }

    #[test]
    fn test_serde_round_trip() {
        for curve in ALL_CURVES {
            let json = serde_json::to_string(&curve).unwrap();
            let back: Easing = serde_json::from_str(&json).unwrap();
            assert_eq!(curve, back);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Invariant 3: continuity — no jump greater than what a
            // Lipschitz bound of ~24 (elastic peaks near 22) allows
            // over a 1e-4 step.
            #[test]
            fn curves_are_continuous(idx in 0usize..ALL_CURVES.len(), t in 0.0f64..0.9999) {
                let curve = ALL_CURVES[idx];
                let step = 1e-4;
                let jump = (curve.apply(t + step) - curve.apply(t)).abs();
                prop_assert!(jump < 24.0 * step + 1e-9);
            }

            #[test]
            fn standard_curves_stay_in_band(t in 0.0f64..=1.0) {
                for curve in ALL_CURVES.iter().filter(|c| !c.overshoots()) {
                    let v = curve.apply(t);
                    prop_assert!((-1e-12..=1.0 + 1e-12).contains(&v));
                }
            }
        }
    }
}
