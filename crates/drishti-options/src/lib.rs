//! Black-Scholes greeks.
//!
//! Pure utility consumed by the trading-level generator for delta-linearized
//! premium projection when no live option-chain row exists for the chosen
//! strike. Only first-order greeks are exposed; the engine reads `delta`.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;

use drishti_models::OptionType;

/// Standard normal PDF: φ(x) = (1/√(2π)) · e^(−x²/2)
fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Standard normal CDF: Φ(x)
fn norm_cdf(x: f64) -> f64 {
    Normal::new(0.0, 1.0).expect("static params").cdf(x)
}

/// Inputs to the pricing model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GreeksInput {
    /// Spot price of the underlying index.
    pub spot: f64,
    /// Strike price.
    pub strike: f64,
    /// Time to expiry in years (e.g. 2 trading days ≈ 2.0/365.0).
    pub time_to_expiry: f64,
    /// Annualized risk-free rate.
    pub risk_free_rate: f64,
    /// Annualized implied volatility (0.12 for 12%).
    pub iv: f64,
    pub option_type: OptionType,
}

/// First-order greeks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Greeks {
    /// ∂V/∂S. Calls in [0, 1], puts in [−1, 0].
    pub delta: f64,
    /// ∂²V/∂S².
    pub gamma: f64,
    /// ∂V/∂t per calendar day (negative for long options).
    pub theta: f64,
    /// ∂V/∂σ per 1% IV change.
    pub vega: f64,
}

/// Compute first-order greeks for a European option.
///
/// Degenerate inputs (zero time or vol) collapse to intrinsic-value deltas
/// so the caller never divides by zero.
pub fn greeks(input: &GreeksInput) -> Greeks {
    let GreeksInput {
        spot,
        strike,
        time_to_expiry: t,
        risk_free_rate: r,
        iv,
        option_type,
    } = *input;

    if t <= 0.0 || iv <= 0.0 || spot <= 0.0 || strike <= 0.0 {
        let itm = match option_type {
            OptionType::Ce => spot > strike,
            OptionType::Pe => spot < strike,
        };
        let delta = match (option_type, itm) {
            (OptionType::Ce, true) => 1.0,
            (OptionType::Ce, false) => 0.0,
            (OptionType::Pe, true) => -1.0,
            (OptionType::Pe, false) => 0.0,
        };
        return Greeks {
            delta,
            ..Greeks::default()
        };
    }

    let sqrt_t = t.sqrt();
    let d1 = ((spot / strike).ln() + (r + 0.5 * iv * iv) * t) / (iv * sqrt_t);
    let d2 = d1 - iv * sqrt_t;

    let delta = match option_type {
        OptionType::Ce => norm_cdf(d1),
        OptionType::Pe => norm_cdf(d1) - 1.0,
    };

    let gamma = norm_pdf(d1) / (spot * iv * sqrt_t);
    let vega = spot * norm_pdf(d1) * sqrt_t / 100.0;

    let decay = -(spot * norm_pdf(d1) * iv) / (2.0 * sqrt_t);
    let carry = r * strike * (-r * t).exp();
    let theta = match option_type {
        OptionType::Ce => (decay - carry * norm_cdf(d2)) / 365.0,
        OptionType::Pe => (decay + carry * norm_cdf(-d2)) / 365.0,
    };

    Greeks {
        delta,
        gamma,
        theta,
        vega,
    }
}

/// Theoretical Black-Scholes premium. Used as a fallback entry premium when
/// the option chain carries no quote for the chosen strike.
pub fn premium(input: &GreeksInput) -> f64 {
    let GreeksInput {
        spot,
        strike,
        time_to_expiry: t,
        risk_free_rate: r,
        iv,
        option_type,
    } = *input;

    if t <= 0.0 || iv <= 0.0 || spot <= 0.0 || strike <= 0.0 {
        return match option_type {
            OptionType::Ce => (spot - strike).max(0.0),
            OptionType::Pe => (strike - spot).max(0.0),
        };
    }

    let sqrt_t = t.sqrt();
    let d1 = ((spot / strike).ln() + (r + 0.5 * iv * iv) * t) / (iv * sqrt_t);
    let d2 = d1 - iv * sqrt_t;
    let df = (-r * t).exp();

    match option_type {
        OptionType::Ce => spot * norm_cdf(d1) - strike * df * norm_cdf(d2),
        OptionType::Pe => strike * df * norm_cdf(-d2) - spot * norm_cdf(-d1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atm_call() -> GreeksInput {
        GreeksInput {
            spot: 24000.0,
            strike: 24000.0,
            time_to_expiry: 2.0 / 365.0,
            risk_free_rate: 0.065,
            iv: 0.12,
            option_type: OptionType::Ce,
        }
    }

    #[test]
    fn atm_call_delta_near_half() {
        let g = greeks(&atm_call());
        assert!(g.delta > 0.45 && g.delta < 0.60, "delta = {}", g.delta);
        assert!(g.gamma > 0.0);
        assert!(g.theta < 0.0);
        assert!(g.vega > 0.0);
    }

    #[test]
    fn put_call_delta_parity() {
        let call = greeks(&atm_call());
        let put = greeks(&GreeksInput {
            option_type: OptionType::Pe,
            ..atm_call()
        });
        assert!((call.delta - put.delta - 1.0).abs() < 1e-9);
    }

    #[test]
    fn deep_itm_call_delta_approaches_one() {
        let g = greeks(&GreeksInput {
            strike: 22000.0,
            ..atm_call()
        });
        assert!(g.delta > 0.99);
    }

    #[test]
    fn expired_option_has_intrinsic_delta() {
        let g = greeks(&GreeksInput {
            time_to_expiry: 0.0,
            strike: 23000.0,
            ..atm_call()
        });
        assert_eq!(g.delta, 1.0);
    }

    #[test]
    fn premium_respects_intrinsic_floor() {
        let p = premium(&GreeksInput {
            strike: 23500.0,
            ..atm_call()
        });
        assert!(p >= 500.0, "premium = {}", p);
    }
}
