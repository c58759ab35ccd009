// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Black–Scholes–Merton closed forms and bracketed implied-volatility
//! solvers. Time is ACT/365 fixed, rates and dividend yield are annualized
//! decimals, volatility is a plain decimal (0.20 = 20%).

use core_types::types::OptionRight;
use libm::erf;
use std::f64::consts::SQRT_2;

pub const MIN_VOL: f64 = 1e-4;
pub const MAX_VOL: f64 = 5.0;
pub const IV_PRICE_TOLERANCE: f64 = 1e-4;
pub const IV_MAX_ITERS: usize = 100;

const INV_SQRT_TWO_PI: f64 = 0.3989422804014327;

pub fn norm_pdf(x: f64) -> f64 {
    INV_SQRT_TWO_PI * (-0.5 * x * x).exp()
}

pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

/// All outputs of one closed-form evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Greeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
}

/// Full closed-form evaluation. `None` when inputs leave the model's
/// domain (non-positive spot/strike/vol/tau or a non-finite intermediate).
pub fn price_and_greeks(
    right: OptionRight,
    spot: f64,
    strike: f64,
    rate: f64,
    dividend_yield: f64,
    vol: f64,
    tau: f64,
) -> Option<Greeks> {
    if !(spot > 0.0 && strike > 0.0 && vol > 0.0 && tau > 0.0) {
        return None;
    }
    let sqrt_tau = tau.sqrt();
    let denom = vol * sqrt_tau;
    if !denom.is_finite() || denom <= 0.0 {
        return None;
    }
    let log_term = (spot / strike).ln();
    if !log_term.is_finite() {
        return None;
    }
    let d1 = (log_term + (rate - dividend_yield + 0.5 * vol * vol) * tau) / denom;
    let d2 = d1 - denom;
    let disc_r = (-rate * tau).exp();
    let disc_q = (-dividend_yield * tau).exp();
    let pdf_d1 = norm_pdf(d1);
    let gamma = disc_q * pdf_d1 / (spot * denom);
    let vega = spot * disc_q * pdf_d1 * sqrt_tau;
    if !gamma.is_finite() || !vega.is_finite() {
        return None;
    }
    let (price, delta, theta) = match right {
        OptionRight::Call => {
            let nd1 = norm_cdf(d1);
            let nd2 = norm_cdf(d2);
            let price = spot * disc_q * nd1 - strike * disc_r * nd2;
            let delta = disc_q * nd1;
            let theta = -spot * disc_q * pdf_d1 * vol / (2.0 * sqrt_tau)
                + dividend_yield * spot * disc_q * nd1
                - rate * strike * disc_r * nd2;
            (price, delta, theta)
        }
        OptionRight::Put => {
            let nneg_d1 = norm_cdf(-d1);
            let nneg_d2 = norm_cdf(-d2);
            let price = strike * disc_r * nneg_d2 - spot * disc_q * nneg_d1;
            let delta = disc_q * (norm_cdf(d1) - 1.0);
            let theta = -spot * disc_q * pdf_d1 * vol / (2.0 * sqrt_tau)
                - dividend_yield * spot * disc_q * nneg_d1
                + rate * strike * disc_r * nneg_d2;
            (price, delta, theta)
        }
    };
    Some(Greeks {
        price,
        delta,
        gamma,
        vega,
        theta,
    })
}

pub fn bs_price(
    right: OptionRight,
    spot: f64,
    strike: f64,
    rate: f64,
    dividend_yield: f64,
    vol: f64,
    tau: f64,
) -> Option<f64> {
    price_and_greeks(right, spot, strike, rate, dividend_yield, vol, tau).map(|g| g.price)
}

/// Per-contract gamma with the engine's edge semantics: expired contracts
/// and vanishing vol contribute zero; an invalid spot/strike yields NaN so
/// downstream finiteness checks reject the trade.
pub fn gamma(spot: f64, strike: f64, tau: f64, vol: f64, rate: f64, dividend_yield: f64) -> f64 {
    if spot <= 0.0 || strike <= 0.0 {
        return f64::NAN;
    }
    if tau <= 0.0 || vol < MIN_VOL {
        return 0.0;
    }
    price_and_greeks(OptionRight::Call, spot, strike, rate, dividend_yield, vol, tau)
        .map(|g| g.gamma)
        .unwrap_or(f64::NAN)
}

/// Delta with `sigma -> 0` saturation to the intrinsic exercise indicator.
pub fn delta(
    right: OptionRight,
    spot: f64,
    strike: f64,
    tau: f64,
    vol: f64,
    rate: f64,
    dividend_yield: f64,
) -> f64 {
    if spot <= 0.0 || strike <= 0.0 {
        return f64::NAN;
    }
    if tau <= 0.0 || vol < MIN_VOL {
        return match right {
            OptionRight::Call => {
                if spot >= strike {
                    1.0
                } else {
                    0.0
                }
            }
            OptionRight::Put => {
                if spot <= strike {
                    -1.0
                } else {
                    0.0
                }
            }
        };
    }
    price_and_greeks(right, spot, strike, rate, dividend_yield, vol, tau)
        .map(|g| g.delta)
        .unwrap_or(f64::NAN)
}

pub fn vega(spot: f64, strike: f64, tau: f64, vol: f64, rate: f64, dividend_yield: f64) -> f64 {
    if spot <= 0.0 || strike <= 0.0 {
        return f64::NAN;
    }
    if tau <= 0.0 || vol < MIN_VOL {
        return 0.0;
    }
    price_and_greeks(OptionRight::Call, spot, strike, rate, dividend_yield, vol, tau)
        .map(|g| g.vega)
        .unwrap_or(f64::NAN)
}

pub fn theta(
    right: OptionRight,
    spot: f64,
    strike: f64,
    tau: f64,
    vol: f64,
    rate: f64,
    dividend_yield: f64,
) -> f64 {
    if spot <= 0.0 || strike <= 0.0 {
        return f64::NAN;
    }
    if tau <= 0.0 || vol < MIN_VOL {
        return 0.0;
    }
    price_and_greeks(right, spot, strike, rate, dividend_yield, vol, tau)
        .map(|g| g.theta)
        .unwrap_or(f64::NAN)
}

/// Bracketed implied-vol solve over `[MIN_VOL, MAX_VOL]`: bisection with a
/// Newton step taken whenever it stays inside the current bracket.
/// `None` when the target cannot be bracketed, an intermediate goes
/// non-finite, or the loop fails to converge within `IV_MAX_ITERS`.
pub fn implied_vol(
    right: OptionRight,
    target: f64,
    spot: f64,
    strike: f64,
    rate: f64,
    dividend_yield: f64,
    tau: f64,
) -> Option<f64> {
    if !target.is_finite() || target <= 0.0 || spot <= 0.0 || strike <= 0.0 || tau <= 0.0 {
        return None;
    }
    let price_at = |vol: f64| bs_price(right, spot, strike, rate, dividend_yield, vol, tau);

    let mut lo = MIN_VOL;
    let mut hi = MAX_VOL;
    let f_lo = price_at(lo)? - target;
    if f_lo.abs() < IV_PRICE_TOLERANCE {
        return Some(lo);
    }
    let f_hi = price_at(hi)? - target;
    if f_hi.abs() < IV_PRICE_TOLERANCE {
        return Some(hi);
    }
    // Price is monotone in vol; same sign at both ends means no root.
    if f_lo.signum() == f_hi.signum() {
        return None;
    }

    let mut sigma = 0.5 * (lo + hi);
    for _ in 0..IV_MAX_ITERS {
        let greeks = price_and_greeks(right, spot, strike, rate, dividend_yield, sigma, tau)?;
        let diff = greeks.price - target;
        if !diff.is_finite() {
            return None;
        }
        if diff.abs() < IV_PRICE_TOLERANCE {
            return Some(sigma);
        }
        if diff > 0.0 {
            hi = sigma;
        } else {
            lo = sigma;
        }
        let newton = if greeks.vega.abs() > 1e-10 {
            sigma - diff / greeks.vega
        } else {
            f64::NAN
        };
        sigma = if newton.is_finite() && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }
    None
}

pub fn implied_vol_call(
    target: f64,
    spot: f64,
    strike: f64,
    rate: f64,
    dividend_yield: f64,
    tau: f64,
) -> Option<f64> {
    implied_vol(OptionRight::Call, target, spot, strike, rate, dividend_yield, tau)
}

pub fn implied_vol_put(
    target: f64,
    spot: f64,
    strike: f64,
    rate: f64,
    dividend_yield: f64,
    tau: f64,
) -> Option<f64> {
    implied_vol(OptionRight::Put, target, spot, strike, rate, dividend_yield, tau)
}
