//! Black-Scholes closed form.

use optmaker_core::{Greeks, OptionKind};

const DAYS_PER_YEAR: f64 = 365.0;
const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Model inputs. `time` is in years, `vol` and `rate` annualized fractions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BsInputs {
    pub spot: f64,
    pub strike: f64,
    pub time: f64,
    pub rate: f64,
    pub vol: f64,
}

impl BsInputs {
    pub fn new(spot: f64, strike: f64, time: f64, rate: f64, vol: f64) -> Self {
        Self {
            spot,
            strike,
            time,
            rate,
            vol,
        }
    }

    pub fn with_vol(&self, vol: f64) -> Self {
        Self { vol, ..*self }
    }

    #[inline]
    fn discount(&self) -> f64 {
        (-self.rate * self.time).exp()
    }

    #[inline]
    fn d1_d2(&self) -> (f64, f64) {
        let sig_sqrt_t = self.vol * self.time.sqrt();
        let d1 = ((self.spot / self.strike).ln()
            + (self.rate + 0.5 * self.vol * self.vol) * self.time)
            / sig_sqrt_t;
        (d1, d1 - sig_sqrt_t)
    }
}

/// Standard normal density.
#[inline]
pub fn norm_pdf(x: f64) -> f64 {
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Cumulative standard normal.
///
/// Abramowitz & Stegun 26.2.17 rational approximation, |error| < 7.5e-8.
pub fn norm_cdf(x: f64) -> f64 {
    const P: f64 = 0.231_641_9;
    const B1: f64 = 0.319_381_530;
    const B2: f64 = -0.356_563_782;
    const B3: f64 = 1.781_477_937;
    const B4: f64 = -1.821_255_978;
    const B5: f64 = 1.330_274_429;

    if x < 0.0 {
        return 1.0 - norm_cdf(-x);
    }
    let t = 1.0 / (1.0 + P * x);
    let poly = t * (B1 + t * (B2 + t * (B3 + t * (B4 + t * B5))));
    1.0 - norm_pdf(x) * poly
}

#[inline]
fn intrinsic(kind: OptionKind, spot: f64, strike: f64) -> f64 {
    match kind {
        OptionKind::Call => (spot - strike).max(0.0),
        OptionKind::Put => (strike - spot).max(0.0),
    }
}

/// Fair value of one option on one unit of underlying.
pub fn price(kind: OptionKind, inputs: &BsInputs) -> f64 {
    if inputs.time <= 0.0 {
        return intrinsic(kind, inputs.spot, inputs.strike);
    }
    let df = inputs.discount();
    if inputs.vol <= 0.0 {
        return intrinsic(kind, inputs.spot, inputs.strike * df);
    }

    let (d1, d2) = inputs.d1_d2();
    match kind {
        OptionKind::Call => inputs.spot * norm_cdf(d1) - inputs.strike * df * norm_cdf(d2),
        OptionKind::Put => inputs.strike * df * norm_cdf(-d2) - inputs.spot * norm_cdf(-d1),
    }
}

/// Vega per unit of volatility (not per 1%). Used by the IV solver.
pub(crate) fn raw_vega(inputs: &BsInputs) -> f64 {
    if inputs.time <= 0.0 || inputs.vol <= 0.0 {
        return 0.0;
    }
    let (d1, _) = inputs.d1_d2();
    inputs.spot * norm_pdf(d1) * inputs.time.sqrt()
}

/// Sensitivities of one option on one unit of underlying.
pub fn greeks(kind: OptionKind, inputs: &BsInputs) -> Greeks {
    let sign = match kind {
        OptionKind::Call => 1.0,
        OptionKind::Put => -1.0,
    };

    if inputs.time <= 0.0 {
        return Greeks {
            delta: sign,
            ..Greeks::default()
        };
    }

    let df = inputs.discount();
    if inputs.vol <= 0.0 {
        let in_the_money = intrinsic(kind, inputs.spot, inputs.strike * df) > 0.0;
        return Greeks {
            delta: if in_the_money { sign } else { 0.0 },
            ..Greeks::default()
        };
    }

    let (d1, d2) = inputs.d1_d2();
    let sqrt_t = inputs.time.sqrt();
    let pdf_d1 = norm_pdf(d1);
    let decay = -inputs.spot * pdf_d1 * inputs.vol / (2.0 * sqrt_t);
    let k_df = inputs.strike * df;

    let (delta, theta_year, rho) = match kind {
        OptionKind::Call => (
            norm_cdf(d1),
            decay - inputs.rate * k_df * norm_cdf(d2),
            k_df * inputs.time * norm_cdf(d2),
        ),
        OptionKind::Put => (
            norm_cdf(d1) - 1.0,
            decay + inputs.rate * k_df * norm_cdf(-d2),
            -k_df * inputs.time * norm_cdf(-d2),
        ),
    };

    Greeks {
        delta,
        gamma: pdf_d1 / (inputs.spot * inputs.vol * sqrt_t),
        theta: theta_year / DAYS_PER_YEAR,
        vega: inputs.spot * pdf_d1 * sqrt_t / 100.0,
        rho: rho / 100.0,
    }
}
