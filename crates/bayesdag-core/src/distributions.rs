//! Probability distributions bound to stochastic nodes.
//!
//! The graph treats a distribution as an opaque scorer and sampler over
//! [`Value`]s: it hands over the current values of the node's parameter
//! parents and asks for a log-density or a draw. A few reference
//! distributions are provided so models can be assembled without external
//! crates; anything implementing [`Distribution`] plugs in the same way.
//!
//! Random draws always take an explicit random source. There is no global
//! generator, so a seeded `ChaCha8Rng` makes every draw reproducible.

use std::f64::consts::PI;
use std::fmt;

use rand::RngCore;
use rand_distr::Distribution as _;
use statrs::function::gamma::ln_gamma;

use crate::engine::errors::DomainError;
use crate::engine::value::Value;

/// A density over values, parameterized by the values of parent nodes.
pub trait Distribution: fmt::Debug + Send + Sync {
    /// Display name, e.g. `"normal"`.
    fn name(&self) -> &'static str;

    /// Names of the parameters, in argument-slot order. The length is the arity.
    fn parameter_names(&self) -> &'static [&'static str];

    /// Natural log of the density (or mass) of `x`.
    ///
    /// Values outside the support score `f64::NEG_INFINITY`. Invalid
    /// parameters are reported as [`DomainError`]s, which the graph also maps
    /// to negative infinity.
    fn ln_pdf(&self, params: &[&Value], x: &Value) -> Result<f64, DomainError>;

    /// Draws a value from the distribution.
    fn sample(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value, DomainError>;

    /// Log ratio `ln p(new) - ln p(old)` under the same parameters.
    ///
    /// Override when terms cancel and the ratio is cheaper than two densities.
    fn ln_prior_ratio(&self, params: &[&Value], new: &Value, old: &Value) -> Result<f64, DomainError> {
        Ok(self.ln_pdf(params, new)? - self.ln_pdf(params, old)?)
    }

    fn clone_box(&self) -> Box<dyn Distribution>;
}

impl Clone for Box<dyn Distribution> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

fn param(params: &[&Value], slot: usize) -> Result<f64, DomainError> {
    params
        .get(slot)
        .ok_or(DomainError::Unbound(slot))
        .and_then(|v| v.real())
}

fn positive(x: f64, what: &str) -> Result<f64, DomainError> {
    if x > 0.0 && x.is_finite() {
        Ok(x)
    } else {
        Err(DomainError::Undefined(format!("{what} must be positive and finite, got {x}")))
    }
}

// ── Normal ──────────────────────────────────────────────────────────

/// Normal distribution with parameters `(mean, sd)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normal;

impl Distribution for Normal {
    fn name(&self) -> &'static str {
        "normal"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["mean", "sd"]
    }

    fn ln_pdf(&self, params: &[&Value], x: &Value) -> Result<f64, DomainError> {
        let mean = param(params, 0)?;
        let sd = positive(param(params, 1)?, "sd")?;
        let z = (x.real()? - mean) / sd;
        Ok(-0.5 * (2.0 * PI).ln() - sd.ln() - 0.5 * z * z)
    }

    fn sample(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value, DomainError> {
        let mean = param(params, 0)?;
        let sd = positive(param(params, 1)?, "sd")?;
        let dist = rand_distr::Normal::new(mean, sd)
            .map_err(|e| DomainError::Undefined(e.to_string()))?;
        Ok(Value::Real(dist.sample(rng)))
    }

    fn clone_box(&self) -> Box<dyn Distribution> {
        Box::new(*self)
    }
}

// ── Exponential ─────────────────────────────────────────────────────

/// Exponential distribution with parameter `(rate)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exponential;

impl Distribution for Exponential {
    fn name(&self) -> &'static str {
        "exponential"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["rate"]
    }

    fn ln_pdf(&self, params: &[&Value], x: &Value) -> Result<f64, DomainError> {
        let rate = positive(param(params, 0)?, "rate")?;
        let x = x.real()?;
        if x < 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(rate.ln() - rate * x)
    }

    fn sample(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value, DomainError> {
        let rate = positive(param(params, 0)?, "rate")?;
        let dist =
            rand_distr::Exp::new(rate).map_err(|e| DomainError::Undefined(e.to_string()))?;
        Ok(Value::Real(dist.sample(rng)))
    }

    /// The normalizing `ln(rate)` cancels.
    fn ln_prior_ratio(&self, params: &[&Value], new: &Value, old: &Value) -> Result<f64, DomainError> {
        let rate = positive(param(params, 0)?, "rate")?;
        let (new, old) = (new.real()?, old.real()?);
        if new < 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        if old < 0.0 {
            return Ok(f64::INFINITY);
        }
        Ok(-rate * (new - old))
    }

    fn clone_box(&self) -> Box<dyn Distribution> {
        Box::new(*self)
    }
}

// ── Poisson ─────────────────────────────────────────────────────────

/// Poisson distribution over non-negative integers with parameter `(rate)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Poisson;

impl Distribution for Poisson {
    fn name(&self) -> &'static str {
        "poisson"
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["rate"]
    }

    fn ln_pdf(&self, params: &[&Value], x: &Value) -> Result<f64, DomainError> {
        let rate = positive(param(params, 0)?, "rate")?;
        let k = x.integer()?;
        if k < 0 {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(k as f64 * rate.ln() - rate - ln_gamma(k as f64 + 1.0))
    }

    fn sample(&self, params: &[&Value], rng: &mut dyn RngCore) -> Result<Value, DomainError> {
        let rate = positive(param(params, 0)?, "rate")?;
        let dist = rand_distr::Poisson::new(rate)
            .map_err(|e| DomainError::Undefined(e.to_string()))?;
        let draw: f64 = dist.sample(rng);
        Ok(Value::Integer(draw as i64))
    }

    fn clone_box(&self) -> Box<dyn Distribution> {
        Box::new(*self)
    }
}
