//! Expression graph for basic-event probabilities
//!
//! Expressions form an append-only DAG owned by an [`ExpressionPool`]. Each
//! node answers four queries: `mean`, `min`, `max` (deterministic descriptors
//! used for interval propagation) and `sample` (a draw consistent with the
//! node's distribution), plus `validate` for domain checks on parameters.
//!
//! Deterministic nodes cover the standard reliability formulas (exponential,
//! GLM two-state availability, Weibull, periodic test); stochastic deviates
//! (uniform, normal, lognormal) express uncertainty on parameters for Monte
//! Carlo runs. Sampling is single-threaded; a node drawn several times within
//! one sample epoch returns its memoized value, so shared subexpressions stay
//! consistent across one simulation pass.

use indexmap::{IndexMap, IndexSet};
use rand::rngs::StdRng;
use rand_distr::{Distribution, LogNormal, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, AnalysisResult};

/// Handle to a node in an [`ExpressionPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExprId(pub(crate) usize);

/// Periodic-test computation flavor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeriodicTest {
    /// Tests and repairs are instantaneous and always successful
    InstantRepair {
        lambda: ExprId,
        tau: ExprId,
        theta: ExprId,
        time: ExprId,
    },
    /// Tests are instantaneous and always successful, repairs proceed at a
    /// finite hourly rate
    InstantTest {
        lambda: ExprId,
        mu: ExprId,
        tau: ExprId,
        theta: ExprId,
        time: ExprId,
    },
}

/// Expression node kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    /// Constant value
    Const(f64),
    /// Named alias to another node
    Param(ExprId),
    /// Sum of the child values
    Add(Vec<ExprId>),
    /// Product of the child values
    Mul(Vec<ExprId>),
    /// `1 - exp(-lambda * t)` with hourly failure rate and mission time
    Exponential { lambda: ExprId, time: ExprId },
    /// Two-state Markov availability with failure on demand, failure rate,
    /// repair rate, and mission time
    Glm {
        gamma: ExprId,
        lambda: ExprId,
        mu: ExprId,
        time: ExprId,
    },
    /// `1 - exp(-((t - t0) / alpha)^beta)` valid for `t >= t0`
    Weibull {
        alpha: ExprId,
        beta: ExprId,
        t0: ExprId,
        time: ExprId,
    },
    /// Periodically tested component; see [`PeriodicTest`] for the flavors
    PeriodicTest(PeriodicTest),
    /// Uniform deviate over `[lower, upper]`
    UniformDeviate { lower: ExprId, upper: ExprId },
    /// Normal deviate with mean and standard deviation
    NormalDeviate { mean: ExprId, sigma: ExprId },
    /// Lognormal deviate parametrized by median and 95% error factor
    LognormalDeviate { median: ExprId, error_factor: ExprId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExprNode {
    kind: ExprKind,
    /// Memoized sample keyed by the epoch it was drawn in
    cached: Option<(u64, f64)>,
}

/// Arena of expression nodes with optional string registration.
///
/// Children always refer to nodes created earlier, so the graph is acyclic by
/// construction and every query terminates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpressionPool {
    nodes: Vec<ExprNode>,
    ids: IndexMap<String, ExprId>,
    epoch: u64,
    sample_warnings: IndexSet<String>,
}

impl ExpressionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an anonymous node
    pub fn anon(&mut self, kind: ExprKind) -> AnalysisResult<ExprId> {
        self.check_children(&kind)?;
        let id = ExprId(self.nodes.len());
        self.nodes.push(ExprNode { kind, cached: None });
        Ok(id)
    }

    /// Add a node registered under a string identifier.
    /// Redefinition of an identifier is rejected.
    pub fn define(&mut self, id: &str, kind: ExprKind) -> AnalysisResult<ExprId> {
        let key = id.trim().to_lowercase();
        if self.ids.contains_key(&key) {
            return Err(AnalysisError::Validation(format!(
                "Trying to doubly define an expression '{}'.",
                id
            )));
        }
        let handle = self.anon(kind)?;
        self.ids.insert(key, handle);
        Ok(handle)
    }

    /// Shorthand for an anonymous constant
    pub fn constant(&mut self, value: f64) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(ExprNode {
            kind: ExprKind::Const(value),
            cached: None,
        });
        id
    }

    /// Resolve a registered identifier
    pub fn lookup(&self, id: &str) -> Option<ExprId> {
        self.ids.get(&id.trim().to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // Children must already exist in the arena; this is what makes the
    // graph provably acyclic.
    fn check_children(&self, kind: &ExprKind) -> AnalysisResult<()> {
        let ok = self.children_of(kind).iter().all(|c| c.0 < self.nodes.len());
        if ok {
            Ok(())
        } else {
            Err(AnalysisError::Logic(
                "expression child handle does not belong to this pool".into(),
            ))
        }
    }

    fn children_of(&self, kind: &ExprKind) -> Vec<ExprId> {
        match kind {
            ExprKind::Const(_) => vec![],
            ExprKind::Param(t) => vec![*t],
            ExprKind::Add(xs) | ExprKind::Mul(xs) => xs.clone(),
            ExprKind::Exponential { lambda, time } => vec![*lambda, *time],
            ExprKind::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => vec![*gamma, *lambda, *mu, *time],
            ExprKind::Weibull {
                alpha,
                beta,
                t0,
                time,
            } => vec![*alpha, *beta, *t0, *time],
            ExprKind::PeriodicTest(PeriodicTest::InstantRepair {
                lambda,
                tau,
                theta,
                time,
            }) => vec![*lambda, *tau, *theta, *time],
            ExprKind::PeriodicTest(PeriodicTest::InstantTest {
                lambda,
                mu,
                tau,
                theta,
                time,
            }) => vec![*lambda, *mu, *tau, *theta, *time],
            ExprKind::UniformDeviate { lower, upper } => vec![*lower, *upper],
            ExprKind::NormalDeviate { mean, sigma } => vec![*mean, *sigma],
            ExprKind::LognormalDeviate {
                median,
                error_factor,
            } => vec![*median, *error_factor],
        }
    }

    /// Expected value of the node
    pub fn mean(&self, id: ExprId) -> f64 {
        match &self.nodes[id.0].kind {
            ExprKind::Const(c) => *c,
            ExprKind::Param(t) => self.mean(*t),
            ExprKind::Add(xs) => xs.iter().map(|x| self.mean(*x)).sum(),
            ExprKind::Mul(xs) => xs.iter().map(|x| self.mean(*x)).product(),
            ExprKind::Exponential { lambda, time } => {
                1.0 - (-(self.mean(*lambda) * self.mean(*time))).exp()
            }
            ExprKind::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => glm_compute(
                self.mean(*gamma),
                self.mean(*lambda),
                self.mean(*mu),
                self.mean(*time),
            ),
            ExprKind::Weibull {
                alpha,
                beta,
                t0,
                time,
            } => weibull_compute(
                self.mean(*alpha),
                self.mean(*beta),
                self.mean(*t0),
                self.mean(*time),
            ),
            ExprKind::PeriodicTest(flavor) => match flavor {
                PeriodicTest::InstantRepair {
                    lambda,
                    tau,
                    theta,
                    time,
                } => periodic_instant_repair(
                    self.mean(*lambda),
                    self.mean(*tau),
                    self.mean(*theta),
                    self.mean(*time),
                ),
                PeriodicTest::InstantTest {
                    lambda,
                    mu,
                    tau,
                    theta,
                    time,
                } => periodic_instant_test(
                    self.mean(*lambda),
                    self.mean(*mu),
                    self.mean(*tau),
                    self.mean(*theta),
                    self.mean(*time),
                ),
            },
            ExprKind::UniformDeviate { lower, upper } => {
                (self.mean(*lower) + self.mean(*upper)) / 2.0
            }
            ExprKind::NormalDeviate { mean, .. } => self.mean(*mean),
            ExprKind::LognormalDeviate { median, .. } => self.mean(*median),
        }
    }

    /// Lower interval bound of the node
    pub fn min(&self, id: ExprId) -> f64 {
        match &self.nodes[id.0].kind {
            ExprKind::Const(c) => *c,
            ExprKind::Param(t) => self.min(*t),
            ExprKind::Add(xs) => xs.iter().map(|x| self.min(*x)).sum(),
            ExprKind::Mul(xs) => self.mul_interval(xs).0,
            ExprKind::Exponential { lambda, time } => {
                1.0 - (-(self.min(*lambda) * self.min(*time))).exp()
            }
            // Conservative bounds; the availability formula is not monotone
            // in its parameters.
            ExprKind::Glm { .. } => 0.0,
            ExprKind::Weibull {
                alpha,
                beta,
                t0,
                time,
            } => weibull_compute(
                self.max(*alpha),
                self.min(*beta),
                self.max(*t0),
                self.min(*time),
            ),
            ExprKind::PeriodicTest(_) => 0.0,
            ExprKind::UniformDeviate { lower, .. } => self.min(*lower),
            ExprKind::NormalDeviate { mean, sigma } => {
                self.min(*mean) - 6.0 * self.max(*sigma)
            }
            ExprKind::LognormalDeviate { .. } => 0.0,
        }
    }

    /// Upper interval bound of the node
    pub fn max(&self, id: ExprId) -> f64 {
        match &self.nodes[id.0].kind {
            ExprKind::Const(c) => *c,
            ExprKind::Param(t) => self.max(*t),
            ExprKind::Add(xs) => xs.iter().map(|x| self.max(*x)).sum(),
            ExprKind::Mul(xs) => self.mul_interval(xs).1,
            ExprKind::Exponential { lambda, time } => {
                1.0 - (-(self.max(*lambda) * self.max(*time))).exp()
            }
            ExprKind::Glm { .. } => 1.0,
            ExprKind::Weibull {
                alpha,
                beta,
                t0,
                time,
            } => weibull_compute(
                self.min(*alpha),
                self.max(*beta),
                self.min(*t0),
                self.max(*time),
            ),
            ExprKind::PeriodicTest(_) => 1.0,
            ExprKind::UniformDeviate { upper, .. } => self.max(*upper),
            ExprKind::NormalDeviate { mean, sigma } => {
                self.max(*mean) + 6.0 * self.max(*sigma)
            }
            // EF^3 spans the ~5e-7 tail of the lognormal in log space.
            ExprKind::LognormalDeviate {
                median,
                error_factor,
            } => self.max(*median) * self.max(*error_factor).powi(3),
        }
    }

    // Interval product over the children, tracking sign combinations.
    fn mul_interval(&self, xs: &[ExprId]) -> (f64, f64) {
        let mut lo = 1.0_f64;
        let mut hi = 1.0_f64;
        for x in xs {
            let (clo, chi) = (self.min(*x), self.max(*x));
            let candidates = [lo * clo, lo * chi, hi * clo, hi * chi];
            lo = candidates.iter().copied().fold(f64::INFINITY, f64::min);
            hi = candidates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        }
        (lo, hi)
    }

    /// Domain checks on the node's parameters and all of its children.
    ///
    /// Reports [`AnalysisError::Domain`] with a human-readable message on the
    /// first violation found.
    pub fn validate(&self, id: ExprId) -> AnalysisResult<()> {
        for child in self.children_of(&self.nodes[id.0].kind) {
            self.validate(child)?;
        }
        let domain_err = |msg: String| Err(AnalysisError::Domain(msg));
        match &self.nodes[id.0].kind {
            ExprKind::Const(_) | ExprKind::Param(_) | ExprKind::Add(_) | ExprKind::Mul(_) => Ok(()),
            ExprKind::Exponential { lambda, time } => {
                if self.mean(*lambda) < 0.0 || self.min(*lambda) < 0.0 {
                    return domain_err("exponential failure rate cannot be negative".into());
                }
                if self.mean(*time) < 0.0 || self.min(*time) < 0.0 {
                    return domain_err("exponential mission time cannot be negative".into());
                }
                Ok(())
            }
            ExprKind::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => {
                let g = self.mean(*gamma);
                if !(0.0..=1.0).contains(&g) {
                    return domain_err(format!(
                        "GLM probability of failure on demand must be in [0, 1], got {}",
                        g
                    ));
                }
                if self.mean(*lambda) < 0.0 {
                    return domain_err("GLM failure rate cannot be negative".into());
                }
                if self.mean(*mu) < 0.0 {
                    return domain_err("GLM repair rate cannot be negative".into());
                }
                if self.mean(*time) < 0.0 {
                    return domain_err("GLM mission time cannot be negative".into());
                }
                if self.mean(*lambda) + self.mean(*mu) <= 0.0 {
                    return domain_err(
                        "GLM failure and repair rates sum to zero; the availability \
                         denominator vanishes"
                            .into(),
                    );
                }
                Ok(())
            }
            ExprKind::Weibull {
                alpha,
                beta,
                t0,
                time,
            } => {
                if self.mean(*alpha) <= 0.0 || self.min(*alpha) <= 0.0 {
                    return domain_err("Weibull scale parameter must be positive".into());
                }
                if self.mean(*beta) <= 0.0 || self.min(*beta) <= 0.0 {
                    return domain_err("Weibull shape parameter must be positive".into());
                }
                if self.mean(*t0) < 0.0 {
                    return domain_err("Weibull time shift cannot be negative".into());
                }
                if self.mean(*time) < self.mean(*t0) {
                    return domain_err(
                        "Weibull mission time must not precede the time shift".into(),
                    );
                }
                Ok(())
            }
            ExprKind::PeriodicTest(flavor) => {
                let (lambda, mu, tau, theta, time) = match flavor {
                    PeriodicTest::InstantRepair {
                        lambda,
                        tau,
                        theta,
                        time,
                    } => (*lambda, None, *tau, *theta, *time),
                    PeriodicTest::InstantTest {
                        lambda,
                        mu,
                        tau,
                        theta,
                        time,
                    } => (*lambda, Some(*mu), *tau, *theta, *time),
                };
                if self.mean(lambda) < 0.0 {
                    return domain_err("periodic-test failure rate cannot be negative".into());
                }
                if self.mean(tau) <= 0.0 {
                    return domain_err("periodic-test interval must be positive".into());
                }
                if self.mean(theta) < 0.0 {
                    return domain_err(
                        "periodic-test time before the first test cannot be negative".into(),
                    );
                }
                if self.mean(time) < 0.0 {
                    return domain_err("periodic-test mission time cannot be negative".into());
                }
                if let Some(mu) = mu {
                    if self.mean(mu) < 0.0 {
                        return domain_err("periodic-test repair rate cannot be negative".into());
                    }
                }
                Ok(())
            }
            ExprKind::UniformDeviate { lower, upper } => {
                if self.mean(*lower) >= self.mean(*upper) {
                    return domain_err(
                        "uniform deviate lower bound must be below the upper bound".into(),
                    );
                }
                Ok(())
            }
            ExprKind::NormalDeviate { sigma, .. } => {
                if self.mean(*sigma) <= 0.0 {
                    return domain_err(
                        "normal deviate standard deviation must be positive".into(),
                    );
                }
                Ok(())
            }
            ExprKind::LognormalDeviate {
                median,
                error_factor,
            } => {
                if self.mean(*median) <= 0.0 {
                    return domain_err("lognormal deviate median must be positive".into());
                }
                if self.mean(*error_factor) <= 1.0 {
                    return domain_err(
                        "lognormal deviate error factor must be greater than 1".into(),
                    );
                }
                Ok(())
            }
        }
    }

    /// Start a new sample epoch; memoized draws from the previous epoch are
    /// invalidated
    pub fn advance_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Draw a value consistent with the node's distribution.
    ///
    /// Deterministic nodes evaluate over their children's samples. The draw is
    /// memoized for the current epoch, so a shared node keeps one value per
    /// simulation pass. Parameters sampled outside their domain are clamped
    /// and a warning is recorded, never an abort mid-run.
    pub fn sample(&mut self, id: ExprId, rng: &mut StdRng) -> f64 {
        if let Some((epoch, value)) = self.nodes[id.0].cached {
            if epoch == self.epoch {
                return value;
            }
        }
        let kind = self.nodes[id.0].kind.clone();
        let value = match kind {
            ExprKind::Const(c) => c,
            ExprKind::Param(t) => self.sample(t, rng),
            ExprKind::Add(xs) => xs.iter().map(|x| self.sample(*x, rng)).sum(),
            ExprKind::Mul(xs) => xs.iter().map(|x| self.sample(*x, rng)).product(),
            ExprKind::Exponential { lambda, time } => {
                let l = self.sample_nonneg(lambda, rng, "exponential failure rate");
                let t = self.sample_nonneg(time, rng, "exponential mission time");
                1.0 - (-(l * t)).exp()
            }
            ExprKind::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => {
                let g = self.sample(gamma, rng).clamp(0.0, 1.0);
                let l = self.sample_nonneg(lambda, rng, "GLM failure rate");
                let m = self.sample_nonneg(mu, rng, "GLM repair rate");
                let t = self.sample_nonneg(time, rng, "GLM mission time");
                glm_compute(g, l, m, t)
            }
            ExprKind::Weibull {
                alpha,
                beta,
                t0,
                time,
            } => {
                let a = self.sample_positive(alpha, rng, "Weibull scale");
                let b = self.sample_positive(beta, rng, "Weibull shape");
                let shift = self.sample_nonneg(t0, rng, "Weibull time shift");
                let t = self.sample_nonneg(time, rng, "Weibull mission time");
                weibull_compute(a, b, shift, t)
            }
            ExprKind::PeriodicTest(flavor) => match flavor {
                PeriodicTest::InstantRepair {
                    lambda,
                    tau,
                    theta,
                    time,
                } => {
                    let l = self.sample_nonneg(lambda, rng, "periodic-test failure rate");
                    let ta = self.sample_positive(tau, rng, "periodic-test interval");
                    let th = self.sample_nonneg(theta, rng, "periodic-test first-test time");
                    let t = self.sample_nonneg(time, rng, "periodic-test mission time");
                    periodic_instant_repair(l, ta, th, t)
                }
                PeriodicTest::InstantTest {
                    lambda,
                    mu,
                    tau,
                    theta,
                    time,
                } => {
                    let l = self.sample_nonneg(lambda, rng, "periodic-test failure rate");
                    let m = self.sample_nonneg(mu, rng, "periodic-test repair rate");
                    let ta = self.sample_positive(tau, rng, "periodic-test interval");
                    let th = self.sample_nonneg(theta, rng, "periodic-test first-test time");
                    let t = self.sample_nonneg(time, rng, "periodic-test mission time");
                    periodic_instant_test(l, m, ta, th, t)
                }
            },
            ExprKind::UniformDeviate { lower, upper } => {
                let lo = self.sample(lower, rng);
                let hi = self.sample(upper, rng);
                if hi > lo {
                    Uniform::new_inclusive(lo, hi).sample(rng)
                } else {
                    self.warn("uniform deviate sampled an empty interval; using lower bound");
                    lo
                }
            }
            ExprKind::NormalDeviate { mean, sigma } => {
                let m = self.sample(mean, rng);
                let s = self.sample(sigma, rng);
                match Normal::new(m, s.max(0.0)) {
                    Ok(dist) => dist.sample(rng),
                    Err(_) => {
                        self.warn("normal deviate sampled an invalid deviation; using the mean");
                        m
                    }
                }
            }
            ExprKind::LognormalDeviate {
                median,
                error_factor,
            } => {
                let med = self.sample(median, rng).max(f64::MIN_POSITIVE);
                let ef = self.sample(error_factor, rng).max(1.0 + 1e-9);
                // Error factor at 90% two-sided confidence: sigma = ln(EF) / 1.645
                let sigma = ef.ln() / 1.645;
                match LogNormal::new(med.ln(), sigma) {
                    Ok(dist) => dist.sample(rng),
                    Err(_) => {
                        self.warn("lognormal deviate sampled invalid parameters; using the median");
                        med
                    }
                }
            }
        };
        self.nodes[id.0].cached = Some((self.epoch, value));
        value
    }

    fn sample_nonneg(&mut self, id: ExprId, rng: &mut StdRng, what: &str) -> f64 {
        let value = self.sample(id, rng);
        if value < 0.0 {
            self.warn(&format!("{} sampled negative; clamped to zero", what));
            0.0
        } else {
            value
        }
    }

    fn sample_positive(&mut self, id: ExprId, rng: &mut StdRng, what: &str) -> f64 {
        let value = self.sample(id, rng);
        if value <= 0.0 {
            self.warn(&format!("{} sampled non-positive; clamped to the domain", what));
            f64::MIN_POSITIVE
        } else {
            value
        }
    }

    fn warn(&mut self, msg: &str) {
        self.sample_warnings.insert(msg.to_string());
    }

    /// Drain warnings recorded by out-of-domain draws
    pub fn take_sample_warnings(&mut self) -> Vec<String> {
        self.sample_warnings.drain(..).collect()
    }
}

/// Two-state Markov availability.
fn glm_compute(gamma: f64, lambda: f64, mu: f64, time: f64) -> f64 {
    let rate = lambda + mu;
    if rate <= 0.0 {
        return gamma;
    }
    let limit = lambda / rate;
    limit + (gamma - limit) * (-rate * time).exp()
}

fn weibull_compute(alpha: f64, beta: f64, t0: f64, time: f64) -> f64 {
    if time <= t0 {
        return 0.0;
    }
    1.0 - (-((time - t0) / alpha).powf(beta)).exp()
}

/// Unavailability of a component renewed at every test instant.
///
/// Test instants themselves report the exposure accumulated over the full
/// interval (left-continuous), matching the `time <= theta` boundary and
/// the cycle handling in [`periodic_instant_test`].
fn periodic_instant_repair(lambda: f64, tau: f64, theta: f64, time: f64) -> f64 {
    let since_renewal = if time <= theta {
        time
    } else {
        let offset = (time - theta) % tau;
        if offset == 0.0 {
            tau
        } else {
            offset
        }
    };
    1.0 - (-lambda * since_renewal).exp()
}

/// Unavailability when tests reveal latent failures and repair proceeds at
/// rate `mu`. Failures stay latent until the next test; detected failures
/// are repaired exponentially and the repaired component can fail again.
fn periodic_instant_test(lambda: f64, mu: f64, tau: f64, theta: f64, time: f64) -> f64 {
    if time <= theta {
        return 1.0 - (-lambda * time).exp();
    }
    // State at the first test: everything failed so far becomes detected.
    let mut up = (-lambda * theta).exp();
    let mut repairing = 1.0 - up;
    let mut remaining = time - theta;
    loop {
        if remaining <= tau {
            let (u, _r) = periodic_cycle_step(up, repairing, lambda, mu, remaining);
            return (1.0 - u).clamp(0.0, 1.0);
        }
        let (u, r) = periodic_cycle_step(up, repairing, lambda, mu, tau);
        let latent = (1.0 - u - r).max(0.0);
        // Steady state reached: only the offset within the final cycle matters.
        if (u - up).abs() < 1e-12 && (r + latent - repairing).abs() < 1e-12 {
            remaining = remaining % tau;
            if remaining == 0.0 {
                remaining = tau;
            }
            let (u, _r) = periodic_cycle_step(up, repairing, lambda, mu, remaining);
            return (1.0 - u).clamp(0.0, 1.0);
        }
        up = u;
        repairing = r + latent;
        remaining -= tau;
    }
}

// Evolves (up, repairing) over `s` hours of one test cycle: detected failures
// repair at rate mu and rejoin the up pool, up components fail latently at
// rate lambda.
fn periodic_cycle_step(u0: f64, r0: f64, lambda: f64, mu: f64, s: f64) -> (f64, f64) {
    let r = r0 * (-mu * s).exp();
    let u = if (lambda - mu).abs() < 1e-12 {
        u0 * (-lambda * s).exp() + r0 * mu * s * (-lambda * s).exp()
    } else {
        u0 * (-lambda * s).exp()
            + r0 * mu / (lambda - mu) * ((-mu * s).exp() - (-lambda * s).exp())
    };
    (u, r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn pool_with(kind: impl FnOnce(&mut ExpressionPool) -> ExprKind) -> (ExpressionPool, ExprId) {
        let mut pool = ExpressionPool::new();
        let kind = kind(&mut pool);
        let id = pool.anon(kind).unwrap();
        (pool, id)
    }

    #[test]
    fn test_constant_queries() {
        let mut pool = ExpressionPool::new();
        let c = pool.constant(0.25);
        assert_eq!(pool.mean(c), 0.25);
        assert_eq!(pool.min(c), 0.25);
        assert_eq!(pool.max(c), 0.25);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pool.sample(c, &mut rng), 0.25);
    }

    #[test]
    fn test_exponential_mean() {
        let (pool, id) = pool_with(|p| {
            let lambda = p.constant(1e-3);
            let time = p.constant(1000.0);
            ExprKind::Exponential { lambda, time }
        });
        let expected = 1.0 - (-1.0_f64).exp();
        assert!((pool.mean(id) - expected).abs() < 1e-9);
        assert!(pool.validate(id).is_ok());
    }

    #[test]
    fn test_exponential_rejects_negative_rate() {
        let (pool, id) = pool_with(|p| {
            let lambda = p.constant(-0.5);
            let time = p.constant(10.0);
            ExprKind::Exponential { lambda, time }
        });
        let err = pool.validate(id).unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn test_exponential_overflow_saturates() {
        let (pool, id) = pool_with(|p| {
            let lambda = p.constant(1e6);
            let time = p.constant(1e6);
            ExprKind::Exponential { lambda, time }
        });
        assert_eq!(pool.mean(id), 1.0);
    }

    #[test]
    fn test_weibull_interval_ordering() {
        let (pool, id) = pool_with(|p| {
            let lower = p.constant(800.0);
            let upper = p.constant(1200.0);
            let alpha = p.anon(ExprKind::UniformDeviate { lower, upper }).unwrap();
            let beta = p.constant(1.5);
            let t0 = p.constant(0.0);
            let time = p.constant(500.0);
            ExprKind::Weibull {
                alpha,
                beta,
                t0,
                time,
            }
        });
        assert!(pool.validate(id).is_ok());
        let (min, mean, max) = (pool.min(id), pool.mean(id), pool.max(id));
        assert!(min <= mean && mean <= max);
        assert!(min >= 0.0 && max <= 1.0);
    }

    #[test]
    fn test_weibull_before_shift_is_zero() {
        assert_eq!(weibull_compute(100.0, 2.0, 50.0, 10.0), 0.0);
    }

    #[test]
    fn test_glm_bounds_and_limit() {
        let (pool, id) = pool_with(|p| {
            let gamma = p.constant(0.0);
            let lambda = p.constant(1e-2);
            let mu = p.constant(1e-1);
            let time = p.constant(1e9);
            ExprKind::Glm {
                gamma,
                lambda,
                mu,
                time,
            }
        });
        assert!(pool.validate(id).is_ok());
        assert_eq!(pool.min(id), 0.0);
        assert_eq!(pool.max(id), 1.0);
        // Long-run unavailability tends to lambda / (lambda + mu).
        assert!((pool.mean(id) - 1e-2 / 1.1e-1).abs() < 1e-9);
    }

    #[test]
    fn test_glm_zero_denominator_rejected() {
        let (pool, id) = pool_with(|p| {
            let gamma = p.constant(0.1);
            let lambda = p.constant(0.0);
            let mu = p.constant(0.0);
            let time = p.constant(10.0);
            ExprKind::Glm {
                gamma,
                lambda,
                mu,
                time,
            }
        });
        assert!(matches!(
            pool.validate(id),
            Err(crate::AnalysisError::Domain(_))
        ));
    }

    #[test]
    fn test_periodic_instant_repair_renewal() {
        // Before the first test the component behaves exponentially.
        let early = periodic_instant_repair(1e-3, 100.0, 500.0, 400.0);
        assert!((early - (1.0 - (-0.4_f64).exp())).abs() < 1e-12);
        // A test instant reports the full interval of exposure.
        let at_test = periodic_instant_repair(1e-3, 100.0, 500.0, 600.0);
        assert!((at_test - (1.0 - (-0.1_f64).exp())).abs() < 1e-12);
        // Within a cycle only the time since the last renewal counts.
        let mid_cycle = periodic_instant_repair(1e-3, 100.0, 500.0, 650.0);
        assert!((mid_cycle - (1.0 - (-0.05_f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_periodic_instant_test_bounded() {
        let q = periodic_instant_test(1e-3, 1e-1, 100.0, 100.0, 5000.0);
        assert!((0.0..=1.0).contains(&q));
        // With repair, long-run unavailability stays below the no-repair case.
        let no_repair = periodic_instant_test(1e-3, 0.0, 100.0, 100.0, 5000.0);
        assert!(q <= no_repair);
    }

    #[test]
    fn test_sample_epoch_memoization() {
        let (mut pool, id) = pool_with(|p| {
            let lower = p.constant(0.0);
            let upper = p.constant(1.0);
            ExprKind::UniformDeviate { lower, upper }
        });
        let mut rng = StdRng::seed_from_u64(7);
        let first = pool.sample(id, &mut rng);
        // Same epoch: the memoized draw is returned.
        assert_eq!(pool.sample(id, &mut rng), first);
        pool.advance_epoch();
        let second = pool.sample(id, &mut rng);
        assert_ne!(first, second);
    }

    #[test]
    fn test_samples_within_interval() {
        let (mut pool, id) = pool_with(|p| {
            let mean = p.constant(0.5);
            let sigma = p.constant(0.05);
            ExprKind::NormalDeviate { mean, sigma }
        });
        let (lo, mean, hi) = (pool.min(id), pool.mean(id), pool.max(id));
        assert!(lo <= mean && mean <= hi);
        let n = 10_000usize;
        let mut rng = StdRng::seed_from_u64(11);
        let inside = (0..n)
            .filter(|_| {
                pool.advance_epoch();
                let s = pool.sample(id, &mut rng);
                s >= lo - 1e-9 && s <= hi + 1e-9
            })
            .count();
        // The descriptor interval spans six standard deviations; draws
        // outside it are vanishingly rare but not impossible, so the
        // contract is a coverage fraction, not every single draw.
        assert!(inside as f64 / n as f64 > 0.999);
    }

    #[test]
    fn test_negative_sampled_rate_clamps_with_warning() {
        let (mut pool, id) = pool_with(|p| {
            // A normal deviate wide enough to go negative.
            let mean = p.constant(1e-3);
            let sigma = p.constant(1.0);
            let lambda = p
                .anon(ExprKind::NormalDeviate { mean, sigma })
                .unwrap();
            let time = p.constant(100.0);
            ExprKind::Exponential { lambda, time }
        });
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            pool.advance_epoch();
            let q = pool.sample(id, &mut rng);
            assert!((0.0..=1.0).contains(&q));
        }
        assert!(!pool.take_sample_warnings().is_empty());
    }

    #[test]
    fn test_redefinition_rejected() {
        let mut pool = ExpressionPool::new();
        pool.define("p-pump", ExprKind::Const(0.1)).unwrap();
        let err = pool.define("P-Pump", ExprKind::Const(0.2)).unwrap_err();
        assert!(err.to_string().contains("doubly define"));
        assert!(pool.lookup("p-pump").is_some());
    }

    #[test]
    fn test_add_mul_composition() {
        let mut pool = ExpressionPool::new();
        let a = pool.constant(0.1);
        let b = pool.constant(0.2);
        let sum = pool.anon(ExprKind::Add(vec![a, b])).unwrap();
        let product = pool.anon(ExprKind::Mul(vec![sum, b])).unwrap();
        assert!((pool.mean(sum) - 0.3).abs() < 1e-12);
        assert!((pool.mean(product) - 0.06).abs() < 1e-12);
    }
}
