//! Skill ratings and the rating-engine contract.
//!
//! The gather core only depends on the [`RatingEngine`] trait: create a
//! default belief, update beliefs from a two-team outcome, score the balance
//! of a proposed split, and estimate win probability. [`GaussianSkill`] is
//! the default implementation: a two-team Gaussian skill model on a 0–100
//! scale. Alternative engines plug in behind the trait.

use serde::{Deserialize, Serialize};

/// Gaussian belief over a player's skill: `mu` is the mean estimate, `sigma`
/// the uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub mu: f64,
    pub sigma: f64,
}

impl Rating {
    pub fn new(mu: f64, sigma: f64) -> Self {
        Self { mu, sigma }
    }
}

/// Relative placement of the two teams after a round. Lower is better;
/// equal ranks mean a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamRanks {
    pub blue: u8,
    pub red: u8,
}

impl TeamRanks {
    /// Blue ranked above red.
    pub const BLUE_WIN: TeamRanks = TeamRanks { blue: 0, red: 1 };
    /// Red ranked above blue.
    pub const RED_WIN: TeamRanks = TeamRanks { blue: 1, red: 0 };
    /// Equal ranks.
    pub const DRAW: TeamRanks = TeamRanks { blue: 0, red: 0 };

    pub fn is_draw(self) -> bool {
        self.blue == self.red
    }
}

/// Contract between the gather core and the skill-rating mathematics.
pub trait RatingEngine: Send + Sync {
    /// Default belief for a player never seen before.
    fn create(&self) -> Rating;

    /// Posterior ratings for both teams after one round.
    fn rate(&self, blue: &[Rating], red: &[Rating], ranks: TeamRanks) -> (Vec<Rating>, Vec<Rating>);

    /// Probability-like score that the split would end balanced; higher is
    /// more even. Symmetric in its arguments.
    fn quality(&self, blue: &[Rating], red: &[Rating]) -> f64;

    /// Probability that team `a` beats team `b`. Advisory only: never the
    /// authority for recorded outcomes.
    fn win_probability(&self, a: &[Rating], b: &[Rating]) -> f64;
}

/// Two-team Gaussian skill model.
///
/// Skill lives on a 0–100 scale: new players start at `mu0 = 50` with
/// `sigma0 = mu0 / 3`; `beta = sigma0 / 2` is the per-player performance
/// variance. `draw_probability` widens the margin inside which a round is
/// expected to tie.
#[derive(Debug, Clone)]
pub struct GaussianSkill {
    pub mu0: f64,
    pub sigma0: f64,
    pub beta: f64,
    pub draw_probability: f64,
}

impl Default for GaussianSkill {
    fn default() -> Self {
        let mu0 = 50.0;
        let sigma0 = mu0 / 3.0;
        Self { mu0, sigma0, beta: sigma0 / 2.0, draw_probability: 0.10 }
    }
}

impl GaussianSkill {
    /// Combined variance of a two-team pairing: `n * beta^2` performance
    /// noise plus every participant's skill uncertainty.
    fn c_squared(&self, blue: &[Rating], red: &[Rating]) -> f64 {
        let n = (blue.len() + red.len()) as f64;
        let sigma_sq: f64 =
            blue.iter().chain(red.iter()).map(|r| r.sigma * r.sigma).sum();
        n * self.beta * self.beta + sigma_sq
    }

    /// Draw margin for `n` total players, solved from the configured draw
    /// probability by bisection on the normal CDF.
    fn draw_margin(&self, n: usize) -> f64 {
        let target = (self.draw_probability + 1.0) / 2.0;
        let scale = (n as f64).sqrt() * self.beta;
        // Phi is monotone; the margin for any sane draw probability lies
        // well inside [0, 10] standard deviations.
        let mut lo = 0.0_f64;
        let mut hi = 10.0_f64;
        for _ in 0..80 {
            let mid = (lo + hi) / 2.0;
            if normal_cdf(mid) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        (lo + hi) / 2.0 * scale
    }
}

impl RatingEngine for GaussianSkill {
    fn create(&self) -> Rating {
        Rating::new(self.mu0, self.sigma0)
    }

    fn rate(&self, blue: &[Rating], red: &[Rating], ranks: TeamRanks) -> (Vec<Rating>, Vec<Rating>) {
        let n = blue.len() + red.len();
        let c2 = self.c_squared(blue, red);
        let c = c2.sqrt();
        let eps = self.draw_margin(n) / c;

        let mu_blue: f64 = blue.iter().map(|r| r.mu).sum();
        let mu_red: f64 = red.iter().map(|r| r.mu).sum();

        // Signed performance gap from blue's perspective, in units of c.
        let t = (mu_blue - mu_red) / c;

        let (v_blue, w) = if ranks.is_draw() {
            (v_within_margin(t, eps), w_within_margin(t, eps))
        } else if ranks.blue < ranks.red {
            (v_exceeds_margin(t, eps), w_exceeds_margin(t, eps))
        } else {
            // Red won: evaluate from red's perspective and negate.
            (-v_exceeds_margin(-t, eps), w_exceeds_margin(-t, eps))
        };

        let update_team = |team: &[Rating], v: f64| -> Vec<Rating> {
            team.iter()
                .map(|r| {
                    let sigma_sq = r.sigma * r.sigma;
                    let mu = r.mu + sigma_sq / c * v;
                    let sigma_sq = sigma_sq * (1.0 - sigma_sq / c2 * w).max(1e-6);
                    Rating::new(mu, sigma_sq.sqrt())
                })
                .collect()
        };

        (update_team(blue, v_blue), update_team(red, -v_blue))
    }

    fn quality(&self, blue: &[Rating], red: &[Rating]) -> f64 {
        let n = (blue.len() + red.len()) as f64;
        let c2 = self.c_squared(blue, red);
        let mu_blue: f64 = blue.iter().map(|r| r.mu).sum();
        let mu_red: f64 = red.iter().map(|r| r.mu).sum();
        let delta = mu_blue - mu_red;
        let perf = n * self.beta * self.beta;
        (perf / c2).sqrt() * (-delta * delta / (2.0 * c2)).exp()
    }

    fn win_probability(&self, a: &[Rating], b: &[Rating]) -> f64 {
        let c = self.c_squared(a, b).sqrt();
        let mu_a: f64 = a.iter().map(|r| r.mu).sum();
        let mu_b: f64 = b.iter().map(|r| r.mu).sum();
        normal_cdf((mu_a - mu_b) / c)
    }
}

/// Mean shift for a decisive outcome: `N(t - eps) / Phi(t - eps)`.
fn v_exceeds_margin(t: f64, eps: f64) -> f64 {
    let x = t - eps;
    let denom = normal_cdf(x);
    if denom < 1e-12 {
        // Deep in the tail the ratio degenerates to -x.
        return -x;
    }
    normal_pdf(x) / denom
}

/// Variance multiplier for a decisive outcome.
fn w_exceeds_margin(t: f64, eps: f64) -> f64 {
    let v = v_exceeds_margin(t, eps);
    v * (v + t - eps)
}

/// Mean shift for a draw, signed toward the weaker side.
fn v_within_margin(t: f64, eps: f64) -> f64 {
    let denom = normal_cdf(eps - t) - normal_cdf(-eps - t);
    if denom < 1e-12 {
        return -t;
    }
    (normal_pdf(-eps - t) - normal_pdf(eps - t)) / denom
}

/// Variance multiplier for a draw.
fn w_within_margin(t: f64, eps: f64) -> f64 {
    let denom = normal_cdf(eps - t) - normal_cdf(-eps - t);
    if denom < 1e-12 {
        return 1.0;
    }
    let v = v_within_margin(t, eps);
    v * v + ((eps - t) * normal_pdf(eps - t) + (eps + t) * normal_pdf(eps + t)) / denom
}

fn normal_pdf(x: f64) -> f64 {
    (-x * x / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26 rational approximation, max error ~1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}
