//! Gaussian-emission hidden Markov model over 2-dimensional features,
//! trained with scaled Baum-Welch expectation maximization.
//!
//! Initialization is deterministic for a fixed seed: states start from
//! volatility-quantile groups of the observations with a small seeded
//! jitter to break symmetry, so training is fully reproducible.

use std::f64::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Result};

/// Feature vector: [log return, annualized volatility]
pub(crate) type Obs = [f64; 2];

/// Emission probabilities are floored here to keep the scaled recursions
/// away from exact zeros
const EMISSION_FLOOR: f64 = 1e-300;

/// Diagonal floor applied to every covariance update
const COVAR_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GaussianHmm {
    pub n_states: usize,
    pub start_prob: Vec<f64>,
    /// Row-stochastic transition matrix, `transition[i][j] = P(j | i)`
    pub transition: Vec<Vec<f64>>,
    pub means: Vec<Obs>,
    pub covars: Vec<[[f64; 2]; 2]>,
}

impl GaussianHmm {
    /// Fit by EM until the log-likelihood improves by less than `tolerance`
    /// or `max_iterations` is reached
    pub fn fit(
        observations: &[Obs],
        n_states: usize,
        max_iterations: usize,
        tolerance: f64,
        seed: u64,
    ) -> Result<Self> {
        if observations.len() < n_states * 4 {
            return Err(AnalysisError::InsufficientData {
                need: n_states * 4,
                got: observations.len(),
                unit: "observations",
            });
        }

        let mut model = Self::init(observations, n_states, seed);
        let mut prev_ll = f64::NEG_INFINITY;

        for _ in 0..max_iterations {
            let ll = model.em_step(observations)?;
            if (ll - prev_ll).abs() < tolerance {
                break;
            }
            prev_ll = ll;
        }
        Ok(model)
    }

    /// Quantile-based deterministic initialization: states ordered by the
    /// volatility feature, sticky transitions
    fn init(observations: &[Obs], n_states: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut by_vol: Vec<Obs> = observations.to_vec();
        by_vol.sort_by(|a, b| a[1].total_cmp(&b[1]));

        let group_len = by_vol.len() / n_states;
        let mut means = Vec::with_capacity(n_states);
        let mut covars = Vec::with_capacity(n_states);
        for g in 0..n_states {
            let start = g * group_len;
            let end = if g + 1 == n_states {
                by_vol.len()
            } else {
                start + group_len
            };
            let group = &by_vol[start..end];

            let (mut mean, cov) = moments(group);
            // Symmetry-breaking jitter, small against the feature scale
            mean[0] += rng.gen_range(-1e-6..1e-6);
            mean[1] += rng.gen_range(-1e-6..1e-6);
            means.push(mean);
            covars.push(cov);
        }

        let off = if n_states > 1 {
            0.1 / (n_states - 1) as f64
        } else {
            0.0
        };
        let transition = (0..n_states)
            .map(|i| {
                (0..n_states)
                    .map(|j| if i == j { 0.9 } else { off })
                    .collect()
            })
            .collect();

        Self {
            n_states,
            start_prob: vec![1.0 / n_states as f64; n_states],
            transition,
            means,
            covars,
        }
    }

    /// One full forward-backward pass plus parameter update; returns the
    /// log-likelihood before the update
    fn em_step(&mut self, observations: &[Obs]) -> Result<f64> {
        let (t_len, k) = (observations.len(), self.n_states);
        let emissions = self.emission_matrix(observations)?;
        let (alpha, scales) = self.forward(&emissions)?;
        let beta = self.backward(&emissions, &scales);

        // State occupancy gamma[t][i]
        let mut gamma = vec![vec![0.0; k]; t_len];
        for t in 0..t_len {
            let mut norm = 0.0;
            for i in 0..k {
                gamma[t][i] = alpha[t][i] * beta[t][i];
                norm += gamma[t][i];
            }
            if norm <= 0.0 {
                return Err(AnalysisError::NumericalFitting(
                    "zero state occupancy in em step",
                ));
            }
            for v in gamma[t].iter_mut() {
                *v /= norm;
            }
        }

        // Expected transitions
        let mut xi_sum = vec![vec![0.0; k]; k];
        for t in 0..t_len - 1 {
            let mut norm = 0.0;
            let mut xi = vec![vec![0.0; k]; k];
            for i in 0..k {
                for (j, xi_ij) in xi[i].iter_mut().enumerate() {
                    *xi_ij =
                        alpha[t][i] * self.transition[i][j] * emissions[t + 1][j] * beta[t + 1][j];
                    norm += *xi_ij;
                }
            }
            if norm > 0.0 {
                for i in 0..k {
                    for j in 0..k {
                        xi_sum[i][j] += xi[i][j] / norm;
                    }
                }
            }
        }

        // M step
        self.start_prob = gamma[0].clone();
        for i in 0..k {
            let occupancy: f64 = (0..t_len - 1).map(|t| gamma[t][i]).sum();
            if occupancy > 0.0 {
                for j in 0..k {
                    self.transition[i][j] = xi_sum[i][j] / occupancy;
                }
            }
            normalize_row(&mut self.transition[i]);

            let total: f64 = (0..t_len).map(|t| gamma[t][i]).sum();
            if total <= 0.0 {
                continue;
            }
            let mut mean = [0.0; 2];
            for t in 0..t_len {
                mean[0] += gamma[t][i] * observations[t][0];
                mean[1] += gamma[t][i] * observations[t][1];
            }
            mean[0] /= total;
            mean[1] /= total;

            let mut cov = [[0.0; 2]; 2];
            for t in 0..t_len {
                let dx = observations[t][0] - mean[0];
                let dy = observations[t][1] - mean[1];
                cov[0][0] += gamma[t][i] * dx * dx;
                cov[0][1] += gamma[t][i] * dx * dy;
                cov[1][1] += gamma[t][i] * dy * dy;
            }
            cov[0][0] = (cov[0][0] / total).max(COVAR_FLOOR);
            cov[1][1] = (cov[1][1] / total).max(COVAR_FLOOR);
            cov[0][1] /= total;
            cov[1][0] = cov[0][1];

            self.means[i] = mean;
            self.covars[i] = cov;
        }

        Ok(scales.iter().map(|c| c.ln()).sum())
    }

    /// Per-day posterior state distribution
    pub fn posteriors(&self, observations: &[Obs]) -> Result<Vec<Vec<f64>>> {
        let emissions = self.emission_matrix(observations)?;
        let (alpha, scales) = self.forward(&emissions)?;
        let beta = self.backward(&emissions, &scales);

        let mut post = Vec::with_capacity(observations.len());
        for t in 0..observations.len() {
            let mut row: Vec<f64> = (0..self.n_states)
                .map(|i| alpha[t][i] * beta[t][i])
                .collect();
            let norm: f64 = row.iter().sum();
            if norm <= 0.0 {
                return Err(AnalysisError::NumericalFitting(
                    "zero posterior mass",
                ));
            }
            for v in row.iter_mut() {
                *v /= norm;
            }
            post.push(row);
        }
        Ok(post)
    }

    /// Most likely state path (Viterbi, log space)
    pub fn viterbi(&self, observations: &[Obs]) -> Result<Vec<usize>> {
        let (t_len, k) = (observations.len(), self.n_states);
        if t_len == 0 {
            return Ok(Vec::new());
        }
        let emissions = self.emission_matrix(observations)?;
        let log_trans: Vec<Vec<f64>> = self
            .transition
            .iter()
            .map(|row| row.iter().map(|p| p.max(EMISSION_FLOOR).ln()).collect())
            .collect();

        let mut delta: Vec<f64> = (0..k)
            .map(|i| self.start_prob[i].max(EMISSION_FLOOR).ln() + emissions[0][i].ln())
            .collect();
        let mut backptr = vec![vec![0usize; k]; t_len];

        for t in 1..t_len {
            let mut next = vec![f64::NEG_INFINITY; k];
            for j in 0..k {
                let mut best = f64::NEG_INFINITY;
                let mut arg = 0;
                for i in 0..k {
                    let score = delta[i] + log_trans[i][j];
                    if score > best {
                        best = score;
                        arg = i;
                    }
                }
                next[j] = best + emissions[t][j].ln();
                backptr[t][j] = arg;
            }
            delta = next;
        }

        let mut state = delta
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut path = vec![0usize; t_len];
        path[t_len - 1] = state;
        for t in (1..t_len).rev() {
            state = backptr[t][state];
            path[t - 1] = state;
        }
        Ok(path)
    }

    fn emission_matrix(&self, observations: &[Obs]) -> Result<Vec<Vec<f64>>> {
        let densities: Vec<Gaussian2d> = self
            .covars
            .iter()
            .zip(&self.means)
            .map(|(cov, mean)| Gaussian2d::new(*mean, *cov))
            .collect::<Result<_>>()?;

        Ok(observations
            .iter()
            .map(|obs| {
                densities
                    .iter()
                    .map(|g| g.pdf(obs).max(EMISSION_FLOOR))
                    .collect()
            })
            .collect())
    }

    /// Scaled forward recursion; returns (alpha, per-step scale sums)
    fn forward(&self, emissions: &[Vec<f64>]) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
        let (t_len, k) = (emissions.len(), self.n_states);
        let mut alpha = vec![vec![0.0; k]; t_len];
        let mut scales = vec![0.0; t_len];

        for i in 0..k {
            alpha[0][i] = self.start_prob[i] * emissions[0][i];
        }
        scales[0] = alpha[0].iter().sum();
        if scales[0] <= 0.0 {
            return Err(AnalysisError::NumericalFitting("forward pass underflow"));
        }
        for v in alpha[0].iter_mut() {
            *v /= scales[0];
        }

        for t in 1..t_len {
            for j in 0..k {
                let mut s = 0.0;
                for i in 0..k {
                    s += alpha[t - 1][i] * self.transition[i][j];
                }
                alpha[t][j] = s * emissions[t][j];
            }
            scales[t] = alpha[t].iter().sum();
            if scales[t] <= 0.0 {
                return Err(AnalysisError::NumericalFitting("forward pass underflow"));
            }
            for v in alpha[t].iter_mut() {
                *v /= scales[t];
            }
        }
        Ok((alpha, scales))
    }

    /// Backward recursion using the forward scales
    fn backward(&self, emissions: &[Vec<f64>], scales: &[f64]) -> Vec<Vec<f64>> {
        let (t_len, k) = (emissions.len(), self.n_states);
        let mut beta = vec![vec![0.0; k]; t_len];
        for v in beta[t_len - 1].iter_mut() {
            *v = 1.0;
        }

        for t in (0..t_len - 1).rev() {
            for i in 0..k {
                let mut s = 0.0;
                for j in 0..k {
                    s += self.transition[i][j] * emissions[t + 1][j] * beta[t + 1][j];
                }
                beta[t][i] = s / scales[t + 1];
            }
        }
        beta
    }
}

/// 2D Gaussian density with a precomputed covariance inverse
struct Gaussian2d {
    mean: Obs,
    inv: [[f64; 2]; 2],
    norm: f64,
}

impl Gaussian2d {
    fn new(mean: Obs, cov: [[f64; 2]; 2]) -> Result<Self> {
        let det = cov[0][0] * cov[1][1] - cov[0][1] * cov[1][0];
        if det <= 0.0 || !det.is_finite() {
            return Err(AnalysisError::NumericalFitting(
                "singular emission covariance",
            ));
        }
        let inv = [
            [cov[1][1] / det, -cov[0][1] / det],
            [-cov[1][0] / det, cov[0][0] / det],
        ];
        Ok(Self {
            mean,
            inv,
            norm: 1.0 / (TAU * det.sqrt()),
        })
    }

    fn pdf(&self, x: &Obs) -> f64 {
        let dx = x[0] - self.mean[0];
        let dy = x[1] - self.mean[1];
        let quad = dx * (self.inv[0][0] * dx + self.inv[0][1] * dy)
            + dy * (self.inv[1][0] * dx + self.inv[1][1] * dy);
        self.norm * (-0.5 * quad).exp()
    }
}

/// Sample mean and covariance of a group of observations
fn moments(group: &[Obs]) -> (Obs, [[f64; 2]; 2]) {
    let n = group.len().max(1) as f64;
    let mut mean = [0.0; 2];
    for obs in group {
        mean[0] += obs[0];
        mean[1] += obs[1];
    }
    mean[0] /= n;
    mean[1] /= n;

    let mut cov = [[0.0; 2]; 2];
    for obs in group {
        let dx = obs[0] - mean[0];
        let dy = obs[1] - mean[1];
        cov[0][0] += dx * dx;
        cov[0][1] += dx * dy;
        cov[1][1] += dy * dy;
    }
    cov[0][0] = (cov[0][0] / n).max(COVAR_FLOOR);
    cov[1][1] = (cov[1][1] / n).max(COVAR_FLOOR);
    cov[0][1] /= n;
    cov[1][0] = cov[0][1];
    (mean, cov)
}

fn normalize_row(row: &mut [f64]) {
    let sum: f64 = row.iter().sum();
    if sum > 0.0 {
        for v in row.iter_mut() {
            *v /= sum;
        }
    } else {
        let uniform = 1.0 / row.len() as f64;
        for v in row.iter_mut() {
            *v = uniform;
        }
    }
}
