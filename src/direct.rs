//! Sparse per-variant direct effects on each trait.

use ndarray::Array2;
use rand::Rng;
use rand::seq::SliceRandom;
use rand::seq::index::sample as sample_indices;
use rand_distr::{Distribution, Normal};
use tracing::{debug, warn};

use crate::error::{Result, SimError};
use crate::qc::{check_all_in_range, check_equal_length};

#[derive(Debug, Clone)]
pub struct DirectEffectConfig {
    pub n_variants: usize,
    /// Expected proportion of variants with a nonzero effect, per trait.
    pub pi: Vec<f64>,
    pub h2: Vec<f64>,
    pub sporadic_pleiotropy: bool,
    /// Use exactly `round(pi * J)` nonzero effects instead of an expected count.
    pub pi_exact: bool,
    /// Rescale so each column's sum of squares equals `h2` exactly.
    pub h2_exact: bool,
}

/// Number of nonzero effects each trait receives when `pi_exact` is set.
pub fn exact_counts(pi: &[f64], n_variants: usize) -> Vec<usize> {
    pi.iter()
        .map(|p| (p * n_variants as f64).round() as usize)
        .collect()
}

pub fn generate_direct_effects<R: Rng + ?Sized>(
    config: &DirectEffectConfig,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let j = config.n_variants;
    let k = config.pi.len();
    check_equal_length(config.h2.len(), k, "h2", "pi")?;
    check_all_in_range(&config.pi, 0.0, 1.0, false, "pi")?;
    check_all_in_range(&config.h2, 0.0, 1.0, false, "h2")?;
    if j == 0 {
        return Err(SimError::InvalidArgument(
            "number of variants must be positive".to_string(),
        ));
    }

    let supports = if config.sporadic_pleiotropy {
        pleiotropic_supports(config, rng)
    } else {
        disjoint_supports(config, rng)?
    };

    let mut beta = Array2::<f64>::zeros((j, k));
    for (trait_idx, support) in supports.iter().enumerate() {
        let h2 = config.h2[trait_idx];
        if support.is_empty() || h2 == 0.0 {
            if h2 > 0.0 {
                warn!("trait {trait_idx} received no nonzero direct effects; its direct heritability is 0");
            }
            continue;
        }
        let sd = (h2 / (config.pi[trait_idx] * j as f64)).sqrt();
        let normal = Normal::new(0.0, sd).map_err(|e| SimError::Distribution(e.to_string()))?;
        let mut column = beta.column_mut(trait_idx);
        for &v in support {
            column[v] = normal.sample(rng);
        }

        let realized: f64 = column.iter().map(|b| b * b).sum();
        if config.h2_exact && realized > 0.0 {
            let scale = (h2 / realized).sqrt();
            column.mapv_inplace(|b| b * scale);
        }
        debug!(
            "trait {trait_idx}: {} nonzero direct effects, sum of squares {:.6}",
            support.len(),
            column.iter().map(|b| b * b).sum::<f64>()
        );
    }
    Ok(beta)
}

fn pleiotropic_supports<R: Rng + ?Sized>(
    config: &DirectEffectConfig,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    let j = config.n_variants;
    if config.pi_exact {
        exact_counts(&config.pi, j)
            .into_iter()
            .map(|count| {
                let mut idx = sample_indices(rng, j, count.min(j)).into_vec();
                idx.sort_unstable();
                idx
            })
            .collect()
    } else {
        config
            .pi
            .iter()
            .map(|&p| (0..j).filter(|_| rng.random_bool(p)).collect())
            .collect()
    }
}

fn disjoint_supports<R: Rng + ?Sized>(
    config: &DirectEffectConfig,
    rng: &mut R,
) -> Result<Vec<Vec<usize>>> {
    let j = config.n_variants;
    let counts = exact_counts(&config.pi, j);
    let required: usize = counts.iter().sum();
    if required > j {
        return Err(SimError::InsufficientVariants {
            required,
            available: j,
        });
    }

    if config.pi_exact {
        let mut order: Vec<usize> = (0..j).collect();
        order.shuffle(rng);
        let mut supports = Vec::with_capacity(counts.len());
        let mut start = 0;
        for count in counts {
            let mut idx = order[start..start + count].to_vec();
            idx.sort_unstable();
            supports.push(idx);
            start += count;
        }
        return Ok(supports);
    }

    // Each variant joins at most one trait, trait k with probability pi_k.
    let total_pi: f64 = config.pi.iter().sum();
    if total_pi > 1.0 + 1e-12 {
        return Err(SimError::InvalidArgument(format!(
            "sum of pi ({total_pi}) must be <= 1 without sporadic pleiotropy"
        )));
    }
    let mut supports = vec![Vec::new(); config.pi.len()];
    for v in 0..j {
        let u: f64 = rng.random_range(0.0..1.0);
        let mut acc = 0.0;
        for (trait_idx, p) in config.pi.iter().enumerate() {
            acc += p;
            if u < acc {
                supports[trait_idx].push(v);
                break;
            }
        }
    }
    Ok(supports)
}

pub fn sum_of_squares(beta: &Array2<f64>) -> Vec<f64> {
    beta.columns()
        .into_iter()
        .map(|c| c.iter().map(|b| b * b).sum())
        .collect()
}

pub fn nonzero_counts(beta: &Array2<f64>) -> Vec<usize> {
    beta.columns()
        .into_iter()
        .map(|c| c.iter().filter(|b| **b != 0.0).count())
        .collect()
}
