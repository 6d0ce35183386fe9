//! Joint and marginal effects, and noisy summary statistics around them.
//!
//! Sampling error for a block of variants is matrix-normal: rows correlated
//! by the block's LD, columns by the sampling correlation `R`, scaled
//! entrywise by the standard errors. Blocks are independent and each draws
//! from its own seeded stream, so results do not depend on thread count.

use ndarray::{Array2, s};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{ChiSquared, Distribution, StandardNormal};
use statrs::function::erf::erfc;
use tracing::debug;

use crate::dag::TraitDag;
use crate::error::{Result, SimError};
use crate::ld::LdBlockStore;
use crate::matrix::{cholesky_or_eigen, ensure_shape, min_eigenvalue};
use crate::overlap::SampleOverlap;
use crate::parallel::map_items;
use crate::qc::{check_all_in_range, check_equal_length};

#[derive(Debug, Clone)]
pub struct SummaryStats {
    pub beta_hat: Array2<f64>,
    pub se_beta_hat: Array2<f64>,
    pub s_estimate: Option<Array2<f64>>,
}

impl SummaryStats {
    /// Two-sided normal p-values of `beta_hat / se_beta_hat`.
    pub fn pvalues(&self) -> Array2<f64> {
        let mut out = &self.beta_hat / &self.se_beta_hat;
        out.mapv_inplace(|z| erfc(z.abs() / std::f64::consts::SQRT_2));
        out
    }

    /// `(variant, p-value)` pairs for one trait, in variant order.
    pub fn priority(&self, trait_idx: usize) -> Result<Vec<(usize, f64)>> {
        let k = self.beta_hat.ncols();
        if trait_idx >= k {
            return Err(SimError::dimension("trait index", format!("< {k}"), trait_idx));
        }
        let p = self.pvalues();
        Ok(p.column(trait_idx).iter().copied().enumerate().collect())
    }
}

/// `beta_direct · (I + T)`: trait `k`'s direct effect reaches trait `j` with weight `T[k,j]`.
pub fn joint_from_direct(beta_direct: &Array2<f64>, dag: &TraitDag) -> Result<Array2<f64>> {
    check_equal_length(beta_direct.ncols(), dag.n_traits(), "direct effect columns", "traits")?;
    Ok(beta_direct.dot(&dag.propagation()))
}

/// Per block `LD_b · beta_joint[b]`. Without LD the joint effects are returned unchanged.
pub fn marginalize(
    beta_joint: &Array2<f64>,
    store: &LdBlockStore,
    parallel: bool,
) -> Result<Array2<f64>> {
    check_equal_length(beta_joint.nrows(), store.n_variants(), "joint effect rows", "variants")?;
    if !store.has_ld() {
        return Ok(beta_joint.clone());
    }
    let ids: Vec<usize> = (0..store.n_blocks()).collect();
    let blocks = map_items(&ids, parallel, |_, &id| {
        let range = store.block_range(id);
        store.apply_columns(id, &beta_joint.slice(s![range, ..]))
    })?;
    let mut out = Array2::zeros(beta_joint.dim());
    for (id, block) in blocks.into_iter().enumerate() {
        out.slice_mut(s![store.block_range(id), ..]).assign(&block);
    }
    Ok(out)
}

pub fn genetic_covariance(beta_joint: &Array2<f64>, beta_marg: &Array2<f64>) -> Array2<f64> {
    beta_joint.t().dot(beta_marg)
}

/// `1/sqrt(N_k)` per trait, divided by `sqrt(2 af (1 - af))` per variant when
/// allele frequencies are given.
pub fn standard_errors(
    sample_sizes: &[f64],
    af: Option<&[f64]>,
    n_variants: usize,
) -> Result<Array2<f64>> {
    if let Some(af) = af {
        check_equal_length(af.len(), n_variants, "allele frequencies", "variants")?;
        check_all_in_range(af, 0.0, 1.0, true, "af")?;
    }
    let k = sample_sizes.len();
    Ok(Array2::from_shape_fn((n_variants, k), |(j, t)| {
        let var_g = af.map(|a| 2.0 * a[j] * (1.0 - a[j])).unwrap_or(1.0);
        1.0 / (sample_sizes[t] * var_g).sqrt()
    }))
}

/// Draws a `J x K` matrix-normal field with row covariance equal to the
/// block-diagonal LD and column covariance `r`.
pub fn matrix_normal_noise<R: Rng + ?Sized>(
    store: &LdBlockStore,
    r: &Array2<f64>,
    parallel: bool,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let k = r.nrows();
    ensure_shape(&r.view(), k, k, "R")?;
    let min = min_eigenvalue(&r.view())?;
    if min < -crate::matrix::TOL {
        return Err(SimError::NonPositiveDefinite {
            name: "sampling correlation R".to_string(),
            min_eigenvalue: min,
        });
    }
    let l_r = cholesky_or_eigen(&r.view(), "sampling correlation R")?;
    let j = store.n_variants();

    if !store.has_ld() {
        let z: Array2<f64> = Array2::from_shape_simple_fn((j, k), || rng.sample(StandardNormal));
        return Ok(z.dot(&l_r.t()));
    }

    let seeds: Vec<u64> = (0..store.n_blocks()).map(|_| rng.next_u64()).collect();
    let blocks = map_items(&seeds, parallel, |id, &seed| {
        let mut block_rng = StdRng::seed_from_u64(seed);
        let rows = store.block_range(id).len();
        let white = match store.sqrt_factor(id) {
            Some(factor) => {
                let z = standard_normal((factor.ncols(), k), &mut block_rng);
                factor.dot(&z)
            }
            None => standard_normal((rows, k), &mut block_rng),
        };
        Ok(white.dot(&l_r.t()))
    })?;

    let mut out = Array2::zeros((j, k));
    for (id, block) in blocks.into_iter().enumerate() {
        out.slice_mut(s![store.block_range(id), ..]).assign(&block);
    }
    Ok(out)
}

fn standard_normal(shape: (usize, usize), rng: &mut StdRng) -> Array2<f64> {
    Array2::from_shape_simple_fn(shape, || rng.sample(StandardNormal))
}

/// Simulates `beta_hat` around `beta_marg`. `beta_marg` must be on the scale
/// implied by `af`: standardized when `af` is `None`, per allele otherwise.
#[allow(clippy::too_many_arguments)]
pub fn simulate_beta_hat<R: Rng + ?Sized>(
    beta_marg: &Array2<f64>,
    overlap: &SampleOverlap,
    af: Option<&[f64]>,
    store: &LdBlockStore,
    estimate_s: bool,
    parallel: bool,
    rng: &mut R,
) -> Result<SummaryStats> {
    let (j, k) = beta_marg.dim();
    check_equal_length(j, store.n_variants(), "marginal effect rows", "variants")?;
    check_equal_length(k, overlap.r.nrows(), "marginal effect columns", "traits")?;

    let sample_sizes = overlap.sample_sizes();
    let se = standard_errors(&sample_sizes, af, j)?;
    let noise = matrix_normal_noise(store, &overlap.r, parallel, rng)?;
    let beta_hat = beta_marg + &(&noise * &se);

    let s_estimate = if estimate_s {
        Some(estimate_standard_errors(&se, &sample_sizes, rng)?)
    } else {
        None
    };
    debug!("simulated summary statistics for {j} variants and {k} traits");

    Ok(SummaryStats {
        beta_hat,
        se_beta_hat: se,
        s_estimate,
    })
}

/// `se * sqrt(X / (N - 1))` with `X ~ chi-squared(N - 1)`, independently per entry.
pub fn estimate_standard_errors<R: Rng + ?Sized>(
    se: &Array2<f64>,
    sample_sizes: &[f64],
    rng: &mut R,
) -> Result<Array2<f64>> {
    let mut out = se.clone();
    for (t, mut column) in out.columns_mut().into_iter().enumerate() {
        let df = sample_sizes[t] - 1.0;
        if df <= 0.0 {
            return Err(SimError::InvalidArgument(format!(
                "estimating standard errors needs N > 1 for trait {t}"
            )));
        }
        let chi = ChiSquared::new(df).map_err(|e| SimError::Distribution(e.to_string()))?;
        column.mapv_inplace(|s| s * (chi.sample(rng) / df).sqrt());
    }
    Ok(out)
}
