//! Trait-level causal graph algebra.
//!
//! `g[(i, j)]` is the direct linear effect of trait `i` on trait `j`. Every
//! trait has unit total variance, split into a genetic part propagated through
//! the graph and an environmental remainder.

use std::collections::VecDeque;

use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::Inverse;
use tracing::debug;

use crate::error::{Result, SimError};
use crate::matrix::{
    TOL, ensure_shape, ensure_square, max_asymmetry, max_unit_diagonal_deviation, min_eigenvalue,
};
use crate::qc::{check_all_in_range, check_equal_length};
use crate::types::HeritabilityMode;

#[derive(Debug, Clone)]
pub struct TraitDag {
    pub g: Array2<f64>,
    /// Total effects including every mediated path; `T = (I - G)^-1 - I`.
    pub total_effects: Array2<f64>,
    /// Heritability attributable to each trait's own variant effects.
    pub h2_direct: Array1<f64>,
    pub sigma_g: Array2<f64>,
    pub sigma_e: Array2<f64>,
    pub trait_corr: Array2<f64>,
    pub order: Vec<usize>,
}

impl TraitDag {
    pub fn build(
        g: &Array2<f64>,
        h2: &[f64],
        r_e: &Array2<f64>,
        mode: HeritabilityMode,
    ) -> Result<Self> {
        let k = ensure_square(&g.view(), "G")?;
        check_equal_length(h2.len(), k, "h2", "G")?;
        ensure_shape(&r_e.view(), k, k, "R_E")?;
        check_all_in_range(h2, 0.0, 1.0, false, "h2")?;
        if g.iter().any(|v| !v.is_finite()) {
            return Err(SimError::InvalidArgument("G must be finite".to_string()));
        }

        let order = topological_order(g)?;
        let total_effects = acyclic_total_effects(g)?;
        let r_e = validate_correlation(r_e, "R_E")?;

        let propagation = &total_effects + &Array2::<f64>::eye(k);
        let h2_direct = match mode {
            HeritabilityMode::Direct => Array1::from_vec(h2.to_vec()),
            HeritabilityMode::Total => solve_direct_h2(&propagation, h2, &order)?,
        };

        let sigma_g = genetic_covariance(&propagation, &h2_direct);
        for (i, v) in sigma_g.diag().iter().enumerate() {
            if *v > 1.0 + TOL {
                return Err(SimError::correlation(
                    "Sigma_G",
                    format!("genetic variance of trait {i} is {v:.6}, above 1"),
                ));
            }
        }

        let d = sigma_g.diag().mapv(|v| (1.0 - v).max(0.0).sqrt());
        let sigma_e = &r_e * &d.view().insert_axis(Axis(1)) * &d.view().insert_axis(Axis(0));
        let mut trait_corr = &sigma_g + &sigma_e;
        for i in 0..k {
            trait_corr[(i, i)] = 1.0;
        }

        debug!(
            "trait graph: {k} traits, order {:?}, direct h2 {:?}",
            order,
            h2_direct.to_vec()
        );

        Ok(Self {
            g: g.clone(),
            total_effects,
            h2_direct,
            sigma_g,
            sigma_e,
            trait_corr,
            order,
        })
    }

    pub fn n_traits(&self) -> usize {
        self.g.nrows()
    }

    /// `I + T`: column `j` holds the weight with which each trait's direct
    /// genetic component reaches trait `j`.
    pub fn propagation(&self) -> Array2<f64> {
        &self.total_effects + &Array2::<f64>::eye(self.n_traits())
    }
}

/// Kahn's algorithm over the nonzero entries of `g`; self-loops count as cycles.
pub fn topological_order(g: &Array2<f64>) -> Result<Vec<usize>> {
    let k = ensure_square(&g.view(), "G")?;
    let mut in_degree = vec![0usize; k];
    for i in 0..k {
        for j in 0..k {
            if g[(i, j)] != 0.0 {
                in_degree[j] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..k).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(k);
    while let Some(node) = queue.pop_front() {
        sorted.push(node);
        for j in 0..k {
            if j != node && g[(node, j)] != 0.0 {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    queue.push_back(j);
                }
            }
        }
    }

    if sorted.len() != k {
        let traits = (0..k).filter(|&i| in_degree[i] > 0).collect();
        return Err(SimError::CyclicGraph { traits });
    }
    Ok(sorted)
}

/// Total effects `T` with `T = G + G·T`.
pub fn total_effects(g: &Array2<f64>) -> Result<Array2<f64>> {
    topological_order(g)?;
    acyclic_total_effects(g)
}

/// `g` must already be known to be acyclic.
fn acyclic_total_effects(g: &Array2<f64>) -> Result<Array2<f64>> {
    let eye = Array2::<f64>::eye(g.nrows());
    let inv = (&eye - g).inv()?;
    Ok(inv - eye)
}

fn solve_direct_h2(propagation: &Array2<f64>, h2: &[f64], order: &[usize]) -> Result<Array1<f64>> {
    let mut h2_direct = Array1::<f64>::zeros(h2.len());
    // Ancestors precede `j` in `order`, so their direct terms are final here.
    for &j in order {
        let mediated: f64 = (0..h2.len())
            .filter(|&m| m != j)
            .map(|m| propagation[(m, j)].powi(2) * h2_direct[m])
            .sum();
        let remaining = h2[j] - mediated;
        if remaining < -TOL {
            return Err(SimError::correlation(
                "Sigma_G",
                format!(
                    "heritability of trait {j} ({}) is smaller than the {mediated:.6} mediated by upstream traits",
                    h2[j]
                ),
            ));
        }
        h2_direct[j] = remaining.max(0.0);
    }
    Ok(h2_direct)
}

/// `(I+T)ᵗ · diag(h2_direct) · (I+T)`.
pub fn genetic_covariance(propagation: &Array2<f64>, h2_direct: &Array1<f64>) -> Array2<f64> {
    let weighted = propagation * &h2_direct.view().insert_axis(Axis(1));
    propagation.t().dot(&weighted)
}

/// Checks that `matrix` is a symmetric PSD correlation matrix and returns it
/// with an exact unit diagonal.
pub fn validate_correlation(matrix: &Array2<f64>, name: &str) -> Result<Array2<f64>> {
    let view = matrix.view();
    ensure_square(&view, name)?;
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(SimError::correlation(name, "entries must be finite"));
    }
    let asym = max_asymmetry(&view);
    if asym > TOL {
        return Err(SimError::correlation(
            name,
            format!("not symmetric (max deviation {asym:e})"),
        ));
    }
    let diag_dev = max_unit_diagonal_deviation(&view);
    if diag_dev > TOL {
        return Err(SimError::correlation(
            name,
            format!("diagonal differs from 1 by {diag_dev:e}"),
        ));
    }
    let min = min_eigenvalue(&view)?;
    if min < -TOL {
        return Err(SimError::correlation(
            name,
            format!("not positive semi-definite (minimum eigenvalue {min:e})"),
        ));
    }
    let mut out = matrix.clone();
    out.diag_mut().fill(1.0);
    Ok(out)
}
