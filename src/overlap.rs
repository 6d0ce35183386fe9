use ndarray::Array2;

use crate::error::{Result, SimError};
use crate::matrix::{ensure_shape, max_asymmetry, to_array2};
use crate::qc::{check_equal_length, check_range_f64};
use crate::types::NInput;

#[derive(Debug, Clone)]
pub struct SampleOverlap {
    /// Diagonal: sample size of each GWAS; off-diagonal: individuals shared by two GWAS.
    pub n: Array2<f64>,
    /// Correlation of sampling errors across traits for a single variant.
    pub r: Array2<f64>,
}

impl SampleOverlap {
    pub fn new(n: Array2<f64>, trait_corr: &Array2<f64>) -> Result<Self> {
        let k = trait_corr.nrows();
        ensure_shape(&n.view(), k, k, "N")?;
        validate_n_matrix(&n)?;
        let r = sampling_correlation(&n, trait_corr);
        Ok(Self { n, r })
    }

    pub fn from_input(input: &NInput, trait_corr: &Array2<f64>) -> Result<Self> {
        let n = build_n_matrix(input, trait_corr.nrows())?;
        Self::new(n, trait_corr)
    }

    pub fn sample_sizes(&self) -> Vec<f64> {
        self.n.diag().to_vec()
    }

    pub fn has_overlap(&self) -> bool {
        let k = self.n.nrows();
        (0..k).any(|i| (0..k).any(|j| i != j && self.n[(i, j)] > 0.0))
    }
}

/// `R[i,j] = N[i,j] / sqrt(N[i,i] N[j,j]) * trait_corr[i,j]`, unit diagonal.
pub fn sampling_correlation(n: &Array2<f64>, trait_corr: &Array2<f64>) -> Array2<f64> {
    let k = n.nrows();
    Array2::from_shape_fn((k, k), |(i, j)| {
        if i == j {
            1.0
        } else {
            n[(i, j)] / (n[(i, i)] * n[(j, j)]).sqrt() * trait_corr[(i, j)]
        }
    })
}

pub fn build_n_matrix(input: &NInput, k: usize) -> Result<Array2<f64>> {
    let n = match input {
        NInput::Scalar(n) => Array2::from_diag_elem(k, *n),
        NInput::Vector(v) => {
            check_equal_length(v.len(), k, "N", "number of traits")?;
            Array2::from_diag(&ndarray::Array1::from_vec(v.clone()))
        }
        NInput::Matrix(m) => to_array2(m, "N")?,
        NInput::Overlapping { n, overlap } => {
            check_range_f64(*overlap, 0.0, 1.0, false, "N overlap fraction")?;
            let mut out = Array2::from_elem((k, k), n * overlap);
            out.diag_mut().fill(*n);
            out
        }
    };
    ensure_shape(&n.view(), k, k, "N")?;
    Ok(n)
}

fn validate_n_matrix(n: &Array2<f64>) -> Result<()> {
    let k = n.nrows();
    for i in 0..k {
        let d = n[(i, i)];
        if !d.is_finite() || d <= 0.0 {
            return Err(SimError::InvalidArgument(format!(
                "sample size of trait {i} must be positive, found {d}"
            )));
        }
    }
    let asym = max_asymmetry(&n.view());
    if asym > 0.0 {
        return Err(SimError::InvalidArgument(format!(
            "N must be symmetric (max deviation {asym})"
        )));
    }
    for i in 0..k {
        for j in (i + 1)..k {
            let shared = n[(i, j)];
            let limit = n[(i, i)].min(n[(j, j)]);
            if !(0.0..=limit).contains(&shared) {
                return Err(SimError::InvalidArgument(format!(
                    "overlap between traits {i} and {j} is {shared}, must lie in [0, {limit}]"
                )));
            }
        }
    }
    Ok(())
}
