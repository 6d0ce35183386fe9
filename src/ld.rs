//! Block-diagonal LD store.
//!
//! A user pattern of correlation blocks is validated once and laid over `J`
//! variants by cycling through the pattern; the last block is cut to its
//! leading principal submatrix when the sizes do not divide `J`. Repeated
//! blocks share the pattern's storage and its sampling factor.

use std::ops::Range;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use sprs::CsMat;
use tracing::debug;

use crate::error::{Result, SimError};
use crate::matrix::{TOL, max_asymmetry, max_unit_diagonal_deviation, psd_sqrt_factor};

#[derive(Debug, Clone)]
pub enum LdBlock {
    Identity(usize),
    Dense(Array2<f64>),
    Sparse(CsMat<f64>),
    /// `vectors · diag(values) · vectorsᵗ`; `vectors` may have fewer columns than rows.
    Eigen {
        vectors: Array2<f64>,
        values: Array1<f64>,
    },
}

impl LdBlock {
    /// AR(1) correlation `rho^|i-j|`.
    pub fn autoregressive(size: usize, rho: f64) -> Self {
        LdBlock::Dense(Array2::from_shape_fn((size, size), |(i, j)| {
            rho.powi(i.abs_diff(j) as i32)
        }))
    }

    pub fn size(&self) -> usize {
        match self {
            LdBlock::Identity(n) => *n,
            LdBlock::Dense(m) => m.nrows(),
            LdBlock::Sparse(m) => m.rows(),
            LdBlock::Eigen { vectors, .. } => vectors.nrows(),
        }
    }

    pub fn entry(&self, i: usize, j: usize) -> f64 {
        match self {
            LdBlock::Identity(_) => {
                if i == j {
                    1.0
                } else {
                    0.0
                }
            }
            LdBlock::Dense(m) => m[(i, j)],
            LdBlock::Sparse(m) => m.get(i, j).copied().unwrap_or(0.0),
            LdBlock::Eigen { vectors, values } => vectors
                .row(i)
                .iter()
                .zip(vectors.row(j).iter())
                .zip(values.iter())
                .map(|((a, b), l)| a * l * b)
                .sum(),
        }
    }

    /// Correlations of local variant `i` with the first `len` variants.
    pub fn column(&self, i: usize, len: usize) -> Array1<f64> {
        match self {
            LdBlock::Identity(_) => {
                let mut out = Array1::zeros(len);
                out[i] = 1.0;
                out
            }
            LdBlock::Dense(m) => m.slice(s![..len, i]).to_owned(),
            LdBlock::Sparse(m) => {
                let mut out = Array1::zeros(len);
                if let Some(col) = m.outer_view(i) {
                    for (j, v) in col.iter() {
                        if j < len {
                            out[j] = *v;
                        }
                    }
                }
                out
            }
            LdBlock::Eigen { vectors, values } => {
                let weighted = &vectors.row(i) * values;
                vectors.slice(s![..len, ..]).dot(&weighted)
            }
        }
    }

    /// Multiplies the leading `len x len` principal submatrix by `x` (`len x K`).
    pub fn apply_columns(&self, len: usize, x: &ArrayView2<'_, f64>) -> Array2<f64> {
        match self {
            LdBlock::Identity(_) => x.to_owned(),
            LdBlock::Dense(m) => m.slice(s![..len, ..len]).dot(x),
            LdBlock::Sparse(m) => {
                let mut out = Array2::zeros(x.dim());
                // symmetric, so outer vectors are rows whatever the storage order
                for (i, row) in m.outer_iterator().enumerate().take(len) {
                    let mut out_row = out.row_mut(i);
                    for (j, v) in row.iter() {
                        if j < len {
                            out_row.scaled_add(*v, &x.row(j));
                        }
                    }
                }
                out
            }
            LdBlock::Eigen { vectors, values } => {
                let q = vectors.slice(s![..len, ..]);
                let projected = q.t().dot(x) * &values.view().insert_axis(Axis(1));
                q.dot(&projected)
            }
        }
    }

    pub fn apply(&self, len: usize, v: &ArrayView1<'_, f64>) -> Array1<f64> {
        let x = v.view().insert_axis(Axis(1));
        self.apply_columns(len, &x).column(0).to_owned()
    }

    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            LdBlock::Identity(n) => Array2::eye(*n),
            LdBlock::Dense(m) => m.clone(),
            LdBlock::Sparse(m) => {
                let mut out = Array2::zeros((m.rows(), m.cols()));
                for (i, row) in m.outer_iterator().enumerate() {
                    for (j, v) in row.iter() {
                        out[(i, j)] = *v;
                    }
                }
                if m.is_csc() { out.reversed_axes() } else { out }
            }
            LdBlock::Eigen { vectors, values } => {
                let weighted = vectors * values;
                weighted.dot(&vectors.t())
            }
        }
    }

    /// Validates the block and returns `F` with `F Fᵗ` equal to it (`None`
    /// for identity blocks).
    fn validate(&self, index: usize) -> Result<Option<Array2<f64>>> {
        let malformed = |reason: String| SimError::MalformedLd {
            block: index,
            reason,
        };
        if self.size() == 0 {
            return Err(malformed("block is empty".to_string()));
        }
        match self {
            LdBlock::Identity(_) => Ok(None),
            LdBlock::Dense(m) => {
                if m.nrows() != m.ncols() {
                    return Err(malformed(format!("shape {}x{} is not square", m.nrows(), m.ncols())));
                }
                check_dense_correlation(m, index)?;
                Ok(Some(block_factor(m, index)?))
            }
            LdBlock::Sparse(m) => {
                if m.rows() != m.cols() {
                    return Err(malformed(format!("shape {}x{} is not square", m.rows(), m.cols())));
                }
                let dense = self.to_dense();
                check_dense_correlation(&dense, index)?;
                Ok(Some(block_factor(&dense, index)?))
            }
            LdBlock::Eigen { vectors, values } => {
                if vectors.ncols() != values.len() {
                    return Err(malformed(format!(
                        "{} eigenvectors but {} eigenvalues",
                        vectors.ncols(),
                        values.len()
                    )));
                }
                if vectors.iter().chain(values.iter()).any(|v| !v.is_finite()) {
                    return Err(malformed("factor entries must be finite".to_string()));
                }
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                if min < -TOL {
                    return Err(malformed(format!(
                        "not positive semi-definite (minimum eigenvalue {min:e})"
                    )));
                }
                for i in 0..vectors.nrows() {
                    let d = self.entry(i, i);
                    if (d - 1.0).abs() > 1e-6 {
                        return Err(malformed(format!("diagonal entry {i} is {d}, expected 1")));
                    }
                }
                Ok(Some(crate::matrix::scale_columns_by_sqrt(vectors, values)))
            }
        }
    }
}

fn check_dense_correlation(m: &Array2<f64>, index: usize) -> Result<()> {
    let malformed = |reason: String| SimError::MalformedLd {
        block: index,
        reason,
    };
    if m.iter().any(|v| !v.is_finite()) {
        return Err(malformed("entries must be finite".to_string()));
    }
    let asym = max_asymmetry(&m.view());
    if asym > TOL {
        return Err(malformed(format!("not symmetric (max deviation {asym:e})")));
    }
    let diag_dev = max_unit_diagonal_deviation(&m.view());
    if diag_dev > TOL {
        return Err(malformed(format!("diagonal differs from 1 by {diag_dev:e}")));
    }
    Ok(())
}

fn block_factor(m: &Array2<f64>, index: usize) -> Result<Array2<f64>> {
    psd_sqrt_factor(&m.view(), &format!("LD block {index}")).map_err(|e| match e {
        SimError::NonPositiveDefinite { min_eigenvalue, .. } => SimError::MalformedLd {
            block: index,
            reason: format!("not positive semi-definite (minimum eigenvalue {min_eigenvalue:e})"),
        },
        other => other,
    })
}

#[derive(Debug, Clone)]
struct PatternBlock {
    block: LdBlock,
    factor: Option<Array2<f64>>,
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    start: usize,
    len: usize,
    source: usize,
}

#[derive(Debug, Clone)]
pub struct LdBlockStore {
    pattern: Vec<PatternBlock>,
    placements: Vec<Placement>,
    n_variants: usize,
    /// `None` for stores built by `independent`.
    pattern_len: Option<usize>,
}

impl LdBlockStore {
    pub fn build(pattern: &[LdBlock], target_j: usize) -> Result<Self> {
        if pattern.is_empty() {
            return Err(SimError::MalformedLd {
                block: 0,
                reason: "LD pattern contains no blocks".to_string(),
            });
        }
        if target_j == 0 {
            return Err(SimError::InvalidArgument(
                "number of variants must be positive".to_string(),
            ));
        }

        let mut validated = Vec::with_capacity(pattern.len());
        for (index, block) in pattern.iter().enumerate() {
            let factor = block.validate(index)?;
            validated.push(PatternBlock {
                block: block.clone(),
                factor,
            });
        }
        let pattern_len = pattern.iter().map(LdBlock::size).sum();

        let mut placements = Vec::new();
        let mut start = 0;
        let mut source = 0;
        while start < target_j {
            let size = validated[source].block.size();
            let len = size.min(target_j - start);
            placements.push(Placement { start, len, source });
            start += len;
            source = (source + 1) % validated.len();
        }

        debug!(
            "LD store: {} pattern blocks ({pattern_len} variants) laid over {target_j} variants in {} blocks",
            validated.len(),
            placements.len()
        );

        Ok(Self {
            pattern: validated,
            placements,
            n_variants: target_j,
            pattern_len: Some(pattern_len),
        })
    }

    pub fn independent(n_variants: usize) -> Self {
        let placements = (0..n_variants)
            .map(|start| Placement {
                start,
                len: 1,
                source: 0,
            })
            .collect();
        Self {
            pattern: vec![PatternBlock {
                block: LdBlock::Identity(1),
                factor: None,
            }],
            placements,
            n_variants,
            pattern_len: None,
        }
    }

    pub fn n_variants(&self) -> usize {
        self.n_variants
    }

    pub fn n_blocks(&self) -> usize {
        self.placements.len()
    }

    /// Total size of the supplied pattern before repetition, even when every
    /// block in it is an identity.
    pub fn pattern_len(&self) -> Option<usize> {
        self.pattern_len
    }

    /// False when every block is an identity, so marginal effects equal joint effects.
    pub fn has_ld(&self) -> bool {
        self.pattern
            .iter()
            .any(|p| !matches!(p.block, LdBlock::Identity(_)))
    }

    pub fn block_range(&self, block_id: usize) -> Range<usize> {
        let p = self.placements[block_id];
        p.start..p.start + p.len
    }

    /// Pattern block backing `block_id`; only its leading `block_range(block_id).len()`
    /// variants are in use.
    pub fn block(&self, block_id: usize) -> &LdBlock {
        &self.pattern[self.placements[block_id].source].block
    }

    pub fn block_of(&self, variant: usize) -> Option<(usize, usize)> {
        if variant >= self.n_variants {
            return None;
        }
        let block_id = self.placements.partition_point(|p| p.start <= variant) - 1;
        Some((block_id, variant - self.placements[block_id].start))
    }

    pub fn apply(&self, block_id: usize, v: &ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        let len = self.checked_len(block_id, v.len())?;
        Ok(self.block(block_id).apply(len, v))
    }

    pub fn apply_columns(&self, block_id: usize, x: &ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let len = self.checked_len(block_id, x.nrows())?;
        Ok(self.block(block_id).apply_columns(len, x))
    }

    /// Local correlations of `local` with every variant of its block.
    pub fn block_column(&self, block_id: usize, local: usize) -> Array1<f64> {
        let len = self.placements[block_id].len;
        self.block(block_id).column(local, len)
    }

    pub fn correlation(&self, a: usize, b: usize) -> Option<f64> {
        let (block_a, off_a) = self.block_of(a)?;
        let (block_b, off_b) = self.block_of(b)?;
        if block_a != block_b {
            return Some(0.0);
        }
        if off_a == off_b {
            return Some(1.0);
        }
        Some(self.block(block_a).entry(off_a, off_b))
    }

    /// Factor `F` (rows = block variants) with `F Fᵗ` equal to the block, or
    /// `None` for identity blocks.
    pub fn sqrt_factor(&self, block_id: usize) -> Option<ArrayView2<'_, f64>> {
        let p = self.placements[block_id];
        self.pattern[p.source]
            .factor
            .as_ref()
            .map(|f| f.slice(s![..p.len, ..]))
    }

    fn checked_len(&self, block_id: usize, found: usize) -> Result<usize> {
        let p = self.placements.get(block_id).ok_or_else(|| {
            SimError::dimension("LD block index", format!("< {}", self.placements.len()), block_id)
        })?;
        if p.len != found {
            return Err(SimError::dimension(
                format!("vector for LD block {block_id}"),
                p.len,
                found,
            ));
        }
        Ok(p.len)
    }
}
