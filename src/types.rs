use rand::rngs::StdRng;

/// Row-major matrix as accepted at the configuration boundary.
pub type Matrix = Vec<Vec<f64>>;

#[derive(Debug, Clone)]
pub enum VecOrScalar {
    Scalar(f64),
    Vec(Vec<f64>),
}

#[derive(Debug, Clone)]
pub enum MatrixOrScalar {
    /// Common off-diagonal value; the diagonal is 1.
    Scalar(f64),
    Matrix(Matrix),
}

#[derive(Debug, Clone)]
pub enum NInput {
    /// Same sample size for every trait, no shared samples.
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(Matrix),
    /// Same sample size for every trait with a fraction `overlap` shared by each pair.
    Overlapping { n: f64, overlap: f64 },
}

pub type AfGenerator = fn(usize, &mut StdRng) -> Vec<f64>;

#[derive(Debug, Clone)]
pub enum AfInput {
    Scalar(f64),
    Vector(Vec<f64>),
    Generator(AfGenerator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeritabilityMode {
    /// `h2` is the total heritability of each trait, including mediated paths.
    #[default]
    Total,
    /// `h2` is the heritability explained by each trait's direct variant effects.
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectScale {
    Standardized,
    PerAllele,
}

impl VecOrScalar {
    pub fn expand(&self, k: usize, name: &str) -> crate::error::Result<Vec<f64>> {
        match self {
            VecOrScalar::Scalar(v) => Ok(vec![*v; k]),
            VecOrScalar::Vec(v) => {
                crate::qc::check_equal_length(v.len(), k, name, "number of traits")?;
                Ok(v.clone())
            }
        }
    }
}
