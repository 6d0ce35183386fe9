use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::dag::TraitDag;
use crate::direct::{DirectEffectConfig, generate_direct_effects, nonzero_counts};
use crate::error::{Result, SimError};
use crate::ld::{LdBlock, LdBlockStore};
use crate::marginal::{
    SummaryStats, genetic_covariance, joint_from_direct, marginalize, simulate_beta_hat,
};
use crate::matrix::{ensure_square, scalar_correlation, to_array2};
use crate::overlap::SampleOverlap;
use crate::parallel::{block_threads, with_block_pool};
use crate::qc::{check_all_in_range, check_equal_length};
use crate::types::{
    AfInput, EffectScale, HeritabilityMode, Matrix, MatrixOrScalar, NInput, VecOrScalar,
};

#[derive(Debug, Clone)]
pub struct SimMvConfig {
    pub n_variants: usize,
    /// `g[i][j]`: direct effect of trait `i` on trait `j`.
    pub g: Matrix,
    pub h2: Vec<f64>,
    pub h2_mode: HeritabilityMode,
    pub pi: VecOrScalar,
    /// Environmental correlation; identity when `None`.
    pub r_e: Option<MatrixOrScalar>,
    pub n: NInput,
    pub af: Option<AfInput>,
    /// Pattern of LD blocks repeated over the variants; independent when `None`.
    pub ld: Option<Vec<LdBlock>>,
    pub sporadic_pleiotropy: bool,
    pub pi_exact: bool,
    pub h2_exact: bool,
    pub estimate_s: bool,
    pub seed: u64,
    pub parallel: bool,
    pub cores: Option<usize>,
}

impl SimMvConfig {
    pub fn new(n_variants: usize, g: Matrix, h2: Vec<f64>, pi: VecOrScalar, n: NInput) -> Self {
        Self {
            n_variants,
            g,
            h2,
            h2_mode: HeritabilityMode::Total,
            pi,
            r_e: None,
            n,
            af: None,
            ld: None,
            sporadic_pleiotropy: true,
            pi_exact: false,
            h2_exact: false,
            estimate_s: false,
            seed: 0,
            parallel: false,
            cores: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimMvOutput {
    pub beta_hat: Array2<f64>,
    pub se_beta_hat: Array2<f64>,
    pub s_estimate: Option<Array2<f64>>,
    pub beta_joint: Array2<f64>,
    pub beta_marg: Array2<f64>,
    pub direct_snp_effects: Array2<f64>,
    pub dag: TraitDag,
    pub overlap: SampleOverlap,
    /// `beta_jointᵗ · LD · beta_joint` on the standardized scale.
    pub realized_sigma_g: Array2<f64>,
    pub af: Option<Vec<f64>>,
    pub scale: EffectScale,
    pub ld: LdBlockStore,
}

impl SimMvOutput {
    pub fn summary_stats(&self) -> SummaryStats {
        SummaryStats {
            beta_hat: self.beta_hat.clone(),
            se_beta_hat: self.se_beta_hat.clone(),
            s_estimate: self.s_estimate.clone(),
        }
    }
}

pub fn sim_mv(config: &SimMvConfig) -> Result<SimMvOutput> {
    let g = to_array2(&config.g, "G")?;
    let k = ensure_square(&g.view(), "G")?;
    check_equal_length(config.h2.len(), k, "h2", "G")?;
    let j = config.n_variants;
    if j == 0 {
        return Err(SimError::InvalidArgument(
            "number of variants must be positive".to_string(),
        ));
    }

    let r_e = match &config.r_e {
        None => Array2::eye(k),
        Some(MatrixOrScalar::Scalar(v)) => scalar_correlation(*v, k),
        Some(MatrixOrScalar::Matrix(m)) => to_array2(m, "R_E")?,
    };
    let dag = TraitDag::build(&g, &config.h2, &r_e, config.h2_mode)?;
    info!("Trait graph resolved: {k} traits, order {:?}", dag.order);
    let pi = config.pi.expand(k, "pi")?;

    let store = match &config.ld {
        Some(pattern) => LdBlockStore::build(pattern, j)?,
        None => LdBlockStore::independent(j),
    };
    let overlap = SampleOverlap::from_input(&config.n, &dag.trait_corr)?;
    info!(
        "Simulating {j} variants for {k} traits over {} LD blocks",
        store.n_blocks()
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let af = match &config.af {
        Some(input) => Some(resolve_af(input, &store, &mut rng)?),
        None => None,
    };

    let direct_config = DirectEffectConfig {
        n_variants: j,
        pi,
        h2: dag.h2_direct.to_vec(),
        sporadic_pleiotropy: config.sporadic_pleiotropy,
        pi_exact: config.pi_exact,
        h2_exact: config.h2_exact,
    };
    let direct_std = generate_direct_effects(&direct_config, &mut rng)?;
    info!("Drew direct effects for {k} traits");
    debug!("nonzero direct effects per trait: {:?}", nonzero_counts(&direct_std));

    let joint_std = joint_from_direct(&direct_std, &dag)?;
    let threads = block_threads(config.cores, store.n_blocks());
    let marg_std = with_block_pool(threads, || marginalize(&joint_std, &store, config.parallel))?;
    let realized_sigma_g = genetic_covariance(&joint_std, &marg_std);
    info!("Marginalized joint effects over {} LD blocks", store.n_blocks());

    let (scale, direct, joint, marg) = match &af {
        Some(af) => {
            let sd = allele_sd(af);
            (
                EffectScale::PerAllele,
                per_allele(direct_std, &sd),
                per_allele(joint_std, &sd),
                per_allele(marg_std, &sd),
            )
        }
        None => (EffectScale::Standardized, direct_std, joint_std, marg_std),
    };

    info!("Sampling summary statistics");
    let stats = with_block_pool(threads, || {
        simulate_beta_hat(
            &marg,
            &overlap,
            af.as_deref(),
            &store,
            config.estimate_s,
            config.parallel,
            &mut rng,
        )
    })?;
    info!("Simulation finished");

    Ok(SimMvOutput {
        beta_hat: stats.beta_hat,
        se_beta_hat: stats.se_beta_hat,
        s_estimate: stats.s_estimate,
        beta_joint: joint,
        beta_marg: marg,
        direct_snp_effects: direct,
        dag,
        overlap,
        realized_sigma_g,
        af,
        scale,
        ld: store,
    })
}

#[derive(Debug, Clone)]
pub struct ResampleConfig {
    pub n: NInput,
    pub estimate_s: bool,
    pub seed: u64,
    pub parallel: bool,
    pub cores: Option<usize>,
}

/// Draws fresh summary statistics around an existing simulation's marginal
/// effects, for a new sample-size specification.
pub fn resample_sumstats(sim: &SimMvOutput, config: &ResampleConfig) -> Result<SummaryStats> {
    let overlap = SampleOverlap::from_input(&config.n, &sim.dag.trait_corr)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let threads = block_threads(config.cores, sim.ld.n_blocks());
    info!("Resampling summary statistics for {} variants", sim.ld.n_variants());
    with_block_pool(threads, || {
        simulate_beta_hat(
            &sim.beta_marg,
            &overlap,
            sim.af.as_deref(),
            &sim.ld,
            config.estimate_s,
            config.parallel,
            &mut rng,
        )
    })
}

/// A vector may cover all variants or, with an LD pattern, one copy of the pattern.
fn resolve_af(input: &AfInput, store: &LdBlockStore, rng: &mut StdRng) -> Result<Vec<f64>> {
    let j = store.n_variants();
    let af = match input {
        AfInput::Scalar(a) => vec![*a; j],
        AfInput::Vector(v) if v.len() == j => v.clone(),
        AfInput::Vector(v) if store.pattern_len() == Some(v.len()) => {
            (0..j).map(|i| v[i % v.len()]).collect()
        }
        AfInput::Vector(v) => {
            let expected = match store.pattern_len() {
                Some(len) => format!("{j} or the LD pattern length {len}"),
                None => j.to_string(),
            };
            return Err(SimError::dimension("allele frequencies", expected, v.len()));
        }
        AfInput::Generator(f) => {
            let af = f(j, rng);
            check_equal_length(af.len(), j, "generated allele frequencies", "variants")?;
            af
        }
    };
    check_all_in_range(&af, 0.0, 1.0, true, "af")?;
    Ok(af)
}

fn allele_sd(af: &[f64]) -> Array1<f64> {
    af.iter().map(|a| (2.0 * a * (1.0 - a)).sqrt()).collect()
}

fn per_allele(beta: Array2<f64>, sd: &Array1<f64>) -> Array2<f64> {
    beta / &sd.view().insert_axis(Axis(1))
}
