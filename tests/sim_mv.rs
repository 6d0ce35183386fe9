use gwas_brew::direct::{nonzero_counts, sum_of_squares};
use gwas_brew::error::SimError;
use gwas_brew::ld::LdBlock;
use gwas_brew::sim_mv::{ResampleConfig, SimMvConfig, resample_sumstats, sim_mv};
use gwas_brew::types::{AfInput, EffectScale, MatrixOrScalar, NInput, VecOrScalar};
use ndarray::Array2;
use rand::Rng;
use rand::rngs::StdRng;

fn two_trait_config() -> SimMvConfig {
    SimMvConfig::new(
        2000,
        vec![vec![0.0, 0.0], vec![0.0, 0.0]],
        vec![0.4, 0.3],
        VecOrScalar::Scalar(0.05),
        NInput::Scalar(50_000.0),
    )
}

fn uniform_af(n: usize, rng: &mut StdRng) -> Vec<f64> {
    (0..n).map(|_| rng.random_range(0.05..0.5)).collect()
}

#[test]
fn independent_traits_without_ld() {
    let mut config = two_trait_config();
    config.seed = 2024;
    let sim = sim_mv(&config).expect("simulation");

    assert_eq!(sim.beta_hat.dim(), (2000, 2));
    assert_eq!(sim.beta_joint, sim.beta_marg);
    assert_eq!(sim.beta_joint, sim.direct_snp_effects);
    assert_eq!(sim.scale, EffectScale::Standardized);
    assert!(sim.af.is_none());
    assert!(sim.s_estimate.is_none());

    for count in nonzero_counts(&sim.direct_snp_effects) {
        assert!((60..=140).contains(&count), "nonzero count {count}");
    }
    assert!((sim.dag.sigma_g[(0, 0)] - 0.4).abs() < 1e-12);
    assert!((sim.dag.sigma_g[(1, 1)] - 0.3).abs() < 1e-12);
    assert_eq!(sim.overlap.r, Array2::eye(2));
    assert!(sim.dag.total_effects.iter().all(|v| *v == 0.0));
    let se = 1.0 / 50_000.0_f64.sqrt();
    assert!(sim.se_beta_hat.iter().all(|v| (v - se).abs() < 1e-15));
}

#[test]
fn sample_overlap_correlates_errors() {
    let mut config = two_trait_config();
    config.n = NInput::Matrix(vec![vec![60_000.0, 30_000.0], vec![30_000.0, 60_000.0]]);
    config.r_e = Some(MatrixOrScalar::Matrix(vec![vec![1.0, 0.4], vec![0.4, 1.0]]));
    let sim = sim_mv(&config).expect("simulation");

    let trait_corr = sim.dag.trait_corr[(0, 1)];
    assert!((trait_corr - (0.6_f64 * 0.7).sqrt() * 0.4).abs() < 1e-12);
    assert!((sim.overlap.r[(0, 1)] - 0.5 * trait_corr).abs() < 1e-12);
    assert!((sim.dag.trait_corr[(0, 0)] - 1.0).abs() < 1e-12);
}

#[test]
fn mediated_effects_reach_downstream_traits() {
    let mut config = SimMvConfig::new(
        5000,
        vec![vec![0.0, 0.5], vec![0.0, 0.0]],
        vec![0.3, 0.4],
        VecOrScalar::Vec(vec![0.02, 0.01]),
        NInput::Vector(vec![20_000.0, 30_000.0]),
    );
    config.pi_exact = true;
    config.h2_exact = true;
    config.sporadic_pleiotropy = false;
    config.seed = 7;
    let sim = sim_mv(&config).expect("simulation");

    assert_eq!(nonzero_counts(&sim.direct_snp_effects), vec![100, 50]);
    let direct_ss = sum_of_squares(&sim.direct_snp_effects);
    assert!((direct_ss[0] - 0.3).abs() < 1e-10);
    assert!((direct_ss[1] - (0.4 - 0.25 * 0.3)).abs() < 1e-10);

    let d = &sim.direct_snp_effects;
    let expected = &d.column(1) + &(&d.column(0) * 0.5);
    assert!(
        (&sim.beta_joint.column(1) - &expected)
            .iter()
            .all(|v| v.abs() < 1e-12)
    );
    // disjoint supports make the realized heritability exact
    assert!((sim.realized_sigma_g[(0, 0)] - 0.3).abs() < 1e-10);
    assert!((sim.realized_sigma_g[(1, 1)] - 0.4).abs() < 1e-10);
    assert!((sim.realized_sigma_g[(0, 1)] - 0.15).abs() < 1e-10);
}

#[test]
fn ld_pattern_and_allele_frequencies() {
    let mut config = SimMvConfig::new(
        1000,
        vec![vec![0.0]],
        vec![0.5],
        VecOrScalar::Scalar(0.05),
        NInput::Scalar(100_000.0),
    );
    config.ld = Some(vec![LdBlock::autoregressive(4, 0.5), LdBlock::Identity(2)]);
    config.af = Some(AfInput::Vector(vec![0.1, 0.2, 0.3, 0.4, 0.25, 0.5]));
    config.estimate_s = true;
    config.parallel = true;
    config.cores = Some(2);
    config.seed = 5;
    let sim = sim_mv(&config).expect("simulation");

    assert_eq!(sim.scale, EffectScale::PerAllele);
    let af = sim.af.as_ref().expect("af");
    assert_eq!(af.len(), 1000);
    assert_eq!(af[6], 0.1);
    assert_eq!(af[11], 0.5);
    assert_ne!(sim.beta_joint, sim.beta_marg);
    assert_eq!(sim.ld.n_blocks(), 333);

    for j in [0, 3, 7, 999] {
        let expected = 1.0 / (100_000.0 * 2.0 * af[j] * (1.0 - af[j])).sqrt();
        assert!((sim.se_beta_hat[(j, 0)] - expected).abs() < 1e-15);
    }
    // per-allele effects are standardized effects divided by sqrt(2 af (1 - af))
    let sd0 = (2.0 * af[0] * (1.0 - af[0])).sqrt();
    let standardized: f64 = (0..4)
        .map(|i| {
            let sd = (2.0 * af[i] * (1.0 - af[i])).sqrt();
            0.5_f64.powi(i as i32) * sim.beta_joint[(i, 0)] * sd
        })
        .sum();
    assert!((sim.beta_marg[(0, 0)] * sd0 - standardized).abs() < 1e-12);
    assert!(sim.s_estimate.is_some());
}

#[test]
fn generated_allele_frequencies() {
    let mut config = two_trait_config();
    config.af = Some(AfInput::Generator(uniform_af));
    let sim = sim_mv(&config).expect("simulation");
    let af = sim.af.expect("af");
    assert_eq!(af.len(), 2000);
    assert!(af.iter().all(|a| (0.05..0.5).contains(a)));
}

#[test]
fn seeded_runs_are_reproducible() {
    let mut config = two_trait_config();
    config.ld = Some(vec![LdBlock::autoregressive(10, 0.8)]);
    config.seed = 99;
    let serial = sim_mv(&config).expect("serial");
    config.parallel = true;
    let parallel = sim_mv(&config).expect("parallel");
    assert_eq!(serial.beta_hat, parallel.beta_hat);
    assert_eq!(serial.beta_marg, parallel.beta_marg);

    config.seed = 100;
    let other = sim_mv(&config).expect("other seed");
    assert_ne!(serial.beta_hat, other.beta_hat);
}

#[test]
fn resampling_keeps_marginal_effects() {
    let mut config = two_trait_config();
    config.ld = Some(vec![LdBlock::autoregressive(5, 0.3)]);
    let sim = sim_mv(&config).expect("simulation");
    let resampled = resample_sumstats(
        &sim,
        &ResampleConfig {
            n: NInput::Overlapping {
                n: 10_000.0,
                overlap: 1.0,
            },
            estimate_s: true,
            seed: 3,
            parallel: false,
            cores: None,
        },
    )
    .expect("resample");
    assert_eq!(resampled.beta_hat.dim(), sim.beta_hat.dim());
    assert!(resampled.se_beta_hat.iter().all(|v| (v - 0.01).abs() < 1e-15));
    assert!(resampled.s_estimate.is_some());
    assert_ne!(resampled.beta_hat, sim.beta_hat);
}

#[test]
fn identity_pattern_repeats_allele_frequencies() {
    let mut config = two_trait_config();
    config.n_variants = 1000;
    config.ld = Some(vec![LdBlock::Identity(5)]);
    config.af = Some(AfInput::Vector(vec![0.1, 0.2, 0.3, 0.4, 0.45]));
    let sim = sim_mv(&config).expect("simulation");

    let af = sim.af.as_ref().expect("af");
    assert_eq!(af.len(), 1000);
    assert_eq!(af[5], af[0]);
    assert_eq!(af[999], 0.45);
    assert_eq!(sim.beta_joint, sim.beta_marg);

    // without a pattern only a full-length vector is accepted
    let mut config = two_trait_config();
    config.af = Some(AfInput::Vector(vec![0.2]));
    match sim_mv(&config) {
        Err(SimError::DimensionMismatch { expected, found, .. }) => {
            assert_eq!(expected, "2000");
            assert_eq!(found, "1");
        }
        other => panic!("expected DimensionMismatch, got {:?}", other.map(|s| s.scale)),
    }
}

#[test]
fn invalid_inputs_fail_the_whole_call() {
    let mut config = two_trait_config();
    config.g = vec![vec![0.0, 0.1], vec![0.2, 0.0]];
    assert!(matches!(sim_mv(&config), Err(SimError::CyclicGraph { .. })));

    let mut config = two_trait_config();
    config.pi = VecOrScalar::Vec(vec![0.6, 0.6]);
    config.sporadic_pleiotropy = false;
    assert!(matches!(
        sim_mv(&config),
        Err(SimError::InsufficientVariants { .. })
    ));

    let mut config = two_trait_config();
    config.af = Some(AfInput::Vector(vec![0.2; 7]));
    assert!(matches!(
        sim_mv(&config),
        Err(SimError::DimensionMismatch { .. })
    ));

    let mut config = two_trait_config();
    config.ld = Some(vec![LdBlock::Dense(Array2::from_elem((2, 2), 0.5))]);
    assert!(matches!(sim_mv(&config), Err(SimError::MalformedLd { .. })));
}
