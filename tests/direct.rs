use gwas_brew::direct::{
    DirectEffectConfig, exact_counts, generate_direct_effects, nonzero_counts, sum_of_squares,
};
use gwas_brew::error::SimError;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn config(n_variants: usize, pi: Vec<f64>, h2: Vec<f64>) -> DirectEffectConfig {
    DirectEffectConfig {
        n_variants,
        pi,
        h2,
        sporadic_pleiotropy: true,
        pi_exact: false,
        h2_exact: false,
    }
}

#[test]
fn exact_sparsity_gives_exact_counts() {
    let mut cfg = config(1000, vec![0.05, 0.013], vec![0.3, 0.2]);
    cfg.pi_exact = true;
    let mut rng = StdRng::seed_from_u64(11);
    let beta = generate_direct_effects(&cfg, &mut rng).expect("effects");
    assert_eq!(beta.dim(), (1000, 2));
    assert_eq!(nonzero_counts(&beta), exact_counts(&cfg.pi, 1000));
    assert_eq!(nonzero_counts(&beta), vec![50, 13]);
}

#[test]
fn exact_heritability_matches_target() {
    for pleiotropy in [true, false] {
        let mut cfg = config(5000, vec![0.01, 0.02, 0.005], vec![0.25, 0.1, 0.6]);
        cfg.h2_exact = true;
        cfg.sporadic_pleiotropy = pleiotropy;
        let mut rng = StdRng::seed_from_u64(3);
        let beta = generate_direct_effects(&cfg, &mut rng).expect("effects");
        for (ss, target) in sum_of_squares(&beta).iter().zip(&cfg.h2) {
            assert!((ss - target).abs() < 1e-10, "{ss} vs {target}");
        }
    }
}

#[test]
fn disjoint_supports_without_pleiotropy() {
    for pi_exact in [true, false] {
        let mut cfg = config(2000, vec![0.1, 0.2, 0.15], vec![0.3, 0.3, 0.3]);
        cfg.sporadic_pleiotropy = false;
        cfg.pi_exact = pi_exact;
        let mut rng = StdRng::seed_from_u64(5);
        let beta = generate_direct_effects(&cfg, &mut rng).expect("effects");
        for row in beta.rows() {
            assert!(row.iter().filter(|b| **b != 0.0).count() <= 1);
        }
        let counts = nonzero_counts(&beta);
        if pi_exact {
            assert_eq!(counts, vec![200, 400, 300]);
        } else {
            assert!(counts.iter().all(|&c| c > 100));
        }
    }
}

#[test]
fn too_many_effect_variants_without_pleiotropy() {
    let mut cfg = config(100, vec![0.6, 0.5], vec![0.2, 0.2]);
    cfg.sporadic_pleiotropy = false;
    let mut rng = StdRng::seed_from_u64(1);
    match generate_direct_effects(&cfg, &mut rng) {
        Err(SimError::InsufficientVariants {
            required,
            available,
        }) => {
            assert_eq!(required, 110);
            assert_eq!(available, 100);
        }
        other => panic!("expected InsufficientVariants, got {other:?}"),
    }
}

#[test]
fn expected_sparsity_is_approximate() {
    let cfg = config(20_000, vec![0.05], vec![0.5]);
    let mut rng = StdRng::seed_from_u64(8);
    let beta = generate_direct_effects(&cfg, &mut rng).expect("effects");
    let count = nonzero_counts(&beta)[0];
    assert!((850..=1150).contains(&count), "count {count}");
    let ss = sum_of_squares(&beta)[0];
    assert!((ss - 0.5).abs() < 0.15, "sum of squares {ss}");
}

#[test]
fn zero_heritability_gives_zero_column() {
    let mut cfg = config(500, vec![0.1, 0.1], vec![0.0, 0.2]);
    cfg.h2_exact = true;
    let mut rng = StdRng::seed_from_u64(2);
    let beta = generate_direct_effects(&cfg, &mut rng).expect("effects");
    assert_eq!(nonzero_counts(&beta)[0], 0);
    assert!((sum_of_squares(&beta)[1] - 0.2).abs() < 1e-10);
}

#[test]
fn out_of_range_sparsity_is_rejected() {
    let cfg = config(100, vec![1.5], vec![0.2]);
    let mut rng = StdRng::seed_from_u64(2);
    assert!(matches!(
        generate_direct_effects(&cfg, &mut rng),
        Err(SimError::InvalidArgument(_))
    ));
}

#[test]
fn expected_sparsity_without_pleiotropy_needs_pi_budget() {
    // the rounded counts (500 + 500) still fit, but the per-variant draw does not
    let mut cfg = config(1000, vec![0.5004, 0.5004], vec![0.2, 0.2]);
    cfg.sporadic_pleiotropy = false;
    let mut rng = StdRng::seed_from_u64(4);
    assert!(matches!(
        generate_direct_effects(&cfg, &mut rng),
        Err(SimError::InvalidArgument(_))
    ));

    cfg.pi_exact = true;
    let beta = generate_direct_effects(&cfg, &mut rng).expect("effects");
    assert_eq!(nonzero_counts(&beta), vec![500, 500]);
}
