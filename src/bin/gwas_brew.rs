use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;

use gwas_brew::direct::{nonzero_counts, sum_of_squares};
use gwas_brew::ld::LdBlock;
use gwas_brew::ld_query::prune;
use gwas_brew::logging::init_tracing;
use gwas_brew::sim_mv::{SimMvConfig, sim_mv};
use gwas_brew::types::{AfInput, HeritabilityMode, MatrixOrScalar, NInput, VecOrScalar};

#[derive(Parser)]
#[command(name = "gwas-brew")]
#[command(about = "Simulate multi-trait GWAS summary statistics", long_about = None)]
struct Cli {
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Simulate {
        #[arg(long, default_value_t = 10_000)]
        variants: usize,
        /// Heritability per trait; the number of values sets the number of traits.
        #[arg(long, value_delimiter = ',', required = true)]
        h2: Vec<f64>,
        /// Treat `h2` as direct rather than total heritability.
        #[arg(long)]
        direct_h2: bool,
        /// Proportion of variants with direct effects: one value or one per trait.
        #[arg(long, value_delimiter = ',', default_values_t = [0.01])]
        pi: Vec<f64>,
        /// Causal edge `from:to:weight` between traits (0-based); repeatable.
        #[arg(long = "edge")]
        edges: Vec<String>,
        /// Common environmental correlation between traits.
        #[arg(long, default_value_t = 0.0)]
        r_e: f64,
        /// GWAS sample size: one value or one per trait.
        #[arg(long, value_delimiter = ',', default_values_t = [50_000.0])]
        n: Vec<f64>,
        /// Fraction of samples shared by every pair of GWAS (single N only).
        #[arg(long, default_value_t = 0.0)]
        overlap: f64,
        /// Allele frequency for all variants; effects are per allele when set.
        #[arg(long)]
        af: Option<f64>,
        /// Size of the AR(1) LD blocks; no LD when omitted.
        #[arg(long)]
        ld_block_size: Option<usize>,
        #[arg(long, default_value_t = 0.5)]
        ld_rho: f64,
        #[arg(long)]
        no_pleiotropy: bool,
        #[arg(long)]
        pi_exact: bool,
        #[arg(long)]
        h2_exact: bool,
        #[arg(long)]
        estimate_s: bool,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long)]
        parallel: bool,
        #[arg(long)]
        cores: Option<usize>,
        /// Report how many variants survive clumping at this r2.
        #[arg(long)]
        prune_r2: Option<f64>,
        #[arg(long, default_value_t = 5e-8)]
        prune_p: f64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Simulate {
            variants,
            h2,
            direct_h2,
            pi,
            edges,
            r_e,
            n,
            overlap,
            af,
            ld_block_size,
            ld_rho,
            no_pleiotropy,
            pi_exact,
            h2_exact,
            estimate_s,
            seed,
            parallel,
            cores,
            prune_r2,
            prune_p,
        } => {
            let k = h2.len();
            let g = parse_edges(&edges, k)?;
            let pi = if pi.len() == 1 {
                VecOrScalar::Scalar(pi[0])
            } else {
                VecOrScalar::Vec(pi)
            };
            let n = match (n.len(), overlap > 0.0) {
                (1, true) => NInput::Overlapping { n: n[0], overlap },
                (1, false) => NInput::Scalar(n[0]),
                (_, true) => bail!("--overlap needs a single --n value"),
                (_, false) => NInput::Vector(n),
            };

            let mut config = SimMvConfig::new(variants, g, h2, pi, n);
            config.h2_mode = if direct_h2 {
                HeritabilityMode::Direct
            } else {
                HeritabilityMode::Total
            };
            config.r_e = Some(MatrixOrScalar::Scalar(r_e));
            config.af = af.map(AfInput::Scalar);
            config.ld = ld_block_size.map(|size| vec![LdBlock::autoregressive(size, ld_rho)]);
            config.sporadic_pleiotropy = !no_pleiotropy;
            config.pi_exact = pi_exact;
            config.h2_exact = h2_exact;
            config.estimate_s = estimate_s;
            config.seed = seed;
            config.parallel = parallel;
            config.cores = cores;

            let sim = sim_mv(&config).context("simulation failed")?;

            let nonzero = nonzero_counts(&sim.direct_snp_effects);
            let direct_ss = sum_of_squares(&sim.direct_snp_effects);
            println!("trait\tnonzero\tdirect_ss\th2_direct\tsigma_g\trealized_h2");
            for t in 0..k {
                println!(
                    "{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}",
                    t,
                    nonzero[t],
                    direct_ss[t],
                    sim.dag.h2_direct[t],
                    sim.dag.sigma_g[(t, t)],
                    sim.realized_sigma_g[(t, t)]
                );
            }
            print_matrix("total_effects", &sim.dag.total_effects);
            print_matrix("trait_corr", &sim.dag.trait_corr);
            print_matrix("R", &sim.overlap.r);

            if let Some(r2) = prune_r2 {
                let stats = sim.summary_stats();
                let mut rng = StdRng::seed_from_u64(seed);
                for t in 0..k {
                    let priority = stats.priority(t)?;
                    let kept = prune(&sim.ld, Some(priority.as_slice()), r2, prune_p, &mut rng)?;
                    println!("trait {t}: {} variants after clumping", kept.len());
                }
            }
        }
    }
    Ok(())
}

fn parse_edges(edges: &[String], k: usize) -> anyhow::Result<Vec<Vec<f64>>> {
    let mut g = vec![vec![0.0; k]; k];
    for edge in edges {
        let parts: Vec<&str> = edge.split(':').collect();
        let [from, to, weight] = parts.as_slice() else {
            bail!("edge {edge:?} must look like from:to:weight");
        };
        let from: usize = from.parse().with_context(|| format!("edge {edge:?} source"))?;
        let to: usize = to.parse().with_context(|| format!("edge {edge:?} target"))?;
        let weight: f64 = weight.parse().with_context(|| format!("edge {edge:?} weight"))?;
        if from >= k || to >= k {
            bail!("edge {edge:?} refers to a trait outside 0..{k}");
        }
        g[from][to] = weight;
    }
    Ok(g)
}

fn print_matrix(name: &str, m: &Array2<f64>) {
    println!("{name}:");
    for row in m.rows() {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:.4}")).collect();
        println!("  {}", cells.join("\t"));
    }
}
