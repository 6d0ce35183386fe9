//! Simulation of multi-trait GWAS summary statistics.
//!
//! Direct variant effects are drawn per trait, pushed through a causal graph
//! between traits to joint effects, through block-diagonal LD to marginal
//! effects, and finally perturbed by sampling error that is correlated across
//! variants (LD) and across traits (sample overlap).

pub mod error;
pub mod logging;
pub mod types;

pub mod matrix;
pub mod parallel;
pub mod qc;

pub mod dag;
pub mod direct;
pub mod ld;
pub mod ld_query;
pub mod marginal;
pub mod overlap;
pub mod sim_mv;
