//! Block-aware LD queries: clumping, proxy lookup and submatrix extraction.
//!
//! Variants in different blocks are uncorrelated, so every query only ever
//! looks inside one block.

use std::collections::{BTreeMap, HashSet};

use ndarray::Array2;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{Result, SimError};
use crate::ld::LdBlockStore;
use crate::qc::check_range_f64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyMatch {
    pub query: usize,
    pub proxy: usize,
    pub r2: f64,
}

#[derive(Debug, Clone)]
pub struct ProxyResult {
    pub matches: Vec<ProxyMatch>,
    /// Correlations among the selected proxies, in query order.
    pub correlation: Option<Array2<f64>>,
}

/// Greedy clumping. Candidates passing `pval_thresh` are visited from the
/// smallest score up (ties by index); each kept variant removes the remaining
/// candidates of its block with `r2 > r2_thresh`. Without `priority` every
/// variant is a candidate, visited in a random order drawn from `rng`.
///
/// Returns kept variant indices in ascending order.
pub fn prune<R: Rng + ?Sized>(
    store: &LdBlockStore,
    priority: Option<&[(usize, f64)]>,
    r2_thresh: f64,
    pval_thresh: f64,
    rng: &mut R,
) -> Result<Vec<usize>> {
    check_range_f64(r2_thresh, 0.0, 1.0, false, "r2_thresh")?;
    if pval_thresh.is_nan() {
        return Err(SimError::InvalidArgument("pval_thresh must not be NaN".to_string()));
    }

    let ordered: Vec<usize> = match priority {
        Some(priority) => {
            let mut scored = Vec::with_capacity(priority.len());
            for &(index, score) in priority {
                check_index(store, index, "prune priority")?;
                if score.is_finite() && score <= pval_thresh {
                    scored.push((index, score));
                }
            }
            scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            let mut seen = HashSet::with_capacity(scored.len());
            scored
                .into_iter()
                .filter(|(index, _)| seen.insert(*index))
                .map(|(index, _)| index)
                .collect()
        }
        None => {
            let mut all: Vec<usize> = (0..store.n_variants()).collect();
            all.shuffle(rng);
            all
        }
    };

    let mut by_block: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &variant in &ordered {
        if let Some((block_id, local)) = store.block_of(variant) {
            by_block.entry(block_id).or_default().push(local);
        }
    }

    let mut kept = Vec::new();
    for (block_id, locals) in by_block {
        let start = store.block_range(block_id).start;
        let mut removed = vec![false; locals.len()];
        for a in 0..locals.len() {
            if removed[a] {
                continue;
            }
            kept.push(start + locals[a]);
            if locals.len() - a == 1 {
                break;
            }
            let column = store.block_column(block_id, locals[a]);
            for c in (a + 1)..locals.len() {
                if !removed[c] && column[locals[c]].powi(2) > r2_thresh {
                    removed[c] = true;
                }
            }
        }
    }
    kept.sort_unstable();
    debug!(
        "pruned {} candidates to {} variants at r2 {r2_thresh}",
        ordered.len(),
        kept.len()
    );
    Ok(kept)
}

/// For each query, the same-block candidate with the highest `r2 >= r2_thresh`
/// (ties by lowest index, the query itself winning at `r2 = 1`), or the query
/// itself with `r2 = 1` when none qualifies or the query lies outside the store.
pub fn proxy(
    store: &LdBlockStore,
    query: &[usize],
    candidates: &[usize],
    r2_thresh: f64,
    return_mat: bool,
) -> Result<ProxyResult> {
    check_range_f64(r2_thresh, 0.0, 1.0, false, "r2_thresh")?;

    let mut by_block: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();
    for &candidate in candidates {
        check_index(store, candidate, "proxy candidates")?;
        if let Some((block_id, local)) = store.block_of(candidate) {
            by_block.entry(block_id).or_default().push((candidate, local));
        }
    }
    for members in by_block.values_mut() {
        members.sort_unstable();
        members.dedup();
    }

    let mut matches = Vec::with_capacity(query.len());
    for &q in query {
        let own = ProxyMatch {
            query: q,
            proxy: q,
            r2: 1.0,
        };
        let Some((block_id, local_q)) = store.block_of(q) else {
            matches.push(own);
            continue;
        };
        let Some(members) = by_block.get(&block_id) else {
            matches.push(own);
            continue;
        };
        if members.iter().any(|(c, _)| *c == q) {
            matches.push(own);
            continue;
        }
        let column = store.block_column(block_id, local_q);
        let mut best: Option<ProxyMatch> = None;
        for &(candidate, local) in members {
            let r2 = column[local].powi(2);
            if r2 < r2_thresh {
                continue;
            }
            if best.is_none_or(|b| r2 > b.r2) {
                best = Some(ProxyMatch {
                    query: q,
                    proxy: candidate,
                    r2,
                });
            }
        }
        matches.push(best.unwrap_or(own));
    }

    let correlation = return_mat.then(|| {
        let proxies: Vec<usize> = matches.iter().map(|m| m.proxy).collect();
        correlation_matrix(store, &proxies)
    });

    Ok(ProxyResult {
        matches,
        correlation,
    })
}

/// Dense correlation submatrix over `indices`, with 0 across blocks.
pub fn extract(store: &LdBlockStore, indices: &[usize]) -> Result<Array2<f64>> {
    for &index in indices {
        check_index(store, index, "extract indices")?;
    }
    Ok(correlation_matrix(store, indices))
}

/// Variants outside the store correlate only with themselves.
fn correlation_matrix(store: &LdBlockStore, indices: &[usize]) -> Array2<f64> {
    let n = indices.len();
    let mut out = Array2::<f64>::eye(n);
    for a in 0..n {
        for b in (a + 1)..n {
            let value = if indices[a] == indices[b] {
                1.0
            } else {
                store.correlation(indices[a], indices[b]).unwrap_or(0.0)
            };
            out[(a, b)] = value;
            out[(b, a)] = value;
        }
    }
    out
}

fn check_index(store: &LdBlockStore, index: usize, name: &str) -> Result<()> {
    if index >= store.n_variants() {
        return Err(SimError::dimension(
            format!("variant index in {name}"),
            format!("< {}", store.n_variants()),
            index,
        ));
    }
    Ok(())
}
