//! Histogram clustering.
//!
//! Reduces a list of per-context histograms to at most a target count by
//! greedily merging the pair whose combined population cost saves the
//! most bits, then keeps merging while any merge still saves bits. The
//! output is the clustered histogram list plus a context-to-cluster map.

use crate::histogram::{population_cost, Histogram};

struct Cluster<const N: usize> {
    histogram: Histogram<N>,
    cost: f64,
}

fn merge_saving<const N: usize>(a: &Cluster<N>, b: &Cluster<N>) -> f64 {
    let mut merged = a.histogram.clone();
    merged.add_histogram(&b.histogram);
    a.cost + b.cost - population_cost(&merged)
}

/// Greedily cluster `histograms` down to at most `max_clusters`.
///
/// Returns the surviving histograms (ordered by first use) and a map from
/// input index to output index.
pub fn cluster_histograms<const N: usize>(
    histograms: &[Histogram<N>],
    max_clusters: usize,
) -> (Vec<Histogram<N>>, Vec<u32>) {
    debug_assert!(max_clusters >= 1);
    let n = histograms.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }

    // Empty contexts are common (most context ids never fire) and merge
    // freely; collapse them up front so the quadratic pass stays small.
    let mut clusters: Vec<Cluster<N>> = Vec::new();
    let mut owner: Vec<usize> = Vec::with_capacity(n);
    let mut empty_cluster: Option<usize> = None;
    for histogram in histograms {
        if histogram.total == 0 {
            let slot = *empty_cluster.get_or_insert_with(|| {
                clusters.push(Cluster {
                    histogram: histogram.clone(),
                    cost: population_cost(histogram),
                });
                clusters.len() - 1
            });
            owner.push(slot);
        } else {
            clusters.push(Cluster {
                histogram: histogram.clone(),
                cost: population_cost(histogram),
            });
            owner.push(clusters.len() - 1);
        }
    }

    let mut active: Vec<usize> = (0..clusters.len()).collect();
    // Savings for every active pair, refreshed only for rows touched by a
    // merge.
    let mut savings: Vec<Vec<f64>> = vec![vec![0.0; clusters.len()]; clusters.len()];
    for i in 0..active.len() {
        for j in i + 1..active.len() {
            let s = merge_saving(&clusters[active[i]], &clusters[active[j]]);
            savings[active[i]][active[j]] = s;
            savings[active[j]][active[i]] = s;
        }
    }

    while active.len() > 1 {
        let mut best = f64::NEG_INFINITY;
        let (mut best_i, mut best_j) = (0, 0);
        for i in 0..active.len() {
            for j in i + 1..active.len() {
                let s = savings[active[i]][active[j]];
                if s > best {
                    best = s;
                    best_i = i;
                    best_j = j;
                }
            }
        }
        if active.len() <= max_clusters && best <= 0.0 {
            break;
        }

        let (dst, src) = (active[best_i], active[best_j]);
        let src_histogram = clusters[src].histogram.clone();
        clusters[dst].histogram.add_histogram(&src_histogram);
        clusters[dst].cost = population_cost(&clusters[dst].histogram);
        for slot in owner.iter_mut() {
            if *slot == src {
                *slot = dst;
            }
        }
        active.remove(best_j);
        for &other in &active {
            if other != dst {
                let s = merge_saving(&clusters[dst], &clusters[other]);
                savings[dst][other] = s;
                savings[other][dst] = s;
            }
        }
    }

    // Renumber surviving clusters in order of first appearance.
    let mut remap = vec![u32::MAX; clusters.len()];
    let mut out_histograms = Vec::new();
    let mut map = vec![0u32; n];
    for (ctx, &cluster) in owner.iter().enumerate() {
        if remap[cluster] == u32::MAX {
            remap[cluster] = out_histograms.len() as u32;
            out_histograms.push(clusters[cluster].histogram.clone());
        }
        map[ctx] = remap[cluster];
    }
    (out_histograms, map)
}
