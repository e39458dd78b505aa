//! Density-based clustering over a precomputed distance matrix.
//!
//! A point is a core point when at least `min_samples` points, itself
//! included, lie within `eps` of it. Clusters grow outward from core points
//! in index order; a border point joins the first cluster that reaches it.
//! Everything else is noise.

pub const NOISE: i32 = -1;

pub fn dbscan(distances: &[Vec<f64>], eps: f64, min_samples: usize) -> Vec<i32> {
    let n = distances.len();
    let min_samples = min_samples.max(1);

    let neighborhoods: Vec<Vec<usize>> = distances
        .iter()
        .map(|row| (0..n).filter(|&j| row[j] <= eps).collect())
        .collect();
    let is_core: Vec<bool> = neighborhoods.iter().map(|nb| nb.len() >= min_samples).collect();

    let mut labels = vec![NOISE; n];
    let mut next_label = 0;
    for start in 0..n {
        if labels[start] != NOISE || !is_core[start] {
            continue;
        }
        labels[start] = next_label;
        let mut stack = vec![start];
        while let Some(point) = stack.pop() {
            if !is_core[point] {
                continue;
            }
            for &neighbor in &neighborhoods[point] {
                if labels[neighbor] == NOISE {
                    labels[neighbor] = next_label;
                    stack.push(neighbor);
                }
            }
        }
        next_label += 1;
    }
    labels
}

/// Number of distinct non-noise labels.
pub fn cluster_count(labels: &[i32]) -> usize {
    let mut seen: Vec<i32> = labels.iter().copied().filter(|&l| l != NOISE).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

pub fn noise_count(labels: &[i32]) -> usize {
    labels.iter().filter(|&&l| l == NOISE).count()
}
