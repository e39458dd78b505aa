//! Vector similarity helpers shared by both clustering modes.

/// Cosine similarity in `[-1, 1]`. Zero for mismatched lengths or a
/// zero-magnitude vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut mag_a = 0.0f64;
    let mut mag_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot / (mag_a.sqrt() * mag_b.sqrt())).clamp(-1.0, 1.0)
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Euclidean,
    /// `1 - cosine similarity`, clipped at zero.
    Cosine,
}

impl Metric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            Metric::Euclidean => euclidean_distance(a, b),
            Metric::Cosine => (1.0 - cosine_similarity(a, b)).max(0.0),
        }
    }
}

/// Symmetric pairwise distance matrix with a zero diagonal.
pub fn distance_matrix<V: AsRef<[f32]>>(points: &[V], metric: Metric) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = metric.distance(points[i].as_ref(), points[j].as_ref());
            matrix[i][j] = d;
            matrix[j][i] = d;
        }
    }
    matrix
}

/// Component-wise mean. Empty input gives an empty vector.
pub fn centroid<V: AsRef<[f32]>>(points: &[V]) -> Vec<f32> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    let mut sum = vec![0.0f64; first.as_ref().len()];
    for point in points {
        for (acc, v) in sum.iter_mut().zip(point.as_ref()) {
            *acc += f64::from(*v);
        }
    }
    let n = points.len() as f64;
    sum.into_iter().map(|v| (v / n) as f32).collect()
}
