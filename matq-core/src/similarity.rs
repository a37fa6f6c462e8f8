//! Cosine similarity and nearest-neighbour selection over embeddings.

/// Cosine similarity of two vectors. Zero-magnitude or mismatched inputs
/// score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Stable argmax: index of the first maximal score. `None` for no scores.
/// A NaN score never wins against a number.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        match best {
            None => best = Some((idx, score)),
            Some((_, top)) if score > top || (top.is_nan() && !score.is_nan()) => {
                best = Some((idx, score))
            }
            _ => {}
        }
    }
    best.map(|(idx, _)| idx)
}

/// Most similar candidate to `query`, with its score. Candidates that are
/// `None` are skipped but keep their index.
pub fn best_match(query: &[f32], candidates: &[Option<Vec<f32>>]) -> Option<(usize, f32)> {
    let scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| c.as_ref().map(|v| (idx, cosine_similarity(query, v))))
        .collect();

    let scores: Vec<f32> = scored.iter().map(|(_, s)| *s).collect();
    argmax(&scores).map(|i| scored[i])
}
