//! Cosine similarity and its complementary distance.
//!
//! The index computes similarity once per candidate and derives the distance
//! from that same value, so `distance == 1 - similarity` holds exactly for
//! every returned hit.

/// Cosine similarity of two equal-length vectors, clamped to `[-1, 1]`.
///
/// A zero vector has no direction; its similarity to anything is `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Cosine distance for a similarity value.
pub fn cosine_distance(similarity: f32) -> f32 {
    1.0 - similarity
}
