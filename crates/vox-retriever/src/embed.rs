use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Fixed embedding dimension for the in-process retriever. Swapping in a
/// real embedding model only requires implementing [`crate::Retriever`]
/// against its own dimension — nothing downstream depends on this value.
pub const EMBED_DIM: usize = 256;

/// Deterministic, dependency-free stand-in for an embedding model: hashes
/// each lowercased word into a bucket of a fixed-size vector (the classic
/// "hashing trick"), then L2-normalizes so cosine similarity behaves
/// sensibly. Two inputs sharing vocabulary get nonzero similarity; it is
/// not semantically rich, but it is a real, callable implementation that
/// exercises the full search path without a network dependency.
pub fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0f32; EMBED_DIM];
    let mut word_count = 0usize;

    for word in tokenize(text) {
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        let bucket = (hasher.finish() as usize) % EMBED_DIM;
        vector[bucket] += 1.0;
        word_count += 1;
    }

    if word_count == 0 {
        return vector;
    }

    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
    vector
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
