use crate::error::{Result, VerityError};

/// Dimension of the sentence embeddings stored with every fact.
pub const EMBEDDING_DIM: usize = 384;

/// Reject vectors that would poison similarity search: wrong length,
/// NaN/inf components, or the all-zero vector some encoders emit on failure.
pub fn validate_embedding(vector: &[f32], expected_dim: usize) -> Result<()> {
    if vector.len() != expected_dim {
        return Err(VerityError::DataIntegrity(format!(
            "embedding has {} dimensions, expected {expected_dim}",
            vector.len()
        )));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(VerityError::DataIntegrity(
            "embedding contains non-finite values".into(),
        ));
    }
    if vector.iter().all(|x| *x == 0.0) {
        return Err(VerityError::DataIntegrity("embedding is all zeros".into()));
    }
    Ok(())
}

/// Cosine distance in `[0, 2]`, matching pgvector's `<=>` operator.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 1.0;
    }
    1.0 - dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_vectors() {
        assert!(validate_embedding(&[0.1; 10], EMBEDDING_DIM).is_err());
        assert!(validate_embedding(&[0.0; EMBEDDING_DIM], EMBEDDING_DIM).is_err());

        let mut v = vec![0.1; EMBEDDING_DIM];
        v[7] = f32::NAN;
        assert!(validate_embedding(&v, EMBEDDING_DIM).is_err());

        assert!(validate_embedding(&[0.1; EMBEDDING_DIM], EMBEDDING_DIM).is_ok());
    }

    #[test]
    fn cosine_distance_basics() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!(cosine_distance(&a, &a).abs() < 1e-9);
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-9);
        assert!((cosine_distance(&a, &[-1.0, 0.0]) - 2.0).abs() < 1e-9);
    }
}
