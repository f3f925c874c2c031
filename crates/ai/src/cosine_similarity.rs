/// Cosine similarity of two equal-length vectors, in [-1.0, 1.0].
///
/// Mismatched or empty inputs score 0.0, as do degenerate
/// near-zero-norm vectors. Accumulation runs in f64 so long
/// low-magnitude embeddings don't lose precision.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return 0.0;
  }

  let (dot, a_sq, b_sq) = a.iter().zip(b).fold(
    (0.0_f64, 0.0_f64, 0.0_f64),
    |(dot, a_sq, b_sq), (&x, &y)| {
      let (x, y) = (f64::from(x), f64::from(y));
      (dot + x * y, a_sq + x * x, b_sq + y * y)
    },
  );

  let norm_product = (a_sq * b_sq).sqrt();
  if norm_product < 1e-12 {
    return 0.0;
  }

  (dot / norm_product) as f32
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identical_vectors_score_one() {
    let v = [0.6, 0.8, 0.0];
    assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn opposite_vectors_score_minus_one() {
    let a = [0.6, 0.8];
    let b = [-0.6, -0.8];
    assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
  }

  #[test]
  fn orthogonal_vectors_score_zero() {
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
  }

  #[test]
  fn mismatched_or_empty_inputs_score_zero() {
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[], &[]), 0.0);
  }

  #[test]
  fn near_zero_vectors_score_zero() {
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
  }
}
