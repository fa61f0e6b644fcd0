//! Vector width normalization and L2 scaling.
//!
//! Providers emit vectors of different native widths. The index stores every
//! vector at one standard width, zero-padded at the tail, with the original
//! width recorded alongside so the exact vector can be recovered.

/// Default standard width, wide enough for common embedding models.
pub const DEFAULT_STANDARD_WIDTH: usize = 1536;

/// In-place L2 normalization helper to keep allocations down during hot paths.
/// Uses f32 throughout for better SIMD auto-vectorization.
pub fn l2_normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 {
        let inv_norm = norm_sq.sqrt().recip();
        for x in v.iter_mut() {
            *x *= inv_norm;
        }
    }
}

/// Pads `vector` with trailing zeros up to `standard_width` and returns the
/// padded vector plus the original width.
///
/// Vectors wider than `standard_width` are truncated with a warning; this
/// loses information and normally means the standard width is misconfigured.
pub fn pad_to_standard(mut vector: Vec<f32>, standard_width: usize) -> (Vec<f32>, usize) {
    let original_dim = vector.len();
    if original_dim > standard_width {
        tracing::warn!(
            original_dim,
            standard_width,
            "vector wider than standard width, truncating"
        );
        vector.truncate(standard_width);
        return (vector, standard_width);
    }
    vector.resize(standard_width, 0.0);
    (vector, original_dim)
}

/// Recovers the original vector from a padded one by cutting at the recorded
/// original width. The inverse of [`pad_to_standard`] for non-truncated input.
pub fn recover_original(padded: &[f32], original_dim: usize) -> Vec<f32> {
    let cut = original_dim.min(padded.len());
    padded[..cut].to_vec()
}

/// Best-effort guess of the original width from trailing zeros.
///
/// Diagnostic only. A genuine trailing zero in the source vector makes the
/// guess too small, so the recorded width stays authoritative.
pub fn infer_original_dim(padded: &[f32]) -> usize {
    padded
        .iter()
        .rposition(|&x| x != 0.0)
        .map(|i| i + 1)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_simple_vector() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize_in_place(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector() {
        let mut v = vec![0.0f32, 0.0, 0.0];
        l2_normalize_in_place(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn l2_normalize_maintains_unit_length() {
        let mut v = vec![1.0f32, 2.0, 3.0, 4.0, 5.0];
        l2_normalize_in_place(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn l2_normalize_empty_slice() {
        let mut v: Vec<f32> = vec![];
        l2_normalize_in_place(&mut v);
        assert!(v.is_empty());
    }

    #[test]
    fn pad_extends_with_zeros() {
        let (padded, original_dim) = pad_to_standard(vec![1.0, 2.0, 3.0], 8);
        assert_eq!(original_dim, 3);
        assert_eq!(padded.len(), 8);
        assert_eq!(&padded[..3], &[1.0, 2.0, 3.0]);
        assert!(padded[3..].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn pad_exact_width_is_identity() {
        let v = vec![0.5f32; 4];
        let (padded, original_dim) = pad_to_standard(v.clone(), 4);
        assert_eq!(original_dim, 4);
        assert_eq!(padded, v);
    }

    #[test]
    fn pad_truncates_oversized() {
        let (padded, original_dim) = pad_to_standard(vec![1.0; 10], 4);
        assert_eq!(original_dim, 4);
        assert_eq!(padded, vec![1.0; 4]);
    }

    #[test]
    fn pad_empty_vector() {
        let (padded, original_dim) = pad_to_standard(vec![], 4);
        assert_eq!(original_dim, 0);
        assert_eq!(padded, vec![0.0; 4]);
    }

    #[test]
    fn recover_round_trip() {
        let original = vec![0.1f32, -0.2, 0.3, 0.0, 0.5];
        let (padded, original_dim) = pad_to_standard(original.clone(), 16);
        assert_eq!(recover_original(&padded, original_dim), original);
    }

    #[test]
    fn recover_round_trip_with_trailing_zero() {
        // A genuine trailing zero in the source survives the round trip
        // because the recorded width is used, not the inferred one.
        let original = vec![0.1f32, 0.2, 0.0];
        let (padded, original_dim) = pad_to_standard(original.clone(), 8);
        assert_eq!(recover_original(&padded, original_dim), original);
    }

    #[test]
    fn recover_clamps_to_padded_length() {
        let padded = vec![1.0f32, 2.0];
        assert_eq!(recover_original(&padded, 10), vec![1.0, 2.0]);
    }

    #[test]
    fn infer_dim_from_trailing_zeros() {
        let (padded, _) = pad_to_standard(vec![1.0, 2.0, 3.0], 8);
        assert_eq!(infer_original_dim(&padded), 3);
    }

    #[test]
    fn infer_dim_undercounts_trailing_zero() {
        let (padded, original_dim) = pad_to_standard(vec![1.0, 2.0, 0.0], 8);
        assert_eq!(original_dim, 3);
        assert_eq!(infer_original_dim(&padded), 2);
    }

    #[test]
    fn infer_dim_all_zeros() {
        assert_eq!(infer_original_dim(&[0.0; 8]), 0);
    }
}
