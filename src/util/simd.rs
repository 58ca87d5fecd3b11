//! SIMD kernels for vector scoring, built on the `wide` crate.

use wide::f32x8;

const LANES: usize = 8;

/// Load up to eight floats into a vector register, zero-padding the tail.
#[inline]
fn load(chunk: &[f32]) -> f32x8 {
    let mut lanes = [0.0f32; LANES];
    lanes[..chunk.len()].copy_from_slice(chunk);
    f32x8::from(lanes)
}

/// Dot product of two equal-length slices.
///
/// Processes eight lanes per step with fused multiply-add; the tail is
/// zero-padded into one final step.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut acc = f32x8::splat(0.0);
    let mut chunks_a = a.chunks_exact(LANES);
    let mut chunks_b = b.chunks_exact(LANES);

    for (ca, cb) in (&mut chunks_a).zip(&mut chunks_b) {
        acc = load(ca).mul_add(load(cb), acc);
    }

    let (rem_a, rem_b) = (chunks_a.remainder(), chunks_b.remainder());
    if !rem_a.is_empty() {
        acc = load(rem_a).mul_add(load(rem_b), acc);
    }

    acc.reduce_add()
}

/// Fill `out` with the `rows × cols` matrix of dot products between the
/// row-major vectors in `left` and `right`, each of length `dimension`.
///
/// `out[i * cols + j] = dot(left[i], right[j])`.
pub fn dot_matrix(left: &[f32], right: &[f32], dimension: usize, out: &mut Vec<f32>) {
    debug_assert!(dimension > 0);
    let rows = left.len() / dimension;
    let cols = right.len() / dimension;

    out.clear();
    out.reserve(rows * cols);
    for l in left.chunks_exact(dimension) {
        out.extend(right.chunks_exact(dimension).map(|r| dot(l, r)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_dot_matches_scalar() {
        for len in [1usize, 2, 7, 8, 9, 16, 31, 128] {
            let a: Vec<f32> = (0..len).map(|i| (i as f32 * 0.37).sin()).collect();
            let b: Vec<f32> = (0..len).map(|i| (i as f32 * 0.11).cos()).collect();
            let diff = (dot(&a, &b) - scalar_dot(&a, &b)).abs();
            assert!(diff < 1e-4, "len {len}: diff {diff}");
        }
    }

    #[test]
    fn test_dot_empty() {
        assert_eq!(dot(&[], &[]), 0.0);
    }

    #[test]
    fn test_dot_matrix_layout() {
        // two left vectors, three right vectors, dimension 2
        let left = [1.0, 0.0, 0.0, 2.0];
        let right = [3.0, 4.0, 5.0, 6.0, -1.0, 1.0];
        let mut out = Vec::new();
        dot_matrix(&left, &right, 2, &mut out);
        assert_eq!(out, vec![3.0, 5.0, -1.0, 8.0, 12.0, 2.0]);
    }
}
