//! Tensor-to-texture packing.
//!
//! A flattened tensor of `n` elements becomes a 2D texture of
//! `width * height >= n` texels, with both dimensions capped by the
//! device's maximum texture size.

/// Compute safe 2D texture dimensions for a flattened tensor.
///
/// Returns `(n, 1)` while a single row fits. Otherwise scans row counts
/// from 2 upward and takes the first exact divisor whose quotient fits,
/// so `width * height == n` whenever a factorisation exists.
///
/// If no divisor works (e.g. a large prime), falls back to `(n, 1)` and
/// warns: the resulting width exceeds `max_dim`, the texture ends up
/// under-sized, and whatever samples past the end reads garbage. Callers
/// that cannot tolerate that must check the returned width themselves.
pub fn pack(elements: usize, max_dim: u32) -> (u32, u32) {
    let max = max_dim as usize;
    if elements <= max {
        return (elements as u32, 1);
    }

    for rows in 2..=max {
        if elements % rows == 0 && elements / rows <= max {
            return ((elements / rows) as u32, rows as u32);
        }
    }

    log::warn!(
        "no 2D factorisation of {elements} elements fits within {max_dim}; \
         falling back to a single row"
    );
    (elements as u32, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_row_when_it_fits() {
        assert_eq!(pack(1, 8192), (1, 1));
        assert_eq!(pack(1000, 8192), (1000, 1));
        assert_eq!(pack(8192, 8192), (8192, 1));
    }

    #[test]
    fn first_divisor_wins() {
        // 12 over a max of 4: rows=2 gives width 6 (too wide), rows=3 fits.
        assert_eq!(pack(12, 4), (4, 3));
        // 16384 over 8192: rows=2 is already exact.
        assert_eq!(pack(16384, 8192), (8192, 2));
        // 24576 = 8192 * 3: rows=2 gives 12288 (too wide), rows=3 fits.
        assert_eq!(pack(24576, 8192), (8192, 3));
    }

    #[test]
    fn factorisations_are_exact() {
        for n in [401_408usize, 1_204_224, 150_528, 62_720, 12544] {
            let (w, h) = pack(n, 8192);
            assert_eq!(w as usize * h as usize, n, "n = {n}");
            assert!(w <= 8192 && h <= 8192, "n = {n}");
        }
    }

    #[test]
    fn prime_falls_back_to_single_row() {
        // 8209 is prime, so nothing in 2..=8192 divides it.
        assert_eq!(pack(8209, 8192), (8209, 1));
    }
}
