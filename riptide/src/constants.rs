//! Core constants shared across the crate.

/// Value of every sequence before anything has been claimed or published.
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Default ring buffer size (must be power of 2)
pub const DEFAULT_RING_BUFFER_SIZE: usize = 64 * 1024;

/// Cache line size for alignment (64 bytes on most CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

/// Alignment used for padded hot fields; two cache lines guards against
/// adjacent-line prefetching on modern Intel parts.
pub const PADDED_ALIGN: usize = 128;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_size_is_power_of_two() {
        assert!(DEFAULT_RING_BUFFER_SIZE.is_power_of_two());
    }

    #[test]
    fn test_pad_sizes_are_powers_of_two() {
        assert!(CACHE_LINE_SIZE.is_power_of_two());
        assert!(PADDED_ALIGN.is_power_of_two());
    }
}
