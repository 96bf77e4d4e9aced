//! Internet checksum (RFC 1071).

/// Compute the one's-complement 16-bit checksum of `buffer`.
///
/// The buffer is summed as big-endian 16-bit words; a trailing odd byte is
/// padded with zero. Carries are folded back until none remain.
pub fn checksum(buffer: &[u8]) -> u16 {
    !fold(sum_words(buffer))
}

/// True when `buffer`, which already contains its own checksum field, sums
/// to all ones.
pub fn verify(buffer: &[u8]) -> bool {
    checksum(buffer) == 0
}

/// Sum of the big-endian 16-bit words of `buffer`, unfolded.
pub(crate) fn sum_words(buffer: &[u8]) -> u64 {
    let mut chunks = buffer.chunks_exact(2);
    let mut sum: u64 = chunks
        .by_ref()
        .map(|pair| u64::from(u16::from_be_bytes([pair[0], pair[1]])))
        .sum();
    if let [last] = chunks.remainder() {
        sum += u64::from(*last) << 8;
    }
    sum
}

/// Fold carries into the low 16 bits until none remain.
pub(crate) fn fold(mut sum: u64) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}
