//! CRC-32 matching the bootloader's image check
//!
//! Bit-serial form of the reflected CRC-32 (polynomial 0x04C11DB7,
//! initial value 0xFFFF_FFFF, reflected result, final inversion). The
//! bootloader computes it MSB-first on bit-reversed bytes, which yields the
//! same value as the usual reflected table-driven variant.

const POLYNOMIAL: u32 = 0x04C1_1DB7;
const INITIAL: u32 = 0xFFFF_FFFF;

/// Compute the CRC-32 of `data` in one call
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finalize()
}

/// Incremental CRC-32, for images that arrive in pieces
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    pub const fn new() -> Self {
        Self { state: INITIAL }
    }

    /// Feed more bytes
    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.state;
        for &byte in data {
            let mut bits = (byte as u32).reverse_bits();
            for _ in 0..8 {
                crc = if (crc ^ bits) & 0x8000_0000 != 0 {
                    (crc << 1) ^ POLYNOMIAL
                } else {
                    crc << 1
                };
                bits <<= 1;
            }
        }
        self.state = crc;
    }

    /// Final CRC value; the hasher can keep being updated afterwards
    pub fn finalize(&self) -> u32 {
        (!self.state).reverse_bits()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(crc32(b"a"), 0xE8B7_BE43);
        assert_eq!(
            crc32(b"The quick brown fox jumps over the lazy dog"),
            0x414F_A339
        );
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let image: [u8; 300] = core::array::from_fn(|i| (i * 7 + 3) as u8);
        let mut crc = Crc32::new();
        for chunk in image.chunks(37) {
            crc.update(chunk);
        }
        assert_eq!(crc.finalize(), crc32(&image));
    }
}
