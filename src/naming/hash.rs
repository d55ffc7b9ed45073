//! MurmurHash64 and the 13-character token encoding used for generated names.
//!
//! The hash is the two-lane 32-bit MurmurHash2 64-bit variant that Azure
//! Resource Manager uses for `uniqueString()`, so tokens generated here match
//! the ones an ARM template would produce for the same inputs.

const C1: u32 = 0x239b_961b;
const C2: u32 = 0xab0e_9789;

/// Alphabet for token characters, indexed by 5-bit groups.
const TOKEN_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Number of characters in a token.
pub const TOKEN_LENGTH: usize = 13;

#[inline]
fn read_u32_le(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, b)| acc | (u32::from(*b) << (8 * i)))
}

#[inline]
fn mix_k1(k1: u32) -> u32 {
    k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline]
fn mix_k2(k2: u32) -> u32 {
    k2.wrapping_mul(C2).rotate_left(17).wrapping_mul(C1)
}

#[inline]
fn fmix(mut h: u32) -> u32 {
    h = (h ^ (h >> 16)).wrapping_mul(0x85eb_ca6b);
    h = (h ^ (h >> 13)).wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

/// Hash `data` with the given seed.
pub fn murmur_hash64(data: &[u8], seed: u32) -> u64 {
    let mut h1 = seed;
    let mut h2 = seed;

    let mut blocks = data.chunks_exact(8);
    for block in &mut blocks {
        let k1 = read_u32_le(&block[..4]);
        let k2 = read_u32_le(&block[4..]);

        h1 ^= mix_k1(k1);
        h1 = h1
            .rotate_left(19)
            .wrapping_add(h2)
            .wrapping_mul(5)
            .wrapping_add(0x561c_cd1b);

        h2 ^= mix_k2(k2);
        h2 = h2
            .rotate_left(13)
            .wrapping_add(h1)
            .wrapping_mul(5)
            .wrapping_add(0x0bca_a747);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let (low, high) = tail.split_at(tail.len().min(4));
        h1 ^= mix_k1(read_u32_le(low));
        if !high.is_empty() {
            h2 ^= mix_k2(read_u32_le(high));
        }
    }

    // Only the low 32 bits of the length take part, as in the reference.
    let len = data.len() as u32;
    h1 ^= len;
    h2 ^= len;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix(h1);
    h2 = fmix(h2);

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (u64::from(h2) << 32) | u64::from(h1)
}

/// Encode the top bits of `value` as a 13-character lowercase token.
///
/// Thirteen 5-bit groups cover 65 bits, so the last character only sees the
/// final 4 bits of the value followed by a zero.
pub fn base32_token(mut value: u64) -> String {
    let mut token = String::with_capacity(TOKEN_LENGTH);
    for _ in 0..TOKEN_LENGTH {
        token.push(TOKEN_ALPHABET[(value >> 59) as usize] as char);
        value <<= 5;
    }
    token
}
