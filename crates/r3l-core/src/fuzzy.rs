//! Locality-sensitive fuzzy hash (TLSH, 128 buckets, 1-byte checksum).
//!
//! Every 5-byte window feeds six Pearson-hashed byte triplets into 128
//! buckets. Bucket counts are quantised against their quartiles into a
//! 2-bit-per-bucket body; a header carries a checksum, a log-scaled length
//! and two quartile ratios. Distance between two hashes is 0 when they are
//! identical and grows with byte-level dissimilarity.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Inputs shorter than this produce no hash.
pub const MIN_DATA_LEN: usize = 50;

const BUCKETS: usize = 128;
const CODE_SIZE: usize = 32;
const WINDOW: usize = 5;
const HEX_LEN: usize = 2 + 2 * (3 + CODE_SIZE);

#[rustfmt::skip]
const PEARSON: [u8; 256] = [
    1, 87, 49, 12, 176, 178, 102, 166, 121, 193, 6, 84, 249, 230, 44, 163,
    14, 197, 213, 181, 161, 85, 218, 80, 64, 239, 24, 226, 236, 142, 38, 200,
    110, 177, 104, 103, 141, 253, 255, 50, 77, 101, 81, 18, 45, 96, 31, 222,
    25, 107, 190, 70, 86, 237, 240, 34, 72, 242, 20, 214, 244, 227, 149, 235,
    97, 234, 57, 22, 60, 250, 82, 175, 208, 5, 127, 199, 111, 62, 135, 248,
    174, 169, 211, 58, 66, 154, 106, 195, 245, 171, 17, 187, 182, 179, 0, 243,
    132, 56, 148, 75, 128, 133, 158, 100, 130, 126, 91, 13, 153, 246, 216, 219,
    119, 68, 223, 78, 83, 88, 201, 99, 122, 11, 92, 32, 136, 114, 52, 10,
    138, 30, 48, 183, 156, 35, 61, 26, 143, 74, 251, 94, 129, 162, 63, 152,
    170, 7, 115, 167, 241, 206, 3, 150, 55, 59, 151, 220, 90, 53, 23, 131,
    125, 173, 15, 238, 79, 95, 89, 16, 105, 137, 225, 224, 217, 160, 37, 123,
    118, 73, 2, 157, 46, 116, 9, 145, 134, 228, 207, 212, 202, 215, 69, 229,
    27, 188, 67, 124, 168, 252, 42, 4, 29, 108, 21, 247, 19, 205, 39, 203,
    233, 40, 186, 147, 198, 192, 155, 33, 164, 191, 98, 204, 165, 180, 117, 76,
    140, 36, 210, 172, 41, 54, 159, 8, 185, 232, 113, 196, 231, 47, 146, 120,
    51, 65, 28, 144, 254, 221, 93, 189, 194, 139, 112, 43, 71, 109, 184, 209,
];

/// (salt, second, third) window positions; the first is always the newest byte.
const TRIPLETS: [(u8, usize, usize); 6] = [(2, 1, 2), (3, 1, 3), (5, 2, 3), (7, 2, 4), (11, 1, 4), (13, 3, 4)];

#[inline]
fn pearson(salt: u8, i: u8, j: u8, k: u8) -> u8 {
    let h = PEARSON[salt as usize];
    let h = PEARSON[(h ^ i) as usize];
    let h = PEARSON[(h ^ j) as usize];
    PEARSON[(h ^ k) as usize]
}

fn log_length(len: usize) -> u8 {
    let ln = (len as f64).ln();
    let v = if len <= 656 {
        (ln / 0.405_465_1).floor()
    } else if len <= 3199 {
        (ln / 0.262_364_26 - 8.727_77).floor()
    } else {
        (ln / 0.095_310_18 - 62.547_2).floor()
    };
    (v as i64 & 0xff) as u8
}

#[inline]
fn swap_nibbles(b: u8) -> u8 {
    b.rotate_left(4)
}

/// Distance on a ring of size `range`.
#[inline]
fn mod_diff(x: u8, y: u8, range: u32) -> u32 {
    let dl = (x as i32 - y as i32).unsigned_abs();
    dl.min(range - dl)
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FuzzyHashError {
    #[error("fuzzy hash must be {HEX_LEN} characters starting with T1")]
    Format,

    #[error("fuzzy hash is not hex: {0}")]
    Hex(String),
}

/// A computed fuzzy hash.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FuzzyHash {
    checksum: u8,
    lvalue: u8,
    q1_ratio: u8,
    q2_ratio: u8,
    code: [u8; CODE_SIZE],
}

impl FuzzyHash {
    /// Hash `data`. `None` when it is too short or too uniform to say anything.
    pub fn compute(data: &[u8]) -> Option<Self> {
        if data.len() < MIN_DATA_LEN {
            return None;
        }

        let mut buckets = [0u32; 256];
        let mut checksum = 0u8;
        for window in data.windows(WINDOW) {
            // newest byte first
            let w = [window[4], window[3], window[2], window[1], window[0]];
            checksum = pearson(0, w[0], w[1], checksum);
            for (salt, a, b) in TRIPLETS {
                buckets[pearson(salt, w[0], w[a], w[b]) as usize] += 1;
            }
        }

        let effective = &buckets[..BUCKETS];
        let mut sorted = [0u32; BUCKETS];
        sorted.copy_from_slice(effective);
        sorted.sort_unstable();
        let (q1, q2, q3) = (sorted[BUCKETS / 4 - 1], sorted[BUCKETS / 2 - 1], sorted[3 * BUCKETS / 4 - 1]);
        if q3 == 0 {
            return None;
        }
        let nonzero = effective.iter().filter(|c| **c > 0).count();
        if nonzero <= BUCKETS / 2 {
            return None;
        }

        let mut code = [0u8; CODE_SIZE];
        for (i, byte) in code.iter_mut().enumerate() {
            for j in 0..4 {
                let count = effective[4 * i + j];
                let level: u8 = if count > q3 {
                    3
                } else if count > q2 {
                    2
                } else if count > q1 {
                    1
                } else {
                    0
                };
                *byte |= level << (2 * j);
            }
        }

        Some(Self {
            checksum,
            lvalue: log_length(data.len()),
            q1_ratio: ((u64::from(q1) * 100 / u64::from(q3)) % 16) as u8,
            q2_ratio: ((u64::from(q2) * 100 / u64::from(q3)) % 16) as u8,
            code,
        })
    }

    /// Distance to `other`, length difference included. 0 means identical.
    pub fn distance(&self, other: &FuzzyHash) -> u32 {
        let mut diff = 0;

        let ldiff = mod_diff(self.lvalue, other.lvalue, 256);
        diff += if ldiff <= 1 { ldiff } else { ldiff * 12 };

        for (a, b) in [(self.q1_ratio, other.q1_ratio), (self.q2_ratio, other.q2_ratio)] {
            let q = mod_diff(a, b, 16);
            diff += if q <= 1 { q } else { (q - 1) * 12 };
        }

        if self.checksum != other.checksum {
            diff += 1;
        }

        for (x, y) in self.code.iter().zip(other.code.iter()) {
            for j in 0..4 {
                let a = (x >> (2 * j)) & 0b11;
                let b = (y >> (2 * j)) & 0b11;
                diff += match a.abs_diff(b) {
                    3 => 6,
                    d => u32::from(d),
                };
            }
        }
        diff
    }
}

/// Distance between two encoded hashes. `None` if either fails to parse.
pub fn distance(a: &str, b: &str) -> Option<u32> {
    let a: FuzzyHash = a.parse().ok()?;
    let b: FuzzyHash = b.parse().ok()?;
    Some(a.distance(&b))
}

/// Hash `data` straight to its text form.
pub fn hash(data: &[u8]) -> Option<String> {
    FuzzyHash::compute(data).map(|h| h.to_string())
}

impl fmt::Display for FuzzyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = Vec::with_capacity(3 + CODE_SIZE);
        raw.push(swap_nibbles(self.checksum));
        raw.push(swap_nibbles(self.lvalue));
        raw.push((self.q1_ratio << 4) | self.q2_ratio);
        raw.extend(self.code.iter().rev());
        write!(f, "T1{}", hex::encode_upper(raw))
    }
}

impl fmt::Debug for FuzzyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FuzzyHash({self})")
    }
}

impl FromStr for FuzzyHash {
    type Err = FuzzyHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix("T1")
            .filter(|_| s.len() == HEX_LEN)
            .ok_or(FuzzyHashError::Format)?;
        let raw = hex::decode(body).map_err(|e| FuzzyHashError::Hex(e.to_string()))?;

        let mut code = [0u8; CODE_SIZE];
        for (dst, src) in code.iter_mut().zip(raw[3..].iter().rev()) {
            *dst = *src;
        }
        Ok(Self {
            checksum: swap_nibbles(raw[0]),
            lvalue: swap_nibbles(raw[1]),
            q1_ratio: raw[2] >> 4,
            q2_ratio: raw[2] & 0x0f,
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lcg(len: usize, seed: u32) -> Vec<u8> {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345) & 0x7fff_ffff;
                ((x >> 16) & 0xff) as u8
            })
            .collect()
    }

    fn perturbed() -> Vec<u8> {
        let mut data = lcg(1000, 42);
        for i in (0..1000).step_by(50) {
            data[i] ^= 0xff;
        }
        data
    }

    #[test]
    fn test_known_hashes() {
        assert_eq!(
            hash(&lcg(1000, 42)).unwrap(),
            "T12911A542120B68C1A45A9DF709CF8C22C13CB116E8AF2D54B27058221E7C6887705135"
        );
        assert_eq!(
            hash(&perturbed()).unwrap(),
            "T1BA116182110A78C6A45A99F75ACF9C638139B566E8AE1CA8B27059221E7D688B301135"
        );
        assert_eq!(
            hash(&lcg(4000, 7)).unwrap(),
            "T173815D2364D5C6BD34D8E9FC13793F15A429BA1E6761841F849A5E04E23FD0FCA671A0"
        );
    }

    #[test]
    fn test_known_distances() {
        let a = hash(&lcg(1000, 42)).unwrap();
        let b = hash(&perturbed()).unwrap();
        let c = hash(&lcg(4000, 7)).unwrap();
        assert_eq!(distance(&a, &a), Some(0));
        assert_eq!(distance(&a, &b), Some(103));
        assert_eq!(distance(&a, &c), Some(430));
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = hash(&lcg(1000, 42)).unwrap();
        let c = hash(&lcg(4000, 7)).unwrap();
        assert_eq!(distance(&a, &c), distance(&c, &a));
    }

    #[test]
    fn test_short_or_uniform_input_has_no_hash() {
        assert_eq!(hash(&lcg(MIN_DATA_LEN - 1, 1)), None);
        assert_eq!(hash(&[b'a'; 100]), None);
    }

    #[test]
    fn test_text_hash_length() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(10);
        let h = hash(text.as_bytes()).unwrap();
        assert_eq!(h, "T1C3F0024A311C1794658A1888438D95B2D2C9C910612114116570604219482359CD8551");
        assert_eq!(h.len(), HEX_LEN);
    }

    #[test]
    fn test_parse_roundtrip() {
        let h = FuzzyHash::compute(&lcg(2000, 3)).unwrap();
        let parsed: FuzzyHash = h.to_string().parse().unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!("TNULL".parse::<FuzzyHash>(), Err(FuzzyHashError::Format));
        let bad = format!("T1{}", "ZZ".repeat(35));
        assert!(matches!(bad.parse::<FuzzyHash>(), Err(FuzzyHashError::Hex(_))));
        assert_eq!(distance("T1", "T1"), None);
    }

    #[test]
    fn test_log_length_buckets() {
        assert_eq!(log_length(100), 11);
        assert_eq!(log_length(1000), 17);
        assert_eq!(log_length(5000), 26);
    }
}
