//! CESR primitive codec: qualified Base64 (qb64) and binary (qb2) forms of
//! typed cryptographic material with a derivation code prefix.
//!
//! The [`Matter`] record is the single discriminated representation of all
//! primitive material; the code drives raw/qb64 lengths through the
//! [`Sizage`] table. Typed wrappers (Diger, Verfer, ...) add domain methods
//! on top without a class hierarchy.

pub mod cigar;
pub mod counting;
pub mod dater;
pub mod diger;
pub mod indexing;
pub mod number;
pub mod prefixer;
pub mod saider;
pub mod seqner;
pub mod signer;
pub mod tholder;
pub mod verfer;

use crate::errors::{MatterError, MatterResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use num_bigint::BigUint;
use num_traits::cast::ToPrimitive;
use num_traits::Zero;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Base64URL alphabet in index order.
pub const B64_CHARS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Returns the Base64URL index of a character, if valid.
pub fn b64_index(c: u8) -> Option<u8> {
    match c {
        b'A'..=b'Z' => Some(c - b'A'),
        b'a'..=b'z' => Some(c - b'a' + 26),
        b'0'..=b'9' => Some(c - b'0' + 52),
        b'-' => Some(62),
        b'_' => Some(63),
        _ => None,
    }
}

/// Converts Base64URL chars to their integer value.
pub fn b64_to_big(s: &str) -> MatterResult<BigUint> {
    let mut i = BigUint::zero();
    for c in s.bytes() {
        let v = b64_index(c)
            .ok_or_else(|| MatterError::Conversion(format!("Invalid Base64 char={}", c as char)))?;
        i = (i << 6u8) + BigUint::from(v);
    }
    Ok(i)
}

/// Converts Base64URL chars to u64. Errors if the value overflows.
pub fn b64_to_int(s: &str) -> MatterResult<u64> {
    b64_to_big(s)?
        .to_u64()
        .ok_or_else(|| MatterError::Conversion(format!("Base64 value too large: {}", s)))
}

/// Converts an integer to Base64URL chars of exactly `l` characters.
pub fn int_to_b64(i: u64, l: usize) -> String {
    let mut chars = vec![b'A'; l];
    let mut v = i;
    for k in (0..l).rev() {
        chars[k] = B64_CHARS[(v & 0x3f) as usize];
        v >>= 6;
    }
    String::from_utf8(chars).expect("b64 alphabet is ascii")
}

/// Extracts the first `l` sextet values (0..=63) from qb2 bytes.
pub fn nab_sextets(qb2: &[u8], l: usize) -> MatterResult<Vec<u8>> {
    let n = (l * 6 + 7) / 8;
    if qb2.len() < n {
        return Err(MatterError::Shortage(format!(
            "Need {} more bytes for {} sextets.",
            n - qb2.len(),
            l
        )));
    }
    let mut i = BigUint::zero();
    for b in &qb2[..n] {
        i = (i << 8u8) + BigUint::from(*b);
    }
    i >>= n * 8 - l * 6;
    let mut out = vec![0u8; l];
    for k in (0..l).rev() {
        out[k] = (&i & BigUint::from(0x3fu8)).to_u8().unwrap_or(0);
        i >>= 6u8;
    }
    Ok(out)
}

/// Converts the first `l` sextets of qb2 bytes back to Base64URL chars.
pub fn code_b2_to_b64(qb2: &[u8], l: usize) -> MatterResult<String> {
    let sextets = nab_sextets(qb2, l)?;
    Ok(sextets
        .iter()
        .map(|&v| B64_CHARS[v as usize] as char)
        .collect())
}

/// Converts Base64URL code chars to left-aligned qb2 bytes.
pub fn code_b64_to_b2(s: &str) -> MatterResult<Vec<u8>> {
    let i = b64_to_big(s)?;
    let n = (s.len() * 3 + 3) / 4;
    let shifted = i << (2 * (s.len() % 4)) as u8;
    let mut bytes = shifted.to_bytes_be();
    while bytes.len() < n {
        bytes.insert(0, 0);
    }
    Ok(bytes)
}

/// Derivation codes for Matter primitives.
#[allow(dead_code)]
pub mod mtr_dex {
    pub const ED25519_SEED: &str = "A"; // Ed25519 256 bit random seed for private key
    pub const ED25519N: &str = "B"; // Ed25519 verification key non-transferable, basic derivation
    pub const X25519: &str = "C"; // X25519 public encryption key
    pub const ED25519: &str = "D"; // Ed25519 verification key basic derivation
    pub const BLAKE3_256: &str = "E"; // Blake3 256 bit digest self-addressing derivation
    pub const BLAKE2B_256: &str = "F"; // Blake2b 256 bit digest self-addressing derivation
    pub const BLAKE2S_256: &str = "G"; // Blake2s 256 bit digest self-addressing derivation
    pub const SHA3_256: &str = "H"; // SHA3 256 bit digest self-addressing derivation
    pub const SHA2_256: &str = "I"; // SHA2 256 bit digest self-addressing derivation
    pub const ECDSA_256K1_SEED: &str = "J"; // ECDSA secp256k1 256 bit random seed for private key
    pub const SHORT: &str = "M"; // Short 2 byte b2 number
    pub const BIG: &str = "N"; // Big 8 byte b2 number
    pub const ECDSA_256R1_SEED: &str = "Q"; // ECDSA secp256r1 256 bit random seed for private key
    pub const TAG3: &str = "X"; // Tag3 3 B64 encoded chars for special values
    pub const SALT_128: &str = "0A"; // 128 bit random salt or seed or nonce
    pub const ED25519_SIG: &str = "0B"; // Ed25519 signature
    pub const ECDSA_256K1_SIG: &str = "0C"; // ECDSA secp256k1 signature
    pub const BLAKE3_512: &str = "0D"; // Blake3 512 bit digest self-addressing derivation
    pub const BLAKE2B_512: &str = "0E"; // Blake2b 512 bit digest self-addressing derivation
    pub const SHA3_512: &str = "0F"; // SHA3 512 bit digest self-addressing derivation
    pub const SHA2_512: &str = "0G"; // SHA2 512 bit digest self-addressing derivation
    pub const LONG: &str = "0H"; // Long 4 byte b2 number
    pub const ECDSA_256R1_SIG: &str = "0I"; // ECDSA secp256r1 signature
    pub const ECDSA_256K1N: &str = "1AAA"; // ECDSA secp256k1 verification key non-transferable
    pub const ECDSA_256K1: &str = "1AAB"; // ECDSA secp256k1 verification key, basic derivation
    pub const DATE_TIME: &str = "1AAG"; // Base64 custom encoded 32 char ISO-8601 DateTime
    pub const ECDSA_256R1N: &str = "1AAI"; // ECDSA secp256r1 verification key non-transferable
    pub const ECDSA_256R1: &str = "1AAJ"; // ECDSA secp256r1 verification key, basic derivation
    pub const BYTES_L0: &str = "4B"; // Byte string lead size 0
    pub const BYTES_L1: &str = "5B"; // Byte string lead size 1
    pub const BYTES_L2: &str = "6B"; // Byte string lead size 2
}

/// Codex of all digest derivation codes. Needed to verify self-addressing
/// derivations. Only provides defined codes.
pub mod dig_dex {
    use super::mtr_dex;

    pub static TUPLE: [&str; 9] = [
        mtr_dex::BLAKE3_256,
        mtr_dex::BLAKE2B_256,
        mtr_dex::BLAKE2S_256,
        mtr_dex::SHA3_256,
        mtr_dex::SHA2_256,
        mtr_dex::BLAKE3_512,
        mtr_dex::BLAKE2B_512,
        mtr_dex::SHA3_512,
        mtr_dex::SHA2_512,
    ];
}

/// Codex of all identifier prefix derivation codes. Needed to verify valid
/// inception events.
pub mod pre_dex {
    use super::mtr_dex;

    pub static TUPLE: [&str; 15] = [
        mtr_dex::ED25519N,
        mtr_dex::ED25519,
        mtr_dex::BLAKE3_256,
        mtr_dex::BLAKE2B_256,
        mtr_dex::BLAKE2S_256,
        mtr_dex::SHA3_256,
        mtr_dex::SHA2_256,
        mtr_dex::BLAKE3_512,
        mtr_dex::BLAKE2B_512,
        mtr_dex::SHA3_512,
        mtr_dex::SHA2_512,
        mtr_dex::ECDSA_256K1N,
        mtr_dex::ECDSA_256K1,
        mtr_dex::ECDSA_256R1N,
        mtr_dex::ECDSA_256R1,
    ];
}

/// Codex of all non-transferable derivation codes.
pub mod non_trans_dex {
    use super::mtr_dex;

    pub static TUPLE: [&str; 3] = [
        mtr_dex::ED25519N,
        mtr_dex::ECDSA_256K1N,
        mtr_dex::ECDSA_256R1N,
    ];
}

/// Size table entry for a derivation code.
///
/// hs = hard size, ss = soft size, xs = extra prepad within soft,
/// fs = full size (None when variable sized), ls = lead byte size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sizage {
    pub hs: usize,
    pub ss: usize,
    pub xs: usize,
    pub fs: Option<usize>,
    pub ls: usize,
}

const fn sz(hs: usize, ss: usize, xs: usize, fs: Option<usize>, ls: usize) -> Sizage {
    Sizage { hs, ss, xs, fs, ls }
}

/// Size table keyed by hard code.
pub static SIZES: Lazy<HashMap<&'static str, Sizage>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(mtr_dex::ED25519_SEED, sz(1, 0, 0, Some(44), 0));
    m.insert(mtr_dex::ED25519N, sz(1, 0, 0, Some(44), 0));
    m.insert(mtr_dex::X25519, sz(1, 0, 0, Some(44), 0));
    m.insert(mtr_dex::ED25519, sz(1, 0, 0, Some(44), 0));
    m.insert(mtr_dex::BLAKE3_256, sz(1, 0, 0, Some(44), 0));
    m.insert(mtr_dex::BLAKE2B_256, sz(1, 0, 0, Some(44), 0));
    m.insert(mtr_dex::BLAKE2S_256, sz(1, 0, 0, Some(44), 0));
    m.insert(mtr_dex::SHA3_256, sz(1, 0, 0, Some(44), 0));
    m.insert(mtr_dex::SHA2_256, sz(1, 0, 0, Some(44), 0));
    m.insert(mtr_dex::ECDSA_256K1_SEED, sz(1, 0, 0, Some(44), 0));
    m.insert(mtr_dex::SHORT, sz(1, 0, 0, Some(4), 0));
    m.insert(mtr_dex::BIG, sz(1, 0, 0, Some(12), 0));
    m.insert(mtr_dex::ECDSA_256R1_SEED, sz(1, 0, 0, Some(44), 0));
    m.insert(mtr_dex::TAG3, sz(1, 3, 0, Some(4), 0));
    m.insert(mtr_dex::SALT_128, sz(2, 0, 0, Some(24), 0));
    m.insert(mtr_dex::ED25519_SIG, sz(2, 0, 0, Some(88), 0));
    m.insert(mtr_dex::ECDSA_256K1_SIG, sz(2, 0, 0, Some(88), 0));
    m.insert(mtr_dex::BLAKE3_512, sz(2, 0, 0, Some(88), 0));
    m.insert(mtr_dex::BLAKE2B_512, sz(2, 0, 0, Some(88), 0));
    m.insert(mtr_dex::SHA3_512, sz(2, 0, 0, Some(88), 0));
    m.insert(mtr_dex::SHA2_512, sz(2, 0, 0, Some(88), 0));
    m.insert(mtr_dex::LONG, sz(2, 0, 0, Some(8), 0));
    m.insert(mtr_dex::ECDSA_256R1_SIG, sz(2, 0, 0, Some(88), 0));
    m.insert(mtr_dex::ECDSA_256K1N, sz(4, 0, 0, Some(48), 0));
    m.insert(mtr_dex::ECDSA_256K1, sz(4, 0, 0, Some(48), 0));
    m.insert(mtr_dex::DATE_TIME, sz(4, 0, 0, Some(36), 0));
    m.insert(mtr_dex::ECDSA_256R1N, sz(4, 0, 0, Some(48), 0));
    m.insert(mtr_dex::ECDSA_256R1, sz(4, 0, 0, Some(48), 0));
    m.insert(mtr_dex::BYTES_L0, sz(2, 2, 0, None, 0));
    m.insert(mtr_dex::BYTES_L1, sz(2, 2, 0, None, 1));
    m.insert(mtr_dex::BYTES_L2, sz(2, 2, 0, None, 2));
    m
});

/// Map of first code character to hard code size.
pub static HARDS: Lazy<HashMap<u8, usize>> = Lazy::new(|| {
    let mut m: HashMap<u8, usize> = (b'A'..=b'Z').map(|c| (c, 1)).collect();
    m.extend((b'a'..=b'z').map(|c| (c, 1)));
    m.extend([
        (b'0', 2),
        (b'1', 4),
        (b'2', 4),
        (b'3', 4),
        (b'4', 2),
        (b'5', 2),
        (b'6', 2),
        (b'7', 4),
        (b'8', 4),
        (b'9', 4),
    ]);
    m
});

/// Returns the raw byte size for a fixed size derivation code.
pub fn raw_size(code: &str) -> MatterResult<usize> {
    let size = SIZES
        .get(code)
        .ok_or_else(|| MatterError::InvalidCode(format!("Unsupported code={}", code)))?;
    let fs = size.fs.ok_or_else(|| {
        MatterError::InvalidVarRawSize(format!("Variable sized code={}", code))
    })?;
    let cs = size.hs + size.ss;
    Ok(((fs - cs) * 3) / 4 - size.ls)
}

/// Fully qualified cryptographic material.
///
/// Holds the hard derivation code, the soft (count/special) chars if any, and
/// the raw bytes. Conversions between raw, qb64 and qb2 domains are total and
/// round-trip for every supported code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matter {
    code: String,
    soft: String,
    raw: Vec<u8>,
}

impl Matter {
    /// Creates Matter from raw bytes and a fixed size code.
    pub fn new(raw: &[u8], code: &str) -> MatterResult<Self> {
        Self::new_sized(raw, code, None)
    }

    /// Creates Matter from raw bytes and a code, with explicit raw size for
    /// variable sized codes.
    pub fn new_sized(raw: &[u8], code: &str, rize: Option<usize>) -> MatterResult<Self> {
        if code.is_empty() {
            return Err(MatterError::EmptyMaterial(
                "Improper initialization, need raw and code".to_string(),
            ));
        }
        let size = *SIZES
            .get(code)
            .ok_or_else(|| MatterError::InvalidCode(format!("Unsupported code={}", code)))?;

        if size.fs.is_none() {
            // Variable sized code: lead size selector in first char
            let rize = rize.unwrap_or(raw.len());
            if raw.len() < rize {
                return Err(MatterError::RawMaterial(format!(
                    "Not enough raw bytes for code={} expected {} got {}",
                    code,
                    rize,
                    raw.len()
                )));
            }
            let ls = (3 - (rize % 3)) % 3;
            let triplets = (rize + ls) / 3;
            if triplets > 64usize.pow(2) - 1 {
                return Err(MatterError::InvalidVarRawSize(format!(
                    "Unsupported raw size for code={}",
                    code
                )));
            }
            let selector = match ls {
                0 => "4",
                1 => "5",
                _ => "6",
            };
            let code = format!("{}{}", selector, &code[1..size.hs]);
            let soft = int_to_b64(triplets as u64, size.ss);
            return Ok(Matter {
                code,
                soft,
                raw: raw[..rize].to_vec(),
            });
        }

        if size.ss > 0 {
            return Err(MatterError::InvalidSoft(format!(
                "Code={} requires soft part, use new_soft",
                code
            )));
        }

        let rize = raw_size(code)?;
        if raw.len() < rize {
            return Err(MatterError::RawMaterial(format!(
                "Not enough raw bytes for code={} expected {} got {}",
                code,
                rize,
                raw.len()
            )));
        }
        Ok(Matter {
            code: code.to_string(),
            soft: String::new(),
            raw: raw[..rize].to_vec(),
        })
    }

    /// Creates Matter with a special soft value and empty raw (tag codes).
    pub fn new_soft(code: &str, soft: &str) -> MatterResult<Self> {
        let size = *SIZES
            .get(code)
            .ok_or_else(|| MatterError::InvalidCode(format!("Unsupported code={}", code)))?;
        if size.ss == 0 || size.fs.is_none() {
            return Err(MatterError::InvalidSoft(format!(
                "Invalid soft size={} for code={}",
                size.ss, code
            )));
        }
        let want = size.ss - size.xs;
        if soft.len() < want {
            return Err(MatterError::InvalidSoft(format!(
                "Not enough chars in soft={} with ss={} xs={} for code={}",
                soft, size.ss, size.xs, code
            )));
        }
        let soft = &soft[..want];
        if !soft.bytes().all(|c| b64_index(c).is_some()) {
            return Err(MatterError::InvalidSoft(format!(
                "Non Base64 chars in soft={}",
                soft
            )));
        }
        Ok(Matter {
            code: code.to_string(),
            soft: soft.to_string(),
            raw: Vec::new(),
        })
    }

    /// Creates Matter from a qb64 string. Trailing text beyond the primitive
    /// is ignored.
    pub fn from_qb64(qb64: &str) -> MatterResult<Self> {
        Ok(Self::decode(qb64.as_bytes())?.0)
    }

    /// Creates Matter from qb64 bytes. Trailing bytes beyond the primitive
    /// are ignored.
    pub fn from_qb64b(qb64b: &[u8]) -> MatterResult<Self> {
        Ok(Self::decode(qb64b)?.0)
    }

    /// Decodes one primitive from the front of `qb64b` without mutating it.
    /// Returns the Matter and the count of bytes consumed.
    pub fn decode(qb64b: &[u8]) -> MatterResult<(Self, usize)> {
        if qb64b.is_empty() {
            return Err(MatterError::EmptyMaterial(
                "Empty material, need more characters.".to_string(),
            ));
        }
        let first = qb64b[0];
        let hs = match HARDS.get(&first) {
            Some(hs) => *hs,
            None => {
                return if first == b'-' {
                    Err(MatterError::UnexpectedCountCode(
                        "Unexpected count code start while extracting Matter.".to_string(),
                    ))
                } else if first == b'_' {
                    Err(MatterError::UnexpectedOpCode(
                        "Unexpected op code start while extracting Matter.".to_string(),
                    ))
                } else {
                    Err(MatterError::UnexpectedCode(format!(
                        "Unsupported code start char={}",
                        first as char
                    )))
                }
            }
        };
        if qb64b.len() < hs {
            return Err(MatterError::Shortage(format!(
                "Need {} more characters.",
                hs - qb64b.len()
            )));
        }
        let hard = std::str::from_utf8(&qb64b[..hs])
            .map_err(|_| MatterError::Conversion("Non UTF-8 code chars".to_string()))?;
        let size = *SIZES
            .get(hard)
            .ok_or_else(|| MatterError::UnexpectedCode(format!("Unsupported code={}", hard)))?;
        let cs = size.hs + size.ss;
        if qb64b.len() < cs {
            return Err(MatterError::Shortage(format!(
                "Need {} more characters.",
                cs - qb64b.len()
            )));
        }
        let soft_all = std::str::from_utf8(&qb64b[hs..cs])
            .map_err(|_| MatterError::Conversion("Non UTF-8 soft chars".to_string()))?;
        let xtra = &soft_all[..size.xs];
        let soft = &soft_all[size.xs..];
        if xtra != "A".repeat(size.xs) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid prepad xtra={}",
                xtra
            )));
        }
        let fs = match size.fs {
            Some(fs) => fs,
            None => (b64_to_int(soft)? as usize) * 4 + cs,
        };
        if qb64b.len() < fs {
            return Err(MatterError::Shortage(format!(
                "Need {} more characters.",
                fs - qb64b.len()
            )));
        }
        // Prepad with ps 'A's so the b64 payload decodes on a 24 bit boundary
        let ps = cs % 4;
        let mut base = vec![b'A'; ps];
        base.extend_from_slice(&qb64b[cs..fs]);
        let paw = URL_SAFE_NO_PAD
            .decode(&base)
            .map_err(|e| MatterError::Conversion(format!("Base64 decode error: {}", e)))?;
        let mid = &paw[..ps + size.ls];
        if mid.iter().any(|&b| b != 0) {
            return Err(MatterError::Conversion(format!(
                "Nonzero midpad bytes={:02x?}.",
                mid
            )));
        }
        let raw = paw[ps + size.ls..].to_vec();
        if raw.len() != ((fs - cs) * 3) / 4 - size.ls {
            return Err(MatterError::Conversion(
                "Improperly qualified material".to_string(),
            ));
        }
        Ok((
            Matter {
                code: hard.to_string(),
                soft: soft.to_string(),
                raw,
            },
            fs,
        ))
    }

    /// Decodes one primitive from the front of a mutable buffer and removes
    /// the consumed bytes in place.
    pub fn strip(buf: &mut Vec<u8>) -> MatterResult<Self> {
        let (matter, consumed) = Self::decode(buf)?;
        buf.drain(..consumed);
        Ok(matter)
    }

    /// Creates Matter from fully qualified binary (qb2) bytes.
    pub fn from_qb2(qb2: &[u8]) -> MatterResult<Self> {
        if qb2.is_empty() {
            return Err(MatterError::EmptyMaterial(
                "Empty material, need more bytes.".to_string(),
            ));
        }
        let first = nab_sextets(qb2, 1)?[0];
        let first_char = B64_CHARS[first as usize];
        let hs = match HARDS.get(&first_char) {
            Some(hs) => *hs,
            None => {
                return if first == 62 {
                    Err(MatterError::UnexpectedCountCode(
                        "Unexpected count code start while extracting Matter.".to_string(),
                    ))
                } else if first == 63 {
                    Err(MatterError::UnexpectedOpCode(
                        "Unexpected op code start while extracting Matter.".to_string(),
                    ))
                } else {
                    Err(MatterError::UnexpectedCode(format!(
                        "Unsupported code start sextet={:#x}",
                        first
                    )))
                }
            }
        };
        let hard = code_b2_to_b64(qb2, hs)?;
        let size = *SIZES
            .get(hard.as_str())
            .ok_or_else(|| MatterError::UnexpectedCode(format!("Unsupported code={}", hard)))?;
        let cs = size.hs + size.ss;
        let both = code_b2_to_b64(qb2, cs)?;
        let soft = both[hs..].to_string();
        let fs = match size.fs {
            Some(fs) => fs,
            None => (b64_to_int(&soft)? as usize) * 4 + cs,
        };
        let bcs = (cs * 3 + 3) / 4;
        let bfs = (fs * 3 + 3) / 4;
        if qb2.len() < bfs {
            return Err(MatterError::Shortage(format!(
                "Need {} more bytes.",
                bfs - qb2.len()
            )));
        }
        // Code mid pad bits must be zero
        let pbs = 2 * (cs % 4);
        if pbs > 0 {
            let mask = (1u8 << pbs) - 1;
            if qb2[bcs - 1] & mask != 0 {
                return Err(MatterError::Conversion(format!(
                    "Nonzero code mid pad bits=0b{:0width$b}.",
                    qb2[bcs - 1] & mask,
                    width = pbs
                )));
            }
        }
        if size.ls > 0 && qb2[bcs..bcs + size.ls].iter().any(|&b| b != 0) {
            return Err(MatterError::Conversion(
                "Nonzero lead midpad bytes.".to_string(),
            ));
        }
        let raw = qb2[bcs + size.ls..bfs].to_vec();
        Ok(Matter {
            code: hard,
            soft,
            raw,
        })
    }

    /// Hard part of the derivation code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Soft part of the code, empty unless the code carries one.
    pub fn soft(&self) -> &str {
        &self.soft
    }

    /// Raw crypto material without derivation code.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Fully qualified Base64 representation.
    pub fn qb64(&self) -> String {
        String::from_utf8(self.infil()).expect("qb64 is ascii")
    }

    /// Fully qualified Base64 representation as bytes.
    pub fn qb64b(&self) -> Vec<u8> {
        self.infil()
    }

    /// Fully qualified binary representation.
    pub fn qb2(&self) -> Vec<u8> {
        self.binfil()
    }

    /// Total qb64 length of this primitive.
    pub fn full_size(&self) -> usize {
        let size = SIZES[self.code.as_str()];
        match size.fs {
            Some(fs) => fs,
            None => {
                let cs = size.hs + size.ss;
                cs + ((self.raw.len() + size.ls) * 4) / 3
            }
        }
    }

    pub fn is_transferable(&self) -> bool {
        !non_trans_dex::TUPLE.contains(&self.code.as_str())
    }

    pub fn is_digestive(&self) -> bool {
        dig_dex::TUPLE.contains(&self.code.as_str())
    }

    pub fn is_prefixive(&self) -> bool {
        pre_dex::TUPLE.contains(&self.code.as_str())
    }

    fn infil(&self) -> Vec<u8> {
        let size = SIZES[self.code.as_str()];
        let both = format!("{}{}", self.code, self.soft);
        let cs = size.hs + size.ss;
        let rs = self.raw.len();
        debug_assert_eq!(cs, both.len());

        let mut out = both.into_bytes();
        if size.fs.is_none() {
            // Variable sized: lead + raw already 24 bit aligned
            let mut padded = vec![0u8; size.ls];
            padded.extend_from_slice(&self.raw);
            out.extend_from_slice(URL_SAFE_NO_PAD.encode(&padded).as_bytes());
        } else {
            let ps = (3 - ((rs + size.ls) % 3)) % 3;
            debug_assert_eq!(ps, cs % 4);
            let mut padded = vec![0u8; ps + size.ls];
            padded.extend_from_slice(&self.raw);
            let encoded = URL_SAFE_NO_PAD.encode(&padded);
            out.extend_from_slice(&encoded.as_bytes()[ps..]);
        }
        out
    }

    fn binfil(&self) -> Vec<u8> {
        let size = SIZES[self.code.as_str()];
        let both = format!("{}{}", self.code, self.soft);
        let cs = size.hs + size.ss;
        let mut full = code_b64_to_b2(&both).unwrap_or_default();
        debug_assert_eq!(full.len(), (cs * 3 + 3) / 4);
        full.extend_from_slice(&vec![0u8; size.ls]);
        full.extend_from_slice(&self.raw);
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b64_helpers() {
        assert_eq!(int_to_b64(0, 1), "A");
        assert_eq!(int_to_b64(1, 2), "AB");
        assert_eq!(int_to_b64(63, 1), "_");
        assert_eq!(int_to_b64(64, 2), "BA");
        assert_eq!(b64_to_int("AB").unwrap(), 1);
        assert_eq!(b64_to_int("BA").unwrap(), 64);
        assert_eq!(b64_to_int("__").unwrap(), 4095);
    }

    #[test]
    fn test_matter_basic() {
        // missing code
        assert!(Matter::new(b"", "").is_err());

        let verkey = b"iN\x89Gi\xe6\xc3&~\x8bG|%\x90(L\xd6G\xddB\xef`\x07\xd2T\xfc\xe1\xcd.\x9b\xe4#";
        let matter = Matter::new(verkey, mtr_dex::ED25519N).unwrap();
        assert_eq!(matter.code(), mtr_dex::ED25519N);
        assert_eq!(matter.raw(), verkey);
        assert_eq!(matter.qb64(), "BGlOiUdp5sMmfotHfCWQKEzWR91C72AH0lT84c0um-Qj");
        assert!(!matter.is_transferable());
        assert!(!matter.is_digestive());
        assert!(matter.is_prefixive());
        assert_eq!(matter.full_size(), 44);

        let matter2 = Matter::from_qb64(&matter.qb64()).unwrap();
        assert_eq!(matter2.code(), mtr_dex::ED25519N);
        assert_eq!(matter2.raw(), verkey);

        let qb2 = matter.qb2();
        let matter3 = Matter::from_qb2(&qb2).unwrap();
        assert_eq!(matter3.code(), mtr_dex::ED25519N);
        assert_eq!(matter3.raw(), verkey);
        assert_eq!(matter3.qb64(), matter.qb64());

        let matter4 = Matter::new(verkey, mtr_dex::ED25519).unwrap();
        assert!(matter4.is_transferable());
        assert_eq!(matter4.qb64(), "DGlOiUdp5sMmfotHfCWQKEzWR91C72AH0lT84c0um-Qj");

        let dig = [0u8; 32];
        let matter5 = Matter::new(&dig, mtr_dex::BLAKE3_256).unwrap();
        assert!(matter5.is_digestive());
        assert!(matter5.is_prefixive());
    }

    #[test]
    fn test_matter_trailing_text_ignored() {
        let prefix = "BGlOiUdp5sMmfotHfCWQKEzWR91C72AH0lT84c0um-Qj";
        let both = format!("{}:mystuff/mypath/toresource?query=what#fragment", prefix);
        let matter = Matter::from_qb64(&both).unwrap();
        assert_eq!(matter.code(), mtr_dex::ED25519N);
        assert_eq!(matter.qb64(), prefix);
    }

    #[test]
    fn test_matter_decode_and_strip() {
        let pre = "DCuhyBcPZEZLK-fcw5tzHn2N46wRCG_ZOoeKtWTOunRA";
        let dig = "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ";
        let stream = format!("{}{}", pre, dig);

        let (m1, used) = Matter::decode(stream.as_bytes()).unwrap();
        assert_eq!(m1.qb64(), pre);
        assert_eq!(used, 44);

        let mut buf = stream.clone().into_bytes();
        let m1 = Matter::strip(&mut buf).unwrap();
        assert_eq!(m1.qb64(), pre);
        assert_eq!(buf.len(), 44);
        let m2 = Matter::strip(&mut buf).unwrap();
        assert_eq!(m2.qb64(), dig);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_matter_bad_starts() {
        match Matter::from_qb64("-AAB") {
            Err(MatterError::UnexpectedCountCode(_)) => (),
            other => panic!("expected count code error, got {:?}", other),
        }
        match Matter::from_qb64("_") {
            Err(MatterError::UnexpectedOpCode(_)) => (),
            other => panic!("expected op code error, got {:?}", other),
        }
        match Matter::from_qb64("%AAB") {
            Err(MatterError::UnexpectedCode(_)) => (),
            other => panic!("expected derivation error, got {:?}", other),
        }
        // known selector but unknown hard code
        assert!(Matter::from_qb64("ZAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").is_err());
    }

    #[test]
    fn test_matter_shortage() {
        let qb64 = "BGlOiUdp5sMmfotHfCWQKEzWR91C72AH0lT84c0um-Qj";
        match Matter::decode(&qb64.as_bytes()[..20]) {
            Err(MatterError::Shortage(_)) => (),
            other => panic!("expected shortage, got {:?}", other),
        }
    }

    #[test]
    fn test_matter_variable_sized() {
        let raw = b"abcdef";
        let matter = Matter::new_sized(raw, mtr_dex::BYTES_L0, None).unwrap();
        assert_eq!(matter.qb64(), "4BACYWJjZGVm");
        let m2 = Matter::from_qb64("4BACYWJjZGVm").unwrap();
        assert_eq!(m2.raw(), raw);
        assert_eq!(m2.code(), mtr_dex::BYTES_L0);

        let raw = b"abcde";
        let matter = Matter::new_sized(raw, mtr_dex::BYTES_L1, None).unwrap();
        assert_eq!(matter.qb64(), "5BACAGFiY2Rl");
        let m2 = Matter::from_qb64("5BACAGFiY2Rl").unwrap();
        assert_eq!(m2.raw(), raw);

        let raw = b"abcd";
        let matter = Matter::new_sized(raw, mtr_dex::BYTES_L2, None).unwrap();
        assert_eq!(matter.qb64(), "6BACAABhYmNk");
        let m2 = Matter::from_qb64("6BACAABhYmNk").unwrap();
        assert_eq!(m2.raw(), raw);
    }

    #[test]
    fn test_matter_special_soft() {
        let matter = Matter::new_soft(mtr_dex::TAG3, "icp").unwrap();
        assert_eq!(matter.qb64(), "Xicp");
        assert!(matter.raw().is_empty());
        let m2 = Matter::from_qb64("Xicp").unwrap();
        assert_eq!(m2.soft(), "icp");
        assert_eq!(m2.code(), mtr_dex::TAG3);
    }
}
