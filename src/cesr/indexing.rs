//! Indexed signatures: a signature Matter carrying the index of its signing
//! key in the current key list, and for establishment events optionally the
//! ondex of the duplicate entry in the prior next key list.

use crate::cesr::verfer::Verfer;
use crate::cesr::{b64_index, int_to_b64};
use crate::errors::{MatterError, MatterResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Derivation codes for indexed signatures.
#[allow(dead_code)]
pub mod idr_dex {
    pub const ED25519_SIG: &str = "A"; // Ed25519 sig appears same in both lists if any
    pub const ED25519_CRT_SIG: &str = "B"; // Ed25519 sig appears in current list only
    pub const ECDSA_256K1_SIG: &str = "C"; // ECDSA secp256k1 sig appears same in both lists
    pub const ECDSA_256K1_CRT_SIG: &str = "D"; // ECDSA secp256k1 sig in current list only
    pub const ECDSA_256R1_SIG: &str = "E"; // ECDSA secp256r1 sig appears same in both lists
    pub const ECDSA_256R1_CRT_SIG: &str = "F"; // ECDSA secp256r1 sig in current list only
    pub const ED25519_BIG_SIG: &str = "2A"; // Ed25519 sig dual indexed big
    pub const ED25519_BIG_CRT_SIG: &str = "2B"; // Ed25519 sig current only big
}

/// Codes whose signature appears in the current list only (no ondex).
pub static CRT_SIG_CODES: [&str; 4] = [
    idr_dex::ED25519_CRT_SIG,
    idr_dex::ECDSA_256K1_CRT_SIG,
    idr_dex::ECDSA_256R1_CRT_SIG,
    idr_dex::ED25519_BIG_CRT_SIG,
];

/// Size table entry for indexed codes: hard, soft, ondex-part, full, lead.
#[derive(Debug, Clone, Copy)]
pub struct Xizage {
    pub hs: usize,
    pub ss: usize,
    pub os: usize,
    pub fs: usize,
    pub ls: usize,
}

const fn xz(hs: usize, ss: usize, os: usize, fs: usize, ls: usize) -> Xizage {
    Xizage { hs, ss, os, fs, ls }
}

pub static IDX_SIZES: Lazy<HashMap<&'static str, Xizage>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(idr_dex::ED25519_SIG, xz(1, 1, 0, 88, 0));
    m.insert(idr_dex::ED25519_CRT_SIG, xz(1, 1, 0, 88, 0));
    m.insert(idr_dex::ECDSA_256K1_SIG, xz(1, 1, 0, 88, 0));
    m.insert(idr_dex::ECDSA_256K1_CRT_SIG, xz(1, 1, 0, 88, 0));
    m.insert(idr_dex::ECDSA_256R1_SIG, xz(1, 1, 0, 88, 0));
    m.insert(idr_dex::ECDSA_256R1_CRT_SIG, xz(1, 1, 0, 88, 0));
    m.insert(idr_dex::ED25519_BIG_SIG, xz(2, 4, 2, 92, 0));
    m.insert(idr_dex::ED25519_BIG_CRT_SIG, xz(2, 4, 2, 92, 0));
    m
});

/// Map of first code char to hard size for indexed codes.
pub static IDX_HARDS: Lazy<HashMap<u8, usize>> = Lazy::new(|| {
    let mut m: HashMap<u8, usize> = (b'A'..=b'Z').map(|c| (c, 1)).collect();
    m.extend((b'a'..=b'z').map(|c| (c, 1)));
    m.extend((b'0'..=b'4').map(|c| (c, 2)));
    m
});

/// Indexed signature with optional attached verification key.
#[derive(Debug, Clone)]
pub struct Siger {
    code: String,
    raw: Vec<u8>,
    index: u32,
    ondex: Option<u32>,
    pub verfer: Option<Verfer>,
}

impl Siger {
    pub fn new(
        raw: &[u8],
        code: &str,
        index: u32,
        ondex: Option<u32>,
        verfer: Option<Verfer>,
    ) -> MatterResult<Self> {
        let size = *IDX_SIZES
            .get(code)
            .ok_or_else(|| MatterError::InvalidCode(format!("Unsupported index code={}", code)))?;
        let ms = size.ss - size.os;
        if index as u64 > 64u64.pow(ms as u32) - 1 {
            return Err(MatterError::InvalidVarIndex(format!(
                "Invalid index={} for code={}",
                index, code
            )));
        }
        let ondex = if CRT_SIG_CODES.contains(&code) {
            if let Some(o) = ondex {
                if o != index && size.os == 0 {
                    return Err(MatterError::InvalidVarIndex(format!(
                        "Invalid ondex={} for current only code={}",
                        o, code
                    )));
                }
            }
            None
        } else if size.os > 0 {
            let o = ondex.unwrap_or(index);
            if o as u64 > 64u64.pow(size.os as u32) - 1 {
                return Err(MatterError::InvalidVarIndex(format!(
                    "Invalid ondex={} for code={}",
                    o, code
                )));
            }
            Some(o)
        } else {
            Some(ondex.unwrap_or(index))
        };
        let rize = ((size.fs - (size.hs + size.ss)) * 3) / 4 - size.ls;
        if raw.len() < rize {
            return Err(MatterError::RawMaterial(format!(
                "Not enough raw bytes for code={} expected {} got {}",
                code,
                rize,
                raw.len()
            )));
        }
        Ok(Siger {
            code: code.to_string(),
            raw: raw[..rize].to_vec(),
            index,
            ondex,
            verfer,
        })
    }

    pub fn from_qb64(qb64: &str) -> MatterResult<Self> {
        Ok(Self::decode(qb64.as_bytes())?.0)
    }

    pub fn from_qb64b(qb64b: &[u8]) -> MatterResult<Self> {
        Ok(Self::decode(qb64b)?.0)
    }

    /// Decodes one indexed signature from the front of `qb64b`.
    pub fn decode(qb64b: &[u8]) -> MatterResult<(Self, usize)> {
        if qb64b.is_empty() {
            return Err(MatterError::EmptyMaterial(
                "Empty material, need more characters.".to_string(),
            ));
        }
        let first = qb64b[0];
        let hs = *IDX_HARDS.get(&first).ok_or_else(|| {
            if first == b'-' {
                MatterError::UnexpectedCountCode(
                    "Unexpected count code start while extracting Indexer.".to_string(),
                )
            } else {
                MatterError::UnexpectedCode(format!(
                    "Unsupported index code start char={}",
                    first as char
                ))
            }
        })?;
        if qb64b.len() < hs {
            return Err(MatterError::Shortage(format!(
                "Need {} more characters.",
                hs - qb64b.len()
            )));
        }
        let hard = std::str::from_utf8(&qb64b[..hs])
            .map_err(|_| MatterError::Conversion("Non UTF-8 code chars".to_string()))?;
        let size = *IDX_SIZES
            .get(hard)
            .ok_or_else(|| MatterError::UnexpectedCode(format!("Unsupported code={}", hard)))?;
        let cs = size.hs + size.ss;
        if qb64b.len() < size.fs {
            return Err(MatterError::Shortage(format!(
                "Need {} more characters.",
                size.fs - qb64b.len()
            )));
        }
        let soft = std::str::from_utf8(&qb64b[hs..cs])
            .map_err(|_| MatterError::Conversion("Non UTF-8 soft chars".to_string()))?;
        let ms = size.ss - size.os;
        let mut index: u32 = 0;
        for c in soft[..ms].bytes() {
            let v = b64_index(c).ok_or_else(|| {
                MatterError::Conversion(format!("Invalid Base64 char={}", c as char))
            })?;
            index = (index << 6) | v as u32;
        }
        let ondex = if CRT_SIG_CODES.contains(&hard) {
            None
        } else if size.os > 0 {
            let mut o: u32 = 0;
            for c in soft[ms..].bytes() {
                let v = b64_index(c).ok_or_else(|| {
                    MatterError::Conversion(format!("Invalid Base64 char={}", c as char))
                })?;
                o = (o << 6) | v as u32;
            }
            Some(o)
        } else {
            Some(index)
        };
        let ps = cs % 4;
        let mut base = vec![b'A'; ps];
        base.extend_from_slice(&qb64b[cs..size.fs]);
        let paw = URL_SAFE_NO_PAD
            .decode(&base)
            .map_err(|e| MatterError::Conversion(format!("Base64 decode error: {}", e)))?;
        if paw[..ps + size.ls].iter().any(|&b| b != 0) {
            return Err(MatterError::Conversion("Nonzero midpad bytes.".to_string()));
        }
        let raw = paw[ps + size.ls..].to_vec();
        Ok((
            Siger {
                code: hard.to_string(),
                raw,
                index,
                ondex,
                verfer: None,
            },
            size.fs,
        ))
    }

    pub fn strip(buf: &mut Vec<u8>) -> MatterResult<Self> {
        let (siger, used) = Self::decode(buf)?;
        buf.drain(..used);
        Ok(siger)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn ondex(&self) -> Option<u32> {
        self.ondex
    }

    pub fn qb64(&self) -> String {
        String::from_utf8(self.qb64b()).expect("qb64 is ascii")
    }

    pub fn qb64b(&self) -> Vec<u8> {
        let size = IDX_SIZES[self.code.as_str()];
        let ms = size.ss - size.os;
        let mut both = self.code.clone();
        both.push_str(&int_to_b64(self.index as u64, ms));
        if size.os > 0 {
            both.push_str(&int_to_b64(self.ondex.unwrap_or(0) as u64, size.os));
        }
        let cs = size.hs + size.ss;
        let ps = (3 - ((self.raw.len() + size.ls) % 3)) % 3;
        debug_assert_eq!(ps, cs % 4);
        let mut padded = vec![0u8; ps + size.ls];
        padded.extend_from_slice(&self.raw);
        let encoded = URL_SAFE_NO_PAD.encode(&padded);
        let mut out = both.into_bytes();
        out.extend_from_slice(&encoded.as_bytes()[ps..]);
        out
    }

    /// Qualified binary representation.
    pub fn qb2(&self) -> Vec<u8> {
        let size = IDX_SIZES[self.code.as_str()];
        let ms = size.ss - size.os;
        let mut both = self.code.clone();
        both.push_str(&int_to_b64(self.index as u64, ms));
        if size.os > 0 {
            both.push_str(&int_to_b64(self.ondex.unwrap_or(0) as u64, size.os));
        }
        let mut full = crate::cesr::code_b64_to_b2(&both).unwrap_or_default();
        full.extend_from_slice(&vec![0u8; size.ls]);
        full.extend_from_slice(&self.raw);
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_siger_roundtrip() {
        let sig = [3u8; 64];
        let siger = Siger::new(&sig, idr_dex::ED25519_SIG, 0, None, None).unwrap();
        assert_eq!(siger.index(), 0);
        assert_eq!(siger.ondex(), Some(0));
        let qb64 = siger.qb64();
        assert_eq!(qb64.len(), 88);
        assert!(qb64.starts_with("AA"));

        let (siger2, used) = Siger::decode(qb64.as_bytes()).unwrap();
        assert_eq!(used, 88);
        assert_eq!(siger2.index(), 0);
        assert_eq!(siger2.raw(), &sig[..]);
        assert_eq!(siger2.qb64(), qb64);

        let siger = Siger::new(&sig, idr_dex::ED25519_SIG, 2, None, None).unwrap();
        assert!(siger.qb64().starts_with("AC"));

        // current-only code has no ondex
        let siger = Siger::new(&sig, idr_dex::ED25519_CRT_SIG, 1, None, None).unwrap();
        assert_eq!(siger.ondex(), None);
        assert!(siger.qb64().starts_with("BB"));

        // big dual indexed
        let siger = Siger::new(&sig, idr_dex::ED25519_BIG_SIG, 3, Some(5), None).unwrap();
        let qb64 = siger.qb64();
        assert_eq!(qb64.len(), 92);
        let siger2 = Siger::from_qb64(&qb64).unwrap();
        assert_eq!(siger2.index(), 3);
        assert_eq!(siger2.ondex(), Some(5));
    }

    #[test]
    fn test_siger_strip() {
        let sig = [9u8; 64];
        let s0 = Siger::new(&sig, idr_dex::ED25519_SIG, 0, None, None).unwrap();
        let s1 = Siger::new(&sig, idr_dex::ED25519_SIG, 1, None, None).unwrap();
        let mut buf = [s0.qb64b(), s1.qb64b()].concat();
        let got0 = Siger::strip(&mut buf).unwrap();
        assert_eq!(got0.index(), 0);
        let got1 = Siger::strip(&mut buf).unwrap();
        assert_eq!(got1.index(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_siger_known_vector() {
        // known witness indexed signature vector
        let wig = "AACdI8OSQkMJ9r-xigjEByEjIua7LHH3AOJ22PQKqljMhuhcgh9nGRcKnsz5KvKd7K_H9-1298F4Id1DxvIoEmCQ";
        let siger = Siger::from_qb64(wig).unwrap();
        assert_eq!(siger.code(), idr_dex::ED25519_SIG);
        assert_eq!(siger.index(), 0);
        assert_eq!(siger.qb64(), wig);
    }
}
