//! Counter: compact typed group headers delimiting attachment groups in a
//! CESR stream.

use crate::cesr::{b64_to_int, code_b64_to_b2, code_b2_to_b64, int_to_b64};
use crate::errors::{MatterError, MatterResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Counter group codes, version 1 stream protocol.
#[allow(dead_code)]
pub mod ctr_dex {
    pub const CONTROLLER_IDX_SIGS: &str = "-A"; // Qualified Base64 indexed controller sigs
    pub const WITNESS_IDX_SIGS: &str = "-B"; // Qualified Base64 indexed witness sigs
    pub const NON_TRANS_RECEIPT_COUPLES: &str = "-C"; // Composed couple, pre+cig
    pub const TRANS_RECEIPT_QUADRUPLES: &str = "-D"; // Composed quadruple, pre+snu+dig+sig
    pub const FIRST_SEEN_REPLAY_COUPLES: &str = "-E"; // Composed couple, fnu+dts
    pub const TRANS_IDX_SIG_GROUPS: &str = "-F"; // Composed group, pre+snu+dig+ControllerIdxSigs
    pub const SEAL_SOURCE_COUPLES: &str = "-G"; // Composed couple, snu+dig of source event
    pub const TRANS_LAST_IDX_SIG_GROUPS: &str = "-H"; // Composed group, pre+ControllerIdxSigs
    pub const SEAL_SOURCE_TRIPLES: &str = "-I"; // Composed triple, pre+snu+dig of source event
    pub const SAD_PATH_SIG_GROUPS: &str = "-J"; // Composed group, path+TransIdxSigGroup
    pub const ROOT_SAD_PATH_SIG_GROUPS: &str = "-K"; // Composed group, root path + said couples
    pub const PATHED_MATERIAL_GROUP: &str = "-L"; // Grouped pathed material quadlets
    pub const ATTACHMENT_GROUP: &str = "-V"; // Grouped attached material quadlets
    pub const BIG_ATTACHMENT_GROUP: &str = "-0V"; // Big grouped attached material quadlets
    pub const KERI_ACDC_GENUS_VERSION: &str = "--AAA"; // Protocol stack genus version
}

/// Size table entry for counter codes: hard, soft, full.
#[derive(Debug, Clone, Copy)]
pub struct Cizage {
    pub hs: usize,
    pub ss: usize,
    pub fs: usize,
}

const fn cz(hs: usize, ss: usize, fs: usize) -> Cizage {
    Cizage { hs, ss, fs }
}

pub static CTR_SIZES: Lazy<HashMap<&'static str, Cizage>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(ctr_dex::CONTROLLER_IDX_SIGS, cz(2, 2, 4));
    m.insert(ctr_dex::WITNESS_IDX_SIGS, cz(2, 2, 4));
    m.insert(ctr_dex::NON_TRANS_RECEIPT_COUPLES, cz(2, 2, 4));
    m.insert(ctr_dex::TRANS_RECEIPT_QUADRUPLES, cz(2, 2, 4));
    m.insert(ctr_dex::FIRST_SEEN_REPLAY_COUPLES, cz(2, 2, 4));
    m.insert(ctr_dex::TRANS_IDX_SIG_GROUPS, cz(2, 2, 4));
    m.insert(ctr_dex::SEAL_SOURCE_COUPLES, cz(2, 2, 4));
    m.insert(ctr_dex::TRANS_LAST_IDX_SIG_GROUPS, cz(2, 2, 4));
    m.insert(ctr_dex::SEAL_SOURCE_TRIPLES, cz(2, 2, 4));
    m.insert(ctr_dex::SAD_PATH_SIG_GROUPS, cz(2, 2, 4));
    m.insert(ctr_dex::ROOT_SAD_PATH_SIG_GROUPS, cz(2, 2, 4));
    m.insert(ctr_dex::PATHED_MATERIAL_GROUP, cz(2, 2, 4));
    m.insert(ctr_dex::ATTACHMENT_GROUP, cz(2, 2, 4));
    m.insert(ctr_dex::BIG_ATTACHMENT_GROUP, cz(3, 5, 8));
    m.insert(ctr_dex::KERI_ACDC_GENUS_VERSION, cz(5, 3, 8));
    m
});

/// Map of two-char code selector to hard size.
pub static CTR_HARDS: Lazy<HashMap<Vec<u8>, usize>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for c in b'A'..=b'Z' {
        m.insert(vec![b'-', c], 2);
    }
    for c in b'a'..=b'z' {
        m.insert(vec![b'-', c], 2);
    }
    m.insert(b"-0".to_vec(), 3);
    m.insert(b"--".to_vec(), 5);
    m
});

/// Typed group header encoding `(group code, count)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    code: String,
    count: u64,
}

impl Counter {
    pub fn new(code: &str, count: u64) -> MatterResult<Self> {
        let size = *CTR_SIZES
            .get(code)
            .ok_or_else(|| MatterError::InvalidCode(format!("Unsupported count code={}", code)))?;
        // Promote small codes to big when the count overflows the soft part
        let (code, ss) = if size.ss == 2 && count > 64u64.pow(2) - 1 {
            let big = format!("-0{}", &code[1..2]);
            let big_size = *CTR_SIZES.get(big.as_str()).ok_or_else(|| {
                MatterError::InvalidVarIndex(format!(
                    "Invalid count={} for code={}",
                    count, code
                ))
            })?;
            (big, big_size.ss)
        } else {
            (code.to_string(), size.ss)
        };
        if count > 64u64.pow(ss as u32) - 1 {
            return Err(MatterError::InvalidVarIndex(format!(
                "Invalid count={} for code={}",
                count, code
            )));
        }
        Ok(Counter { code, count })
    }

    pub fn from_qb64(qb64: &str) -> MatterResult<Self> {
        Ok(Self::decode(qb64.as_bytes())?.0)
    }

    pub fn from_qb64b(qb64b: &[u8]) -> MatterResult<Self> {
        Ok(Self::decode(qb64b)?.0)
    }

    /// Decodes one counter from the front of `qb64b`.
    pub fn decode(qb64b: &[u8]) -> MatterResult<(Self, usize)> {
        if qb64b.is_empty() {
            return Err(MatterError::EmptyMaterial(
                "Empty material, need more characters.".to_string(),
            ));
        }
        if qb64b[0] != b'-' {
            return Err(MatterError::UnexpectedCode(format!(
                "Expected count code start, got char={}",
                qb64b[0] as char
            )));
        }
        if qb64b.len() < 2 {
            return Err(MatterError::Shortage("Need 1 more character.".to_string()));
        }
        let hs = *CTR_HARDS
            .get(&qb64b[..2].to_vec())
            .ok_or_else(|| {
                MatterError::UnexpectedCode(format!(
                    "Invalid count code selector={:?}",
                    &qb64b[..2]
                ))
            })?;
        if qb64b.len() < hs {
            return Err(MatterError::Shortage(format!(
                "Need {} more characters.",
                hs - qb64b.len()
            )));
        }
        let hard = std::str::from_utf8(&qb64b[..hs])
            .map_err(|_| MatterError::Conversion("Non UTF-8 code chars".to_string()))?;
        let size = *CTR_SIZES
            .get(hard)
            .ok_or_else(|| MatterError::UnexpectedCode(format!("Unsupported code={}", hard)))?;
        if qb64b.len() < size.fs {
            return Err(MatterError::Shortage(format!(
                "Need {} more characters.",
                size.fs - qb64b.len()
            )));
        }
        let soft = std::str::from_utf8(&qb64b[hs..size.fs])
            .map_err(|_| MatterError::Conversion("Non UTF-8 count chars".to_string()))?;
        let count = b64_to_int(soft)?;
        Ok((
            Counter {
                code: hard.to_string(),
                count,
            },
            size.fs,
        ))
    }

    pub fn strip(buf: &mut Vec<u8>) -> MatterResult<Self> {
        let (counter, used) = Self::decode(buf)?;
        buf.drain(..used);
        Ok(counter)
    }

    /// Creates Counter from qb2 bytes.
    pub fn from_qb2(qb2: &[u8]) -> MatterResult<Self> {
        let first = crate::cesr::nab_sextets(qb2, 1)?[0];
        if first != 62 {
            return Err(MatterError::UnexpectedCode(format!(
                "Expected count code start sextet, got {:#x}",
                first
            )));
        }
        let two = code_b2_to_b64(qb2, 2)?;
        let hs = *CTR_HARDS
            .get(&two.as_bytes().to_vec())
            .ok_or_else(|| {
                MatterError::UnexpectedCode(format!("Invalid count code selector={}", two))
            })?;
        let hard = code_b2_to_b64(qb2, hs)?;
        let size = *CTR_SIZES
            .get(hard.as_str())
            .ok_or_else(|| MatterError::UnexpectedCode(format!("Unsupported code={}", hard)))?;
        let both = code_b2_to_b64(qb2, size.fs)?;
        let count = b64_to_int(&both[hs..])?;
        Ok(Counter { code: hard, count })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Full qb64 size of this counter header.
    pub fn full_size(&self) -> usize {
        CTR_SIZES[self.code.as_str()].fs
    }

    pub fn qb64(&self) -> String {
        let size = CTR_SIZES[self.code.as_str()];
        format!("{}{}", self.code, int_to_b64(self.count, size.ss))
    }

    pub fn qb64b(&self) -> Vec<u8> {
        self.qb64().into_bytes()
    }

    pub fn qb2(&self) -> Vec<u8> {
        code_b64_to_b2(&self.qb64()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = Counter::new(ctr_dex::CONTROLLER_IDX_SIGS, 1).unwrap();
        assert_eq!(counter.qb64(), "-AAB");
        assert_eq!(counter.count(), 1);
        assert_eq!(counter.full_size(), 4);

        let counter = Counter::new(ctr_dex::WITNESS_IDX_SIGS, 2).unwrap();
        assert_eq!(counter.qb64(), "-BAC");

        let (decoded, used) = Counter::decode(b"-AABextra").unwrap();
        assert_eq!(used, 4);
        assert_eq!(decoded.code(), ctr_dex::CONTROLLER_IDX_SIGS);
        assert_eq!(decoded.count(), 1);

        let counter2 = Counter::from_qb2(&counter.qb2()).unwrap();
        assert_eq!(counter2.code(), counter.code());
        assert_eq!(counter2.count(), counter.count());
    }

    #[test]
    fn test_counter_attachment_group() {
        // pipeline wrapper counts quadlets of following material
        let counter = Counter::new(ctr_dex::ATTACHMENT_GROUP, 23).unwrap();
        assert_eq!(counter.qb64(), "-VAX");

        // counts too large for the small code promote to the big code
        let counter = Counter::new(ctr_dex::ATTACHMENT_GROUP, 5000).unwrap();
        assert_eq!(counter.code(), ctr_dex::BIG_ATTACHMENT_GROUP);
        assert_eq!(counter.count(), 5000);
        assert_eq!(counter.qb64().len(), 8);
        let again = Counter::from_qb64(&counter.qb64()).unwrap();
        assert_eq!(again.count(), 5000);
    }

    #[test]
    fn test_counter_strip() {
        let mut buf = b"-AAC-BAB".to_vec();
        let c1 = Counter::strip(&mut buf).unwrap();
        assert_eq!(c1.code(), ctr_dex::CONTROLLER_IDX_SIGS);
        assert_eq!(c1.count(), 2);
        let c2 = Counter::strip(&mut buf).unwrap();
        assert_eq!(c2.code(), ctr_dex::WITNESS_IDX_SIGS);
        assert_eq!(c2.count(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_counter_errors() {
        assert!(Counter::new("-9", 1).is_err());
        match Counter::decode(b"AAAB") {
            Err(MatterError::UnexpectedCode(_)) => (),
            other => panic!("expected code error, got {:?}", other),
        }
        match Counter::decode(b"-A") {
            Err(MatterError::Shortage(_)) => (),
            other => panic!("expected shortage, got {:?}", other),
        }
    }
}
