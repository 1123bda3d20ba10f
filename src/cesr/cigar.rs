//! Cigar: a nonindexed signature Matter with an optional verfer property.

use crate::cesr::verfer::Verfer;
use crate::cesr::{mtr_dex, Matter};
use crate::errors::{MatterError, MatterResult};

const SIG_CODES: [&str; 3] = [
    mtr_dex::ED25519_SIG,
    mtr_dex::ECDSA_256K1_SIG,
    mtr_dex::ECDSA_256R1_SIG,
];

#[derive(Debug, Clone)]
pub struct Cigar {
    matter: Matter,
    pub verfer: Option<Verfer>,
}

impl Cigar {
    pub fn new(raw: &[u8], code: &str, verfer: Option<Verfer>) -> MatterResult<Self> {
        if !SIG_CODES.contains(&code) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for signature: {}",
                code
            )));
        }
        Ok(Cigar {
            matter: Matter::new(raw, code)?,
            verfer,
        })
    }

    pub fn from_qb64(qb64: &str) -> MatterResult<Self> {
        Ok(Self::decode(qb64.as_bytes())?.0)
    }

    pub fn from_qb64b(qb64b: &[u8]) -> MatterResult<Self> {
        Ok(Self::decode(qb64b)?.0)
    }

    pub fn decode(qb64b: &[u8]) -> MatterResult<(Self, usize)> {
        let (matter, used) = Matter::decode(qb64b)?;
        if !SIG_CODES.contains(&matter.code()) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for signature: {}",
                matter.code()
            )));
        }
        Ok((
            Cigar {
                matter,
                verfer: None,
            },
            used,
        ))
    }

    pub fn strip(buf: &mut Vec<u8>) -> MatterResult<Self> {
        let (cigar, used) = Self::decode(buf)?;
        buf.drain(..used);
        Ok(cigar)
    }

    pub fn code(&self) -> &str {
        self.matter.code()
    }

    pub fn raw(&self) -> &[u8] {
        self.matter.raw()
    }

    pub fn qb64(&self) -> String {
        self.matter.qb64()
    }

    pub fn qb64b(&self) -> Vec<u8> {
        self.matter.qb64b()
    }
}
