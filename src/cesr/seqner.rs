//! Seqner: Matter for sequence numbers and first seen ordinals, qualified
//! with the 128 bit Salt_128 code.

use crate::cesr::{mtr_dex, Matter};
use crate::errors::{MatterError, MatterResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seqner {
    matter: Matter,
}

impl Seqner {
    pub fn new(sn: u64) -> MatterResult<Self> {
        let mut raw = [0u8; 16];
        raw[8..].copy_from_slice(&sn.to_be_bytes());
        Ok(Seqner {
            matter: Matter::new(&raw, mtr_dex::SALT_128)?,
        })
    }

    /// Creates from a lowercase hex string without leading zeros.
    pub fn from_snh(snh: &str) -> MatterResult<Self> {
        let sn = u64::from_str_radix(snh, 16)
            .map_err(|e| MatterError::Value(format!("Invalid hex sn={}: {}", snh, e)))?;
        Self::new(sn)
    }

    pub fn from_qb64(qb64: &str) -> MatterResult<Self> {
        Ok(Self::decode(qb64.as_bytes())?.0)
    }

    pub fn from_qb64b(qb64b: &[u8]) -> MatterResult<Self> {
        Ok(Self::decode(qb64b)?.0)
    }

    pub fn decode(qb64b: &[u8]) -> MatterResult<(Self, usize)> {
        let (matter, used) = Matter::decode(qb64b)?;
        if matter.code() != mtr_dex::SALT_128 {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for seqner: {}",
                matter.code()
            )));
        }
        Ok((Seqner { matter }, used))
    }

    pub fn strip(buf: &mut Vec<u8>) -> MatterResult<Self> {
        let (seqner, used) = Self::decode(buf)?;
        buf.drain(..used);
        Ok(seqner)
    }

    pub fn sn(&self) -> u64 {
        let raw = self.matter.raw();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&raw[8..16]);
        u64::from_be_bytes(bytes)
    }

    /// Hex string form, lowercase, no leading zeros.
    pub fn snh(&self) -> String {
        format!("{:x}", self.sn())
    }

    pub fn qb64(&self) -> String {
        self.matter.qb64()
    }

    pub fn qb64b(&self) -> Vec<u8> {
        self.matter.qb64b()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seqner() {
        let seqner = Seqner::new(0).unwrap();
        assert_eq!(seqner.sn(), 0);
        assert_eq!(seqner.snh(), "0");
        assert_eq!(seqner.qb64(), "0AAAAAAAAAAAAAAAAAAAAAAA");
        assert_eq!(seqner.qb64().len(), 24);

        let seqner = Seqner::new(10).unwrap();
        assert_eq!(seqner.snh(), "a");
        let again = Seqner::from_qb64(&seqner.qb64()).unwrap();
        assert_eq!(again.sn(), 10);

        let seqner = Seqner::from_snh("f").unwrap();
        assert_eq!(seqner.sn(), 15);
    }
}
