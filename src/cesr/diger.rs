//! Diger: Matter with methods to create and verify digests of serializations.

use crate::cesr::{dig_dex, mtr_dex, Matter};
use crate::errors::{MatterError, MatterResult};
use blake2::{Blake2b512, Blake2s256, Digest as Blake2Digest};
use sha2::{Sha256, Sha512};
use sha3::{Sha3_256, Sha3_512};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diger {
    matter: Matter,
}

impl Diger {
    pub fn new(raw: &[u8], code: &str) -> MatterResult<Self> {
        if !dig_dex::TUPLE.contains(&code) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for digest: {}",
                code
            )));
        }
        Ok(Diger {
            matter: Matter::new(raw, code)?,
        })
    }

    /// Computes the digest of `ser` under `code` (default Blake3_256).
    pub fn from_ser(ser: &[u8], code: Option<&str>) -> MatterResult<Self> {
        let code = code.unwrap_or(mtr_dex::BLAKE3_256);
        let raw = Self::digest(ser, code)?;
        Self::new(&raw, code)
    }

    pub fn from_qb64(qb64: &str) -> MatterResult<Self> {
        Self::from_qb64b(qb64.as_bytes())
    }

    pub fn from_qb64b(qb64b: &[u8]) -> MatterResult<Self> {
        let matter = Matter::from_qb64b(qb64b)?;
        if !dig_dex::TUPLE.contains(&matter.code()) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for digest: {}",
                matter.code()
            )));
        }
        Ok(Diger { matter })
    }

    pub fn decode(qb64b: &[u8]) -> MatterResult<(Self, usize)> {
        let (matter, used) = Matter::decode(qb64b)?;
        if !dig_dex::TUPLE.contains(&matter.code()) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for digest: {}",
                matter.code()
            )));
        }
        Ok((Diger { matter }, used))
    }

    pub fn strip(buf: &mut Vec<u8>) -> MatterResult<Self> {
        let (diger, used) = Self::decode(buf)?;
        buf.drain(..used);
        Ok(diger)
    }

    /// Raw digest of `ser` under digest code `code`.
    pub fn digest(ser: &[u8], code: &str) -> MatterResult<Vec<u8>> {
        match code {
            mtr_dex::BLAKE3_256 => Ok(blake3::hash(ser).as_bytes().to_vec()),
            mtr_dex::BLAKE2B_256 => {
                // Blake2b truncated to 256 bits as the wire code requires
                let mut hasher = blake2::Blake2bVar::new(32)
                    .map_err(|e| MatterError::Crypto(format!("blake2b: {}", e)))?;
                use blake2::digest::{Update, VariableOutput};
                hasher.update(ser);
                let mut out = vec![0u8; 32];
                hasher
                    .finalize_variable(&mut out)
                    .map_err(|e| MatterError::Crypto(format!("blake2b: {}", e)))?;
                Ok(out)
            }
            mtr_dex::BLAKE2S_256 => {
                let mut hasher = Blake2s256::new();
                hasher.update(ser);
                Ok(hasher.finalize().to_vec())
            }
            mtr_dex::SHA3_256 => {
                let mut hasher = Sha3_256::new();
                hasher.update(ser);
                Ok(hasher.finalize().to_vec())
            }
            mtr_dex::SHA2_256 => {
                let mut hasher = Sha256::new();
                hasher.update(ser);
                Ok(hasher.finalize().to_vec())
            }
            mtr_dex::BLAKE3_512 => {
                let mut hasher = blake3::Hasher::new();
                hasher.update(ser);
                let mut out = vec![0u8; 64];
                hasher.finalize_xof().fill(&mut out);
                Ok(out)
            }
            mtr_dex::BLAKE2B_512 => {
                let mut hasher = Blake2b512::new();
                hasher.update(ser);
                Ok(hasher.finalize().to_vec())
            }
            mtr_dex::SHA3_512 => {
                let mut hasher = Sha3_512::new();
                hasher.update(ser);
                Ok(hasher.finalize().to_vec())
            }
            mtr_dex::SHA2_512 => {
                let mut hasher = Sha512::new();
                hasher.update(ser);
                Ok(hasher.finalize().to_vec())
            }
            _ => Err(MatterError::UnexpectedCode(format!(
                "Unsupported digest code: {}",
                code
            ))),
        }
    }

    /// True if this digest matches the digest of `ser`.
    pub fn verify(&self, ser: &[u8]) -> bool {
        match Self::digest(ser, self.code()) {
            Ok(d) => d == self.raw(),
            Err(_) => false,
        }
    }

    /// Compares against another digest of the same serialization, allowing
    /// different digest codes on either side.
    pub fn compare(&self, ser: &[u8], other: &Diger) -> bool {
        if other.qb64() == self.qb64() {
            return true;
        }
        other.verify(ser) && self.verify(ser)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diger() {
        let ser = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let dig = blake3::hash(ser).as_bytes().to_vec();

        let diger = Diger::new(&dig, mtr_dex::BLAKE3_256).unwrap();
        assert_eq!(diger.code(), mtr_dex::BLAKE3_256);
        assert_eq!(diger.raw(), &dig[..]);
        assert!(diger.verify(ser));
        assert!(!diger.verify(b"other data"));

        let diger2 = Diger::from_ser(ser, None).unwrap();
        assert_eq!(diger2.qb64(), diger.qb64());

        let diger3 = Diger::from_qb64(&diger.qb64()).unwrap();
        assert_eq!(diger3.raw(), &dig[..]);

        // cross-code comparison of the same serialization
        let diger4 = Diger::from_ser(ser, Some(mtr_dex::SHA3_256)).unwrap();
        assert!(diger.compare(ser, &diger4));
        let diger5 = Diger::from_ser(b"other data", Some(mtr_dex::SHA3_256)).unwrap();
        assert!(!diger.compare(ser, &diger5));

        // not a digest code
        assert!(Diger::from_qb64("BGlOiUdp5sMmfotHfCWQKEzWR91C72AH0lT84c0um-Qj").is_err());
    }

    #[test]
    fn test_diger_known_vector() {
        // Blake3 digest of a verfer qb64b, known vector
        let keyb = b"DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH";
        let diger = Diger::from_ser(keyb, Some(mtr_dex::BLAKE3_256)).unwrap();
        assert_eq!(diger.qb64(), "EIf-ENw7PrM52w4H-S7NGU2qVIfraXVIlV9hEAaMHg7W");
    }
}
