//! Number: Matter for ordinal numbers carried in compact numeric codes.

use crate::cesr::{mtr_dex, raw_size, Matter};
use crate::errors::{MatterError, MatterResult};

/// Numeric codes in ascending capacity order.
pub static NUM_CODES: [&str; 4] = [
    mtr_dex::SHORT,
    mtr_dex::LONG,
    mtr_dex::BIG,
    mtr_dex::SALT_128,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Number {
    matter: Matter,
}

impl Number {
    /// Creates a Number using the smallest code that holds `num`.
    pub fn new(num: u64) -> MatterResult<Self> {
        let code = if num <= 0xffff {
            mtr_dex::SHORT
        } else if num <= 0xffff_ffff {
            mtr_dex::LONG
        } else {
            mtr_dex::BIG
        };
        Self::new_with_code(num, code)
    }

    pub fn new_with_code(num: u64, code: &str) -> MatterResult<Self> {
        if !NUM_CODES.contains(&code) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for number: {}",
                code
            )));
        }
        let rize = raw_size(code)?;
        let bytes = num.to_be_bytes();
        if rize < 8 && num >> (rize * 8) != 0 {
            return Err(MatterError::RawMaterial(format!(
                "Number {} too big for code={}",
                num, code
            )));
        }
        let raw = if rize <= 8 {
            bytes[8 - rize..].to_vec()
        } else {
            let mut r = vec![0u8; rize - 8];
            r.extend_from_slice(&bytes);
            r
        };
        Ok(Number {
            matter: Matter::new(&raw, code)?,
        })
    }

    /// Creates from a lowercase hex string without leading zeros.
    pub fn from_numh(numh: &str) -> MatterResult<Self> {
        let num = u64::from_str_radix(numh, 16)
            .map_err(|e| MatterError::Value(format!("Invalid hex num={}: {}", numh, e)))?;
        Self::new(num)
    }

    pub fn from_qb64(qb64: &str) -> MatterResult<Self> {
        let matter = Matter::from_qb64(qb64)?;
        if !NUM_CODES.contains(&matter.code()) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for number: {}",
                matter.code()
            )));
        }
        Ok(Number { matter })
    }

    pub fn num(&self) -> u64 {
        let raw = self.matter.raw();
        let mut num: u64 = 0;
        for &b in raw.iter().skip(raw.len().saturating_sub(8)) {
            num = (num << 8) | b as u64;
        }
        num
    }

    /// Hex string form, lowercase, no leading zeros.
    pub fn numh(&self) -> String {
        format!("{:x}", self.num())
    }

    pub fn code(&self) -> &str {
        self.matter.code()
    }

    pub fn qb64(&self) -> String {
        self.matter.qb64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number() {
        let n = Number::new(0).unwrap();
        assert_eq!(n.num(), 0);
        assert_eq!(n.numh(), "0");
        assert_eq!(n.code(), mtr_dex::SHORT);
        assert_eq!(n.qb64().len(), 4);

        let n = Number::new(1).unwrap();
        assert_eq!(n.numh(), "1");
        let again = Number::from_qb64(&n.qb64()).unwrap();
        assert_eq!(again.num(), 1);

        let n = Number::new(0x1_0000).unwrap();
        assert_eq!(n.code(), mtr_dex::LONG);

        let n = Number::new(0x1_0000_0000).unwrap();
        assert_eq!(n.code(), mtr_dex::BIG);

        let n = Number::from_numh("ff").unwrap();
        assert_eq!(n.num(), 255);

        assert!(Number::new_with_code(0x10000, mtr_dex::SHORT).is_err());
    }
}
