//! Dater: Matter for ISO-8601 datetimes qualified with the DateTime code.
//!
//! The 32 char datetime form replaces ':' with 'c', '.' with 'd' and '+'
//! with 'p' so the text domain stays Base64 safe.

use crate::cesr::{b64_index, mtr_dex, Matter};
use crate::errors::{MatterError, MatterResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dater {
    matter: Matter,
}

impl Dater {
    /// Creates a Dater for the current UTC instant.
    pub fn now() -> MatterResult<Self> {
        Self::from_dt(Utc::now())
    }

    pub fn from_dt(dt: DateTime<Utc>) -> MatterResult<Self> {
        let dts = dt.to_rfc3339_opts(SecondsFormat::Micros, false);
        Self::from_dts(&dts)
    }

    /// Creates from an ISO-8601 string with microseconds and offset.
    pub fn from_dts(dts: &str) -> MatterResult<Self> {
        if dts.len() != 32 {
            return Err(MatterError::Value(format!(
                "Invalid datetime length={} for {}",
                dts.len(),
                dts
            )));
        }
        let b64: String = dts
            .chars()
            .map(|c| match c {
                ':' => 'c',
                '.' => 'd',
                '+' => 'p',
                other => other,
            })
            .collect();
        if !b64.bytes().all(|c| b64_index(c).is_some()) {
            return Err(MatterError::Value(format!("Invalid datetime chars in {}", dts)));
        }
        let raw = URL_SAFE_NO_PAD
            .decode(b64.as_bytes())
            .map_err(|e| MatterError::Conversion(format!("Base64 decode error: {}", e)))?;
        Ok(Dater {
            matter: Matter::new(&raw, mtr_dex::DATE_TIME)?,
        })
    }

    pub fn from_qb64(qb64: &str) -> MatterResult<Self> {
        Ok(Self::decode(qb64.as_bytes())?.0)
    }

    pub fn decode(qb64b: &[u8]) -> MatterResult<(Self, usize)> {
        let (matter, used) = Matter::decode(qb64b)?;
        if matter.code() != mtr_dex::DATE_TIME {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for dater: {}",
                matter.code()
            )));
        }
        Ok((Dater { matter }, used))
    }

    pub fn strip(buf: &mut Vec<u8>) -> MatterResult<Self> {
        let (dater, used) = Self::decode(buf)?;
        buf.drain(..used);
        Ok(dater)
    }

    /// ISO-8601 datetime string form.
    pub fn dts(&self) -> String {
        let b64 = URL_SAFE_NO_PAD.encode(self.matter.raw());
        b64.chars()
            .map(|c| match c {
                'c' => ':',
                'd' => '.',
                'p' => '+',
                other => other,
            })
            .collect()
    }

    pub fn dtsb(&self) -> Vec<u8> {
        self.dts().into_bytes()
    }

    pub fn dt(&self) -> MatterResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.dts())
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| MatterError::Value(format!("Invalid datetime: {}", e)))
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
    fn test_dater() {
        let dts = "2021-01-01T00:00:00.000000+00:00";
        let dater = Dater::from_dts(dts).unwrap();
        assert_eq!(dater.dts(), dts);
        assert_eq!(dater.qb64().len(), 36);
        assert!(dater.qb64().starts_with("1AAG"));

        let again = Dater::from_qb64(&dater.qb64()).unwrap();
        assert_eq!(again.dts(), dts);
        assert_eq!(again.dt().unwrap(), dater.dt().unwrap());

        let now = Dater::now().unwrap();
        assert_eq!(now.dts().len(), 32);
    }
}
