//! Prefixer: Matter for autonomic identifier (AID) prefixes with derivation
//! verification against an inception event body.

use crate::cesr::diger::Diger;
use crate::cesr::{dig_dex, pre_dex, Matter};
use crate::core::serdering::{dummy, dumps};
use crate::core::{deversify, Kinds};
use crate::errors::{MatterError, MatterResult};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefixer {
    matter: Matter,
}

impl Prefixer {
    pub fn from_qb64(qb64: &str) -> MatterResult<Self> {
        Ok(Self::decode(qb64.as_bytes())?.0)
    }

    pub fn from_qb64b(qb64b: &[u8]) -> MatterResult<Self> {
        Ok(Self::decode(qb64b)?.0)
    }

    pub fn decode(qb64b: &[u8]) -> MatterResult<(Self, usize)> {
        let (matter, used) = Matter::decode(qb64b)?;
        if !pre_dex::TUPLE.contains(&matter.code()) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for prefixer: {}",
                matter.code()
            )));
        }
        Ok((Prefixer { matter }, used))
    }

    pub fn strip(buf: &mut Vec<u8>) -> MatterResult<Self> {
        let (prefixer, used) = Self::decode(buf)?;
        buf.drain(..used);
        Ok(prefixer)
    }

    /// Verifies this prefix against its inception event body.
    ///
    /// Basic derivations must equal the single signing key; self-addressing
    /// derivations must reproduce under dummy substitution of both `d` and
    /// `i`. When `prefixed` the event's `i` field must also equal this
    /// prefix.
    pub fn verify(&self, ked: &Value, prefixed: bool) -> bool {
        let qb64 = self.qb64();
        if prefixed {
            match ked.get("i").and_then(|i| i.as_str()) {
                Some(i) if i == qb64 => (),
                _ => return false,
            }
        }
        if self.is_digestive() {
            self.verify_digestive(ked)
        } else {
            let keys = ked.get("k").and_then(|k| k.as_array());
            match keys {
                Some(keys) if keys.len() == 1 => {
                    keys[0].as_str().map(|k| k == qb64).unwrap_or(false)
                }
                _ => false,
            }
        }
    }

    fn verify_digestive(&self, ked: &Value) -> bool {
        let kind = match ked
            .get("v")
            .and_then(|v| v.as_str())
            .map(|v| deversify(v.as_bytes()))
        {
            Some(Ok(smellage)) => smellage.kind,
            _ => Kinds::Json,
        };
        let Ok(placeholder) = dummy(self.code()) else {
            return false;
        };
        let mut dummied = ked.clone();
        let Some(map) = dummied.as_object_mut() else {
            return false;
        };
        map.insert("d".to_string(), Value::String(placeholder.clone()));
        map.insert("i".to_string(), Value::String(placeholder));
        let Ok(raw) = dumps(&dummied, kind) else {
            return false;
        };
        match Diger::from_ser(&raw, Some(self.code())) {
            Ok(diger) => diger.qb64() == self.qb64(),
            Err(_) => false,
        }
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

    pub fn is_transferable(&self) -> bool {
        self.matter.is_transferable()
    }

    pub fn is_digestive(&self) -> bool {
        dig_dex::TUPLE.contains(&self.matter.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixer_codes() {
        let pre = "BGlOiUdp5sMmfotHfCWQKEzWR91C72AH0lT84c0um-Qj";
        let prefixer = Prefixer::from_qb64(pre).unwrap();
        assert!(!prefixer.is_transferable());
        assert!(!prefixer.is_digestive());
        assert_eq!(prefixer.qb64(), pre);

        let dig = "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ";
        let prefixer = Prefixer::from_qb64(dig).unwrap();
        assert!(prefixer.is_transferable());
        assert!(prefixer.is_digestive());

        // seed codes are not prefix codes
        assert!(Prefixer::from_qb64("AGlOiUdp5sMmfotHfCWQKEzWR91C72AH0lT84c0um-Qj").is_err());
    }
}
