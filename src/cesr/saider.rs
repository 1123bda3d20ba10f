//! Saider: Matter for self-addressing identifiers computed by deterministic
//! dummy substitution hashing of a serialized field map.

use crate::cesr::diger::Diger;
use crate::cesr::{dig_dex, mtr_dex, Matter};
use crate::core::serdering::{dummy, dumps};
use crate::core::Kinds;
use crate::errors::{KeriError, KeriResult, MatterError, MatterResult};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Saider {
    matter: Matter,
}

impl Saider {
    pub fn from_qb64(qb64: &str) -> MatterResult<Self> {
        Ok(Self::decode(qb64.as_bytes())?.0)
    }

    pub fn from_qb64b(qb64b: &[u8]) -> MatterResult<Self> {
        Ok(Self::decode(qb64b)?.0)
    }

    pub fn decode(qb64b: &[u8]) -> MatterResult<(Self, usize)> {
        let (matter, used) = Matter::decode(qb64b)?;
        if !dig_dex::TUPLE.contains(&matter.code()) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for saider: {}",
                matter.code()
            )));
        }
        Ok((Saider { matter }, used))
    }

    pub fn strip(buf: &mut Vec<u8>) -> MatterResult<Self> {
        let (saider, used) = Self::decode(buf)?;
        buf.drain(..used);
        Ok(saider)
    }

    /// Computes the said of `sad` at `label` by dummy substitution and
    /// returns the saider together with the updated sad.
    pub fn saidify(
        sad: &Value,
        kind: Kinds,
        code: Option<&str>,
        label: &str,
    ) -> KeriResult<(Self, Value)> {
        let code = code.unwrap_or(mtr_dex::BLAKE3_256);
        let mut sad = sad.clone();
        let map = sad
            .as_object_mut()
            .ok_or_else(|| KeriError::FieldError("Sad is not a field map".to_string()))?;
        map.insert(label.to_string(), Value::String(dummy(code)?));
        let raw = dumps(&sad, kind)?;
        let diger = Diger::from_ser(&raw, Some(code))?;
        let qb64 = diger.qb64();
        sad.as_object_mut()
            .expect("still a field map")
            .insert(label.to_string(), Value::String(qb64.clone()));
        let saider = Saider::from_qb64(&qb64)?;
        Ok((saider, sad))
    }

    /// Reproduces the dummy substitution procedure and compares with this
    /// said.
    pub fn verify(&self, sad: &Value, kind: Kinds, label: &str) -> bool {
        let mut dummied = sad.clone();
        let Some(map) = dummied.as_object_mut() else {
            return false;
        };
        let Ok(placeholder) = dummy(self.code()) else {
            return false;
        };
        map.insert(label.to_string(), Value::String(placeholder));
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
    use crate::core::serdering::sadify;
    use serde_json::json;

    #[test]
    fn test_saidify_and_verify() {
        let sad = sadify(vec![
            ("d", json!("")),
            ("first", json!("John")),
            ("last", json!("Doe")),
        ]);
        let (saider, saided) = Saider::saidify(&sad, Kinds::Json, None, "d").unwrap();
        assert_eq!(saider.code(), mtr_dex::BLAKE3_256);
        assert_eq!(
            saided.get("d").unwrap().as_str().unwrap(),
            saider.qb64().as_str()
        );
        assert!(saider.verify(&saided, Kinds::Json, "d"));

        // tampering breaks verification
        let mut tampered = saided.clone();
        tampered
            .as_object_mut()
            .unwrap()
            .insert("last".to_string(), json!("Smith"));
        assert!(!saider.verify(&tampered, Kinds::Json, "d"));
    }
}
