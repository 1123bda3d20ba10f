//! Serder: event body (de)serialization across JSON/CBOR/MGPK with an
//! embedded size-encoded version string and self-addressing identifier
//! computation via dummy substitution.
//!
//! Field maps are `serde_json::Value` objects; the crate enables
//! `preserve_order` so declared key order survives all three wire kinds.

use crate::cesr::diger::Diger;
use crate::cesr::tholder::Tholder;
use crate::cesr::verfer::Verfer;
use crate::cesr::{dig_dex, mtr_dex, Matter, SIZES};
use crate::core::{deversify, smell, versify, Ilks, Kinds, Smellage, Versionage, VERSION};
use crate::errors::{KeriError, KeriResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::error;

/// Serializes a field map in the given kind.
pub fn dumps(sad: &Value, kind: Kinds) -> KeriResult<Vec<u8>> {
    match kind {
        Kinds::Json => serde_json::to_vec(sad).map_err(|e| KeriError::SerializeError(e.to_string())),
        Kinds::Cbor => serde_cbor::to_vec(sad).map_err(|e| KeriError::SerializeError(e.to_string())),
        Kinds::Mgpk => rmp_serde::to_vec(sad).map_err(|e| KeriError::SerializeError(e.to_string())),
    }
}

/// Deserializes a field map of the given kind from exactly `raw`.
pub fn loads(raw: &[u8], kind: Kinds) -> KeriResult<Value> {
    match kind {
        Kinds::Json => {
            serde_json::from_slice(raw).map_err(|e| KeriError::DeserializeError(e.to_string()))
        }
        Kinds::Cbor => {
            serde_cbor::from_slice(raw).map_err(|e| KeriError::DeserializeError(e.to_string()))
        }
        Kinds::Mgpk => {
            rmp_serde::from_slice(raw).map_err(|e| KeriError::DeserializeError(e.to_string()))
        }
    }
}

/// Returns the dummy placeholder string for a said field of `code`.
pub fn dummy(code: &str) -> KeriResult<String> {
    let size = SIZES
        .get(code)
        .ok_or_else(|| KeriError::DerivationError(format!("Unsupported said code={}", code)))?;
    let fs = size
        .fs
        .ok_or_else(|| KeriError::DerivationError(format!("Variable said code={}", code)))?;
    Ok("#".repeat(fs))
}

/// Said field labels with their digest codes for a given event sad.
///
/// The `d` field is always saidive for key events; for inceptions the `i`
/// field is additionally saidive when missing, empty, or already digest
/// coded (self-addressing derivation). Receipts and key state notices carry
/// a foreign said in `d` and are not saidive.
fn said_labels(sad: &Value) -> Vec<(&'static str, String)> {
    let ilk = sad.get("t").and_then(|t| t.as_str()).unwrap_or_default();
    // Default digest code, or the stored field's own digest code on reparse
    let dcode = match sad.get("d").and_then(|d| d.as_str()) {
        Some(d) if !d.is_empty() => match Matter::from_qb64(d) {
            Ok(m) if dig_dex::TUPLE.contains(&m.code()) => m.code().to_string(),
            _ => mtr_dex::BLAKE3_256.to_string(),
        },
        _ => mtr_dex::BLAKE3_256.to_string(),
    };
    let mut labels: Vec<(&'static str, String)> = Vec::new();
    match ilk {
        Ilks::RCT | Ilks::KSN => {}
        Ilks::ICP | Ilks::DIP => {
            labels.push(("d", dcode));
            let icode = match sad.get("i").and_then(|i| i.as_str()) {
                Some(i) if !i.is_empty() => match Matter::from_qb64(i) {
                    Ok(m) if dig_dex::TUPLE.contains(&m.code()) => Some(m.code().to_string()),
                    Ok(_) => None,
                    Err(_) => Some(mtr_dex::BLAKE3_256.to_string()),
                },
                _ => Some(mtr_dex::BLAKE3_256.to_string()),
            };
            if let Some(code) = icode {
                labels.push(("i", code));
            }
        }
        _ => {
            labels.push(("d", dcode));
        }
    }
    labels
}

/// Event body serializer and deserializer with said computation.
#[derive(Debug, Clone)]
pub struct Serder {
    raw: Vec<u8>,
    sad: Value,
    proto: String,
    vrsn: Versionage,
    kind: Kinds,
    size: usize,
    said: Option<String>,
}

impl Serder {
    /// Parses the version string from the front of `raw`, deserializes
    /// exactly the declared size as the event body, and verifies the said.
    pub fn from_raw(raw: &[u8]) -> KeriResult<Self> {
        let smellage = smell(raw)?;
        Self::from_raw_smelled(raw, smellage)
    }

    /// Like [`Serder::from_raw`] with a pre-computed smellage, avoiding a
    /// second smell when the parser has already peeked the version string.
    pub fn from_raw_smelled(raw: &[u8], smellage: Smellage) -> KeriResult<Self> {
        if raw.len() < smellage.size {
            return Err(KeriError::ShortageError(smellage.size - raw.len()));
        }
        let body = &raw[..smellage.size];
        let sad = loads(body, smellage.kind)?;
        if !sad.is_object() {
            return Err(KeriError::FieldError(
                "Event body is not a field map".to_string(),
            ));
        }
        let said = sad
            .get("d")
            .and_then(|d| d.as_str())
            .map(|d| d.to_string());
        let serder = Serder {
            raw: body.to_vec(),
            sad,
            proto: smellage.proto,
            vrsn: smellage.vrsn,
            kind: smellage.kind,
            size: smellage.size,
            said,
        };
        if let Err(err) = serder.verify() {
            error!("Invalid raw for Serder: {}", err);
            return Err(err);
        }
        Ok(serder)
    }

    /// Serializes a supplied field map, rewriting the `v` size sub-field to
    /// the actual byte length. The sad must already carry its saids.
    pub fn from_sad(sad: Value, kind: Kinds) -> KeriResult<Self> {
        let mut sad = sad;
        let size = size_sad(&mut sad, kind)?;
        let raw = dumps(&sad, kind)?;
        let said = sad
            .get("d")
            .and_then(|d| d.as_str())
            .map(|d| d.to_string());
        Ok(Serder {
            raw,
            sad,
            proto: "KERI".to_string(),
            vrsn: VERSION,
            kind,
            size,
            said,
        })
    }

    /// Makes the version string and computes said field values for a sad,
    /// dummy-substituting the said labels before hashing. `saids` overrides
    /// the default label digest codes.
    pub fn makify(
        sad: Value,
        kind: Kinds,
        saids: Option<HashMap<&str, String>>,
    ) -> KeriResult<Self> {
        let mut sad = sad;
        {
            let map = sad.as_object_mut().ok_or_else(|| {
                KeriError::FieldError("Event body is not a field map".to_string())
            })?;
            if !map.contains_key("t") {
                return Err(KeriError::FieldError("Missing ilk field t".to_string()));
            }
        }
        let mut labels = said_labels(&sad);
        if let Some(saids) = saids {
            for (label, code) in saids {
                if let Some(entry) = labels.iter_mut().find(|(l, _)| *l == label) {
                    entry.1 = code;
                } else if label == "i" {
                    labels.push(("i", code));
                }
            }
        }

        // Install dummies so the hashed serialization has final length
        for (label, code) in &labels {
            let placeholder = dummy(code)?;
            sad.as_object_mut()
                .expect("checked above")
                .insert((*label).to_string(), Value::String(placeholder));
        }
        size_sad(&mut sad, kind)?;
        let dummy_raw = dumps(&sad, kind)?;

        let mut digests: HashMap<String, String> = HashMap::new();
        for (label, code) in &labels {
            let qb64 = match digests.get(code) {
                Some(q) => q.clone(),
                None => {
                    let q = Diger::from_ser(&dummy_raw, Some(code))?.qb64();
                    digests.insert(code.clone(), q.clone());
                    q
                }
            };
            sad.as_object_mut()
                .expect("checked above")
                .insert((*label).to_string(), Value::String(qb64));
        }
        Self::from_sad(sad, kind)
    }

    /// Recomputes the said(s) from the dummy-substituted serialization and
    /// compares with the stored field values.
    pub fn verify(&self) -> KeriResult<()> {
        let labels = said_labels(&self.sad);
        if labels.is_empty() {
            return Ok(());
        }
        let mut dummied = self.sad.clone();
        for (label, code) in &labels {
            let placeholder = dummy(code)?;
            dummied
                .as_object_mut()
                .ok_or_else(|| KeriError::FieldError("Event body is not a field map".to_string()))?
                .insert((*label).to_string(), Value::String(placeholder));
        }
        let dummy_raw = dumps(&dummied, self.kind)?;
        for (label, code) in &labels {
            let expected = Diger::from_ser(&dummy_raw, Some(code))?.qb64();
            let actual = self
                .sad
                .get(*label)
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if actual != expected {
                return Err(KeriError::ValidationError(format!(
                    "Invalid said field {}={} expected {} for evt={}",
                    label, actual, expected, self.pretty()
                )));
            }
        }
        Ok(())
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn sad(&self) -> &Value {
        &self.sad
    }

    /// Alias for the key event dict.
    pub fn ked(&self) -> &Value {
        &self.sad
    }

    pub fn kind(&self) -> Kinds {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn proto(&self) -> &str {
        &self.proto
    }

    pub fn vrsn(&self) -> &Versionage {
        &self.vrsn
    }

    pub fn said(&self) -> Option<&str> {
        self.said.as_deref()
    }

    pub fn saidb(&self) -> Option<Vec<u8>> {
        self.said.as_ref().map(|s| s.as_bytes().to_vec())
    }

    pub fn ilk(&self) -> Option<&str> {
        self.sad.get("t").and_then(|t| t.as_str())
    }

    pub fn pre(&self) -> Option<String> {
        self.sad
            .get("i")
            .and_then(|i| i.as_str())
            .map(|i| i.to_string())
    }

    pub fn preb(&self) -> Option<Vec<u8>> {
        self.pre().map(|p| p.into_bytes())
    }

    /// Sequence number parsed from the lowercase hex `s` field.
    pub fn sn(&self) -> KeriResult<u64> {
        let snh = self
            .sad
            .get("s")
            .and_then(|s| s.as_str())
            .ok_or_else(|| KeriError::FieldError("Missing sn field s".to_string()))?;
        if snh.len() > 1 && snh.starts_with('0') {
            return Err(KeriError::ValidationError(format!(
                "Invalid sn={} with leading zeros",
                snh
            )));
        }
        u64::from_str_radix(snh, 16)
            .map_err(|e| KeriError::ValidationError(format!("Invalid hex sn={}: {}", snh, e)))
    }

    pub fn snh(&self) -> Option<String> {
        self.sad
            .get("s")
            .and_then(|s| s.as_str())
            .map(|s| s.to_string())
    }

    fn str_list(&self, label: &str) -> Vec<String> {
        self.sad
            .get(label)
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|k| k.as_str())
                    .map(|k| k.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current signing keys `k`.
    pub fn keys(&self) -> Vec<String> {
        self.str_list("k")
    }

    pub fn verfers(&self) -> KeriResult<Vec<Verfer>> {
        self.keys()
            .iter()
            .map(|k| Verfer::from_qb64(k).map_err(KeriError::from))
            .collect()
    }

    /// Next key digest list `n`.
    pub fn ndigs(&self) -> Vec<String> {
        self.str_list("n")
    }

    pub fn ndigers(&self) -> KeriResult<Vec<Diger>> {
        self.ndigs()
            .iter()
            .map(|d| Diger::from_qb64(d).map_err(KeriError::from))
            .collect()
    }

    /// Witness list `b`.
    pub fn backs(&self) -> Vec<String> {
        self.str_list("b")
    }

    /// Witness removals `br` of a rotation.
    pub fn cuts(&self) -> Vec<String> {
        self.str_list("br")
    }

    /// Witness additions `ba` of a rotation.
    pub fn adds(&self) -> Vec<String> {
        self.str_list("ba")
    }

    /// Configuration trait list `c`.
    pub fn traits(&self) -> Vec<String> {
        self.str_list("c")
    }

    pub fn tholder(&self) -> KeriResult<Option<Tholder>> {
        match self.sad.get("kt") {
            Some(kt) => Ok(Some(Tholder::from_sith(kt)?)),
            None => Ok(None),
        }
    }

    pub fn ntholder(&self) -> KeriResult<Option<Tholder>> {
        match self.sad.get("nt") {
            Some(nt) => Ok(Some(Tholder::from_sith(nt)?)),
            None => Ok(None),
        }
    }

    /// Witness threshold `bt` as an integer, accepting hex string or number
    /// wire forms.
    pub fn toad(&self) -> KeriResult<u64> {
        match self.sad.get("bt") {
            Some(Value::String(s)) => u64::from_str_radix(s, 16)
                .map_err(|e| KeriError::ValidationError(format!("Invalid toad={}: {}", s, e))),
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| KeriError::ValidationError(format!("Invalid toad={}", n))),
            Some(other) => Err(KeriError::ValidationError(format!(
                "Invalid toad={:?}",
                other
            ))),
            None => Err(KeriError::FieldError("Missing toad field bt".to_string())),
        }
    }

    /// Prior event said `p`.
    pub fn prior(&self) -> Option<String> {
        self.sad
            .get("p")
            .and_then(|p| p.as_str())
            .map(|p| p.to_string())
    }

    /// Delegator prefix `di` of a delegated inception.
    pub fn delpre(&self) -> Option<String> {
        self.sad
            .get("di")
            .and_then(|d| d.as_str())
            .filter(|d| !d.is_empty())
            .map(|d| d.to_string())
    }

    /// Seal list `a`.
    pub fn seals(&self) -> Option<&Value> {
        self.sad.get("a")
    }

    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.sad).unwrap_or_default()
    }
}

/// Rewrites the `v` field of `sad` so its size sub-field matches the actual
/// serialized length, returning that length.
fn size_sad(sad: &mut Value, kind: Kinds) -> KeriResult<usize> {
    let map = sad
        .as_object_mut()
        .ok_or_else(|| KeriError::FieldError("Event body is not a field map".to_string()))?;
    let (proto, vrsn) = match map.get("v").and_then(|v| v.as_str()) {
        Some(vs) if vs.len() == crate::core::VER_FULL_SPAN && !vs.starts_with('#') => {
            let smellage = deversify(vs.as_bytes())?;
            (smellage.proto, smellage.vrsn)
        }
        _ => ("KERI".to_string(), VERSION),
    };
    map.insert(
        "v".to_string(),
        Value::String(versify(&proto, &vrsn, kind, 0)?),
    );
    let size = dumps(sad, kind)?.len();
    let map = sad.as_object_mut().expect("still a field map");
    map.insert(
        "v".to_string(),
        Value::String(versify(&proto, &vrsn, kind, size)?),
    );
    Ok(size)
}

/// Builds an ordered field map from label/value pairs.
pub fn sadify(fields: Vec<(&str, Value)>) -> Value {
    let mut map = Map::new();
    for (label, value) in fields {
        map.insert(label.to_string(), value);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_icp() -> Value {
        sadify(vec![
            ("v", json!("KERI10JSON000000_")),
            ("t", json!("icp")),
            ("d", json!("")),
            ("i", json!("BFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH")),
            ("s", json!("0")),
            ("kt", json!("1")),
            ("k", json!(["BFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH"])),
            ("nt", json!("0")),
            ("n", json!([])),
            ("bt", json!("0")),
            ("b", json!([])),
            ("c", json!([])),
            ("a", json!([])),
        ])
    }

    #[test]
    fn test_serder_makify_vector() {
        // Ephemeral nontransferable inception, known vector
        let serder = Serder::makify(minimal_icp(), Kinds::Json, None).unwrap();
        assert_eq!(serder.size(), 0xfd);
        assert_eq!(
            serder.raw(),
            &b"{\"v\":\"KERI10JSON0000fd_\",\"t\":\"icp\",\"d\":\"EMW0zK3bagYPO6gx3w7Ua90f-I7x5kGIaI4Xeq9W8_As\",\"i\":\"BFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH\",\"s\":\"0\",\"kt\":\"1\",\"k\":[\"BFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH\"],\"nt\":\"0\",\"n\":[],\"bt\":\"0\",\"b\":[],\"c\":[],\"a\":[]}"[..]
        );
        assert_eq!(
            serder.said(),
            Some("EMW0zK3bagYPO6gx3w7Ua90f-I7x5kGIaI4Xeq9W8_As")
        );
        assert_eq!(
            serder.pre(),
            Some("BFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string())
        );
        assert_eq!(serder.sn().unwrap(), 0);
        assert_eq!(serder.ilk(), Some(Ilks::ICP));
    }

    #[test]
    fn test_serder_roundtrip_kinds() {
        for kind in [Kinds::Json, Kinds::Cbor, Kinds::Mgpk] {
            let serder = Serder::makify(minimal_icp(), kind, None).unwrap();
            let parsed = Serder::from_raw(serder.raw()).unwrap();
            assert_eq!(parsed.sad(), serder.sad());
            assert_eq!(parsed.said(), serder.said());
            assert_eq!(parsed.kind(), kind);
            assert_eq!(parsed.size(), serder.size());
        }
    }

    #[test]
    fn test_serder_tampered_said_rejected() {
        let serder = Serder::makify(minimal_icp(), Kinds::Json, None).unwrap();
        let mut sad = serder.sad().clone();
        sad.as_object_mut().unwrap().insert(
            "d".to_string(),
            json!("EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ"),
        );
        let forged = Serder::from_sad(sad, Kinds::Json).unwrap();
        match Serder::from_raw(forged.raw()) {
            Err(KeriError::ValidationError(_)) => (),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_serder_determinism() {
        let a = Serder::makify(minimal_icp(), Kinds::Json, None).unwrap();
        let b = Serder::makify(minimal_icp(), Kinds::Json, None).unwrap();
        assert_eq!(a.raw(), b.raw());
        assert_eq!(a.said(), b.said());
    }

    #[test]
    fn test_serder_trailing_bytes_ignored() {
        let serder = Serder::makify(minimal_icp(), Kinds::Json, None).unwrap();
        let mut stream = serder.raw().to_vec();
        stream.extend_from_slice(b"-AABAA...");
        let parsed = Serder::from_raw(&stream).unwrap();
        assert_eq!(parsed.size(), serder.size());
        assert_eq!(parsed.raw(), serder.raw());
    }
}
