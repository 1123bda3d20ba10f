//! Rotation event construction for `rot` and `drt`.

use crate::cesr::tholder::Tholder;
use crate::core::eventing::incept::threshold_value;
use crate::core::eventing::MAX_INT_THOLD;
use crate::core::serdering::{sadify, Serder};
use crate::core::{ample, Ilks, Kinds, VERSION};
use crate::errors::{KeriError, KeriResult};
use serde_json::{json, Value};
use std::collections::HashSet;

/// Builder for rotation events over an established identifier.
pub struct RotateBuilder {
    pre: String,
    keys: Vec<String>,
    dig: String,
    ilk: &'static str,
    sn: u64,
    isith: Option<Value>,
    ndigs: Vec<String>,
    nsith: Option<Value>,
    toad: Option<u64>,
    wits: Vec<String>,
    cuts: Vec<String>,
    adds: Vec<String>,
    data: Vec<Value>,
    kind: Kinds,
    intive: bool,
}

impl RotateBuilder {
    /// `pre` is the identifier, `keys` the new signing keys, `dig` the said
    /// of the prior accepted event.
    pub fn new(pre: String, keys: Vec<String>, dig: String) -> Self {
        RotateBuilder {
            pre,
            keys,
            dig,
            ilk: Ilks::ROT,
            sn: 1,
            isith: None,
            ndigs: Vec::new(),
            nsith: None,
            toad: None,
            wits: Vec::new(),
            cuts: Vec::new(),
            adds: Vec::new(),
            data: Vec::new(),
            kind: Kinds::Json,
            intive: false,
        }
    }

    /// Makes this a delegated rotation `drt`.
    pub fn delegated(mut self) -> Self {
        self.ilk = Ilks::DRT;
        self
    }

    pub fn with_sn(mut self, sn: u64) -> Self {
        self.sn = sn;
        self
    }

    pub fn with_isith(mut self, isith: Value) -> Self {
        self.isith = Some(isith);
        self
    }

    pub fn with_ndigs(mut self, ndigs: Vec<String>) -> Self {
        self.ndigs = ndigs;
        self
    }

    pub fn with_nsith(mut self, nsith: Value) -> Self {
        self.nsith = Some(nsith);
        self
    }

    pub fn with_toad(mut self, toad: u64) -> Self {
        self.toad = Some(toad);
        self
    }

    /// Prior witness list the cuts and adds apply against.
    pub fn with_wits(mut self, wits: Vec<String>) -> Self {
        self.wits = wits;
        self
    }

    pub fn with_cuts(mut self, cuts: Vec<String>) -> Self {
        self.cuts = cuts;
        self
    }

    pub fn with_adds(mut self, adds: Vec<String>) -> Self {
        self.adds = adds;
        self
    }

    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_kind(mut self, kind: Kinds) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_intive(mut self, intive: bool) -> Self {
        self.intive = intive;
        self
    }

    pub fn build(self) -> KeriResult<Serder> {
        if self.sn < 1 {
            return Err(KeriError::ValueError(format!(
                "Invalid sn = {:x} for rot or drt.",
                self.sn
            )));
        }
        let vs = crate::core::versify("KERI", &VERSION, self.kind, 0)?;

        let isith = match self.isith {
            Some(sith) => sith,
            None => json!(format!("{:x}", 1.max((self.keys.len() + 1) / 2))),
        };
        let tholder = Tholder::from_sith(&isith)?;
        if let Some(num) = tholder.num() {
            if num < 1 {
                return Err(KeriError::ValueError(format!(
                    "Invalid sith = {} less than 1.",
                    num
                )));
            }
        }
        if tholder.size() > self.keys.len() {
            return Err(KeriError::ValueError(format!(
                "Invalid sith = {:?} for keys = {:?}",
                isith, self.keys
            )));
        }

        let nsith = match self.nsith {
            Some(sith) => sith,
            None => json!(format!("{:x}", (self.ndigs.len() + 1) / 2)),
        };
        let ntholder = Tholder::from_sith(&nsith)?;
        if ntholder.size() > self.ndigs.len() {
            return Err(KeriError::ValueError(format!(
                "Invalid nsith = {:?} for ndigs = {:?}",
                nsith, self.ndigs
            )));
        }

        // Witness list derivation: cuts must come from the prior list, adds
        // must be disjoint from both the remainder and the cuts
        let witset: HashSet<&String> = self.wits.iter().collect();
        if witset.len() != self.wits.len() {
            return Err(KeriError::ValueError(format!(
                "Invalid wits = {:?}, has duplicates.",
                self.wits
            )));
        }
        let cutset: HashSet<&String> = self.cuts.iter().collect();
        if cutset.len() != self.cuts.len() {
            return Err(KeriError::ValueError(format!(
                "Invalid cuts = {:?}, has duplicates.",
                self.cuts
            )));
        }
        if !cutset.is_subset(&witset) {
            return Err(KeriError::ValueError(format!(
                "Invalid cuts = {:?}, not all members in wits.",
                self.cuts
            )));
        }
        let addset: HashSet<&String> = self.adds.iter().collect();
        if addset.len() != self.adds.len() {
            return Err(KeriError::ValueError(format!(
                "Invalid adds = {:?}, has duplicates.",
                self.adds
            )));
        }
        if !addset.is_disjoint(&witset) {
            return Err(KeriError::ValueError(format!(
                "Intersecting wits = {:?} and adds = {:?}.",
                self.wits, self.adds
            )));
        }
        let newits: Vec<String> = self
            .wits
            .iter()
            .filter(|w| !cutset.contains(w))
            .chain(self.adds.iter())
            .cloned()
            .collect();

        let toad = match self.toad {
            Some(t) => t,
            None => {
                if newits.is_empty() {
                    0
                } else {
                    ample(newits.len() as u64, None, true)?
                }
            }
        };
        if !newits.is_empty() {
            if toad < 1 || toad > newits.len() as u64 {
                return Err(KeriError::ValueError(format!(
                    "Invalid toad = {} for resultant wits = {:?}",
                    toad, newits
                )));
            }
        } else if toad != 0 {
            return Err(KeriError::ValueError(format!(
                "Invalid toad = {} for resultant wits = {:?}",
                toad, newits
            )));
        }

        let kt = threshold_value(&tholder, self.intive);
        let nt = threshold_value(&ntholder, self.intive);
        let bt = if self.intive && toad <= MAX_INT_THOLD {
            json!(toad)
        } else {
            json!(format!("{:x}", toad))
        };

        let sad = sadify(vec![
            ("v", json!(vs)),
            ("t", json!(self.ilk)),
            ("d", json!("")),
            ("i", json!(self.pre)),
            ("s", json!(format!("{:x}", self.sn))),
            ("p", json!(self.dig)),
            ("kt", kt),
            ("k", json!(self.keys)),
            ("nt", nt),
            ("n", json!(self.ndigs)),
            ("bt", bt),
            ("br", json!(self.cuts)),
            ("ba", json!(self.adds)),
            ("a", Value::Array(self.data)),
        ]);
        Serder::makify(sad, self.kind, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cesr::diger::Diger;
    use crate::cesr::mtr_dex;
    use crate::cesr::signer::Signer;

    fn signer(seed: &[u8]) -> Signer {
        Signer::new(Some(seed), Some(mtr_dex::ED25519_SEED), Some(true)).unwrap()
    }

    #[test]
    fn test_rotate_basic() {
        let seed0 = b"\x9f{\xa8\xa7\xa8C9\x96&\xfa\xb1\x99\xeb\xaa \xc4\x1bG\x11\xc4\xaeSAR\xc9\xbd\x04\x9d\x85)~\x93";
        let seed1 = b"\x83B~\x04\x94\xe3\xceUQy\x11f\x0c\x93]\x1e\xbf\xacQ\xb5\xd6Y^\xa2E\xfa\x015\x98Y\xdd\xe8";
        let signer0 = signer(seed0);
        let signer1 = signer(seed1);

        let pre = signer0.verfer().qb64();
        let dig = "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ".to_string();
        let ndig = Diger::from_ser(&signer1.verfer().qb64b(), None).unwrap().qb64();

        let serder = RotateBuilder::new(pre.clone(), vec![signer1.verfer().qb64()], dig.clone())
            .with_sn(1)
            .with_ndigs(vec![ndig.clone()])
            .build()
            .unwrap();
        let ked = serder.ked();
        assert_eq!(ked["t"].as_str().unwrap(), Ilks::ROT);
        assert_eq!(ked["i"].as_str().unwrap(), pre);
        assert_eq!(ked["s"].as_str().unwrap(), "1");
        assert_eq!(ked["p"].as_str().unwrap(), dig);
        assert_eq!(ked["kt"].as_str().unwrap(), "1");
        assert_eq!(ked["n"].as_array().unwrap()[0].as_str().unwrap(), ndig);
        assert!(ked["br"].as_array().unwrap().is_empty());
        assert!(ked["ba"].as_array().unwrap().is_empty());
        // said recomputes on reparse
        let parsed = Serder::from_raw(serder.raw()).unwrap();
        assert_eq!(parsed.said(), serder.said());
    }

    #[test]
    fn test_rotate_witness_derivation() {
        let wits = vec!["BAAA".repeat(11), "BBBB".repeat(11), "BCCC".repeat(11)];
        let serder = RotateBuilder::new(
            "DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string(),
            vec!["DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string()],
            "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ".to_string(),
        )
        .with_sn(2)
        .with_ndigs(vec!["EIf-ENw7PrM52w4H-S7NGU2qVIfraXVIlV9hEAaMHg7W".to_string()])
        .with_wits(wits.clone())
        .with_cuts(vec![wits[0].clone()])
        .with_adds(vec!["BDDD".repeat(11)])
        .with_toad(2)
        .build()
        .unwrap();
        let ked = serder.ked();
        assert_eq!(ked["bt"].as_str().unwrap(), "2");
        assert_eq!(ked["br"].as_array().unwrap().len(), 1);
        assert_eq!(ked["ba"].as_array().unwrap().len(), 1);

        // cut not in wits
        assert!(RotateBuilder::new(
            "DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string(),
            vec!["DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string()],
            "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ".to_string(),
        )
        .with_sn(2)
        .with_ndigs(vec!["EIf-ENw7PrM52w4H-S7NGU2qVIfraXVIlV9hEAaMHg7W".to_string()])
        .with_wits(wits.clone())
        .with_cuts(vec!["BEEE".repeat(11)])
        .build()
        .is_err());

        // add intersects wits
        assert!(RotateBuilder::new(
            "DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string(),
            vec!["DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string()],
            "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ".to_string(),
        )
        .with_sn(2)
        .with_ndigs(vec!["EIf-ENw7PrM52w4H-S7NGU2qVIfraXVIlV9hEAaMHg7W".to_string()])
        .with_wits(wits.clone())
        .with_adds(vec![wits[1].clone()])
        .build()
        .is_err());
    }

    #[test]
    fn test_rotate_sn_zero_rejected() {
        assert!(RotateBuilder::new(
            "DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string(),
            vec!["DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string()],
            "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ".to_string(),
        )
        .with_sn(0)
        .build()
        .is_err());
    }

    #[test]
    fn test_rotate_delegated() {
        let serder = RotateBuilder::new(
            "EAKCxMOuoRzREVHsHCkLilBrUXTvyenBiuM2QtV8BB0C".to_string(),
            vec!["DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string()],
            "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ".to_string(),
        )
        .delegated()
        .with_sn(1)
        .with_ndigs(vec!["EIf-ENw7PrM52w4H-S7NGU2qVIfraXVIlV9hEAaMHg7W".to_string()])
        .build()
        .unwrap();
        assert_eq!(serder.ked()["t"].as_str().unwrap(), Ilks::DRT);
    }
}
