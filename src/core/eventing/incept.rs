//! Inception event construction for `icp` and `dip`.

use crate::cesr::dig_dex;
use crate::cesr::tholder::Tholder;
use crate::core::eventing::MAX_INT_THOLD;
use crate::core::serdering::{sadify, Serder};
use crate::core::{ample, Ilks, Kinds, VERSION};
use crate::errors::{KeriError, KeriResult};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Builder for inception events. Produces `icp`, or `dip` when a delegator
/// prefix is supplied.
pub struct InceptBuilder {
    keys: Vec<String>,
    isith: Option<Value>,
    ndigs: Vec<String>,
    nsith: Option<Value>,
    toad: Option<u64>,
    wits: Vec<String>,
    cnfg: Vec<String>,
    data: Vec<Value>,
    kind: Kinds,
    code: Option<String>,
    intive: bool,
    delpre: Option<String>,
}

impl InceptBuilder {
    pub fn new(keys: Vec<String>) -> Self {
        InceptBuilder {
            keys,
            isith: None,
            ndigs: Vec::new(),
            nsith: None,
            toad: None,
            wits: Vec::new(),
            cnfg: Vec::new(),
            data: Vec::new(),
            kind: Kinds::Json,
            code: None,
            intive: false,
            delpre: None,
        }
    }

    /// Current signing threshold, wire form.
    pub fn with_isith(mut self, isith: Value) -> Self {
        self.isith = Some(isith);
        self
    }

    /// Next key digest list.
    pub fn with_ndigs(mut self, ndigs: Vec<String>) -> Self {
        self.ndigs = ndigs;
        self
    }

    /// Next signing threshold, wire form.
    pub fn with_nsith(mut self, nsith: Value) -> Self {
        self.nsith = Some(nsith);
        self
    }

    /// Witness threshold.
    pub fn with_toad(mut self, toad: u64) -> Self {
        self.toad = Some(toad);
        self
    }

    /// Witness list.
    pub fn with_wits(mut self, wits: Vec<String>) -> Self {
        self.wits = wits;
        self
    }

    /// Configuration trait list.
    pub fn with_cnfg(mut self, cnfg: Vec<String>) -> Self {
        self.cnfg = cnfg;
        self
    }

    /// Seal data for the `a` field.
    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_kind(mut self, kind: Kinds) -> Self {
        self.kind = kind;
        self
    }

    /// Derivation code for a self-addressing prefix.
    pub fn with_code(mut self, code: String) -> Self {
        self.code = Some(code);
        self
    }

    /// Emit thresholds as integers when they fit.
    pub fn with_intive(mut self, intive: bool) -> Self {
        self.intive = intive;
        self
    }

    /// Delegator prefix, makes this a `dip`.
    pub fn with_delpre(mut self, delpre: String) -> Self {
        self.delpre = Some(delpre);
        self
    }

    pub fn build(self) -> KeriResult<Serder> {
        let vs = crate::core::versify("KERI", &VERSION, self.kind, 0)?;
        let ilk = if self.delpre.is_none() {
            Ilks::ICP
        } else {
            Ilks::DIP
        };

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

        let wits_set: HashSet<&String> = self.wits.iter().collect();
        if wits_set.len() != self.wits.len() {
            return Err(KeriError::ValueError(format!(
                "Invalid wits = {:?}, has duplicates.",
                self.wits
            )));
        }

        let toad = match self.toad {
            Some(t) => t,
            None => {
                if self.wits.is_empty() {
                    0
                } else {
                    ample(self.wits.len() as u64, None, true)?
                }
            }
        };
        if !self.wits.is_empty() {
            if toad < 1 || toad > self.wits.len() as u64 {
                return Err(KeriError::ValueError(format!(
                    "Invalid toad = {} for wits = {:?}",
                    toad, self.wits
                )));
            }
        } else if toad != 0 {
            return Err(KeriError::ValueError(format!(
                "Invalid toad = {} for wits = {:?}",
                toad, self.wits
            )));
        }

        let kt = threshold_value(&tholder, self.intive);
        let nt = threshold_value(&ntholder, self.intive);
        let bt = if self.intive && toad <= MAX_INT_THOLD {
            json!(toad)
        } else {
            json!(format!("{:x}", toad))
        };

        // Basic derivation uses the single signing key as the prefix;
        // otherwise the prefix field stays empty for said computation
        let i = if self.delpre.is_none()
            && self.keys.len() == 1
            && self
                .code
                .as_deref()
                .map(|c| !dig_dex::TUPLE.contains(&c))
                .unwrap_or(true)
        {
            json!(self.keys[0].clone())
        } else {
            json!("")
        };

        let mut fields = vec![
            ("v", json!(vs)),
            ("t", json!(ilk)),
            ("d", json!("")),
            ("i", i),
            ("s", json!("0")),
            ("kt", kt),
            ("k", json!(self.keys)),
            ("nt", nt),
            ("n", json!(self.ndigs)),
            ("bt", bt),
            ("b", json!(self.wits)),
            ("c", json!(self.cnfg)),
            ("a", Value::Array(self.data)),
        ];
        if let Some(delpre) = &self.delpre {
            fields.push(("di", json!(delpre)));
        }
        let sad = sadify(fields);

        let mut saids: HashMap<&str, String> = HashMap::new();
        if let Some(code) = &self.code {
            if dig_dex::TUPLE.contains(&code.as_str()) {
                saids.insert("i", code.clone());
            }
        }
        Serder::makify(sad, self.kind, if saids.is_empty() { None } else { Some(saids) })
    }
}

/// Wire form of a threshold honoring the intive flag.
pub(crate) fn threshold_value(tholder: &Tholder, intive: bool) -> Value {
    match tholder.num() {
        Some(num) if intive && num <= MAX_INT_THOLD => json!(num),
        _ => tholder.sith().clone(),
    }
}
