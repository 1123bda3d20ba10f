//! Tholder: signing threshold holder for simple and fractionally weighted
//! thresholds with clause partitioning.

use crate::errors::{KeriError, KeriResult};
use num_rational::Ratio;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct Tholder {
    weighted: bool,
    size: usize,
    num: Option<u64>,
    thold: Vec<Vec<Ratio<u64>>>,
    sith: Value,
}

impl Tholder {
    /// Parses a threshold from its wire form: an unsigned integer, a hex
    /// string, a flat list of weight fractions, or a list of clauses.
    pub fn from_sith(sith: &Value) -> KeriResult<Self> {
        match sith {
            Value::Number(n) => {
                let num = n.as_u64().ok_or_else(|| {
                    KeriError::ValueError(format!("Invalid threshold number {}", n))
                })?;
                Ok(Self::from_num(num))
            }
            Value::String(s) => {
                if s.trim_start().starts_with('[') {
                    let v: Value = serde_json::from_str(s)
                        .map_err(|e| KeriError::ValueError(format!("Invalid sith json: {}", e)))?;
                    Self::from_sith(&v)
                } else {
                    let num = u64::from_str_radix(s, 16).map_err(|e| {
                        KeriError::ValueError(format!("Invalid hex threshold {}: {}", s, e))
                    })?;
                    Ok(Self::from_num(num))
                }
            }
            Value::Array(items) => {
                let clauses: Vec<Vec<String>> = if items.iter().all(|i| i.is_string()) {
                    vec![items
                        .iter()
                        .map(|i| i.as_str().unwrap_or_default().to_string())
                        .collect()]
                } else if items.iter().all(|i| i.is_array()) {
                    items
                        .iter()
                        .map(|clause| {
                            clause
                                .as_array()
                                .unwrap()
                                .iter()
                                .map(|w| w.as_str().unwrap_or_default().to_string())
                                .collect()
                        })
                        .collect()
                } else {
                    return Err(KeriError::ValueError(format!(
                        "Invalid mixed weighted threshold {:?}",
                        sith
                    )));
                };
                Self::from_clauses(clauses)
            }
            other => Err(KeriError::ValueError(format!(
                "Invalid threshold form {:?}",
                other
            ))),
        }
    }

    fn from_num(num: u64) -> Self {
        Tholder {
            weighted: false,
            size: num as usize,
            num: Some(num),
            thold: Vec::new(),
            sith: Value::String(format!("{:x}", num)),
        }
    }

    fn from_clauses(clauses: Vec<Vec<String>>) -> KeriResult<Self> {
        if clauses.is_empty() || clauses.iter().any(|c| c.is_empty()) {
            return Err(KeriError::ValueError(
                "Empty weighted threshold clause".to_string(),
            ));
        }
        let mut thold = Vec::with_capacity(clauses.len());
        for clause in &clauses {
            let mut weights = Vec::with_capacity(clause.len());
            for w in clause {
                weights.push(parse_weight(w)?);
            }
            let total: Ratio<u64> = weights.iter().sum();
            if total < Ratio::from_integer(1) {
                return Err(KeriError::ValueError(format!(
                    "Invalid sith clause {:?}, weights sum below one",
                    clause
                )));
            }
            thold.push(weights);
        }
        let size = thold.iter().map(|c| c.len()).sum();
        let sith = if clauses.len() == 1 {
            Value::Array(
                clauses[0]
                    .iter()
                    .map(|w| Value::String(w.clone()))
                    .collect(),
            )
        } else {
            Value::Array(
                clauses
                    .iter()
                    .map(|c| Value::Array(c.iter().map(|w| Value::String(w.clone())).collect()))
                    .collect(),
            )
        };
        Ok(Tholder {
            weighted: true,
            size,
            num: None,
            thold,
            sith,
        })
    }

    pub fn weighted(&self) -> bool {
        self.weighted
    }

    /// Minimum size of the keys list this threshold applies to.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num(&self) -> Option<u64> {
        self.num
    }

    /// Normalized JSON form: hex string or (nested) weight list.
    pub fn sith(&self) -> &Value {
        &self.sith
    }

    /// True if the set of signature indices satisfies the threshold.
    pub fn satisfy(&self, indices: &[u32]) -> bool {
        let unique: HashSet<u32> = indices.iter().copied().collect();
        if !self.weighted {
            return unique.len() as u64 >= self.num.unwrap_or(0);
        }
        let mut sats = vec![false; self.size];
        for idx in unique {
            if (idx as usize) < self.size {
                sats[idx as usize] = true;
            }
        }
        let mut offset = 0usize;
        for clause in &self.thold {
            let mut sum = Ratio::from_integer(0);
            for (k, weight) in clause.iter().enumerate() {
                if sats[offset + k] {
                    sum += *weight;
                }
            }
            if sum < Ratio::from_integer(1) {
                return false;
            }
            offset += clause.len();
        }
        true
    }
}

fn parse_weight(w: &str) -> KeriResult<Ratio<u64>> {
    let ratio = if let Some((numer, denom)) = w.split_once('/') {
        let n: u64 = numer
            .trim()
            .parse()
            .map_err(|_| KeriError::ValueError(format!("Invalid weight {}", w)))?;
        let d: u64 = denom
            .trim()
            .parse()
            .map_err(|_| KeriError::ValueError(format!("Invalid weight {}", w)))?;
        if d == 0 {
            return Err(KeriError::ValueError(format!("Invalid weight {}", w)));
        }
        Ratio::new(n, d)
    } else {
        let n: u64 = w
            .trim()
            .parse()
            .map_err(|_| KeriError::ValueError(format!("Invalid weight {}", w)))?;
        Ratio::from_integer(n)
    };
    if ratio > Ratio::from_integer(1) {
        return Err(KeriError::ValueError(format!(
            "Invalid weight {} greater than one",
            w
        )));
    }
    Ok(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tholder_simple() {
        let tholder = Tholder::from_sith(&json!("2")).unwrap();
        assert!(!tholder.weighted());
        assert_eq!(tholder.num(), Some(2));
        assert_eq!(tholder.size(), 2);
        assert!(tholder.satisfy(&[0, 1]));
        assert!(tholder.satisfy(&[0, 2, 1]));
        assert!(!tholder.satisfy(&[0]));
        assert!(!tholder.satisfy(&[0, 0]));

        let tholder = Tholder::from_sith(&json!(1)).unwrap();
        assert_eq!(tholder.num(), Some(1));
        assert!(tholder.satisfy(&[2]));

        // hex string
        let tholder = Tholder::from_sith(&json!("a")).unwrap();
        assert_eq!(tholder.num(), Some(10));

        // null threshold is trivially satisfied
        let tholder = Tholder::from_sith(&json!("0")).unwrap();
        assert!(tholder.satisfy(&[]));
    }

    #[test]
    fn test_tholder_weighted() {
        let tholder =
            Tholder::from_sith(&json!(["1/2", "1/2", "1/4", "1/4", "1/4"])).unwrap();
        assert!(tholder.weighted());
        assert_eq!(tholder.size(), 5);
        assert!(tholder.satisfy(&[0, 1]));
        assert!(tholder.satisfy(&[0, 2, 4]));
        assert!(tholder.satisfy(&[1, 3, 4, 0]));
        assert!(!tholder.satisfy(&[0, 2]));
        assert!(!tholder.satisfy(&[2, 3, 4]));

        let tholder =
            Tholder::from_sith(&json!([["1/2", "1/2", "1/4", "1/4", "1/4"], ["1", "1"]]))
                .unwrap();
        assert_eq!(tholder.size(), 7);
        assert!(tholder.satisfy(&[1, 2, 3, 5]));
        assert!(tholder.satisfy(&[0, 1, 6]));
        assert!(!tholder.satisfy(&[0, 1]));
        assert!(!tholder.satisfy(&[5, 6]));

        // json string form of a weight list
        let tholder = Tholder::from_sith(&json!("[\"1/2\",\"1/2\"]")).unwrap();
        assert!(tholder.weighted());
        assert!(tholder.satisfy(&[0, 1]));

        // invalid: weights under one in a clause
        assert!(Tholder::from_sith(&json!(["1/2", "1/4"])).is_err());
        // invalid: weight above one
        assert!(Tholder::from_sith(&json!(["3/2"])).is_err());
    }
}
