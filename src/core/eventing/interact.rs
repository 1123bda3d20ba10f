//! Interaction event construction for `ixn`.

use crate::core::serdering::{sadify, Serder};
use crate::core::{Ilks, Kinds, VERSION};
use crate::errors::{KeriError, KeriResult};
use serde_json::{json, Value};

/// Constructs an interaction event for `pre` at `sn` with prior said `dig`
/// anchoring seal `data`.
pub fn interact(
    pre: &str,
    dig: &str,
    sn: u64,
    data: Vec<Value>,
    kind: Kinds,
) -> KeriResult<Serder> {
    if sn < 1 {
        return Err(KeriError::ValueError(format!(
            "Invalid sn = {:x} for ixn.",
            sn
        )));
    }
    let vs = crate::core::versify("KERI", &VERSION, kind, 0)?;
    let sad = sadify(vec![
        ("v", json!(vs)),
        ("t", json!(Ilks::IXN)),
        ("d", json!("")),
        ("i", json!(pre)),
        ("s", json!(format!("{:x}", sn))),
        ("p", json!(dig)),
        ("a", Value::Array(data)),
    ]);
    Serder::makify(sad, kind, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::eventing::SealEvent;

    #[test]
    fn test_interact() {
        let pre = "DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH";
        let dig = "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ";
        let serder = interact(pre, dig, 1, vec![], Kinds::Json).unwrap();
        let ked = serder.ked();
        assert_eq!(ked["t"].as_str().unwrap(), Ilks::IXN);
        assert_eq!(ked["i"].as_str().unwrap(), pre);
        assert_eq!(ked["s"].as_str().unwrap(), "1");
        assert_eq!(ked["p"].as_str().unwrap(), dig);
        assert!(ked["a"].as_array().unwrap().is_empty());
        assert!(Serder::from_raw(serder.raw()).is_ok());

        // with an anchored event seal
        let seal = SealEvent {
            i: "EAKCxMOuoRzREVHsHCkLilBrUXTvyenBiuM2QtV8BB0C".to_string(),
            s: "0".to_string(),
            d: "EIf-ENw7PrM52w4H-S7NGU2qVIfraXVIlV9hEAaMHg7W".to_string(),
        };
        let serder = interact(
            pre,
            dig,
            2,
            vec![serde_json::to_value(&seal).unwrap()],
            Kinds::Json,
        )
        .unwrap();
        let seals = serder.ked()["a"].as_array().unwrap();
        assert_eq!(seals.len(), 1);
        assert_eq!(seals[0]["i"].as_str().unwrap(), seal.i);

        assert!(interact(pre, dig, 0, vec![], Kinds::Json).is_err());
    }
}
