//! Key state notice construction for `ksn`.

use crate::core::serdering::{sadify, Serder};
use crate::core::{Ilks, Kinds, VERSION};
use crate::db::KeyStateRecord;
use crate::errors::KeriResult;
use serde_json::json;

/// Constructs a key state notice message from a key state record. The `d`
/// field carries the said of the latest accepted event; the notice is not
/// itself saidified.
pub fn state_notice(state: &KeyStateRecord, kind: Kinds) -> KeriResult<Serder> {
    let vs = crate::core::versify("KERI", &VERSION, kind, 0)?;
    let ee = sadify(vec![
        ("s", json!(state.ee.s)),
        ("d", json!(state.ee.d)),
        ("br", json!(state.ee.br)),
        ("ba", json!(state.ee.ba)),
    ]);
    let sad = sadify(vec![
        ("v", json!(vs)),
        ("t", json!(Ilks::KSN)),
        ("d", json!(state.d)),
        ("i", json!(state.i)),
        ("s", json!(state.s)),
        ("p", json!(state.p)),
        ("f", json!(state.f)),
        ("dt", json!(state.dt)),
        ("et", json!(state.et)),
        ("kt", state.kt.clone()),
        ("k", json!(state.k)),
        ("nt", state.nt.clone()),
        ("n", json!(state.n)),
        ("bt", json!(state.bt)),
        ("b", json!(state.b)),
        ("c", json!(state.c)),
        ("ee", ee),
        ("di", json!(state.di)),
    ]);
    Serder::from_sad(sad, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StateEERecord;

    #[test]
    fn test_state_notice() {
        let state = KeyStateRecord {
            vn: [1, 0],
            i: "DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string(),
            s: "1".to_string(),
            p: "EMW0zK3bagYPO6gx3w7Ua90f-I7x5kGIaI4Xeq9W8_As".to_string(),
            d: "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ".to_string(),
            f: "1".to_string(),
            dt: "2021-01-01T00:00:00.000000+00:00".to_string(),
            et: "ixn".to_string(),
            kt: json!("1"),
            k: vec!["DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string()],
            nt: json!("1"),
            n: vec!["EIf-ENw7PrM52w4H-S7NGU2qVIfraXVIlV9hEAaMHg7W".to_string()],
            bt: "0".to_string(),
            b: vec![],
            c: vec![],
            ee: StateEERecord {
                s: "0".to_string(),
                d: "EMW0zK3bagYPO6gx3w7Ua90f-I7x5kGIaI4Xeq9W8_As".to_string(),
                br: vec![],
                ba: vec![],
            },
            di: "".to_string(),
        };
        let serder = state_notice(&state, Kinds::Json).unwrap();
        let ked = serder.ked();
        assert_eq!(ked["t"].as_str().unwrap(), Ilks::KSN);
        assert_eq!(ked["i"].as_str().unwrap(), state.i);
        assert_eq!(ked["et"].as_str().unwrap(), "ixn");
        assert_eq!(ked["ee"]["s"].as_str().unwrap(), "0");
        // notices parse without said verification since d is foreign
        assert!(Serder::from_raw(serder.raw()).is_ok());
    }
}
