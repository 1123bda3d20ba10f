//! Receipt message construction for `rct`.

use crate::core::serdering::{sadify, Serder};
use crate::core::{Ilks, Kinds, VERSION};
use crate::errors::KeriResult;
use serde_json::json;

/// Constructs a receipt message referencing the event of `pre` at `sn` with
/// said `said`. The `d` field carries the receipted event's said, not a
/// self digest; endorsement couples ride as attachments.
pub fn receipt(pre: &str, sn: u64, said: &str, kind: Kinds) -> KeriResult<Serder> {
    let vs = crate::core::versify("KERI", &VERSION, kind, 0)?;
    let sad = sadify(vec![
        ("v", json!(vs)),
        ("t", json!(Ilks::RCT)),
        ("d", json!(said)),
        ("i", json!(pre)),
        ("s", json!(format!("{:x}", sn))),
    ]);
    Serder::from_sad(sad, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt() {
        let pre = "DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH";
        let said = "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ";
        let serder = receipt(pre, 0, said, Kinds::Json).unwrap();
        let ked = serder.ked();
        assert_eq!(ked["t"].as_str().unwrap(), Ilks::RCT);
        assert_eq!(ked["d"].as_str().unwrap(), said);
        assert_eq!(ked["i"].as_str().unwrap(), pre);
        assert_eq!(ked["s"].as_str().unwrap(), "0");
        assert_eq!(serder.said(), Some(said));

        // round trips without said verification since d is foreign
        let parsed = Serder::from_raw(serder.raw()).unwrap();
        assert_eq!(parsed.sad(), serder.sad());
        assert_eq!(
            serder.raw(),
            &b"{\"v\":\"KERI10JSON000091_\",\"t\":\"rct\",\"d\":\"EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ\",\"i\":\"DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH\",\"s\":\"0\"}"[..]
        );
    }
}
