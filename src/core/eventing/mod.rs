//! Key event construction and processing: seals, signature verification,
//! fixed-shape attachment group decoders, message composition, the Kever
//! state machine and the Kevery multiplexer.

mod incept;
mod interact;
pub mod kever;
pub mod kevery;
mod query;
mod receipt;
mod rotate;
mod state;

pub use incept::InceptBuilder;
pub use interact::interact;
pub use query::QueryBuilder;
pub use receipt::receipt;
pub use rotate::RotateBuilder;
pub use state::state_notice;

use crate::cesr::cigar::Cigar;
use crate::cesr::counting::{ctr_dex, Counter};
use crate::cesr::diger::Diger;
use crate::cesr::indexing::Siger;
use crate::cesr::prefixer::Prefixer;
use crate::cesr::saider::Saider;
use crate::cesr::seqner::Seqner;
use crate::cesr::verfer::Verfer;
use crate::core::serdering::Serder;
use crate::errors::{KeriError, KeriResult, MatterResult};
use serde::{Deserialize, Serialize};

/// Maximum threshold value emitted as an integer under intive.
pub const MAX_INT_THOLD: u64 = 12;

/// Event seal: triple of prefix, sn and said of a sealed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealEvent {
    pub i: String,
    pub s: String,
    pub d: String,
}

/// Source seal: couple of sn and said of a sealing (delegating) event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealSource {
    pub s: String,
    pub d: String,
}

/// Last establishment seal: prefix only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealLast {
    pub i: String,
}

/// Verifies indexed signatures over `ser` against `verfers`.
///
/// Attaches the verfer at each siger's index and returns the unique
/// signature verified sigers together with their sorted indices. An index
/// beyond the key list is a validation error.
pub fn verify_sigs(
    ser: &[u8],
    sigers: Vec<Siger>,
    verfers: &[Verfer],
) -> KeriResult<(Vec<Siger>, Vec<u32>)> {
    let mut verified: Vec<Siger> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    for mut siger in sigers {
        let idx = siger.index() as usize;
        if idx >= verfers.len() {
            return Err(KeriError::ValidationError(format!(
                "Index = {} to large for keys len = {}",
                idx,
                verfers.len()
            )));
        }
        let verfer = verfers[idx].clone();
        if verfer.verify(siger.raw(), ser) {
            siger.verfer = Some(verfer);
            if !indices.contains(&siger.index()) {
                indices.push(siger.index());
                verified.push(siger);
            }
        }
    }
    indices.sort_unstable();
    Ok((verified, indices))
}

/// Decodes a witness receipt couple: dig(44) + wig(88).
pub fn de_witness_couple(qb64b: &[u8]) -> MatterResult<(Diger, Siger, usize)> {
    let (diger, a) = Diger::decode(qb64b)?;
    let (wiger, b) = Siger::decode(&qb64b[a..])?;
    Ok((diger, wiger, a + b))
}

pub fn de_witness_couple_strip(buf: &mut Vec<u8>) -> MatterResult<(Diger, Siger)> {
    let (diger, wiger, used) = de_witness_couple(buf)?;
    buf.drain(..used);
    Ok((diger, wiger))
}

/// Decodes a nontrans receipt couple: pre(44) + cig(88).
pub fn de_receipt_couple(qb64b: &[u8]) -> MatterResult<(Prefixer, Cigar, usize)> {
    let (prefixer, a) = Prefixer::decode(qb64b)?;
    let (cigar, b) = Cigar::decode(&qb64b[a..])?;
    Ok((prefixer, cigar, a + b))
}

pub fn de_receipt_couple_strip(buf: &mut Vec<u8>) -> MatterResult<(Prefixer, Cigar)> {
    let (prefixer, cigar, used) = de_receipt_couple(buf)?;
    buf.drain(..used);
    Ok((prefixer, cigar))
}

/// Decodes a seal source couple: snu(24) + dig(44).
pub fn de_source_couple(qb64b: &[u8]) -> MatterResult<(Seqner, Saider, usize)> {
    let (seqner, a) = Seqner::decode(qb64b)?;
    let (saider, b) = Saider::decode(&qb64b[a..])?;
    Ok((seqner, saider, a + b))
}

pub fn de_source_couple_strip(buf: &mut Vec<u8>) -> MatterResult<(Seqner, Saider)> {
    let (seqner, saider, used) = de_source_couple(buf)?;
    buf.drain(..used);
    Ok((seqner, saider))
}

/// Decodes a receipt triple: dig(44) + pre(44) + cig(88).
pub fn de_receipt_triple(qb64b: &[u8]) -> MatterResult<(Diger, Prefixer, Cigar, usize)> {
    let (diger, a) = Diger::decode(qb64b)?;
    let (prefixer, b) = Prefixer::decode(&qb64b[a..])?;
    let (cigar, c) = Cigar::decode(&qb64b[a + b..])?;
    Ok((diger, prefixer, cigar, a + b + c))
}

pub fn de_receipt_triple_strip(buf: &mut Vec<u8>) -> MatterResult<(Diger, Prefixer, Cigar)> {
    let (diger, prefixer, cigar, used) = de_receipt_triple(buf)?;
    buf.drain(..used);
    Ok((diger, prefixer, cigar))
}

/// Decodes a transferable receipt quadruple:
/// pre(44) + snu(24) + dig(44) + sig(88).
pub fn de_trans_receipt_quadruple(
    qb64b: &[u8],
) -> MatterResult<(Prefixer, Seqner, Saider, Siger, usize)> {
    let (prefixer, a) = Prefixer::decode(qb64b)?;
    let (seqner, b) = Seqner::decode(&qb64b[a..])?;
    let (saider, c) = Saider::decode(&qb64b[a + b..])?;
    let (siger, d) = Siger::decode(&qb64b[a + b + c..])?;
    Ok((prefixer, seqner, saider, siger, a + b + c + d))
}

pub fn de_trans_receipt_quadruple_strip(
    buf: &mut Vec<u8>,
) -> MatterResult<(Prefixer, Seqner, Saider, Siger)> {
    let (prefixer, seqner, saider, siger, used) = de_trans_receipt_quadruple(buf)?;
    buf.drain(..used);
    Ok((prefixer, seqner, saider, siger))
}

/// Decodes a transferable receipt quintuple:
/// edig(44) + pre(44) + snu(24) + dig(44) + sig(88).
pub fn de_trans_receipt_quintuple(
    qb64b: &[u8],
) -> MatterResult<(Diger, Prefixer, Seqner, Saider, Siger, usize)> {
    let (ediger, a) = Diger::decode(qb64b)?;
    let (prefixer, b) = Prefixer::decode(&qb64b[a..])?;
    let (seqner, c) = Seqner::decode(&qb64b[a + b..])?;
    let (saider, d) = Saider::decode(&qb64b[a + b + c..])?;
    let (siger, e) = Siger::decode(&qb64b[a + b + c + d..])?;
    Ok((ediger, prefixer, seqner, saider, siger, a + b + c + d + e))
}

pub fn de_trans_receipt_quintuple_strip(
    buf: &mut Vec<u8>,
) -> MatterResult<(Diger, Prefixer, Seqner, Saider, Siger)> {
    let (ediger, prefixer, seqner, saider, siger, used) = de_trans_receipt_quintuple(buf)?;
    buf.drain(..used);
    Ok((ediger, prefixer, seqner, saider, siger))
}

/// Composes a wire message from an event body plus attachment groups.
///
/// Controller indexed sigs, nontrans receipt couples, witness indexed sigs
/// and a delegation source couple each get their own counter group. With
/// `pipelined` the attachments are wrapped in a pipeline envelope counting
/// quadlets.
pub fn messagize(
    serder: &Serder,
    sigers: Option<&[Siger]>,
    cigars: Option<&[Cigar]>,
    wigers: Option<&[Siger]>,
    source: Option<(&Seqner, &Saider)>,
    pipelined: bool,
) -> KeriResult<Vec<u8>> {
    let mut atc: Vec<u8> = Vec::new();

    if let Some(sigers) = sigers {
        if !sigers.is_empty() {
            atc.extend_from_slice(
                &Counter::new(ctr_dex::CONTROLLER_IDX_SIGS, sigers.len() as u64)?.qb64b(),
            );
            for siger in sigers {
                atc.extend_from_slice(&siger.qb64b());
            }
        }
    }
    if let Some(cigars) = cigars {
        if !cigars.is_empty() {
            atc.extend_from_slice(
                &Counter::new(ctr_dex::NON_TRANS_RECEIPT_COUPLES, cigars.len() as u64)?.qb64b(),
            );
            for cigar in cigars {
                let verfer = cigar.verfer.as_ref().ok_or_else(|| {
                    KeriError::ValueError("Missing verfer on cigar for couple".to_string())
                })?;
                if verfer.is_transferable() {
                    return Err(KeriError::ValueError(format!(
                        "Attempt to use tranferable prefix={} for receipt couple",
                        verfer.qb64()
                    )));
                }
                atc.extend_from_slice(&verfer.qb64b());
                atc.extend_from_slice(&cigar.qb64b());
            }
        }
    }
    if let Some(wigers) = wigers {
        if !wigers.is_empty() {
            atc.extend_from_slice(
                &Counter::new(ctr_dex::WITNESS_IDX_SIGS, wigers.len() as u64)?.qb64b(),
            );
            for wiger in wigers {
                atc.extend_from_slice(&wiger.qb64b());
            }
        }
    }
    if let Some((seqner, saider)) = source {
        atc.extend_from_slice(&Counter::new(ctr_dex::SEAL_SOURCE_COUPLES, 1)?.qb64b());
        atc.extend_from_slice(&seqner.qb64b());
        atc.extend_from_slice(&saider.qb64b());
    }

    let mut msg = serder.raw().to_vec();
    if pipelined {
        if atc.len() % 4 != 0 {
            return Err(KeriError::ValueError(format!(
                "Invalid attachments size={}, nonintegral quadlets",
                atc.len()
            )));
        }
        msg.extend_from_slice(
            &Counter::new(ctr_dex::ATTACHMENT_GROUP, (atc.len() / 4) as u64)?.qb64b(),
        );
    }
    msg.extend_from_slice(&atc);
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cesr::mtr_dex;
    use crate::cesr::signer::Signer;
    use crate::core::Kinds;

    #[test]
    fn test_de_witness_couple() {
        let dig = "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ";
        let wig = "AACdI8OSQkMJ9r-xigjEByEjIua7LHH3AOJ22PQKqljMhuhcgh9nGRcKnsz5KvKd7K_H9-1298F4Id1DxvIoEmCQ";
        let couple = format!("{}{}", dig, wig);
        assert_eq!(couple.len(), 132);

        let (diger, wiger, used) = de_witness_couple(couple.as_bytes()).unwrap();
        assert_eq!(diger.qb64(), dig);
        assert_eq!(wiger.qb64(), wig);
        assert_eq!(used, 132);

        let mut buf = couple.clone().into_bytes();
        let (diger, wiger) = de_witness_couple_strip(&mut buf).unwrap();
        assert_eq!(diger.qb64(), dig);
        assert_eq!(wiger.qb64(), wig);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_de_receipt_couple() {
        let pre = "DCuhyBcPZEZLK-fcw5tzHn2N46wRCG_ZOoeKtWTOunRA";
        let cig = "0BAszieX0cpTOWZwa2I2LfeFAi9lrDjc1-Ip9ywl1KCNqie4ds_3mrZxHFboMC8Fu_5asnM7m67KlGC9EYaw0KDQ";
        let couple = format!("{}{}", pre, cig);
        assert_eq!(couple.len(), 132);

        let (prefixer, cigar, used) = de_receipt_couple(couple.as_bytes()).unwrap();
        assert_eq!(prefixer.qb64(), pre);
        assert_eq!(cigar.qb64(), cig);
        assert_eq!(used, 132);

        let mut buf = couple.into_bytes();
        let (prefixer, cigar) = de_receipt_couple_strip(&mut buf).unwrap();
        assert_eq!(prefixer.qb64(), pre);
        assert_eq!(cigar.qb64(), cig);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_de_source_couple() {
        let snu = "0AAAAAAAAAAAAAAAAAAAAAAC";
        let dig = "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ";
        let couple = format!("{}{}", snu, dig);
        assert_eq!(couple.len(), 68);

        let (seqner, saider, used) = de_source_couple(couple.as_bytes()).unwrap();
        assert_eq!(seqner.sn(), 2);
        assert_eq!(saider.qb64(), dig);
        assert_eq!(used, 68);

        let mut buf = couple.into_bytes();
        let (seqner, saider) = de_source_couple_strip(&mut buf).unwrap();
        assert_eq!(seqner.sn(), 2);
        assert_eq!(saider.qb64(), dig);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_de_trans_receipt_quadruple() {
        let spre = "DCuhyBcPZEZLK-fcw5tzHn2N46wRCG_ZOoeKtWTOunRA";
        let ssnu = "0AAAAAAAAAAAAAAAAAAAAAAB";
        let sdig = "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ";
        let sig = "AACdI8OSQkMJ9r-xigjEByEjIua7LHH3AOJ22PQKqljMhuhcgh9nGRcKnsz5KvKd7K_H9-1298F4Id1DxvIoEmCQ";
        let quadruple = format!("{}{}{}{}", spre, ssnu, sdig, sig);
        assert_eq!(quadruple.len(), 200);

        let (prefixer, seqner, saider, siger, used) =
            de_trans_receipt_quadruple(quadruple.as_bytes()).unwrap();
        assert_eq!(prefixer.qb64(), spre);
        assert_eq!(seqner.sn(), 1);
        assert_eq!(saider.qb64(), sdig);
        assert_eq!(siger.qb64(), sig);
        assert_eq!(used, 200);

        let mut buf = quadruple.into_bytes();
        let _ = de_trans_receipt_quadruple_strip(&mut buf).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_de_trans_receipt_quintuple() {
        let edig = "EK2X8Lfrl9lZbCGz8cfKIvM_cqLyTYVLSFLhnttezlzQ";
        let spre = "DCuhyBcPZEZLK-fcw5tzHn2N46wRCG_ZOoeKtWTOunRA";
        let ssnu = "0AAAAAAAAAAAAAAAAAAAAAAB";
        let sdig = "EILrx-KFk_1ZSKtuCOnxkHTSGCD3Tqn9cbBQSvX8dgHC";
        let sig = "AACdI8OSQkMJ9r-xigjEByEjIua7LHH3AOJ22PQKqljMhuhcgh9nGRcKnsz5KvKd7K_H9-1298F4Id1DxvIoEmCQ";
        let quintuple = format!("{}{}{}{}{}", edig, spre, ssnu, sdig, sig);
        assert_eq!(quintuple.len(), 244);

        let (ediger, prefixer, seqner, saider, siger, used) =
            de_trans_receipt_quintuple(quintuple.as_bytes()).unwrap();
        assert_eq!(ediger.qb64(), edig);
        assert_eq!(prefixer.qb64(), spre);
        assert_eq!(seqner.sn(), 1);
        assert_eq!(saider.qb64(), sdig);
        assert_eq!(siger.qb64(), sig);
        assert_eq!(used, 244);

        let mut buf = quintuple.into_bytes();
        let _ = de_trans_receipt_quintuple_strip(&mut buf).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_verify_sigs() {
        let seed = b"\x9f{\xa8\xa7\xa8C9\x96&\xfa\xb1\x99\xeb\xaa \xc4\x1bG\x11\xc4\xaeSAR\xc9\xbd\x04\x9d\x85)~\x93";
        let signer = Signer::new(Some(&seed[..]), Some(mtr_dex::ED25519_SEED), Some(true)).unwrap();
        let verfers = vec![signer.verfer().clone()];
        let ser = b"message bytes";

        let siger = signer.sign_indexed(ser, 0, false, None).unwrap();
        let (verified, indices) = verify_sigs(ser, vec![siger.clone()], &verfers).unwrap();
        assert_eq!(indices, vec![0]);
        assert_eq!(verified.len(), 1);

        // duplicate sigers collapse to one index
        let (verified, indices) =
            verify_sigs(ser, vec![siger.clone(), siger.clone()], &verfers).unwrap();
        assert_eq!(indices, vec![0]);
        assert_eq!(verified.len(), 1);

        // index beyond key list is a validation error
        let bad = signer.sign_indexed(ser, 1, false, None).unwrap();
        assert!(verify_sigs(ser, vec![bad], &verfers).is_err());

        // wrong message yields no verified sigs
        let (verified, indices) = verify_sigs(b"other", vec![siger], &verfers).unwrap();
        assert!(verified.is_empty());
        assert!(indices.is_empty());
    }

    #[test]
    fn test_messagize() {
        let seed = b"\x9f{\xa8\xa7\xa8C9\x96&\xfa\xb1\x99\xeb\xaa \xc4\x1bG\x11\xc4\xaeSAR\xc9\xbd\x04\x9d\x85)~\x93";
        let signer = Signer::new(Some(&seed[..]), Some(mtr_dex::ED25519_SEED), Some(true)).unwrap();
        let serder = InceptBuilder::new(vec![signer.verfer().qb64()])
            .build()
            .unwrap();
        let siger = signer.sign_indexed(serder.raw(), 0, false, None).unwrap();

        let msg = messagize(&serder, Some(&[siger.clone()]), None, None, None, false).unwrap();
        assert_eq!(&msg[..serder.raw().len()], serder.raw());
        let tail = &msg[serder.raw().len()..];
        assert!(tail.starts_with(b"-AAB"));
        assert_eq!(tail.len(), 4 + 88);

        // pipelined wraps attachments in a quadlet envelope
        let msg = messagize(&serder, Some(&[siger]), None, None, None, true).unwrap();
        let tail = &msg[serder.raw().len()..];
        assert!(tail.starts_with(b"-VAX")); // 92 bytes = 23 quadlets
        assert_eq!(tail.len(), 4 + 4 + 88);
    }

    #[test]
    fn test_seals_serialize_in_field_order() {
        let seal = SealEvent {
            i: "BAKY".to_string(),
            s: "1".to_string(),
            d: "EABC".to_string(),
        };
        let value = serde_json::to_value(&seal).unwrap();
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"i":"BAKY","s":"1","d":"EABC"}"#
        );

        let source = SealSource {
            s: "2".to_string(),
            d: "EABC".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&source).unwrap(),
            r#"{"s":"2","d":"EABC"}"#
        );
    }

    #[test]
    fn test_kinds_anchor() {
        // serder composed above defaults to json kind
        let serder = InceptBuilder::new(vec![
            "BFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH".to_string()
        ])
        .build()
        .unwrap();
        assert_eq!(serder.kind(), Kinds::Json);
    }
}
