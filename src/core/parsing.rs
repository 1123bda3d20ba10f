//! Parser: explicit state machine pulling framed messages with attachment
//! groups out of an incoming byte buffer and handing them to a Kevery.
//!
//! One [`Parser::step`] either yields one message unit, reports how many
//! more bytes it needs, or resynchronizes past garbage. The driver owns the
//! feed loop and reinvokes; there is no internal suspension.

use crate::cesr::cigar::Cigar;
use crate::cesr::counting::{ctr_dex, Counter};
use crate::cesr::dater::Dater;
use crate::cesr::indexing::Siger;
use crate::cesr::prefixer::Prefixer;
use crate::cesr::saider::Saider;
use crate::cesr::seqner::Seqner;
use crate::cesr::verfer::Verfer;
use crate::core::eventing::kevery::{Cue, Kevery, Tsg};
use crate::core::serdering::Serder;
use crate::core::{smell, Ilks};
use crate::errors::{KeriError, KeriResult, MatterError};
use tracing::{debug, warn};

/// Attachment groups collected behind one event body.
#[derive(Debug, Default)]
pub struct Attachments {
    pub sigers: Vec<Siger>,
    pub wigers: Vec<Siger>,
    pub cigars: Vec<Cigar>,
    pub trqs: Vec<(Prefixer, Seqner, Saider, Siger)>,
    pub tsgs: Vec<Tsg>,
    pub sscs: Vec<(Prefixer, Seqner, Saider)>,
    pub ssgs: Vec<(Seqner, Saider)>,
    pub frcs: Vec<(Seqner, Dater)>,
}

/// Outcome of one parser step.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// Short read; feed at least this many more bytes.
    Need(usize),
    /// One message unit was extracted and dispatched.
    Message,
    /// Garbage was dropped to resynchronize; a cue was emitted.
    Resynced,
}

enum Extract {
    Unit(Serder, Attachments, usize),
    Short(usize),
    Garbage(String),
}

#[derive(Debug, Default)]
pub struct Parser {
    buf: Vec<u8>,
}

impl Parser {
    pub fn new() -> Self {
        Parser::default()
    }

    /// Appends incoming stream bytes to the buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Runs steps until the buffer runs short, returning the count of
    /// message units dispatched.
    pub fn parse_all(&mut self, kvy: &mut Kevery) -> KeriResult<usize> {
        let mut count = 0;
        loop {
            match self.step(kvy)? {
                Step::Message => count += 1,
                Step::Resynced => (),
                Step::Need(_) => return Ok(count),
            }
        }
    }

    /// Extracts and dispatches at most one message unit.
    pub fn step(&mut self, kvy: &mut Kevery) -> KeriResult<Step> {
        if self.buf.is_empty() {
            return Ok(Step::Need(crate::core::SMELLSIZE));
        }
        match self.extract() {
            Extract::Short(need) => Ok(Step::Need(need)),
            Extract::Garbage(reason) => {
                self.resync(kvy, &reason);
                Ok(Step::Resynced)
            }
            Extract::Unit(serder, attachments, used) => {
                self.buf.drain(..used);
                if let Err(err) = dispatch(kvy, serder, attachments) {
                    // Recoverable rejections have been escrowed already
                    debug!("message dropped or escrowed: {}", err);
                }
                Ok(Step::Message)
            }
        }
    }

    /// Drops bytes up to the next plausible message boundary and cues the
    /// discontinuity.
    fn resync(&mut self, kvy: &mut Kevery, reason: &str) {
        warn!("parser resync: {}", reason);
        let boundary = self
            .buf
            .windows(6)
            .skip(1)
            .position(|w| w == b"{\"v\":\"")
            .map(|p| p + 1);
        match boundary {
            Some(pos) => {
                self.buf.drain(..pos);
            }
            None => self.buf.clear(),
        }
        kvy.cues.push_back(Cue {
            kin: "resync".to_string(),
            serder: None,
        });
    }

    fn extract(&mut self) -> Extract {
        let smellage = match smell(&self.buf) {
            Ok(smellage) => smellage,
            Err(KeriError::ShortageError(need)) => return Extract::Short(need),
            Err(err) => return Extract::Garbage(err.to_string()),
        };
        if self.buf.len() < smellage.size {
            return Extract::Short(smellage.size - self.buf.len());
        }
        let size = smellage.size;
        let serder = match Serder::from_raw_smelled(&self.buf[..size], smellage) {
            Ok(serder) => serder,
            Err(err) => return Extract::Garbage(err.to_string()),
        };

        // Attachment groups follow until the next message or buffer end.
        // A pipeline wrapper instead bounds them to an exact window.
        let mut atc = Attachments::default();
        let mut cursor = size;
        let mut window_end: Option<usize> = None;
        loop {
            if let Some(end) = window_end {
                if cursor >= end {
                    break;
                }
            }
            if cursor >= self.buf.len() || self.buf[cursor] != b'-' {
                break;
            }
            match self.extract_group(cursor, &mut atc, &mut window_end) {
                Ok(next) => cursor = next,
                Err(MatterError::Shortage(_)) | Err(MatterError::EmptyMaterial(_)) => {
                    return Extract::Short(1)
                }
                Err(err) => return Extract::Garbage(err.to_string()),
            }
        }
        Extract::Unit(serder, atc, cursor)
    }

    /// Parses one counter delimited group starting at `cursor`, returning
    /// the cursor past the group.
    fn extract_group(
        &self,
        cursor: usize,
        atc: &mut Attachments,
        window_end: &mut Option<usize>,
    ) -> Result<usize, MatterError> {
        use crate::core::eventing::{
            de_receipt_couple, de_source_couple, de_trans_receipt_quadruple,
        };

        let (counter, used) = Counter::decode(&self.buf[cursor..])?;
        let mut pos = cursor + used;
        let count = counter.count();
        match counter.code() {
            ctr_dex::CONTROLLER_IDX_SIGS => {
                for _ in 0..count {
                    let (siger, used) = Siger::decode(&self.buf[pos..])?;
                    atc.sigers.push(siger);
                    pos += used;
                }
            }
            ctr_dex::WITNESS_IDX_SIGS => {
                for _ in 0..count {
                    let (wiger, used) = Siger::decode(&self.buf[pos..])?;
                    atc.wigers.push(wiger);
                    pos += used;
                }
            }
            ctr_dex::NON_TRANS_RECEIPT_COUPLES => {
                for _ in 0..count {
                    let (prefixer, mut cigar, used) = de_receipt_couple(&self.buf[pos..])?;
                    cigar.verfer = Some(Verfer::from_qb64(&prefixer.qb64())?);
                    atc.cigars.push(cigar);
                    pos += used;
                }
            }
            ctr_dex::TRANS_RECEIPT_QUADRUPLES => {
                for _ in 0..count {
                    let (prefixer, seqner, saider, siger, used) =
                        de_trans_receipt_quadruple(&self.buf[pos..])?;
                    atc.trqs.push((prefixer, seqner, saider, siger));
                    pos += used;
                }
            }
            ctr_dex::TRANS_IDX_SIG_GROUPS => {
                for _ in 0..count {
                    let (prefixer, a) = Prefixer::decode(&self.buf[pos..])?;
                    pos += a;
                    let (seqner, b) = Seqner::decode(&self.buf[pos..])?;
                    pos += b;
                    let (saider, c) = Saider::decode(&self.buf[pos..])?;
                    pos += c;
                    let (inner, d) = Counter::decode(&self.buf[pos..])?;
                    pos += d;
                    if inner.code() != ctr_dex::CONTROLLER_IDX_SIGS {
                        return Err(MatterError::UnexpectedCode(format!(
                            "Expected idx sigs group in trans idx sig group, got {}",
                            inner.code()
                        )));
                    }
                    let mut sigers = Vec::new();
                    for _ in 0..inner.count() {
                        let (siger, used) = Siger::decode(&self.buf[pos..])?;
                        sigers.push(siger);
                        pos += used;
                    }
                    atc.tsgs.push(Tsg {
                        prefixer,
                        seqner,
                        saider,
                        sigers,
                    });
                }
            }
            ctr_dex::TRANS_LAST_IDX_SIG_GROUPS => {
                // pre + controller idx sigs; carried for exchange messages,
                // not consumed by the key event kernel
                for _ in 0..count {
                    let (_prefixer, a) = Prefixer::decode(&self.buf[pos..])?;
                    pos += a;
                    let (inner, d) = Counter::decode(&self.buf[pos..])?;
                    pos += d;
                    for _ in 0..inner.count() {
                        let (_siger, used) = Siger::decode(&self.buf[pos..])?;
                        pos += used;
                    }
                }
                debug!("skipped trans last idx sig group");
            }
            ctr_dex::SEAL_SOURCE_COUPLES => {
                for _ in 0..count {
                    let (seqner, saider, used) = de_source_couple(&self.buf[pos..])?;
                    atc.ssgs.push((seqner, saider));
                    pos += used;
                }
            }
            ctr_dex::SEAL_SOURCE_TRIPLES => {
                for _ in 0..count {
                    let (prefixer, a) = Prefixer::decode(&self.buf[pos..])?;
                    pos += a;
                    let (seqner, b) = Seqner::decode(&self.buf[pos..])?;
                    pos += b;
                    let (saider, c) = Saider::decode(&self.buf[pos..])?;
                    pos += c;
                    atc.sscs.push((prefixer, seqner, saider));
                }
            }
            ctr_dex::FIRST_SEEN_REPLAY_COUPLES => {
                for _ in 0..count {
                    let (seqner, a) = Seqner::decode(&self.buf[pos..])?;
                    pos += a;
                    let (dater, b) = Dater::decode(&self.buf[pos..])?;
                    pos += b;
                    atc.frcs.push((seqner, dater));
                }
            }
            ctr_dex::ATTACHMENT_GROUP | ctr_dex::BIG_ATTACHMENT_GROUP => {
                // Pipeline envelope bounds the remaining attachments
                let span = (count as usize) * 4;
                if self.buf.len() < pos + span {
                    return Err(MatterError::Shortage(format!(
                        "Need {} more bytes for pipelined attachments.",
                        pos + span - self.buf.len()
                    )));
                }
                *window_end = Some(pos + span);
            }
            other => {
                return Err(MatterError::UnexpectedCode(format!(
                    "Unsupported count code = {} in attachments",
                    other
                )));
            }
        }
        Ok(pos)
    }
}

/// Routes one extracted message unit into the Kevery by ilk.
fn dispatch(kvy: &mut Kevery, serder: Serder, atc: Attachments) -> KeriResult<()> {
    let ilk = serder
        .ilk()
        .ok_or_else(|| KeriError::FieldError("Missing ilk".to_string()))?
        .to_string();
    match ilk.as_str() {
        Ilks::ICP | Ilks::ROT | Ilks::IXN | Ilks::DIP | Ilks::DRT => {
            if atc.sigers.is_empty() {
                return Err(KeriError::ValidationError(format!(
                    "Missing attached signature(s) for evt = {:?}",
                    serder.said()
                )));
            }
            let (delseqner, delsaider) = match atc.ssgs.into_iter().next() {
                Some((seqner, saider)) => (Some(seqner), Some(saider)),
                None => (None, None),
            };
            let wigers = if atc.wigers.is_empty() {
                None
            } else {
                Some(atc.wigers)
            };
            kvy.process_event(serder, atc.sigers, wigers, delseqner, delsaider)
        }
        Ilks::RCT => {
            if !atc.cigars.is_empty() {
                kvy.process_receipt(serder.clone(), atc.cigars)?;
            }
            let mut tsgs = atc.tsgs;
            for (prefixer, seqner, saider, siger) in atc.trqs {
                tsgs.push(Tsg {
                    prefixer,
                    seqner,
                    saider,
                    sigers: vec![siger],
                });
            }
            if !tsgs.is_empty() {
                kvy.process_receipt_trans(serder, tsgs)?;
            }
            Ok(())
        }
        Ilks::QRY => kvy.process_query(serder),
        Ilks::KSN => kvy.process_key_state_notice(serder),
        other => Err(KeriError::ValidationError(format!(
            "Unexpected message ilk = {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cesr::mtr_dex;
    use crate::cesr::signer::Signer;
    use crate::core::eventing::{messagize, InceptBuilder};
    use crate::db::Baser;
    use std::sync::Arc;

    fn signer() -> Signer {
        let seed = b"\x9f{\xa8\xa7\xa8C9\x96&\xfa\xb1\x99\xeb\xaa \xc4\x1bG\x11\xc4\xaeSAR\xc9\xbd\x04\x9d\x85)~\x93";
        Signer::new(Some(&seed[..]), Some(mtr_dex::ED25519_SEED), Some(true)).unwrap()
    }

    fn icp_msg(signer: &Signer) -> (Serder, Vec<u8>) {
        let serder = InceptBuilder::new(vec![signer.verfer().qb64()])
            .with_ndigs(vec![
                crate::cesr::diger::Diger::from_ser(&signer.verfer().qb64b(), None)
                    .unwrap()
                    .qb64(),
            ])
            .build()
            .unwrap();
        let siger = signer.sign_indexed(serder.raw(), 0, false, None).unwrap();
        let msg = messagize(&serder, Some(&[siger]), None, None, None, false).unwrap();
        (serder, msg)
    }

    #[test]
    fn test_parser_one_message() {
        let signer = signer();
        let (serder, msg) = icp_msg(&signer);

        let mut kvy = Kevery::new(Arc::new(Baser::new()));
        let mut parser = Parser::new();
        parser.feed(&msg);
        let count = parser.parse_all(&mut kvy).unwrap();
        assert_eq!(count, 1);
        assert_eq!(parser.pending(), 0);
        let pre = serder.pre().unwrap();
        assert!(kvy.kevers().contains_key(&pre));
        assert_eq!(kvy.kevers()[&pre].sner, 0);
        // acceptance cued a receipt
        assert!(kvy.cues.iter().any(|c| c.kin == "receipt"));
    }

    #[test]
    fn test_parser_short_reads() {
        let signer = signer();
        let (serder, msg) = icp_msg(&signer);

        let mut kvy = Kevery::new(Arc::new(Baser::new()));
        let mut parser = Parser::new();

        // drip the body in below the smell size
        parser.feed(&msg[..10]);
        match parser.step(&mut kvy).unwrap() {
            Step::Need(_) => (),
            other => panic!("expected need, got {:?}", other),
        }
        // feed the rest of the body but not the attachments
        parser.feed(&msg[10..serder.raw().len() + 2]);
        match parser.step(&mut kvy).unwrap() {
            Step::Need(_) => (),
            other => panic!("expected need, got {:?}", other),
        }
        // complete the frame
        parser.feed(&msg[serder.raw().len() + 2..]);
        assert_eq!(parser.step(&mut kvy).unwrap(), Step::Message);
        assert!(kvy.kevers().contains_key(&serder.pre().unwrap()));
    }

    #[test]
    fn test_parser_resync_on_garbage() {
        let signer = signer();
        let (serder, msg) = icp_msg(&signer);

        let mut kvy = Kevery::new(Arc::new(Baser::new()));
        let mut parser = Parser::new();
        let mut stream = b"garbage garbage garbage garbage".to_vec();
        stream.extend_from_slice(&msg);
        parser.feed(&stream);

        assert_eq!(parser.step(&mut kvy).unwrap(), Step::Resynced);
        assert!(kvy.cues.iter().any(|c| c.kin == "resync"));
        assert_eq!(parser.step(&mut kvy).unwrap(), Step::Message);
        assert!(kvy.kevers().contains_key(&serder.pre().unwrap()));
    }

    #[test]
    fn test_parser_pipelined_message() {
        let signer = signer();
        let serder = InceptBuilder::new(vec![signer.verfer().qb64()])
            .build()
            .unwrap();
        let siger = signer.sign_indexed(serder.raw(), 0, false, None).unwrap();
        let msg = messagize(&serder, Some(&[siger]), None, None, None, true).unwrap();

        let mut kvy = Kevery::new(Arc::new(Baser::new()));
        let mut parser = Parser::new();
        parser.feed(&msg);
        assert_eq!(parser.parse_all(&mut kvy).unwrap(), 1);
        assert!(kvy.kevers().contains_key(&serder.pre().unwrap()));
    }

    #[test]
    fn test_parser_two_messages_back_to_back() {
        let signer = signer();
        let (serder, msg) = icp_msg(&signer);

        // same inception twice: second is an idempotent duplicate
        let mut stream = msg.clone();
        stream.extend_from_slice(&msg);
        let mut kvy = Kevery::new(Arc::new(Baser::new()));
        let mut parser = Parser::new();
        parser.feed(&stream);
        assert_eq!(parser.parse_all(&mut kvy).unwrap(), 2);
        assert_eq!(kvy.kevers()[&serder.pre().unwrap()].sner, 0);
    }
}
