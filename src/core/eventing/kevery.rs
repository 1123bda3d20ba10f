//! Kevery: key event message processing facility.
//!
//! Routes incoming events and receipts to Kevers keyed by identifier
//! prefix, maintains the named escrows for recoverable failures, records
//! duplicity, and emits cues for follow-up actions.

use crate::cesr::cigar::Cigar;
use crate::cesr::indexing::Siger;
use crate::cesr::prefixer::Prefixer;
use crate::cesr::saider::Saider;
use crate::cesr::seqner::Seqner;
use crate::core::eventing::kever::Kever;
use crate::core::eventing::verify_sigs;
use crate::core::serdering::Serder;
use crate::core::Ilks;
use crate::db::{dg_key, sn_key, split_on_key, Baser};
use crate::errors::{KeriError, KeriResult};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// Notice of an event needing receipt or a request needing response.
#[derive(Debug, Clone)]
pub struct Cue {
    pub kin: String,
    pub serder: Option<Serder>,
}

/// Transferable receipt signature group: endorser prefix, establishment
/// location and indexed signatures.
#[derive(Debug, Clone)]
pub struct Tsg {
    pub prefixer: Prefixer,
    pub seqner: Seqner,
    pub saider: Saider,
    pub sigers: Vec<Siger>,
}

pub struct Kevery {
    pub db: Arc<Baser>,
    pub kevers: HashMap<String, Kever>,
    pub cues: VecDeque<Cue>,
    /// Promiscuous mode accepts events for any prefix.
    pub lax: bool,
    /// Event source is local (protected) so witness thresholds are not yet
    /// enforceable.
    pub local: bool,
    /// Direct mode cues receipts for accepted events.
    pub direct: bool,
    /// Do not update the database in any non-idempotent way.
    pub check: bool,
}

impl Kevery {
    /// Seconds to timeout out of order escrows.
    pub const TIMEOUT_OOE: i64 = 1200;
    /// Seconds to timeout partially signed or delegated escrows.
    pub const TIMEOUT_PSE: i64 = 3600;
    /// Seconds to timeout partially witnessed escrows.
    pub const TIMEOUT_PWE: i64 = 3600;
    /// Seconds to timeout likely duplicitous escrows.
    pub const TIMEOUT_LDE: i64 = 3600;
    /// Seconds to timeout unverified receipt escrows.
    pub const TIMEOUT_URE: i64 = 3600;
    /// Seconds to timeout unverified transferable receipt escrows.
    pub const TIMEOUT_VRE: i64 = 3600;

    pub fn new(db: Arc<Baser>) -> Self {
        Kevery {
            db,
            kevers: HashMap::new(),
            cues: VecDeque::new(),
            lax: true,
            local: true,
            direct: true,
            check: false,
        }
    }

    pub fn kevers(&self) -> &HashMap<String, Kever> {
        &self.kevers
    }

    /// Processes one key event with its attachments.
    pub fn process_event(
        &mut self,
        serder: Serder,
        sigers: Vec<Siger>,
        wigers: Option<Vec<Siger>>,
        delseqner: Option<Seqner>,
        delsaider: Option<Saider>,
    ) -> KeriResult<()> {
        let pre = serder
            .pre()
            .ok_or_else(|| KeriError::FieldError("Missing pre in event".to_string()))?;
        Prefixer::from_qb64(&pre).map_err(|e| {
            KeriError::DerivationError(format!("Invalid pre = {} for evt: {}", pre, e))
        })?;
        let sn = serder.sn()?;
        let ilk = serder
            .ilk()
            .ok_or_else(|| KeriError::FieldError("Missing ilk in event".to_string()))?
            .to_string();
        let said = serder
            .said()
            .ok_or_else(|| KeriError::FieldError("Missing said in event".to_string()))?
            .to_string();

        if !self.kevers.contains_key(&pre) {
            // First seen event for pre
            if ilk == Ilks::ICP || ilk == Ilks::DIP {
                let result = Kever::new(
                    self.db.clone(),
                    serder.clone(),
                    sigers.clone(),
                    wigers.clone(),
                    delseqner.clone(),
                    delsaider.clone(),
                    self.local,
                    self.check,
                );
                match result {
                    Ok(kever) => {
                        self.kevers.insert(pre.clone(), kever);
                        if self.direct {
                            self.cues.push_back(Cue {
                                kin: "receipt".to_string(),
                                serder: Some(serder),
                            });
                        } else {
                            self.cues.push_back(Cue {
                                kin: "notice".to_string(),
                                serder: Some(serder),
                            });
                        }
                        Ok(())
                    }
                    Err(err) => {
                        self.escrow_recoverable(
                            &err, &serder, &sigers, wigers.as_deref(), delseqner, delsaider,
                        )?;
                        Err(err)
                    }
                }
            } else {
                // No inception yet so all else is out of order
                self.escrow_oo_event(&serder, &sigers, wigers.as_deref(), delseqner, delsaider)?;
                debug!(pre = %pre, sn, "out-of-order event before inception");
                Err(KeriError::OutOfOrderError(format!(
                    "Out-of-order event sn = {} before inception for pre = {}",
                    sn, pre
                )))
            }
        } else if ilk == Ilks::ICP || ilk == Ilks::DIP {
            // Already incepted: either a duplicate or duplicitous
            if sn != 0 {
                return Err(KeriError::ValidationError(format!(
                    "Invalid sn = {} for inception event = {}",
                    sn,
                    serder.pretty()
                )));
            }
            let ldig = self.db.kels.get_last(&sn_key(&pre, 0));
            if ldig.as_deref() == Some(said.as_bytes()) {
                self.accrue_sigs(&pre, sn, &serder, sigers, wigers)
            } else {
                self.escrow_ld_event(&serder, &sigers)?;
                let msg = format!(
                    "Likely duplicitous inception said = {} for pre = {}",
                    said, pre
                );
                debug!("{}", msg);
                Err(KeriError::LikelyDuplicitousError(msg))
            }
        } else {
            // rot, drt or ixn against existing state
            let (sno, last_est_s) = {
                let kever = &self.kevers[&pre];
                (kever.sner + 1, kever.last_est.s)
            };
            if sn > sno {
                self.escrow_oo_event(&serder, &sigers, wigers.as_deref(), delseqner, delsaider)?;
                debug!(pre = %pre, sn, expected = sno, "out-of-order event");
                Err(KeriError::OutOfOrderError(format!(
                    "Out-of-order event sn = {} expecting = {} for pre = {}",
                    sn, sno, pre
                )))
            } else if sn == sno
                || (ilk == Ilks::ROT && last_est_s < sn && sn <= sno)
                || (ilk == Ilks::DRT && last_est_s <= sn && sn <= sno)
            {
                // In order event or superseding recovery
                let result = {
                    let kever = self
                        .kevers
                        .get_mut(&pre)
                        .expect("checked contains above");
                    kever.update(
                        serder.clone(),
                        sigers.clone(),
                        wigers.clone(),
                        delseqner.clone(),
                        delsaider.clone(),
                        self.local,
                        self.check,
                    )
                };
                match result {
                    Ok(()) => {
                        if self.direct {
                            self.cues.push_back(Cue {
                                kin: "receipt".to_string(),
                                serder: Some(serder),
                            });
                        } else {
                            self.cues.push_back(Cue {
                                kin: "notice".to_string(),
                                serder: Some(serder),
                            });
                        }
                        Ok(())
                    }
                    Err(err) => {
                        self.escrow_recoverable(
                            &err, &serder, &sigers, wigers.as_deref(), delseqner, delsaider,
                        )?;
                        Err(err)
                    }
                }
            } else {
                // Stale sn: duplicate of an accepted event or duplicitous
                let ldig = self.db.kels.get_last(&sn_key(&pre, sn));
                if ldig.as_deref() == Some(said.as_bytes()) {
                    self.accrue_sigs(&pre, sn, &serder, sigers, wigers)
                } else {
                    self.escrow_ld_event(&serder, &sigers)?;
                    let msg = format!(
                        "Likely duplicitous event sn = {} said = {} for pre = {}",
                        sn, said, pre
                    );
                    debug!("{}", msg);
                    Err(KeriError::LikelyDuplicitousError(msg))
                }
            }
        }
    }

    /// Logs late arriving signatures for a duplicate of an already accepted
    /// event. Idempotent; never mutates key state.
    fn accrue_sigs(
        &mut self,
        pre: &str,
        sn: u64,
        serder: &Serder,
        sigers: Vec<Siger>,
        wigers: Option<Vec<Siger>>,
    ) -> KeriResult<()> {
        let eserder = self.fetch_est_event(pre, sn).ok_or_else(|| {
            KeriError::MissingEntryError(format!(
                "No establishment event for accepted pre = {} at sn = {}",
                pre, sn
            ))
        })?;
        let (sigers, _) = verify_sigs(serder.raw(), sigers, &eserder.verfers()?)?;
        let wigers = match wigers {
            Some(wigers) => {
                let werfers = eserder
                    .backs()
                    .iter()
                    .map(|w| crate::cesr::verfer::Verfer::from_qb64(w).map_err(KeriError::from))
                    .collect::<KeriResult<Vec<_>>>()?;
                let (wigers, _) = verify_sigs(serder.raw(), wigers, &werfers)?;
                Some(wigers)
            }
            None => None,
        };
        if !sigers.is_empty() || wigers.as_ref().map(|w| !w.is_empty()).unwrap_or(false) {
            let kever = self.kevers.get(pre).ok_or_else(|| {
                KeriError::MissingEntryError(format!("No kever for pre = {}", pre))
            })?;
            kever.log_event(serder, &sigers, wigers.as_deref(), None, false, None)?;
            debug!(pre = %pre, sn, "accrued late signatures on duplicate event");
        }
        Ok(())
    }

    /// Routes a Kever rejection into the matching escrow when recoverable.
    fn escrow_recoverable(
        &self,
        err: &KeriError,
        serder: &Serder,
        sigers: &[Siger],
        wigers: Option<&[Siger]>,
        delseqner: Option<Seqner>,
        delsaider: Option<Saider>,
    ) -> KeriResult<()> {
        match err {
            KeriError::MissingSignatureError(_) => {
                self.escrow_event(&self.db.pses, serder, sigers, wigers, delseqner, delsaider)
            }
            KeriError::MissingWitnessSignatureError(_) => {
                self.escrow_event(&self.db.pwes, serder, sigers, wigers, delseqner, delsaider)
            }
            KeriError::MissingDelegationError(_) => {
                self.escrow_event(&self.db.mdes, serder, sigers, wigers, delseqner, delsaider)
            }
            KeriError::OutOfOrderError(_) => {
                self.escrow_event(&self.db.ooes, serder, sigers, wigers, delseqner, delsaider)
            }
            _ => Ok(()),
        }
    }

    fn escrow_oo_event(
        &self,
        serder: &Serder,
        sigers: &[Siger],
        wigers: Option<&[Siger]>,
        delseqner: Option<Seqner>,
        delsaider: Option<Saider>,
    ) -> KeriResult<()> {
        self.escrow_event(&self.db.ooes, serder, sigers, wigers, delseqner, delsaider)
    }

    /// Stores the event material and adds its digest to the escrow index.
    fn escrow_event(
        &self,
        escrow: &crate::db::Store,
        serder: &Serder,
        sigers: &[Siger],
        wigers: Option<&[Siger]>,
        delseqner: Option<Seqner>,
        delsaider: Option<Saider>,
    ) -> KeriResult<()> {
        let pre = serder
            .pre()
            .ok_or_else(|| KeriError::FieldError("Missing pre".to_string()))?;
        let said = serder
            .said()
            .ok_or_else(|| KeriError::FieldError("Missing said".to_string()))?;
        let sn = serder.sn()?;
        let dgkey = dg_key(&pre, said);
        let dts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
        self.db.dtss.put(&dgkey, dts.as_bytes());
        self.db.evts.put(&dgkey, serder.raw());
        for siger in sigers {
            self.db.sigs.add(&dgkey, &siger.qb64b());
        }
        if let Some(wigers) = wigers {
            for wiger in wigers {
                self.db.wigs.add(&dgkey, &wiger.qb64b());
            }
        }
        if let (Some(seqner), Some(saider)) = (delseqner, delsaider) {
            let couple = [seqner.qb64b(), saider.qb64b()].concat();
            self.db.aess.put(&dgkey, &couple);
        }
        escrow.add(&sn_key(&pre, sn), said.as_bytes());
        Ok(())
    }

    fn escrow_ld_event(&self, serder: &Serder, sigers: &[Siger]) -> KeriResult<()> {
        let pre = serder
            .pre()
            .ok_or_else(|| KeriError::FieldError("Missing pre".to_string()))?;
        let said = serder
            .said()
            .ok_or_else(|| KeriError::FieldError("Missing said".to_string()))?;
        let sn = serder.sn()?;
        let dgkey = dg_key(&pre, said);
        let dts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
        self.db.dtss.put(&dgkey, dts.as_bytes());
        self.db.evts.put(&dgkey, serder.raw());
        for siger in sigers {
            self.db.sigs.add(&dgkey, &siger.qb64b());
        }
        self.db.ldes.add(&sn_key(&pre, sn), said.as_bytes());
        // Record both branches into the duplicity index
        self.db.dels.add(&sn_key(&pre, sn), said.as_bytes());
        Ok(())
    }

    /// Processes a receipt message with nontransferable endorser couples.
    pub fn process_receipt(&mut self, serder: Serder, cigars: Vec<Cigar>) -> KeriResult<()> {
        let pre = serder
            .pre()
            .ok_or_else(|| KeriError::FieldError("Missing pre in receipt".to_string()))?;
        let sn = serder.sn()?;
        let said = serder
            .said()
            .ok_or_else(|| KeriError::FieldError("Missing dig in receipt".to_string()))?
            .to_string();

        let dgkey = dg_key(&pre, &said);
        match self.db.evts.get(&dgkey) {
            Some(raw) => {
                for cigar in cigars {
                    let verfer = cigar.verfer.as_ref().ok_or_else(|| {
                        KeriError::ValueError("Missing verfer on receipt couple".to_string())
                    })?;
                    if verfer.is_transferable() {
                        return Err(KeriError::ValidationError(format!(
                            "Transferable endorser = {} in nontrans receipt couple",
                            verfer.qb64()
                        )));
                    }
                    if !verfer.verify(cigar.raw(), &raw) {
                        return Err(KeriError::ValidationError(format!(
                            "Invalid receipt couple signature by = {} on evt = {}",
                            verfer.qb64(),
                            said
                        )));
                    }
                    let couple = [verfer.qb64b(), cigar.qb64b()].concat();
                    self.db.rcts.add(&dgkey, &couple);
                }
                Ok(())
            }
            None => {
                // Receipted event not yet accepted: escrow unverified
                let dts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
                for cigar in cigars {
                    let verfer = cigar.verfer.as_ref().ok_or_else(|| {
                        KeriError::ValueError("Missing verfer on receipt couple".to_string())
                    })?;
                    let val = [
                        dts.as_bytes().to_vec(),
                        said.as_bytes().to_vec(),
                        verfer.qb64b(),
                        cigar.qb64b(),
                    ]
                    .concat();
                    self.db.ures.add(&sn_key(&pre, sn), &val);
                }
                debug!(pre = %pre, sn, said = %said, "escrowed unverified receipt");
                Ok(())
            }
        }
    }

    /// Processes a receipt message with transferable endorser signature
    /// groups, validating against the endorser's establishment keys as
    /// stored in its KEL.
    pub fn process_receipt_trans(&mut self, serder: Serder, tsgs: Vec<Tsg>) -> KeriResult<()> {
        let pre = serder
            .pre()
            .ok_or_else(|| KeriError::FieldError("Missing pre in receipt".to_string()))?;
        let sn = serder.sn()?;
        let said = serder
            .said()
            .ok_or_else(|| KeriError::FieldError("Missing dig in receipt".to_string()))?
            .to_string();
        let dgkey = dg_key(&pre, &said);
        let raw = self.db.evts.get(&dgkey);

        for tsg in tsgs {
            let spre = tsg.prefixer.qb64();
            let sdig = tsg.saider.qb64();
            let endorsed = self
                .db
                .kels
                .get_last(&sn_key(&spre, tsg.seqner.sn()))
                .filter(|ldig| ldig == &tsg.saider.qb64b())
                .and_then(|_| self.db.evts.get(&dg_key(&spre, &sdig)));

            match (&raw, endorsed) {
                (Some(raw), Some(eraw)) => {
                    let eserder = Serder::from_raw(&eraw)?;
                    let verfers = eserder.verfers()?;
                    let (verified, _) = verify_sigs(raw, tsg.sigers.clone(), &verfers)?;
                    if verified.is_empty() {
                        return Err(KeriError::ValidationError(format!(
                            "Invalid trans receipt sigs by = {} on evt = {}",
                            spre, said
                        )));
                    }
                    for siger in verified {
                        let quadruple = [
                            spre.as_bytes().to_vec(),
                            tsg.seqner.qb64b(),
                            tsg.saider.qb64b(),
                            siger.qb64b(),
                        ]
                        .concat();
                        self.db.vrcs.add(&dgkey, &quadruple);
                    }
                }
                _ => {
                    // Either the event or the endorser state is missing
                    let dts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
                    for siger in &tsg.sigers {
                        let val = [
                            dts.as_bytes().to_vec(),
                            said.as_bytes().to_vec(),
                            spre.as_bytes().to_vec(),
                            tsg.seqner.qb64b(),
                            tsg.saider.qb64b(),
                            siger.qb64b(),
                        ]
                        .concat();
                        self.db.vres.add(&sn_key(&pre, sn), &val);
                    }
                    debug!(pre = %pre, sn, "escrowed unverified trans receipt");
                }
            }
        }
        Ok(())
    }

    /// Enqueues a cue to answer a query message.
    pub fn process_query(&mut self, serder: Serder) -> KeriResult<()> {
        self.cues.push_back(Cue {
            kin: "reply".to_string(),
            serder: Some(serder),
        });
        Ok(())
    }

    /// Enqueues a cue for a received key state notice.
    pub fn process_key_state_notice(&mut self, serder: Serder) -> KeriResult<()> {
        self.cues.push_back(Cue {
            kin: "ksn".to_string(),
            serder: Some(serder),
        });
        Ok(())
    }

    /// Finds the establishment event governing `pre` at `sn` by walking the
    /// KEL backwards.
    pub fn fetch_est_event(&self, pre: &str, sn: u64) -> Option<Serder> {
        let mut sn = sn;
        loop {
            let dig = self.db.kels.get_last(&sn_key(pre, sn))?;
            let raw = self.db.evts.get(&dg_key(pre, &dig))?;
            let serder = Serder::from_raw(&raw).ok()?;
            match serder.ilk() {
                Some(ilk) if Ilks::is_establishment(ilk) => return Some(serder),
                _ => {
                    if sn == 0 {
                        return None;
                    }
                    sn -= 1;
                }
            }
        }
    }

    /// Walks all escrows and re-attempts promotion, evicting stale entries.
    pub fn process_escrows(&mut self) -> KeriResult<()> {
        let db = self.db.clone();
        self.process_event_escrow(&db.ooes, Self::TIMEOUT_OOE, |e| {
            matches!(e, KeriError::OutOfOrderError(_))
        })?;
        self.process_event_escrow(&db.pses, Self::TIMEOUT_PSE, |e| {
            matches!(e, KeriError::MissingSignatureError(_))
        })?;
        self.process_event_escrow(&db.pwes, Self::TIMEOUT_PWE, |e| {
            matches!(e, KeriError::MissingWitnessSignatureError(_))
        })?;
        self.process_event_escrow(&db.mdes, Self::TIMEOUT_PSE, |e| {
            matches!(e, KeriError::MissingDelegationError(_))
        })?;
        self.process_unverified_receipts()?;
        self.process_unverified_trans_receipts()?;
        Ok(())
    }

    /// Promotion walk over one event escrow. `retain` keeps entries whose
    /// re-processing still fails with the escrow's own recoverable kind.
    fn process_event_escrow(
        &mut self,
        escrow: &crate::db::Store,
        timeout: i64,
        retain: fn(&KeriError) -> bool,
    ) -> KeriResult<()> {
        let now = Utc::now();
        for (key, digs) in escrow.top(b"") {
            let Some((preb, _sn)) = split_on_key(&key) else {
                escrow.del(&key);
                continue;
            };
            let pre = String::from_utf8_lossy(&preb).to_string();
            for dig in digs {
                let dgkey = dg_key(&pre, &dig);

                // Stale entries age out
                if let Some(dtsb) = self.db.dtss.get(&dgkey) {
                    if let Ok(dts) =
                        DateTime::parse_from_rfc3339(&String::from_utf8_lossy(&dtsb))
                    {
                        if now - dts.with_timezone(&Utc) > Duration::seconds(timeout) {
                            info!(pre = %pre, "stale escrow entry aged out");
                            escrow.del_dup(&key, &dig);
                            continue;
                        }
                    }
                }

                let Some(raw) = self.db.evts.get(&dgkey) else {
                    escrow.del_dup(&key, &dig);
                    continue;
                };
                let Ok(serder) = Serder::from_raw(&raw) else {
                    escrow.del_dup(&key, &dig);
                    continue;
                };
                let sigers: Vec<Siger> = self
                    .db
                    .sigs
                    .get_dups(&dgkey)
                    .iter()
                    .filter_map(|s| Siger::from_qb64b(s).ok())
                    .collect();
                let wigers: Vec<Siger> = self
                    .db
                    .wigs
                    .get_dups(&dgkey)
                    .iter()
                    .filter_map(|s| Siger::from_qb64b(s).ok())
                    .collect();
                let wigers = if wigers.is_empty() { None } else { Some(wigers) };
                let delcouple = self.db.aess.get(&dgkey).and_then(|couple| {
                    let mut buf = couple;
                    let seqner = Seqner::strip(&mut buf).ok()?;
                    let saider = Saider::strip(&mut buf).ok()?;
                    Some((seqner, saider))
                });
                let (delseqner, delsaider) = match delcouple {
                    Some((s, d)) => (Some(s), Some(d)),
                    None => (None, None),
                };

                match self.process_event(serder, sigers, wigers, delseqner, delsaider) {
                    Ok(()) => {
                        escrow.del_dup(&key, &dig);
                        info!(pre = %pre, "escrowed event promoted");
                    }
                    Err(err) if retain(&err) => {
                        // Still waiting on its precondition
                    }
                    Err(_) => {
                        escrow.del_dup(&key, &dig);
                    }
                }
            }
        }
        Ok(())
    }

    /// Promotion walk over the unverified nontrans receipt escrow.
    fn process_unverified_receipts(&mut self) -> KeriResult<()> {
        let now = Utc::now();
        let db = self.db.clone();
        for (key, vals) in db.ures.top(b"") {
            let Some((preb, _sn)) = split_on_key(&key) else {
                db.ures.del(&key);
                continue;
            };
            let pre = String::from_utf8_lossy(&preb).to_string();
            for val in vals {
                // dts(32) + said(44) + pre(44) + cig(88)
                if val.len() < 32 + 44 + 44 + 88 {
                    db.ures.del_dup(&key, &val);
                    continue;
                }
                let dts = String::from_utf8_lossy(&val[..32]).to_string();
                if let Ok(stamp) = DateTime::parse_from_rfc3339(&dts) {
                    if now - stamp.with_timezone(&Utc) > Duration::seconds(Self::TIMEOUT_URE) {
                        db.ures.del_dup(&key, &val);
                        continue;
                    }
                }
                let said = String::from_utf8_lossy(&val[32..76]).to_string();
                let dgkey = dg_key(&pre, &said);
                let Some(raw) = db.evts.get(&dgkey) else {
                    continue;
                };
                let Ok(verfer) = crate::cesr::verfer::Verfer::from_qb64b(&val[76..120]) else {
                    db.ures.del_dup(&key, &val);
                    continue;
                };
                let Ok(cigar) = Cigar::from_qb64b(&val[120..]) else {
                    db.ures.del_dup(&key, &val);
                    continue;
                };
                if verfer.verify(cigar.raw(), &raw) {
                    let couple = [verfer.qb64b(), cigar.qb64b()].concat();
                    db.rcts.add(&dgkey, &couple);
                    info!(pre = %pre, said = %said, "unverified receipt promoted");
                }
                db.ures.del_dup(&key, &val);
            }
        }
        Ok(())
    }

    /// Promotion walk over the unverified transferable receipt escrow.
    fn process_unverified_trans_receipts(&mut self) -> KeriResult<()> {
        let now = Utc::now();
        let db = self.db.clone();
        for (key, vals) in db.vres.top(b"") {
            let Some((preb, _sn)) = split_on_key(&key) else {
                db.vres.del(&key);
                continue;
            };
            let pre = String::from_utf8_lossy(&preb).to_string();
            for val in vals {
                // dts(32) + said(44) + spre(44) + ssnu(24) + sdig(44) + sig(88)
                if val.len() < 32 + 44 + 44 + 24 + 44 + 88 {
                    db.vres.del_dup(&key, &val);
                    continue;
                }
                let dts = String::from_utf8_lossy(&val[..32]).to_string();
                if let Ok(stamp) = DateTime::parse_from_rfc3339(&dts) {
                    if now - stamp.with_timezone(&Utc) > Duration::seconds(Self::TIMEOUT_VRE) {
                        db.vres.del_dup(&key, &val);
                        continue;
                    }
                }
                let said = String::from_utf8_lossy(&val[32..76]).to_string();
                let spre = String::from_utf8_lossy(&val[76..120]).to_string();
                let Ok(seqner) = Seqner::from_qb64b(&val[120..144]) else {
                    db.vres.del_dup(&key, &val);
                    continue;
                };
                let Ok(saider) = Saider::from_qb64b(&val[144..188]) else {
                    db.vres.del_dup(&key, &val);
                    continue;
                };
                let Ok(siger) = Siger::from_qb64b(&val[188..]) else {
                    db.vres.del_dup(&key, &val);
                    continue;
                };
                let dgkey = dg_key(&pre, &said);
                let raw = db.evts.get(&dgkey);
                let endorsed = db
                    .kels
                    .get_last(&sn_key(&spre, seqner.sn()))
                    .filter(|ldig| *ldig == saider.qb64b())
                    .and_then(|_| db.evts.get(&dg_key(&spre, &saider.qb64())));
                let (Some(raw), Some(eraw)) = (raw, endorsed) else {
                    continue;
                };
                let Ok(eserder) = Serder::from_raw(&eraw) else {
                    db.vres.del_dup(&key, &val);
                    continue;
                };
                let Ok(verfers) = eserder.verfers() else {
                    db.vres.del_dup(&key, &val);
                    continue;
                };
                if let Ok((verified, _)) = verify_sigs(&raw, vec![siger], &verfers) {
                    for siger in verified {
                        let quadruple = [
                            spre.as_bytes().to_vec(),
                            seqner.qb64b(),
                            saider.qb64b(),
                            siger.qb64b(),
                        ]
                        .concat();
                        db.vrcs.add(&dgkey, &quadruple);
                        info!(pre = %pre, said = %said, "unverified trans receipt promoted");
                    }
                }
                db.vres.del_dup(&key, &val);
            }
        }
        Ok(())
    }
}
