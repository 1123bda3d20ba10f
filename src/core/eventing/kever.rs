//! Kever: per-identifier key event verifier and state machine.
//!
//! A Kever is created by a valid inception event and updated by rotation
//! and interaction events. It validates one event at a time against its
//! current state under the ordering, threshold, next-commitment, witness
//! and delegation rules, and appends accepted events to the database.

use crate::cesr::dater::Dater;
use crate::cesr::diger::Diger;
use crate::cesr::indexing::Siger;
use crate::cesr::prefixer::Prefixer;
use crate::cesr::saider::Saider;
use crate::cesr::seqner::Seqner;
use crate::cesr::tholder::Tholder;
use crate::cesr::verfer::Verfer;
use crate::core::eventing::verify_sigs;
use crate::core::serdering::Serder;
use crate::core::{trait_dex, Ilks};
use crate::db::{dg_key, sn_key, Baser, KeyStateRecord, StateEERecord};
use crate::errors::{KeriError, KeriResult};
use chrono::{SecondsFormat, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Location of the last establishment event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastEstLoc {
    pub s: u64,
    pub d: String,
}

pub struct Kever {
    pub db: Arc<Baser>,
    pub prefixer: Prefixer,
    pub sner: u64,
    pub fner: Option<u64>,
    pub dater: Option<Dater>,
    pub ilk: String,
    pub serder: Serder,
    pub verfers: Vec<Verfer>,
    pub tholder: Tholder,
    pub ndigers: Vec<Diger>,
    pub ntholder: Option<Tholder>,
    pub toader: u64,
    pub wits: Vec<String>,
    pub cuts: Vec<String>,
    pub adds: Vec<String>,
    pub last_est: LastEstLoc,
    pub est_only: bool,
    pub do_not_delegate: bool,
    pub delpre: Option<String>,
}

impl Kever {
    /// Creates a Kever by validating an inception event (`icp` or `dip`)
    /// with its attached controller and witness indexed signatures.
    ///
    /// `local` marks a protected (controller side) event source for which
    /// the witness threshold is not yet enforceable. `check` suppresses
    /// non-idempotent first seen writes.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Baser>,
        serder: Serder,
        sigers: Vec<Siger>,
        wigers: Option<Vec<Siger>>,
        delseqner: Option<Seqner>,
        delsaider: Option<Saider>,
        local: bool,
        check: bool,
    ) -> KeriResult<Self> {
        let ilk = serder
            .ilk()
            .ok_or_else(|| KeriError::FieldError("Missing ilk".to_string()))?
            .to_string();
        if ilk != Ilks::ICP && ilk != Ilks::DIP {
            return Err(KeriError::ValidationError(format!(
                "Expected ilk = icp or dip, got {} for evt = {}",
                ilk,
                serder.pretty()
            )));
        }

        let sn = serder.sn()?;
        if sn != 0 {
            return Err(KeriError::ValidationError(format!(
                "Nonzero sn = {} in inception event.",
                sn
            )));
        }

        let pre = serder
            .pre()
            .ok_or_else(|| KeriError::FieldError("Missing pre".to_string()))?;
        let prefixer = Prefixer::from_qb64(&pre)?;
        if !prefixer.verify(serder.ked(), true) {
            return Err(KeriError::DerivationError(format!(
                "Invalid prefix derivation = {} for inception evt = {}",
                pre,
                serder.pretty()
            )));
        }

        let verfers = serder.verfers()?;
        let tholder = serder
            .tholder()?
            .ok_or_else(|| KeriError::FieldError("Missing kt".to_string()))?;
        if let Some(num) = tholder.num() {
            if num < 1 {
                return Err(KeriError::ValidationError(format!(
                    "Invalid sith = {} less than 1 for evt = {}",
                    num,
                    serder.pretty()
                )));
            }
        }
        if verfers.len() < tholder.size() {
            return Err(KeriError::ValidationError(format!(
                "Invalid sith = {:?} for keys = {:?}",
                tholder.sith(),
                serder.keys()
            )));
        }

        let ndigers = serder.ndigers()?;
        let ntholder = serder.ntholder()?;
        let wits = serder.backs();
        let toad = serder.toad()?;

        // Non-transferable restrictions on next digests, witnesses and seals
        if !prefixer.is_transferable() {
            if !ndigers.is_empty() {
                return Err(KeriError::DerivationError(format!(
                    "Invalid inception next digest list not empty for non-transferable prefix = {}",
                    pre
                )));
            }
            if !wits.is_empty() {
                return Err(KeriError::DerivationError(format!(
                    "Invalid inception wits not empty for non-transferable prefix = {}",
                    pre
                )));
            }
            if serder
                .seals()
                .and_then(|a| a.as_array())
                .map(|a| !a.is_empty())
                .unwrap_or(false)
            {
                return Err(KeriError::DerivationError(format!(
                    "Invalid inception data not empty for non-transferable prefix = {}",
                    pre
                )));
            }
        }

        let mut unique = HashSet::new();
        for wit in &wits {
            if !unique.insert(wit) {
                return Err(KeriError::ValidationError(format!(
                    "Invalid backers = {:?}, has duplicates for evt = {}",
                    wits,
                    serder.pretty()
                )));
            }
        }
        validate_toad(toad, &wits)?;

        // Configuration traits
        let traits = serder.traits();
        let est_only = traits.iter().any(|t| t == trait_dex::EST_ONLY);
        let do_not_delegate = traits.iter().any(|t| t == trait_dex::DO_NOT_DELEGATE);

        let delpre = if ilk == Ilks::DIP {
            let delpre = serder.delpre().ok_or_else(|| {
                KeriError::ValidationError(format!(
                    "Empty or missing delegator for delegated inception evt = {}",
                    serder.pretty()
                ))
            })?;
            Some(delpre)
        } else {
            None
        };

        let kever = Kever {
            db,
            prefixer,
            sner: 0,
            fner: None,
            dater: None,
            ilk: ilk.clone(),
            serder: serder.clone(),
            verfers,
            tholder,
            ndigers,
            ntholder,
            toader: toad,
            wits: wits.clone(),
            cuts: Vec::new(),
            adds: Vec::new(),
            last_est: LastEstLoc {
                s: 0,
                d: serder.said().unwrap_or_default().to_string(),
            },
            est_only,
            do_not_delegate,
            delpre: delpre.clone(),
        };

        let (sigers, wigers) = kever.validate_sigs(
            &serder,
            sigers,
            &kever.verfers,
            &kever.tholder,
            wigers,
            toad,
            &wits,
            local,
        )?;

        let delcouple =
            kever.validate_delegation(&serder, delpre.as_deref(), delseqner, delsaider)?;

        let mut kever = kever;
        let (fner, dts) = kever.log_event(
            &serder,
            &sigers,
            wigers.as_deref(),
            Some(&wits),
            !check,
            delcouple.as_ref(),
        )?;
        if let Some(fon) = fner {
            kever.fner = Some(fon);
            kever.dater = Some(Dater::from_dts(&dts)?);
            kever.db.put_state(&kever.prefixer.qb64(), &kever.state());
        }
        Ok(kever)
    }

    /// Reloads a Kever from a persisted key state record without replaying
    /// the KEL.
    pub fn reload(db: Arc<Baser>, state: KeyStateRecord) -> KeriResult<Self> {
        let prefixer = Prefixer::from_qb64(&state.i)?;
        let raw = db
            .evts
            .get(&dg_key(&state.i, &state.d))
            .ok_or_else(|| {
                KeriError::MissingEntryError(format!(
                    "Corresponding event not found for state of pre = {}",
                    state.i
                ))
            })?;
        let serder = Serder::from_raw(&raw)?;
        let verfers = state
            .k
            .iter()
            .map(|k| Verfer::from_qb64(k).map_err(KeriError::from))
            .collect::<KeriResult<Vec<_>>>()?;
        let ndigers = state
            .n
            .iter()
            .map(|d| Diger::from_qb64(d).map_err(KeriError::from))
            .collect::<KeriResult<Vec<_>>>()?;
        let tholder = Tholder::from_sith(&state.kt)?;
        let ntholder = if state.n.is_empty() {
            None
        } else {
            Some(Tholder::from_sith(&state.nt)?)
        };
        let last_s = u64::from_str_radix(&state.ee.s, 16)
            .map_err(|e| KeriError::ValueError(format!("Invalid last est sn: {}", e)))?;
        Ok(Kever {
            db,
            prefixer,
            sner: u64::from_str_radix(&state.s, 16)
                .map_err(|e| KeriError::ValueError(format!("Invalid sn: {}", e)))?,
            fner: Some(
                u64::from_str_radix(&state.f, 16)
                    .map_err(|e| KeriError::ValueError(format!("Invalid fn: {}", e)))?,
            ),
            dater: Some(Dater::from_dts(&state.dt)?),
            ilk: state.et.clone(),
            serder,
            verfers,
            tholder,
            ndigers,
            ntholder,
            toader: u64::from_str_radix(&state.bt, 16)
                .map_err(|e| KeriError::ValueError(format!("Invalid bt: {}", e)))?,
            wits: state.b.clone(),
            cuts: state.ee.br.clone(),
            adds: state.ee.ba.clone(),
            last_est: LastEstLoc {
                s: last_s,
                d: state.ee.d.clone(),
            },
            est_only: state.c.iter().any(|t| t == trait_dex::EST_ONLY),
            do_not_delegate: state.c.iter().any(|t| t == trait_dex::DO_NOT_DELEGATE),
            delpre: if state.di.is_empty() {
                None
            } else {
                Some(state.di.clone())
            },
        })
    }

    pub fn transferable(&self) -> bool {
        !self.ndigers.is_empty() && self.prefixer.is_transferable()
    }

    /// Updates state with one non-inceptive event (`rot`, `drt` or `ixn`).
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        serder: Serder,
        sigers: Vec<Siger>,
        wigers: Option<Vec<Siger>>,
        delseqner: Option<Seqner>,
        delsaider: Option<Saider>,
        local: bool,
        check: bool,
    ) -> KeriResult<()> {
        if !self.transferable() {
            return Err(KeriError::ValidationError(format!(
                "Unexpected event = {} in nontransferable state.",
                serder.pretty()
            )));
        }
        let pre = self.prefixer.qb64();
        if serder.pre().as_deref() != Some(pre.as_str()) {
            return Err(KeriError::ValidationError(format!(
                "Mismatch event aid prefix = {:?} expecting = {}",
                serder.pre(),
                pre
            )));
        }
        let ilk = serder
            .ilk()
            .ok_or_else(|| KeriError::FieldError("Missing ilk".to_string()))?
            .to_string();
        let sn = serder.sn()?;

        if ilk == Ilks::ROT || ilk == Ilks::DRT {
            if self.delpre.is_some() && ilk != Ilks::DRT {
                return Err(KeriError::ValidationError(format!(
                    "Attempted non delegated rotation on delegated pre = {}",
                    pre
                )));
            }
            if self.delpre.is_none() && ilk == Ilks::DRT {
                return Err(KeriError::ValidationError(format!(
                    "Attempted delegated rotation on non delegated pre = {}",
                    pre
                )));
            }

            let (tholder, toad, wits, cuts, adds) = self.rotate(&serder)?;

            let verfers = serder.verfers()?;
            let (sigers, wigers) = self.validate_sigs(
                &serder, sigers, &verfers, &tholder, wigers, toad, &wits, local,
            )?;

            // Forward commitment: the new key set must satisfy the prior
            // next threshold through its digests in the prior next list
            let ondices = self.exposeds(&sigers, &serder)?;
            let ntholder = self.ntholder.clone().ok_or_else(|| {
                KeriError::ValidationError(format!(
                    "Attempted rotation for abandoned pre = {}",
                    pre
                ))
            })?;
            if ondices.is_empty() {
                return Err(KeriError::ValidationError(format!(
                    "New keys = {:?} not in prior next digests = {:?} for evt = {}",
                    serder.keys(),
                    self.ndigers.iter().map(|d| d.qb64()).collect::<Vec<_>>(),
                    serder.pretty()
                )));
            }
            if !ntholder.satisfy(&ondices) {
                return Err(KeriError::MissingSignatureError(format!(
                    "Failure satisfying prior nsith = {:?} with exposed ondices {:?} for evt = {:?}",
                    ntholder.sith(),
                    ondices,
                    serder.said()
                )));
            }

            let delcouple =
                self.validate_delegation(&serder, self.delpre.as_deref(), delseqner, delsaider)?;

            let old_sn = self.sner;
            let recovery = sn <= old_sn;
            let (fner, dts) = self.log_event(
                &serder,
                &sigers,
                wigers.as_deref(),
                Some(&wits),
                !check,
                delcouple.as_ref(),
            )?;

            if recovery {
                self.mark_superseded(sn, old_sn, serder.said().unwrap_or_default());
            }

            self.sner = sn;
            self.serder = serder.clone();
            self.ilk = ilk;
            self.tholder = tholder;
            self.verfers = verfers;
            self.ndigers = serder.ndigers()?;
            self.ntholder = serder.ntholder()?;
            self.toader = toad;
            self.wits = wits;
            self.cuts = cuts;
            self.adds = adds;
            self.last_est = LastEstLoc {
                s: sn,
                d: serder.said().unwrap_or_default().to_string(),
            };
            if let Some(fon) = fner {
                self.fner = Some(fon);
                self.dater = Some(Dater::from_dts(&dts)?);
                self.db.put_state(&pre, &self.state());
            }
        } else if ilk == Ilks::IXN {
            if self.est_only {
                return Err(KeriError::ValidationError(format!(
                    "Unexpected non-establishment event = {}",
                    serder.pretty()
                )));
            }
            if sn != self.sner + 1 {
                return Err(KeriError::ValidationError(format!(
                    "Invalid sn = {} expecting = {} for evt = {}",
                    sn,
                    self.sner + 1,
                    serder.pretty()
                )));
            }
            let prior = serder.prior().unwrap_or_default();
            if Some(prior.as_str()) != self.serder.said() {
                return Err(KeriError::ValidationError(format!(
                    "Mismatch event dig = {} with state dig = {:?} for evt = {}",
                    prior,
                    self.serder.said(),
                    serder.pretty()
                )));
            }

            let verfers = self.verfers.clone();
            let tholder = self.tholder.clone();
            let wits = self.wits.clone();
            let (sigers, wigers) = self.validate_sigs(
                &serder,
                sigers,
                &verfers,
                &tholder,
                wigers,
                self.toader,
                &wits,
                local,
            )?;

            let (fner, dts) =
                self.log_event(&serder, &sigers, wigers.as_deref(), None, !check, None)?;

            self.sner = sn;
            self.serder = serder;
            self.ilk = ilk;
            if let Some(fon) = fner {
                self.fner = Some(fon);
                self.dater = Some(Dater::from_dts(&dts)?);
                self.db.put_state(&pre, &self.state());
            }
        } else {
            return Err(KeriError::ValidationError(format!(
                "Unsupported ilk = {} for evt = {}",
                ilk,
                serder.pretty()
            )));
        }
        Ok(())
    }

    /// Provisional rotation validation shared by `rot` and `drt`: ordering
    /// and prior linkage including superseding recovery, rotation
    /// permission, and witness list derivation.
    pub fn rotate(
        &self,
        serder: &Serder,
    ) -> KeriResult<(Tholder, u64, Vec<String>, Vec<String>, Vec<String>)> {
        let sn = serder.sn()?;
        let pre = self.prefixer.qb64();
        let prior = serder.prior().unwrap_or_default();
        let ilk = serder.ilk().unwrap_or_default();

        if sn > self.sner + 1 {
            return Err(KeriError::OutOfOrderError(format!(
                "Out of order event sn = {} expecting = {} for evt = {}",
                sn,
                self.sner + 1,
                serder.pretty()
            )));
        } else if sn <= self.sner {
            // Superseding recovery window
            if (ilk == Ilks::ROT && sn <= self.last_est.s)
                || (ilk == Ilks::DRT && sn < self.last_est.s)
            {
                return Err(KeriError::ValidationError(format!(
                    "Stale event sn = {} expecting = {} for evt = {}",
                    sn,
                    self.sner + 1,
                    serder.pretty()
                )));
            }
            if ilk == Ilks::ROT && self.ilk != Ilks::IXN {
                // Only interaction suffixes may be recovered by rotation
                return Err(KeriError::ValidationError(format!(
                    "Invalid recovery attempt at ilk = {} for evt = {}",
                    self.ilk,
                    serder.pretty()
                )));
            }
            let psn = sn - 1;
            let pdig = self
                .db
                .kels
                .get_last(&sn_key(&pre, psn))
                .ok_or_else(|| {
                    KeriError::ValidationError(format!(
                        "Invalid recovery attempt: missing event at sn = {} for pre = {}",
                        psn, pre
                    ))
                })?;
            let praw = self
                .db
                .evts
                .get(&dg_key(&pre, &pdig))
                .ok_or_else(|| {
                    KeriError::ValidationError(format!(
                        "Invalid recovery attempt: missing event for dig = {:?}",
                        String::from_utf8_lossy(&pdig)
                    ))
                })?;
            let pserder = Serder::from_raw(&praw)?;
            if Some(prior.as_str()) != pserder.said() {
                return Err(KeriError::ValidationError(format!(
                    "Invalid recovery attempt: mismatch prior dig = {} with dig = {:?} at sn = {}",
                    prior,
                    pserder.said(),
                    psn
                )));
            }
        } else {
            // In order rotation
            if Some(prior.as_str()) != self.serder.said() {
                return Err(KeriError::ValidationError(format!(
                    "Mismatch event dig = {} with state dig = {:?} for evt = {}",
                    prior,
                    self.serder.said(),
                    serder.pretty()
                )));
            }
        }

        if self.ndigers.is_empty() {
            return Err(KeriError::ValidationError(format!(
                "Attempted rotation for nontransferable prefix = {}",
                pre
            )));
        }

        let tholder = serder
            .tholder()?
            .ok_or_else(|| KeriError::FieldError("Missing kt".to_string()))?;
        let keys = serder.keys();
        if keys.len() < tholder.size() {
            return Err(KeriError::ValidationError(format!(
                "Invalid sith = {:?} for keys = {:?}",
                tholder.sith(),
                keys
            )));
        }

        let (wits, cuts, adds) = self.derive_backs(serder)?;
        let toad = serder.toad()?;
        validate_toad(toad, &wits)?;
        Ok((tholder, toad, wits, cuts, adds))
    }

    /// Computes the resultant witness list from the current wits with the
    /// event's cuts and adds.
    fn derive_backs(&self, serder: &Serder) -> KeriResult<(Vec<String>, Vec<String>, Vec<String>)> {
        let cuts = serder.cuts();
        let adds = serder.adds();
        let witset: HashSet<&String> = self.wits.iter().collect();
        let cutset: HashSet<&String> = cuts.iter().collect();
        let addset: HashSet<&String> = adds.iter().collect();
        if cutset.len() != cuts.len() {
            return Err(KeriError::ValidationError(format!(
                "Invalid cuts = {:?}, has duplicates for evt = {}",
                cuts,
                serder.pretty()
            )));
        }
        if !cutset.is_subset(&witset) {
            return Err(KeriError::ValidationError(format!(
                "Invalid cuts = {:?}, not all members in wits for evt = {}",
                cuts,
                serder.pretty()
            )));
        }
        if addset.len() != adds.len() {
            return Err(KeriError::ValidationError(format!(
                "Invalid adds = {:?}, has duplicates for evt = {}",
                adds,
                serder.pretty()
            )));
        }
        if !addset.is_disjoint(&witset) || !addset.is_disjoint(&cutset) {
            return Err(KeriError::ValidationError(format!(
                "Intersecting wits or cuts with adds = {:?} for evt = {}",
                adds,
                serder.pretty()
            )));
        }
        let wits: Vec<String> = self
            .wits
            .iter()
            .filter(|w| !cutset.contains(w))
            .chain(adds.iter())
            .cloned()
            .collect();
        Ok((wits, cuts, adds))
    }

    /// Verifies controller and witness indexed signatures, enforcing the
    /// signing threshold and for remote sources the witness threshold.
    #[allow(clippy::too_many_arguments)]
    fn validate_sigs(
        &self,
        serder: &Serder,
        sigers: Vec<Siger>,
        verfers: &[Verfer],
        tholder: &Tholder,
        wigers: Option<Vec<Siger>>,
        toad: u64,
        wits: &[String],
        local: bool,
    ) -> KeriResult<(Vec<Siger>, Option<Vec<Siger>>)> {
        if verfers.len() < tholder.size() {
            return Err(KeriError::ValidationError(format!(
                "Invalid sith = {:?} for keys = {:?} for evt = {}",
                tholder.sith(),
                serder.keys(),
                serder.pretty()
            )));
        }

        let (sigers, indices) = verify_sigs(serder.raw(), sigers, verfers)?;
        if indices.is_empty() {
            return Err(KeriError::ValidationError(format!(
                "No verified signatures for evt = {}",
                serder.pretty()
            )));
        }
        if !tholder.satisfy(&indices) {
            return Err(KeriError::MissingSignatureError(format!(
                "Failure satisfying sith = {:?} on sigs indices {:?} for evt = {:?}",
                tholder.sith(),
                indices,
                serder.said()
            )));
        }

        let wigers = match wigers {
            Some(wigers) => {
                let werfers = wits
                    .iter()
                    .map(|w| Verfer::from_qb64(w).map_err(KeriError::from))
                    .collect::<KeriResult<Vec<_>>>()?;
                let (wigers, windices) = verify_sigs(serder.raw(), wigers, &werfers)?;
                if !local && (windices.len() as u64) < toad {
                    return Err(KeriError::MissingWitnessSignatureError(format!(
                        "Failure satisfying toad = {} on witness sigs indices {:?} for evt = {:?}",
                        toad,
                        windices,
                        serder.said()
                    )));
                }
                Some(wigers)
            }
            None => {
                if !local && !wits.is_empty() && toad > 0 {
                    return Err(KeriError::MissingWitnessSignatureError(format!(
                        "Failure satisfying toad = {} with no witness sigs for evt = {:?}",
                        toad,
                        serder.said()
                    )));
                }
                None
            }
        };
        Ok((sigers, wigers))
    }

    /// Ondices: positions in the prior next digest list exposed by the new
    /// key of each verified signature.
    fn exposeds(&self, sigers: &[Siger], serder: &Serder) -> KeriResult<Vec<u32>> {
        let keys = serder.keys();
        let mut ondices: Vec<u32> = Vec::new();
        for siger in sigers {
            let idx = siger.index() as usize;
            if idx >= keys.len() {
                continue;
            }
            let keyb = keys[idx].as_bytes();
            for (pos, ndiger) in self.ndigers.iter().enumerate() {
                if ndiger.verify(keyb) && !ondices.contains(&(pos as u32)) {
                    ondices.push(pos as u32);
                }
            }
        }
        ondices.sort_unstable();
        Ok(ondices)
    }

    /// Validates a delegation source couple against the delegator's KEL.
    /// Missing material is recoverable (escrowed by the caller); a seal or
    /// digest mismatch is not.
    fn validate_delegation(
        &self,
        serder: &Serder,
        delpre: Option<&str>,
        delseqner: Option<Seqner>,
        delsaider: Option<Saider>,
    ) -> KeriResult<Option<(Seqner, Saider)>> {
        let Some(delpre) = delpre else {
            return Ok(None);
        };
        let ilk = serder.ilk().unwrap_or_default();
        if !Ilks::is_establishment(ilk) {
            return Ok(None);
        }
        let (Some(seqner), Some(saider)) = (delseqner, delsaider) else {
            return Err(KeriError::MissingDelegationError(format!(
                "Missing delegation source couple by {} of evt = {:?}",
                delpre,
                serder.said()
            )));
        };

        if let Some(dstate) = self.db.get_state(delpre) {
            if dstate.c.iter().any(|t| t == trait_dex::DO_NOT_DELEGATE) {
                return Err(KeriError::ValidationError(format!(
                    "Attempted delegation by non-delegating delegator = {}",
                    delpre
                )));
            }
        }

        let ddig = self
            .db
            .kels
            .get_last(&sn_key(delpre, seqner.sn()))
            .ok_or_else(|| {
                KeriError::MissingDelegationError(format!(
                    "No delegating event at sn = {} from delegator = {}",
                    seqner.sn(),
                    delpre
                ))
            })?;
        if ddig != saider.qb64b() {
            return Err(KeriError::ValidationError(format!(
                "Mismatch delegating event dig = {} at sn = {} from delegator = {}",
                saider.qb64(),
                seqner.sn(),
                delpre
            )));
        }
        let draw = self
            .db
            .evts
            .get(&dg_key(delpre, &ddig))
            .ok_or_else(|| {
                KeriError::MissingDelegationError(format!(
                    "Missing delegating event for dig = {}",
                    saider.qb64()
                ))
            })?;
        let dserder = Serder::from_raw(&draw)?;

        let pre = serder.pre().unwrap_or_default();
        let snh = serder.snh().unwrap_or_default();
        let said = serder.said().unwrap_or_default();
        let sealed = dserder
            .seals()
            .and_then(|a| a.as_array())
            .map(|seals| {
                seals.iter().any(|seal| {
                    seal.get("i").and_then(|v| v.as_str()) == Some(pre.as_str())
                        && seal.get("s").and_then(|v| v.as_str()) == Some(snh.as_str())
                        && seal.get("d").and_then(|v| v.as_str()) == Some(said)
                })
            })
            .unwrap_or(false);
        if !sealed {
            return Err(KeriError::MissingDelegationError(format!(
                "Missing delegation seal for evt = {:?} in delegating event = {:?}",
                serder.said(),
                dserder.said()
            )));
        }
        Ok(Some((seqner, saider)))
    }

    /// Writes an accepted (or duplicate, for late signature accrual) event
    /// with its signatures and metadata. With `first` the event is entered
    /// into the first seen log and stamped.
    pub fn log_event(
        &self,
        serder: &Serder,
        sigers: &[Siger],
        wigers: Option<&[Siger]>,
        wits: Option<&[String]>,
        first: bool,
        delcouple: Option<&(Seqner, Saider)>,
    ) -> KeriResult<(Option<u64>, String)> {
        let pre = serder
            .pre()
            .ok_or_else(|| KeriError::FieldError("Missing pre".to_string()))?;
        let said = serder
            .said()
            .ok_or_else(|| KeriError::FieldError("Missing said".to_string()))?
            .to_string();
        let dgkey = dg_key(&pre, &said);
        let dts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);

        self.db.dtss.put(&dgkey, dts.as_bytes());
        for siger in sigers {
            self.db.sigs.add(&dgkey, &siger.qb64b());
        }
        if let Some(wigers) = wigers {
            for wiger in wigers {
                self.db.wigs.add(&dgkey, &wiger.qb64b());
            }
        }
        if let Some(wits) = wits {
            for wit in wits {
                self.db.wits.add(&dgkey, wit.as_bytes());
            }
        }
        self.db.evts.put(&dgkey, serder.raw());

        if let Some((seqner, saider)) = delcouple {
            let couple = [seqner.qb64b(), saider.qb64b()].concat();
            self.db.aess.put(&dgkey, &couple);
        }

        let mut fner = None;
        if first {
            let fon = self
                .db
                .fels
                .append_on(pre.as_bytes(), said.as_bytes());
            self.db.fons.set(&dgkey, format!("{:x}", fon).as_bytes());
            self.db.dtss.set(&dgkey, dts.as_bytes());
            fner = Some(fon);
        }
        let sn = serder.sn()?;
        self.db.kels.add(&sn_key(&pre, sn), said.as_bytes());
        debug!(pre = %pre, sn, said = %said, "logged key event");
        Ok((fner, dts))
    }

    /// Records the superseded suffix `(sn..=old_sn]` digests into the
    /// duplicitous event index after a recovery rotation installed `said`
    /// at `sn`.
    fn mark_superseded(&self, sn: u64, old_sn: u64, said: &str) {
        let pre = self.prefixer.qb64();
        for psn in sn..=old_sn {
            let key = sn_key(&pre, psn);
            for dig in self.db.kels.get_dups(&key) {
                if dig != said.as_bytes() {
                    self.db.dels.add(&key, &dig);
                }
            }
        }
        debug!(pre = %pre, sn, old_sn, "superseded recovery suffix");
    }

    /// Current key state record.
    pub fn state(&self) -> KeyStateRecord {
        KeyStateRecord {
            vn: [1, 0],
            i: self.prefixer.qb64(),
            s: format!("{:x}", self.sner),
            p: self.serder.prior().unwrap_or_default(),
            d: self.serder.said().unwrap_or_default().to_string(),
            f: format!("{:x}", self.fner.unwrap_or(0)),
            dt: self
                .dater
                .as_ref()
                .map(|d| d.dts())
                .unwrap_or_default(),
            et: self.ilk.clone(),
            kt: self.tholder.sith().clone(),
            k: self.verfers.iter().map(|v| v.qb64()).collect(),
            nt: self
                .ntholder
                .as_ref()
                .map(|t| t.sith().clone())
                .unwrap_or_else(|| serde_json::json!("0")),
            n: self.ndigers.iter().map(|d| d.qb64()).collect(),
            bt: format!("{:x}", self.toader),
            b: self.wits.clone(),
            c: {
                let mut c = Vec::new();
                if self.est_only {
                    c.push(trait_dex::EST_ONLY.to_string());
                }
                if self.do_not_delegate {
                    c.push(trait_dex::DO_NOT_DELEGATE.to_string());
                }
                c
            },
            ee: StateEERecord {
                s: format!("{:x}", self.last_est.s),
                d: self.last_est.d.clone(),
                br: self.cuts.clone(),
                ba: self.adds.clone(),
            },
            di: self.delpre.clone().unwrap_or_default(),
        }
    }
}

fn validate_toad(toad: u64, wits: &[String]) -> KeriResult<()> {
    if !wits.is_empty() {
        if toad < 1 || toad > wits.len() as u64 {
            return Err(KeriError::ValidationError(format!(
                "Invalid toad = {} for backers = {:?}",
                toad, wits
            )));
        }
    } else if toad != 0 {
        return Err(KeriError::ValidationError(format!(
            "Invalid toad = {} for backers = {:?}",
            toad, wits
        )));
    }
    Ok(())
}
