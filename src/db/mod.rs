//! Keyed byte store with ordered duplicate values and the logical tables of
//! the key event database.
//!
//! The persistent engine itself is an external collaborator; this in-memory
//! realization keeps the same operation surface and key scheme (dot
//! separated prefix keys with 32 hex char ordinals) so the kernel's
//! acceptance path is exercised hermetically. Writers serialize through the
//! per-table lock; readers see either the pre- or post-state of each write.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Returns key with ordinal suffix: `pre.%032x`.
pub fn on_key(pre: impl AsRef<[u8]>, on: u64) -> Vec<u8> {
    let mut key = pre.as_ref().to_vec();
    key.push(b'.');
    key.extend_from_slice(format!("{:032x}", on).as_bytes());
    key
}

/// Key for the key event log: `pre.%032x` of sn.
pub fn sn_key(pre: impl AsRef<[u8]>, sn: u64) -> Vec<u8> {
    on_key(pre, sn)
}

/// Key for the first seen event log: `pre.%032x` of fn.
pub fn fn_key(pre: impl AsRef<[u8]>, fon: u64) -> Vec<u8> {
    on_key(pre, fon)
}

/// Key for digest keyed tables: `pre.dig`.
pub fn dg_key(pre: impl AsRef<[u8]>, dig: impl AsRef<[u8]>) -> Vec<u8> {
    let mut key = pre.as_ref().to_vec();
    key.push(b'.');
    key.extend_from_slice(dig.as_ref());
    key
}

/// Splits a key at the last separator into (top, suffix).
pub fn split_key(key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let pos = key.iter().rposition(|&b| b == b'.')?;
    Some((key[..pos].to_vec(), key[pos + 1..].to_vec()))
}

/// Splits an ordinal suffixed key into (pre, ordinal).
pub fn split_on_key(key: &[u8]) -> Option<(Vec<u8>, u64)> {
    let (top, suffix) = split_key(key)?;
    let text = std::str::from_utf8(&suffix).ok()?;
    let on = u64::from_str_radix(text, 16).ok()?;
    Some((top, on))
}

/// One named sub database: ordered keys, insertion ordered duplicates.
#[derive(Debug, Default)]
pub struct Store {
    inner: Mutex<BTreeMap<Vec<u8>, Vec<Vec<u8>>>>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    /// Writes val at key only if no entry exists. Returns false otherwise.
    pub fn put(&self, key: &[u8], val: &[u8]) -> bool {
        let mut map = self.inner.lock().expect("store lock");
        if map.contains_key(key) {
            return false;
        }
        map.insert(key.to_vec(), vec![val.to_vec()]);
        true
    }

    /// Writes val at key, overwriting any existing entry.
    pub fn set(&self, key: &[u8], val: &[u8]) -> bool {
        let mut map = self.inner.lock().expect("store lock");
        map.insert(key.to_vec(), vec![val.to_vec()]);
        true
    }

    /// Returns the first val at key.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let map = self.inner.lock().expect("store lock");
        map.get(key).and_then(|vals| vals.first().cloned())
    }

    /// Deletes all vals at key. Returns false when no entry existed.
    pub fn del(&self, key: &[u8]) -> bool {
        let mut map = self.inner.lock().expect("store lock");
        map.remove(key).is_some()
    }

    /// Appends val to the ordered duplicates at key, deduplicating.
    /// Returns false when the val was already present.
    pub fn add(&self, key: &[u8], val: &[u8]) -> bool {
        let mut map = self.inner.lock().expect("store lock");
        let vals = map.entry(key.to_vec()).or_default();
        if vals.iter().any(|v| v == val) {
            return false;
        }
        vals.push(val.to_vec());
        true
    }

    /// Returns all duplicate vals at key in insertion order.
    pub fn get_dups(&self, key: &[u8]) -> Vec<Vec<u8>> {
        let map = self.inner.lock().expect("store lock");
        map.get(key).cloned().unwrap_or_default()
    }

    /// Returns the last inserted val at key.
    pub fn get_last(&self, key: &[u8]) -> Option<Vec<u8>> {
        let map = self.inner.lock().expect("store lock");
        map.get(key).and_then(|vals| vals.last().cloned())
    }

    /// Removes one duplicate val at key. Returns false when absent.
    pub fn del_dup(&self, key: &[u8], val: &[u8]) -> bool {
        let mut map = self.inner.lock().expect("store lock");
        if let Some(vals) = map.get_mut(key) {
            let before = vals.len();
            vals.retain(|v| v != val);
            let removed = vals.len() != before;
            if vals.is_empty() {
                map.remove(key);
            }
            return removed;
        }
        false
    }

    /// Count of duplicate vals at key.
    pub fn cnt(&self, key: &[u8]) -> usize {
        let map = self.inner.lock().expect("store lock");
        map.get(key).map(|vals| vals.len()).unwrap_or(0)
    }

    /// Snapshot of all entries whose key begins with `top`, key ordered.
    pub fn top(&self, top: &[u8]) -> Vec<(Vec<u8>, Vec<Vec<u8>>)> {
        let map = self.inner.lock().expect("store lock");
        map.range(top.to_vec()..)
            .take_while(|(k, _)| k.starts_with(top))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Appends val at the next free ordinal suffix of `pre`, returning the
    /// ordinal used.
    pub fn append_on(&self, pre: &[u8], val: &[u8]) -> u64 {
        let mut map = self.inner.lock().expect("store lock");
        let mut top = pre.to_vec();
        top.push(b'.');
        let next = map
            .range(top.clone()..)
            .take_while(|(k, _)| k.starts_with(&top))
            .last()
            .and_then(|(k, _)| split_on_key(k))
            .map(|(_, on)| on + 1)
            .unwrap_or(0);
        map.insert(on_key(pre, next), vec![val.to_vec()]);
        next
    }
}

/// Last establishment event record within a key state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateEERecord {
    pub s: String,
    pub d: String,
    pub br: Vec<String>,
    pub ba: Vec<String>,
}

/// Key state snapshot record for one identifier prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyStateRecord {
    pub vn: [u32; 2],
    pub i: String,
    pub s: String,
    pub p: String,
    pub d: String,
    pub f: String,
    pub dt: String,
    pub et: String,
    pub kt: Value,
    pub k: Vec<String>,
    pub nt: Value,
    pub n: Vec<String>,
    pub bt: String,
    pub b: Vec<String>,
    pub c: Vec<String>,
    pub ee: StateEERecord,
    pub di: String,
}

/// Key event database: named sub stores keyed per the persistence layout.
#[derive(Debug, Default)]
pub struct Baser {
    /// Serialized events: dg_key(pre, dig) -> raw.
    pub evts: Store,
    /// First seen datetimes: dg_key(pre, dig) -> ISO-8601 dts.
    pub dtss: Store,
    /// Controller indexed signatures: dg_key(pre, dig) -> dup sig qb64.
    pub sigs: Store,
    /// Witness indexed signatures: dg_key(pre, dig) -> dup wig qb64.
    pub wigs: Store,
    /// Witness list at event acceptance: dg_key(pre, dig) -> dup wit qb64.
    pub wits: Store,
    /// Nontrans receipt couples: dg_key(pre, dig) -> dup pre+cig.
    pub rcts: Store,
    /// Trans receipt quadruples: dg_key(pre, dig) -> dup pre+snu+dig+sig.
    pub vrcs: Store,
    /// Key event log: sn_key(pre, sn) -> dup dig.
    pub kels: Store,
    /// First seen event log: fn_key(pre, fn) -> dig.
    pub fels: Store,
    /// First seen ordinal: dg_key(pre, dig) -> hex fn.
    pub fons: Store,
    /// Key state snapshots: pre -> key state record json.
    pub states: Store,
    /// Authorizer (delegator) event seal source couples: dg_key -> snu+dig.
    pub aess: Store,
    /// Out of order escrow: sn_key(pre, sn) -> dup dig.
    pub ooes: Store,
    /// Partially signed escrow: sn_key(pre, sn) -> dup dig.
    pub pses: Store,
    /// Partially witnessed escrow: sn_key(pre, sn) -> dup dig.
    pub pwes: Store,
    /// Missing delegation escrow: sn_key(pre, sn) -> dup dig.
    pub mdes: Store,
    /// Likely duplicitous escrow: sn_key(pre, sn) -> dup dig.
    pub ldes: Store,
    /// Unverified nontrans receipt escrow: sn_key(pre, sn) -> dup triple.
    pub ures: Store,
    /// Unverified trans receipt escrow: sn_key(pre, sn) -> dup quintuple.
    pub vres: Store,
    /// Duplicitous event log: sn_key(pre, sn) -> dup dig.
    pub dels: Store,
    /// Locally owned identifier prefixes.
    pub prefixes: Mutex<IndexSet<String>>,
}

impl Baser {
    pub fn new() -> Self {
        Baser::default()
    }

    /// Stores a key state record snapshot for pre.
    pub fn put_state(&self, pre: &str, state: &KeyStateRecord) -> bool {
        match serde_json::to_vec(state) {
            Ok(raw) => self.states.set(pre.as_bytes(), &raw),
            Err(_) => false,
        }
    }

    /// Loads the key state record snapshot for pre, if any.
    pub fn get_state(&self, pre: &str) -> Option<KeyStateRecord> {
        self.states
            .get(pre.as_bytes())
            .and_then(|raw| serde_json::from_slice(&raw).ok())
    }

    pub fn add_prefix(&self, pre: &str) {
        self.prefixes.lock().expect("prefixes lock").insert(pre.to_string());
    }

    pub fn has_prefix(&self, pre: &str) -> bool {
        self.prefixes.lock().expect("prefixes lock").contains(pre)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_funcs() {
        let key = sn_key("BAKY", 5);
        assert_eq!(
            key,
            b"BAKY.00000000000000000000000000000005".to_vec()
        );
        let (pre, on) = split_on_key(&key).unwrap();
        assert_eq!(pre, b"BAKY".to_vec());
        assert_eq!(on, 5);

        let key = dg_key("BAKY", "EABC");
        assert_eq!(key, b"BAKY.EABC".to_vec());
        let (pre, dig) = split_key(&key).unwrap();
        assert_eq!(pre, b"BAKY".to_vec());
        assert_eq!(dig, b"EABC".to_vec());
    }

    #[test]
    fn test_store_ops() {
        let store = Store::new();
        assert!(store.put(b"a", b"1"));
        assert!(!store.put(b"a", b"2"));
        assert_eq!(store.get(b"a").unwrap(), b"1".to_vec());
        assert!(store.set(b"a", b"2"));
        assert_eq!(store.get(b"a").unwrap(), b"2".to_vec());
        assert!(store.del(b"a"));
        assert!(!store.del(b"a"));
    }

    #[test]
    fn test_store_dups_ordered() {
        let store = Store::new();
        assert!(store.add(b"k", b"z"));
        assert!(store.add(b"k", b"m"));
        assert!(store.add(b"k", b"a"));
        assert!(!store.add(b"k", b"m")); // dedupe
        assert_eq!(
            store.get_dups(b"k"),
            vec![b"z".to_vec(), b"m".to_vec(), b"a".to_vec()]
        );
        assert_eq!(store.get_last(b"k").unwrap(), b"a".to_vec());
        assert_eq!(store.cnt(b"k"), 3);
        assert!(store.del_dup(b"k", b"m"));
        assert_eq!(store.cnt(b"k"), 2);
    }

    #[test]
    fn test_store_append_on_and_top() {
        let store = Store::new();
        assert_eq!(store.append_on(b"pre", b"d0"), 0);
        assert_eq!(store.append_on(b"pre", b"d1"), 1);
        assert_eq!(store.append_on(b"pre", b"d2"), 2);
        assert_eq!(store.append_on(b"other", b"x0"), 0);

        let entries = store.top(b"pre.");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].1[0], b"d0".to_vec());
        assert_eq!(entries[2].1[0], b"d2".to_vec());
    }

    #[test]
    fn test_state_record_roundtrip() {
        let db = Baser::new();
        let state = KeyStateRecord {
            vn: [1, 0],
            i: "BAKY".to_string(),
            s: "0".to_string(),
            p: "".to_string(),
            d: "EABC".to_string(),
            f: "0".to_string(),
            dt: "2021-01-01T00:00:00.000000+00:00".to_string(),
            et: "icp".to_string(),
            kt: serde_json::json!("1"),
            k: vec!["BAKY".to_string()],
            nt: serde_json::json!("0"),
            n: vec![],
            bt: "0".to_string(),
            b: vec![],
            c: vec![],
            ee: StateEERecord {
                s: "0".to_string(),
                d: "EABC".to_string(),
                br: vec![],
                ba: vec![],
            },
            di: "".to_string(),
        };
        assert!(db.put_state("BAKY", &state));
        assert_eq!(db.get_state("BAKY").unwrap(), state);
        assert!(db.get_state("missing").is_none());
    }
}
