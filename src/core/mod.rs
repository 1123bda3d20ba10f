//! Protocol-level definitions: version strings, serialization kinds, message
//! ilks, configuration traits and witness threshold helpers.

pub mod eventing;
pub mod parsing;
pub mod serdering;

use crate::errors::{KeriError, KeriResult};
use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// Protocol version with major and minor parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Versionage {
    pub major: u32,
    pub minor: u32,
}

/// Current supported protocol version.
pub const VERSION: Versionage = Versionage { major: 1, minor: 0 };

/// Supported protocol identifiers.
pub const PROTOCOLS: [&str; 2] = ["KERI", "ACDC"];

/// Number of hex chars in the version string size field.
pub const VERRAWSIZE: usize = 6;

/// Full span of a version 1 version string.
pub const VER_FULL_SPAN: usize = 17;

/// Maximum offset of the version string within the raw serialization.
pub const MAXVSOFFSET: usize = 12;

/// Minimum bytes needed to smell a full version string.
pub const SMELLSIZE: usize = MAXVSOFFSET + VER_FULL_SPAN;

/// Serialization kinds for event bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kinds {
    Json,
    Cbor,
    Mgpk,
}

impl Kinds {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kinds::Json => "JSON",
            Kinds::Cbor => "CBOR",
            Kinds::Mgpk => "MGPK",
        }
    }

    pub fn from_str(kind: &str) -> KeriResult<Self> {
        match kind {
            "JSON" => Ok(Kinds::Json),
            "CBOR" => Ok(Kinds::Cbor),
            "MGPK" => Ok(Kinds::Mgpk),
            other => Err(KeriError::KindError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Kinds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Version string regex for version 1 streams.
pub static REVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?-u)(?P<proto>[A-Z]{4})(?P<major>[0-9a-f])(?P<minor>[0-9a-f])(?P<kind>[A-Z]{4})(?P<size>[0-9a-f]{6})_",
    )
    .expect("version regex compiles")
});

/// Result of parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smellage {
    pub proto: String,
    pub vrsn: Versionage,
    pub kind: Kinds,
    pub size: usize,
}

/// Creates a version string: proto + hex major + hex minor + kind + hex size
/// terminated with '_'. Size is the exact byte length of the serialization.
pub fn versify(proto: &str, vrsn: &Versionage, kind: Kinds, size: usize) -> KeriResult<String> {
    if !PROTOCOLS.contains(&proto) {
        return Err(KeriError::VersionError(format!(
            "Invalid protocol={}",
            proto
        )));
    }
    if vrsn.major > 1 {
        return Err(KeriError::VersionError(format!(
            "Unsupported major version={}",
            vrsn.major
        )));
    }
    Ok(format!(
        "{}{:x}{:x}{}{:0width$x}_",
        proto,
        vrsn.major,
        vrsn.minor,
        kind.as_str(),
        size,
        width = VERRAWSIZE
    ))
}

fn rematch(caps: &regex::bytes::Captures) -> KeriResult<Smellage> {
    let text = |name: &str| -> KeriResult<&str> {
        std::str::from_utf8(caps.name(name).map(|m| m.as_bytes()).unwrap_or(b""))
            .map_err(|_| KeriError::VersionError("Non UTF-8 version string".to_string()))
    };
    let proto = text("proto")?.to_string();
    if !PROTOCOLS.contains(&proto.as_str()) {
        return Err(KeriError::VersionError(format!(
            "Invalid protocol={}",
            proto
        )));
    }
    let major = u32::from_str_radix(text("major")?, 16)
        .map_err(|e| KeriError::VersionError(e.to_string()))?;
    let minor = u32::from_str_radix(text("minor")?, 16)
        .map_err(|e| KeriError::VersionError(e.to_string()))?;
    if major > 1 {
        return Err(KeriError::VersionError(format!(
            "Incompatible major version={}",
            major
        )));
    }
    let kind = Kinds::from_str(text("kind")?)?;
    let size = usize::from_str_radix(text("size")?, 16)
        .map_err(|e| KeriError::VersionError(e.to_string()))?;
    Ok(Smellage {
        proto,
        vrsn: Versionage { major, minor },
        kind,
        size,
    })
}

/// Parses a version string from its exact bytes.
pub fn deversify(vs: &[u8]) -> KeriResult<Smellage> {
    match REVER.captures(vs) {
        Some(caps) => rematch(&caps),
        None => Err(KeriError::VersionError(format!(
            "Invalid version string={:?}",
            String::from_utf8_lossy(vs)
        ))),
    }
}

/// Extracts the version string from the front of a raw serialization.
/// The field map's first field must be `v` within MAXVSOFFSET bytes.
pub fn smell(raw: &[u8]) -> KeriResult<Smellage> {
    if raw.len() < SMELLSIZE {
        return Err(KeriError::ShortageError(SMELLSIZE - raw.len()));
    }
    match REVER.find(&raw[..SMELLSIZE]) {
        Some(m) if m.start() <= MAXVSOFFSET => {
            let caps = REVER
                .captures(&raw[..SMELLSIZE])
                .expect("find implies captures");
            rematch(&caps)
        }
        _ => Err(KeriError::VersionError(format!(
            "Invalid version string from smelled raw={:?}",
            String::from_utf8_lossy(&raw[..SMELLSIZE.min(raw.len())])
        ))),
    }
}

/// KERI protocol packet (message) types.
pub struct Ilks;

impl Ilks {
    pub const ICP: &'static str = "icp";
    pub const ROT: &'static str = "rot";
    pub const IXN: &'static str = "ixn";
    pub const DIP: &'static str = "dip";
    pub const DRT: &'static str = "drt";
    pub const RCT: &'static str = "rct";
    pub const QRY: &'static str = "qry";
    pub const RPY: &'static str = "rpy";
    pub const KSN: &'static str = "ksn";
    pub const EXN: &'static str = "exn";

    /// Establishment event ilks.
    pub fn establishment() -> [&'static str; 4] {
        [Self::ICP, Self::ROT, Self::DIP, Self::DRT]
    }

    pub fn is_establishment(ilk: &str) -> bool {
        Self::establishment().contains(&ilk)
    }
}

/// Configuration trait values carried in the `c` field of inceptions.
pub mod trait_dex {
    pub const EST_ONLY: &str = "EO";
    pub const DO_NOT_DELEGATE: &str = "DND";
}

/// Trivial majority floor: min(max(0,n), ceil((max(0,n)+1)/2)).
pub fn simple(n: i64) -> u64 {
    let n = n.max(0) as u64;
    n.min((n + 2) / 2)
}

/// Byzantine-ample majority for witness thresholds.
///
/// With `f` unset, derives the least and most tolerable fault counts from
/// `n`. With `f` set, raises when `n >= 1` yet the immune bound cannot be
/// met. `weak` selects the lower ample bound, otherwise the stricter one.
pub fn ample(n: u64, f: Option<u64>, weak: bool) -> KeriResult<u64> {
    match f {
        None => {
            let f1 = 1.max(n.saturating_sub(1) / 3);
            let f2 = 1.max((n + 2) / 3);
            if weak {
                Ok(n.min((n + f1 + 2) / 2).min((n + f2 + 2) / 2))
            } else {
                Ok(n.min(0.max(n.saturating_sub(f1)).max((n + f1 + 2) / 2)))
            }
        }
        Some(f) => {
            let m1 = (n + f + 2) / 2;
            let m2 = n.saturating_sub(f);
            if m2 < m1 && n > 0 {
                return Err(KeriError::ValueError(format!(
                    "Invalid f={} is too big for n={}",
                    f, n
                )));
            }
            if weak {
                Ok(n.min(m1).min(m2))
            } else {
                Ok(n.min(m1.max(m2)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versify_deversify() {
        let vs = versify("KERI", &VERSION, Kinds::Json, 0).unwrap();
        assert_eq!(vs, "KERI10JSON000000_");
        assert_eq!(vs.len(), VER_FULL_SPAN);

        let smellage = deversify(vs.as_bytes()).unwrap();
        assert_eq!(smellage.proto, "KERI");
        assert_eq!(smellage.vrsn, VERSION);
        assert_eq!(smellage.kind, Kinds::Json);
        assert_eq!(smellage.size, 0);

        let vs = versify("KERI", &VERSION, Kinds::Cbor, 253).unwrap();
        assert_eq!(vs, "KERI10CBOR0000fd_");
        let smellage = deversify(vs.as_bytes()).unwrap();
        assert_eq!(smellage.kind, Kinds::Cbor);
        assert_eq!(smellage.size, 253);

        assert!(versify("BADP", &VERSION, Kinds::Json, 0).is_err());
        assert!(deversify(b"KERI10TEXT000000_").is_err());
    }

    #[test]
    fn test_smell() {
        let raw = br#"{"v":"KERI10JSON0000fd_","t":"icp"}extra"#;
        let smellage = smell(raw).unwrap();
        assert_eq!(smellage.size, 253);
        assert_eq!(smellage.kind, Kinds::Json);

        match smell(b"{\"v\":\"KERI") {
            Err(KeriError::ShortageError(_)) => (),
            other => panic!("expected shortage, got {:?}", other),
        }

        // version string too deep in the stream
        let raw = br#"{"vs-far-too-deep":"KERI10JSON0000fd_","t":"icp"}"#;
        assert!(smell(raw).is_err());
    }

    #[test]
    fn test_simple() {
        assert_eq!(simple(-2), 0);
        assert_eq!(simple(-1), 0);
        assert_eq!(simple(0), 0);
        assert_eq!(simple(1), 1);
        assert_eq!(simple(2), 2);
        assert_eq!(simple(3), 2);
        assert_eq!(simple(4), 3);
        assert_eq!(simple(5), 3);
        assert_eq!(simple(6), 4);
    }

    #[test]
    fn test_ample() {
        assert_eq!(ample(0, None, true).unwrap(), 0);
        assert_eq!(ample(0, None, false).unwrap(), 0);
        assert_eq!(ample(0, Some(0), true).unwrap(), 0);
        assert_eq!(ample(0, Some(1), true).unwrap(), 0);
        assert_eq!(ample(1, None, true).unwrap(), 1);
        assert_eq!(ample(1, None, false).unwrap(), 1);
        assert!(ample(1, Some(1), true).is_err());
        assert_eq!(ample(2, None, true).unwrap(), 2);
        assert!(ample(2, Some(1), true).is_err());
        assert_eq!(ample(3, None, true).unwrap(), 3);
        assert!(ample(3, Some(1), true).is_err());
        assert_eq!(ample(4, None, true).unwrap(), 3);
        assert_eq!(ample(4, Some(1), true).unwrap(), 3);
        assert_eq!(ample(5, None, true).unwrap(), 4);
        assert_eq!(ample(5, Some(1), true).unwrap(), 4);
        assert_eq!(ample(6, None, true).unwrap(), 4);
        assert_eq!(ample(6, None, false).unwrap(), 5);
        assert_eq!(ample(6, Some(1), true).unwrap(), 4);
        assert_eq!(ample(6, Some(1), false).unwrap(), 5);
        assert_eq!(ample(7, None, true).unwrap(), 5);
        assert_eq!(ample(7, Some(2), true).unwrap(), 5);
        assert_eq!(ample(8, None, true).unwrap(), 6);
        assert_eq!(ample(8, Some(2), true).unwrap(), 6);
        assert_eq!(ample(9, None, true).unwrap(), 6);
        assert_eq!(ample(9, None, false).unwrap(), 7);
        assert_eq!(ample(10, None, true).unwrap(), 7);
        assert_eq!(ample(10, Some(3), true).unwrap(), 7);
        assert_eq!(ample(11, None, true).unwrap(), 8);
        assert_eq!(ample(11, Some(3), true).unwrap(), 8);
        assert_eq!(ample(12, None, true).unwrap(), 8);
        assert_eq!(ample(12, None, false).unwrap(), 9);
        assert_eq!(ample(13, None, true).unwrap(), 9);
        assert_eq!(ample(13, Some(4), true).unwrap(), 9);
    }
}
