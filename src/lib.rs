//! kelcore: key event processing kernel for KERI (Key Event Receipt
//! Infrastructure).
//!
//! The crate provides the primitives that construct key event messages with
//! cryptographic self-addressing identifiers, serialize and parse the
//! streamed wire format mixing JSON/CBOR/MessagePack event bodies with
//! compact Base64 attachment groups, maintain per-identifier key state
//! under strict ordering and threshold rules ([`Kever`]), and multiplex
//! incoming events and receipts with escrows and cues ([`Kevery`]).
//!
//! Signing key management, the persistent database engine and transports
//! are external collaborators.

mod errors;

pub mod cesr;
pub mod core;
pub mod db;

pub use crate::cesr::Matter;
pub use crate::core::eventing::kever::Kever;
pub use crate::core::eventing::kevery::Kevery;
pub use crate::core::parsing::Parser;
pub use crate::core::serdering::Serder;
pub use crate::errors::{KeriError, MatterError};

/// Initializes the underlying crypto library. Call once before signing or
/// verifying in a fresh process.
pub fn init() -> Result<(), KeriError> {
    sodiumoxide::init()
        .map_err(|_| KeriError::ValueError("Failed to initialize sodiumoxide".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert!(init().is_ok());
    }
}
