//! Verfer: Matter with a method to verify signatures of serializations using
//! the raw as verifier key and the code as cipher suite.

use crate::cesr::{mtr_dex, Matter};
use crate::errors::{MatterError, MatterResult};
use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey};
use secp256k1::ecdsa::Signature as K1Signature;
use secp256k1::{Message, PublicKey, Secp256k1};
use sha2::{Digest, Sha256};
use sodiumoxide::crypto::sign::ed25519;

const VERFER_CODES: [&str; 6] = [
    mtr_dex::ED25519N,
    mtr_dex::ED25519,
    mtr_dex::ECDSA_256K1N,
    mtr_dex::ECDSA_256K1,
    mtr_dex::ECDSA_256R1N,
    mtr_dex::ECDSA_256R1,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verfer {
    matter: Matter,
}

impl Verfer {
    pub fn new(raw: &[u8], code: &str) -> MatterResult<Self> {
        if !VERFER_CODES.contains(&code) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for verifier: {}",
                code
            )));
        }
        Ok(Verfer {
            matter: Matter::new(raw, code)?,
        })
    }

    pub fn from_qb64(qb64: &str) -> MatterResult<Self> {
        Self::from_qb64b(qb64.as_bytes())
    }

    pub fn from_qb64b(qb64b: &[u8]) -> MatterResult<Self> {
        let matter = Matter::from_qb64b(qb64b)?;
        if !VERFER_CODES.contains(&matter.code()) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for verifier: {}",
                matter.code()
            )));
        }
        Ok(Verfer { matter })
    }

    pub fn decode(qb64b: &[u8]) -> MatterResult<(Self, usize)> {
        let (matter, used) = Matter::decode(qb64b)?;
        if !VERFER_CODES.contains(&matter.code()) {
            return Err(MatterError::UnexpectedCode(format!(
                "Invalid code for verifier: {}",
                matter.code()
            )));
        }
        Ok((Verfer { matter }, used))
    }

    /// Verifies `sig` over `ser` with this key. Returns false on any
    /// malformed key or signature material.
    pub fn verify(&self, sig: &[u8], ser: &[u8]) -> bool {
        match self.code() {
            mtr_dex::ED25519N | mtr_dex::ED25519 => self.verify_ed25519(sig, ser),
            mtr_dex::ECDSA_256K1N | mtr_dex::ECDSA_256K1 => self.verify_secp256k1(sig, ser),
            mtr_dex::ECDSA_256R1N | mtr_dex::ECDSA_256R1 => self.verify_secp256r1(sig, ser),
            _ => false,
        }
    }

    fn verify_ed25519(&self, sig: &[u8], ser: &[u8]) -> bool {
        if sig.len() != ed25519::SIGNATUREBYTES || self.raw().len() != ed25519::PUBLICKEYBYTES {
            return false;
        }
        let pk = match ed25519::PublicKey::from_slice(self.raw()) {
            Some(pk) => pk,
            None => return false,
        };
        let signature = match ed25519::Signature::from_bytes(sig) {
            Ok(s) => s,
            Err(_) => return false,
        };
        ed25519::verify_detached(&signature, ser, &pk)
    }

    fn verify_secp256k1(&self, sig: &[u8], ser: &[u8]) -> bool {
        let secp = Secp256k1::verification_only();
        let pk = match PublicKey::from_slice(self.raw()) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let signature = match K1Signature::from_compact(sig) {
            Ok(s) => s,
            Err(_) => return false,
        };
        let digest: [u8; 32] = Sha256::digest(ser).into();
        let msg = Message::from_digest(digest);
        secp.verify_ecdsa(&msg, &signature, &pk).is_ok()
    }

    fn verify_secp256r1(&self, sig: &[u8], ser: &[u8]) -> bool {
        let vk = match VerifyingKey::from_sec1_bytes(self.raw()) {
            Ok(vk) => vk,
            Err(_) => return false,
        };
        let signature = match P256Signature::from_slice(sig) {
            Ok(s) => s,
            Err(_) => return false,
        };
        vk.verify(ser, &signature).is_ok()
    }

    pub fn code(&self) -> &str {
        self.matter.code()
    }

    pub fn raw(&self) -> &[u8] {
        self.matter.raw()
    }

    pub fn qb64(&self) -> String {
        self.matter.qb64()
    }

    pub fn qb64b(&self) -> Vec<u8> {
        self.matter.qb64b()
    }

    pub fn is_transferable(&self) -> bool {
        self.matter.is_transferable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verfer_ed25519() {
        sodiumoxide::init().expect("sodium init");
        let seed = ed25519::Seed::from_slice(&[7u8; 32]).unwrap();
        let (pk, sk) = ed25519::keypair_from_seed(&seed);

        let verfer = Verfer::new(pk.as_ref(), mtr_dex::ED25519N).unwrap();
        assert_eq!(verfer.code(), mtr_dex::ED25519N);
        assert!(!verfer.is_transferable());

        let ser = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let sig = ed25519::sign_detached(ser, &sk);
        assert!(verfer.verify(sig.as_ref(), ser));

        let mut bad = sig.as_ref().to_vec();
        bad[0] = bad[0].wrapping_add(1);
        assert!(!verfer.verify(&bad, ser));
        assert!(!verfer.verify(sig.as_ref(), b"tampered"));

        let verfer = Verfer::new(pk.as_ref(), mtr_dex::ED25519).unwrap();
        assert!(verfer.is_transferable());
        assert!(verfer.verify(sig.as_ref(), ser));

        // digest codes are not verifier codes
        assert!(Verfer::new(&[0u8; 32], mtr_dex::BLAKE3_256).is_err());
    }
}
