//! Signer: Matter holding a signing seed with methods to create signatures.
//!
//! The raw is the private key seed, the code its cipher suite, and the
//! attached verfer holds the derived public verification key.

use crate::cesr::cigar::Cigar;
use crate::cesr::indexing::{idr_dex, Siger};
use crate::cesr::verfer::Verfer;
use crate::cesr::{mtr_dex, Matter};
use crate::errors::{MatterError, MatterResult};
use p256::ecdsa::signature::Signer as _;
use p256::ecdsa::{Signature as P256Signature, SigningKey};
use rand::rngs::OsRng;
use rand_core::RngCore;
use secp256k1::{Message, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use sodiumoxide::crypto::sign::ed25519;

#[derive(Debug, Clone)]
pub struct Signer {
    matter: Matter,
    verfer: Verfer,
}

impl Signer {
    /// Creates a Signer from an optional seed. A missing seed is generated
    /// randomly. `transferable` selects the derived verfer code family.
    pub fn new(
        raw: Option<&[u8]>,
        code: Option<&str>,
        transferable: Option<bool>,
    ) -> MatterResult<Self> {
        let code = code.unwrap_or(mtr_dex::ED25519_SEED);
        let transferable = transferable.unwrap_or(true);

        let raw = match raw {
            Some(bytes) => bytes.to_vec(),
            None => match code {
                mtr_dex::ED25519_SEED => {
                    sodiumoxide::init()
                        .map_err(|_| MatterError::Crypto("Sodium init failed".to_string()))?;
                    sodiumoxide::randombytes::randombytes(ed25519::SEEDBYTES)
                }
                mtr_dex::ECDSA_256K1_SEED | mtr_dex::ECDSA_256R1_SEED => {
                    let mut seed = vec![0u8; 32];
                    OsRng.fill_bytes(&mut seed);
                    seed
                }
                _ => {
                    return Err(MatterError::UnexpectedCode(format!(
                        "Unsupported signer code: {}",
                        code
                    )))
                }
            },
        };

        let matter = Matter::new(&raw, code)?;

        let verfer = match code {
            mtr_dex::ED25519_SEED => {
                sodiumoxide::init()
                    .map_err(|_| MatterError::Crypto("Sodium init failed".to_string()))?;
                let seed = ed25519::Seed::from_slice(matter.raw())
                    .ok_or_else(|| MatterError::Crypto("Invalid Ed25519 seed".to_string()))?;
                let (pk, _) = ed25519::keypair_from_seed(&seed);
                let vcode = if transferable {
                    mtr_dex::ED25519
                } else {
                    mtr_dex::ED25519N
                };
                Verfer::new(pk.as_ref(), vcode)?
            }
            mtr_dex::ECDSA_256K1_SEED => {
                let seed: [u8; 32] = matter
                    .raw()
                    .try_into()
                    .map_err(|_| MatterError::Crypto("Invalid secp256k1 seed".to_string()))?;
                let secp = Secp256k1::new();
                let sk = SecretKey::from_byte_array(&seed)
                    .map_err(|_| MatterError::Crypto("Invalid secp256k1 seed".to_string()))?;
                let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
                let vcode = if transferable {
                    mtr_dex::ECDSA_256K1
                } else {
                    mtr_dex::ECDSA_256K1N
                };
                Verfer::new(&pk.serialize(), vcode)?
            }
            mtr_dex::ECDSA_256R1_SEED => {
                let sk = SigningKey::from_slice(matter.raw())
                    .map_err(|_| MatterError::Crypto("Invalid p256 seed".to_string()))?;
                let vk = sk.verifying_key().to_encoded_point(true).as_bytes().to_vec();
                let vcode = if transferable {
                    mtr_dex::ECDSA_256R1
                } else {
                    mtr_dex::ECDSA_256R1N
                };
                Verfer::new(&vk, vcode)?
            }
            _ => {
                return Err(MatterError::UnexpectedCode(format!(
                    "Unsupported signer code: {}",
                    code
                )))
            }
        };

        Ok(Signer { matter, verfer })
    }

    pub fn verfer(&self) -> &Verfer {
        &self.verfer
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

    /// Signs `ser` and returns a nonindexed Cigar.
    pub fn sign(&self, ser: &[u8]) -> MatterResult<Cigar> {
        let (raw, code) = self.sign_raw(ser)?;
        Cigar::new(&raw, code, Some(self.verfer.clone()))
    }

    /// Signs `ser` and returns an indexed Siger. `only` selects the
    /// current-only code family (witness signatures); `ondex` overrides the
    /// prior-next list offset for establishment events.
    pub fn sign_indexed(
        &self,
        ser: &[u8],
        index: u32,
        only: bool,
        ondex: Option<u32>,
    ) -> MatterResult<Siger> {
        let (raw, _) = self.sign_raw(ser)?;
        let code = match self.matter.code() {
            mtr_dex::ED25519_SEED => {
                if only {
                    idr_dex::ED25519_CRT_SIG
                } else {
                    idr_dex::ED25519_SIG
                }
            }
            mtr_dex::ECDSA_256K1_SEED => {
                if only {
                    idr_dex::ECDSA_256K1_CRT_SIG
                } else {
                    idr_dex::ECDSA_256K1_SIG
                }
            }
            mtr_dex::ECDSA_256R1_SEED => {
                if only {
                    idr_dex::ECDSA_256R1_CRT_SIG
                } else {
                    idr_dex::ECDSA_256R1_SIG
                }
            }
            other => {
                return Err(MatterError::UnexpectedCode(format!(
                    "Unsupported signer code: {}",
                    other
                )))
            }
        };
        let ondex = if only { None } else { ondex.or(Some(index)) };
        Siger::new(&raw, code, index, ondex, Some(self.verfer.clone()))
    }

    fn sign_raw(&self, ser: &[u8]) -> MatterResult<(Vec<u8>, &'static str)> {
        match self.matter.code() {
            mtr_dex::ED25519_SEED => {
                let seed = ed25519::Seed::from_slice(self.matter.raw())
                    .ok_or_else(|| MatterError::Crypto("Invalid Ed25519 seed".to_string()))?;
                let (_, sk) = ed25519::keypair_from_seed(&seed);
                let sig = ed25519::sign_detached(ser, &sk);
                Ok((sig.as_ref().to_vec(), mtr_dex::ED25519_SIG))
            }
            mtr_dex::ECDSA_256K1_SEED => {
                let seed: [u8; 32] = self
                    .matter
                    .raw()
                    .try_into()
                    .map_err(|_| MatterError::Crypto("Invalid secp256k1 seed".to_string()))?;
                let secp = Secp256k1::new();
                let sk = SecretKey::from_byte_array(&seed)
                    .map_err(|_| MatterError::Crypto("Invalid secp256k1 seed".to_string()))?;
                let digest: [u8; 32] = Sha256::digest(ser).into();
                let msg = Message::from_digest(digest);
                let sig = secp.sign_ecdsa(&msg, &sk);
                Ok((
                    sig.serialize_compact().to_vec(),
                    mtr_dex::ECDSA_256K1_SIG,
                ))
            }
            mtr_dex::ECDSA_256R1_SEED => {
                let sk = SigningKey::from_slice(self.matter.raw())
                    .map_err(|_| MatterError::Crypto("Invalid p256 seed".to_string()))?;
                let sig: P256Signature = sk.sign(ser);
                Ok((sig.to_bytes().to_vec(), mtr_dex::ECDSA_256R1_SIG))
            }
            other => Err(MatterError::UnexpectedCode(format!(
                "Unsupported signer code: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_ed25519() {
        let seed = b"\x9f{\xa8\xa7\xa8C9\x96&\xfa\xb1\x99\xeb\xaa \xc4\x1bG\x11\xc4\xaeSAR\xc9\xbd\x04\x9d\x85)~\x93";
        let signer = Signer::new(Some(&seed[..]), Some(mtr_dex::ED25519_SEED), Some(false)).unwrap();
        assert_eq!(signer.code(), mtr_dex::ED25519_SEED);
        assert_eq!(signer.verfer().code(), mtr_dex::ED25519N);
        assert_eq!(
            signer.verfer().qb64(),
            "BFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH"
        );

        let signer = Signer::new(Some(&seed[..]), Some(mtr_dex::ED25519_SEED), Some(true)).unwrap();
        assert_eq!(signer.verfer().code(), mtr_dex::ED25519);
        assert_eq!(
            signer.verfer().qb64(),
            "DFs8BBx86uytIM0D2BhsE5rrqVIT8ef8mflpNceHo4XH"
        );

        let ser = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let cigar = signer.sign(ser).unwrap();
        assert!(signer.verfer().verify(cigar.raw(), ser));

        let siger = signer.sign_indexed(ser, 0, false, None).unwrap();
        assert_eq!(siger.index(), 0);
        assert!(signer.verfer().verify(siger.raw(), ser));
    }

    #[test]
    fn test_signer_random() {
        let signer = Signer::new(None, None, None).unwrap();
        let ser = b"data";
        let cigar = signer.sign(ser).unwrap();
        assert!(signer.verfer().verify(cigar.raw(), ser));
    }
}
