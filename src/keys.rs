// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Private keys and signature primitives.
//!
//! Two key types are supported: RSA (any modulus size, PKCS#1 v1.5
//! signatures and key transport) and ECDSA over P-256 (signatures only).
//! SCEP envelopes can only be addressed to RSA keys.

use p256::ecdsa::signature::{Signer, Verifier};
use rand_core::CryptoRngCore;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use spki::EncodePublicKey;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use der::asn1::{Any, ObjectIdentifier};
use der::{Decode, Encode};

use crate::digest::DigestAlgorithm;
use crate::error::{Result, ScepError};
use crate::oids;

/// Supported key algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// ECDSA with P-256 curve (secp256r1 / prime256v1).
    EcdsaP256,

    /// RSA with specified key size.
    Rsa {
        /// RSA modulus size in bits.
        bits: usize,
    },
}

impl KeyAlgorithm {
    /// Identify the algorithm of a SubjectPublicKeyInfo.
    ///
    /// Returns `None` for keys other than RSA and P-256.
    pub fn of(spki: &SubjectPublicKeyInfoOwned) -> Option<Self> {
        if spki.algorithm.oid == oids::RSA_ENCRYPTION {
            let key = RsaPublicKey::from_pkcs1_der(spki.subject_public_key.raw_bytes()).ok()?;
            return Some(Self::Rsa {
                bits: key.size() * 8,
            });
        }
        if spki.algorithm.oid == oids::ID_EC_PUBLIC_KEY && ec_curve(spki) == Some(oids::SECP256R1) {
            return Some(Self::EcdsaP256);
        }
        None
    }

    /// Returns true for RSA keys.
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::Rsa { .. })
    }

    /// Get a string representation of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EcdsaP256 => "ECDSA-P256",
            Self::Rsa { .. } => "RSA",
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa { bits } => write!(f, "RSA-{bits}"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

fn ec_curve(spki: &SubjectPublicKeyInfoOwned) -> Option<ObjectIdentifier> {
    let params = spki.algorithm.parameters.as_ref()?;
    ObjectIdentifier::from_der(&params.to_der().ok()?).ok()
}

/// Describe the key algorithm of a SubjectPublicKeyInfo for error messages.
pub fn describe_key(spki: &SubjectPublicKeyInfoOwned) -> String {
    match KeyAlgorithm::of(spki) {
        Some(alg) => alg.to_string(),
        None => spki.algorithm.oid.to_string(),
    }
}

/// A private key held in memory.
#[derive(Clone)]
pub enum PrivateKey {
    /// RSA private key.
    Rsa(Box<RsaPrivateKey>),
    /// ECDSA P-256 signing key.
    EcdsaP256(p256::ecdsa::SigningKey),
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey")
            .field(&self.algorithm())
            .finish()
    }
}

impl PrivateKey {
    /// Generate a new RSA key.
    pub fn generate_rsa<R: CryptoRngCore>(rng: &mut R, bits: usize) -> Result<Self> {
        let key = RsaPrivateKey::new(rng, bits)
            .map_err(|e| ScepError::internal(format!("RSA key generation failed: {e}")))?;
        Ok(Self::Rsa(Box::new(key)))
    }

    /// Generate a new P-256 key.
    pub fn generate_p256<R: CryptoRngCore>(rng: &mut R) -> Self {
        Self::EcdsaP256(p256::ecdsa::SigningKey::random(rng))
    }

    /// The key algorithm.
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::Rsa(key) => KeyAlgorithm::Rsa {
                bits: key.size() * 8,
            },
            Self::EcdsaP256(_) => KeyAlgorithm::EcdsaP256,
        }
    }

    /// The matching public key as a SubjectPublicKeyInfo.
    pub fn public_key_info(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let document = match self {
            Self::Rsa(key) => key.to_public_key().to_public_key_der(),
            Self::EcdsaP256(key) => key.verifying_key().to_public_key_der(),
        }
        .map_err(|e| ScepError::internal(format!("public key encoding failed: {e}")))?;

        Ok(SubjectPublicKeyInfoOwned::from_der(document.as_bytes())?)
    }

    /// The digest actually used when signing with `requested`.
    ///
    /// P-256 keys always sign with SHA-256.
    pub fn signature_digest(&self, requested: DigestAlgorithm) -> DigestAlgorithm {
        match self {
            Self::Rsa(_) => requested,
            Self::EcdsaP256(_) => DigestAlgorithm::Sha256,
        }
    }

    /// AlgorithmIdentifier of the signatures produced with `digest`.
    pub fn signature_algorithm(&self, digest: DigestAlgorithm) -> Result<AlgorithmIdentifierOwned> {
        match self {
            Self::Rsa(_) => {
                let oid = match digest {
                    DigestAlgorithm::Sha1 => oids::SHA1_WITH_RSA,
                    DigestAlgorithm::Sha224 => oids::SHA224_WITH_RSA,
                    DigestAlgorithm::Sha256 => oids::SHA256_WITH_RSA,
                    DigestAlgorithm::Sha384 => oids::SHA384_WITH_RSA,
                    DigestAlgorithm::Sha512 => oids::SHA512_WITH_RSA,
                    DigestAlgorithm::Md5 => {
                        return Err(ScepError::InvalidDigestAlgorithm(
                            "MD5 is not accepted for signatures".to_string(),
                        ))
                    }
                };
                Ok(AlgorithmIdentifierOwned {
                    oid,
                    parameters: Some(Any::null()),
                })
            }
            Self::EcdsaP256(_) => Ok(AlgorithmIdentifierOwned {
                oid: oids::ECDSA_WITH_SHA256,
                parameters: None,
            }),
        }
    }

    /// Sign `message`, hashing it with `digest` (see [`signature_digest`](Self::signature_digest)).
    ///
    /// Returns the signature algorithm identifier and the signature bytes.
    pub fn sign(
        &self,
        digest: DigestAlgorithm,
        message: &[u8],
    ) -> Result<(AlgorithmIdentifierOwned, Vec<u8>)> {
        let digest = self.signature_digest(digest);
        let algorithm = self.signature_algorithm(digest)?;

        let signature = match self {
            Self::Rsa(key) => key
                .sign(pkcs1v15_scheme(digest)?, &digest.digest(message))
                .map_err(|e| ScepError::internal(format!("RSA signing failed: {e}")))?,
            Self::EcdsaP256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                signature.to_der().as_bytes().to_vec()
            }
        };

        Ok((algorithm, signature))
    }

    /// Recover a content-encryption key wrapped with RSA PKCS#1 v1.5.
    pub fn decrypt_key_transport(&self, encrypted_key: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Rsa(key) => key
                .decrypt(Pkcs1v15Encrypt, encrypted_key)
                .map_err(|e| ScepError::decryption_failed(format!("key transport: {e}"))),
            Self::EcdsaP256(_) => Err(ScepError::decryption_failed(
                "P-256 keys cannot unwrap key transport recipients",
            )),
        }
    }
}

fn pkcs1v15_scheme(digest: DigestAlgorithm) -> Result<Pkcs1v15Sign> {
    Ok(match digest {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        DigestAlgorithm::Sha224 => Pkcs1v15Sign::new::<Sha224>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        DigestAlgorithm::Md5 => {
            return Err(ScepError::InvalidDigestAlgorithm(
                "MD5 is not accepted for signatures".to_string(),
            ))
        }
    })
}

/// Wrap a content-encryption key for an RSA recipient (PKCS#1 v1.5).
pub fn encrypt_key_transport<R: CryptoRngCore>(
    recipient: &SubjectPublicKeyInfoOwned,
    key: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>> {
    if recipient.algorithm.oid != oids::RSA_ENCRYPTION {
        return Err(ScepError::UnsupportedRecipientAlgorithm(describe_key(
            recipient,
        )));
    }
    let public_key = RsaPublicKey::from_pkcs1_der(recipient.subject_public_key.raw_bytes())
        .map_err(|e| ScepError::UnsupportedRecipientAlgorithm(format!("bad RSA key: {e}")))?;

    public_key
        .encrypt(rng, Pkcs1v15Encrypt, key)
        .map_err(|e| ScepError::internal(format!("key transport encryption failed: {e}")))
}

/// Verify `signature` over `message` with the key in `spki`.
///
/// `digest_hint` supplies the hash for identifiers that do not name one
/// (plain `rsaEncryption` in a CMS SignerInfo).
pub fn verify_signature(
    spki: &SubjectPublicKeyInfoOwned,
    algorithm: &AlgorithmIdentifierOwned,
    digest_hint: Option<DigestAlgorithm>,
    message: &[u8],
    signature: &[u8],
) -> Result<()> {
    let rsa_digest = match algorithm.oid {
        oid if oid == oids::SHA1_WITH_RSA => Some(DigestAlgorithm::Sha1),
        oid if oid == oids::SHA224_WITH_RSA => Some(DigestAlgorithm::Sha224),
        oid if oid == oids::SHA256_WITH_RSA => Some(DigestAlgorithm::Sha256),
        oid if oid == oids::SHA384_WITH_RSA => Some(DigestAlgorithm::Sha384),
        oid if oid == oids::SHA512_WITH_RSA => Some(DigestAlgorithm::Sha512),
        oid if oid == oids::RSA_ENCRYPTION => Some(digest_hint.ok_or_else(|| {
            ScepError::internal("rsaEncryption signature without a digest algorithm")
        })?),
        _ => None,
    };

    if let Some(digest) = rsa_digest {
        if spki.algorithm.oid != oids::RSA_ENCRYPTION {
            return Err(ScepError::internal("RSA signature with a non-RSA key"));
        }
        let key = RsaPublicKey::from_pkcs1_der(spki.subject_public_key.raw_bytes())
            .map_err(|e| ScepError::internal(format!("bad RSA public key: {e}")))?;
        return key
            .verify(pkcs1v15_scheme(digest)?, &digest.digest(message), signature)
            .map_err(|e| ScepError::internal(format!("RSA signature invalid: {e}")));
    }

    if algorithm.oid == oids::ECDSA_WITH_SHA256 {
        if KeyAlgorithm::of(spki) != Some(KeyAlgorithm::EcdsaP256) {
            return Err(ScepError::internal("ECDSA signature with a non-P-256 key"));
        }
        let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(spki.subject_public_key.raw_bytes())
            .map_err(|e| ScepError::internal(format!("bad P-256 public key: {e}")))?;
        let signature = p256::ecdsa::Signature::from_der(signature)
            .map_err(|e| ScepError::internal(format!("bad ECDSA signature encoding: {e}")))?;
        return key
            .verify(message, &signature)
            .map_err(|e| ScepError::internal(format!("ECDSA signature invalid: {e}")));
    }

    Err(ScepError::internal(format!(
        "unsupported signature algorithm {}",
        algorithm.oid
    )))
}
