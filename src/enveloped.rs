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

//! CMS EnvelopedData encryption and decryption.
//!
//! SCEP wraps every request and reply payload in an EnvelopedData with a
//! single key transport recipient. The content-encryption key is wrapped
//! with RSA PKCS#1 v1.5 and the recipient is identified by issuer and
//! serial number.

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::enveloped_data::{
    EncryptedContentInfo, EnvelopedData, KeyTransRecipientInfo, RecipientIdentifier,
    RecipientInfo, RecipientInfos,
};
use der::asn1::{Any, ObjectIdentifier, OctetString, SetOfVec};
use der::{Decode, Encode};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;

use crate::error::{Result, ScepError};
use crate::identity::{issuer_and_serial, Identity};
use crate::keys::encrypt_key_transport;
use crate::oids::{
    AES_128_CBC, AES_192_CBC, AES_256_CBC, DES_EDE3_CBC, ID_DATA, ID_ENVELOPED_DATA,
    RSA_ENCRYPTION,
};

/// Supported content encryption algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionAlgorithm {
    /// AES-128-CBC
    Aes128Cbc,
    /// AES-192-CBC
    Aes192Cbc,
    /// AES-256-CBC
    Aes256Cbc,
    /// Triple DES (3DES) CBC
    TripleDesCbc,
}

impl Default for EncryptionAlgorithm {
    fn default() -> Self {
        Self::Aes128Cbc
    }
}

impl EncryptionAlgorithm {
    /// Get the key size in bytes for this algorithm.
    pub fn key_size(&self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes192Cbc => 24,
            Self::Aes256Cbc => 32,
            Self::TripleDesCbc => 24,
        }
    }

    /// Get the block size in bytes for this algorithm.
    pub fn block_size(&self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes192Cbc | Self::Aes256Cbc => 16,
            Self::TripleDesCbc => 8,
        }
    }

    /// Get the algorithm name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes128Cbc => "AES-128-CBC",
            Self::Aes192Cbc => "AES-192-CBC",
            Self::Aes256Cbc => "AES-256-CBC",
            Self::TripleDesCbc => "3DES-CBC",
        }
    }

    /// Algorithm OID.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            Self::Aes128Cbc => AES_128_CBC,
            Self::Aes192Cbc => AES_192_CBC,
            Self::Aes256Cbc => AES_256_CBC,
            Self::TripleDesCbc => DES_EDE3_CBC,
        }
    }

    /// Parse algorithm from its OID.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [
            Self::Aes128Cbc,
            Self::Aes192Cbc,
            Self::Aes256Cbc,
            Self::TripleDesCbc,
        ]
        .into_iter()
        .find(|alg| alg.oid() == *oid)
    }

    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Aes128Cbc => cbc_encrypt::<cbc::Encryptor<aes::Aes128>>(key, iv, plaintext),
            Self::Aes192Cbc => cbc_encrypt::<cbc::Encryptor<aes::Aes192>>(key, iv, plaintext),
            Self::Aes256Cbc => cbc_encrypt::<cbc::Encryptor<aes::Aes256>>(key, iv, plaintext),
            Self::TripleDesCbc => cbc_encrypt::<cbc::Encryptor<des::TdesEde3>>(key, iv, plaintext),
        }
    }

    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if iv.len() != self.block_size() {
            return Err(ScepError::decryption_failed(format!(
                "Invalid IV size: expected {}, got {}",
                self.block_size(),
                iv.len()
            )));
        }
        match self {
            Self::Aes128Cbc => cbc_decrypt::<cbc::Decryptor<aes::Aes128>>(key, iv, ciphertext),
            Self::Aes192Cbc => cbc_decrypt::<cbc::Decryptor<aes::Aes192>>(key, iv, ciphertext),
            Self::Aes256Cbc => cbc_decrypt::<cbc::Decryptor<aes::Aes256>>(key, iv, ciphertext),
            Self::TripleDesCbc => cbc_decrypt::<cbc::Decryptor<des::TdesEde3>>(key, iv, ciphertext),
        }
    }
}

impl std::fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn cbc_encrypt<E: KeyIvInit + BlockEncryptMut>(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = E::new_from_slices(key, iv)
        .map_err(|e| ScepError::internal(format!("Failed to create cipher: {e}")))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_decrypt<D: KeyIvInit + BlockDecryptMut>(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = D::new_from_slices(key, iv)
        .map_err(|e| ScepError::decryption_failed(format!("Failed to create cipher: {e}")))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| ScepError::decryption_failed(format!("bad padding: {e}")))
}

/// Encrypt `payload` for `recipient` and return a DER ContentInfo.
///
/// The recipient must hold an RSA key; anything else fails with
/// `UnsupportedRecipientAlgorithm`.
pub fn envelope_encrypt<R: CryptoRngCore>(
    payload: &[u8],
    recipient: &Certificate,
    algorithm: EncryptionAlgorithm,
    rng: &mut R,
) -> Result<Vec<u8>> {
    let mut key = vec![0u8; algorithm.key_size()];
    let mut iv = vec![0u8; algorithm.block_size()];
    rng.try_fill_bytes(&mut key)
        .and_then(|_| rng.try_fill_bytes(&mut iv))
        .map_err(|e| ScepError::randomness(e.to_string()))?;

    let encrypted_key = encrypt_key_transport(
        &recipient.tbs_certificate.subject_public_key_info,
        &key,
        rng,
    )?;
    let ciphertext = algorithm.encrypt(&key, &iv, payload)?;

    let recipient_info = RecipientInfo::Ktri(KeyTransRecipientInfo {
        version: CmsVersion::V0,
        rid: RecipientIdentifier::IssuerAndSerialNumber(issuer_and_serial(recipient)),
        key_enc_alg: AlgorithmIdentifierOwned {
            oid: RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        },
        enc_key: OctetString::new(encrypted_key)?,
    });

    let enveloped = EnvelopedData {
        version: CmsVersion::V0,
        originator_info: None,
        recip_infos: RecipientInfos(SetOfVec::try_from(vec![recipient_info])?),
        encrypted_content: EncryptedContentInfo {
            content_type: ID_DATA,
            content_enc_alg: AlgorithmIdentifierOwned {
                oid: algorithm.oid(),
                parameters: Some(Any::encode_from(&OctetString::new(iv)?)?),
            },
            encrypted_content: Some(OctetString::new(ciphertext)?),
        },
        unprotected_attrs: None,
    };

    debug!(
        "Enveloped {} bytes with {} for recipient {}",
        payload.len(),
        algorithm,
        recipient.tbs_certificate.subject
    );

    let content_info = ContentInfo {
        content_type: ID_ENVELOPED_DATA,
        content: Any::encode_from(&enveloped)?,
    };
    Ok(content_info.to_der()?)
}

/// Decrypt a DER EnvelopedData with whichever of `identities` it is addressed to.
///
/// Returns the plaintext and the identity that decrypted it.
pub fn envelope_decrypt(data: &[u8], identities: &[Identity]) -> Result<(Vec<u8>, Identity)> {
    let content_info = ContentInfo::from_der(data)
        .map_err(|e| ScepError::decryption_failed(format!("malformed ContentInfo: {e}")))?;
    if content_info.content_type != ID_ENVELOPED_DATA {
        return Err(ScepError::decryption_failed(format!(
            "expected EnvelopedData content, got {}",
            content_info.content_type
        )));
    }
    let enveloped = EnvelopedData::from_der(&content_info.content.to_der()?)
        .map_err(|e| ScepError::decryption_failed(format!("malformed EnvelopedData: {e}")))?;

    let content = &enveloped.encrypted_content;
    let algorithm = EncryptionAlgorithm::from_oid(&content.content_enc_alg.oid).ok_or_else(|| {
        ScepError::decryption_failed(format!(
            "unsupported content encryption algorithm {}",
            content.content_enc_alg.oid
        ))
    })?;
    let iv = match &content.content_enc_alg.parameters {
        Some(params) => OctetString::from_der(&params.to_der()?)
            .map_err(|e| ScepError::decryption_failed(format!("bad IV parameter: {e}")))?,
        None => return Err(ScepError::decryption_failed("missing IV parameter")),
    };
    let ciphertext = content
        .encrypted_content
        .as_ref()
        .ok_or_else(|| ScepError::decryption_failed("EnvelopedData has no encrypted content"))?;

    for recipient in enveloped.recip_infos.0.iter() {
        let RecipientInfo::Ktri(ktri) = recipient else {
            debug!("Skipping non key transport recipient");
            continue;
        };
        let RecipientIdentifier::IssuerAndSerialNumber(rid) = &ktri.rid else {
            continue;
        };
        let Some(identity) = identities.iter().find(|id| id.issuer_and_serial() == *rid) else {
            continue;
        };

        debug!("Decrypting EnvelopedData for {}", rid.issuer);
        let key = identity
            .private_key()
            .decrypt_key_transport(ktri.enc_key.as_bytes())?;
        if key.len() != algorithm.key_size() {
            return Err(ScepError::decryption_failed(format!(
                "Invalid key size for {}: expected {}, got {}",
                algorithm,
                algorithm.key_size(),
                key.len()
            )));
        }
        let plaintext = algorithm.decrypt(&key, iv.as_bytes(), ciphertext.as_bytes())?;
        return Ok((plaintext, identity.clone()));
    }

    Err(ScepError::decryption_failed(
        "no recipient matches an available identity",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PrivateKey;
    use rand_core::OsRng;

    fn rsa_identity() -> Identity {
        let key = PrivateKey::generate_rsa(&mut OsRng, 1024).unwrap();
        Identity::temporary(key, &mut OsRng).unwrap()
    }

    #[test]
    fn test_encryption_algorithm_key_sizes() {
        assert_eq!(EncryptionAlgorithm::Aes128Cbc.key_size(), 16);
        assert_eq!(EncryptionAlgorithm::Aes192Cbc.key_size(), 24);
        assert_eq!(EncryptionAlgorithm::Aes256Cbc.key_size(), 32);
        assert_eq!(EncryptionAlgorithm::TripleDesCbc.key_size(), 24);
    }

    #[test]
    fn test_encryption_algorithm_block_sizes() {
        assert_eq!(EncryptionAlgorithm::Aes128Cbc.block_size(), 16);
        assert_eq!(EncryptionAlgorithm::Aes256Cbc.block_size(), 16);
        assert_eq!(EncryptionAlgorithm::TripleDesCbc.block_size(), 8);
    }

    #[test]
    fn test_oid_lookup() {
        assert_eq!(
            EncryptionAlgorithm::from_oid(&DES_EDE3_CBC),
            Some(EncryptionAlgorithm::TripleDesCbc)
        );
        assert_eq!(EncryptionAlgorithm::from_oid(&ID_DATA), None);
    }

    #[test]
    fn test_envelope_round_trip() {
        let identity = rsa_identity();
        let payload = b"certificate request bytes";

        for alg in [EncryptionAlgorithm::Aes128Cbc, EncryptionAlgorithm::TripleDesCbc] {
            let der = envelope_encrypt(payload, identity.certificate(), alg, &mut OsRng).unwrap();
            let (plaintext, recipient) =
                envelope_decrypt(&der, std::slice::from_ref(&identity)).unwrap();
            assert_eq!(plaintext, payload);
            assert_eq!(recipient.certificate(), identity.certificate());
        }
    }

    #[test]
    fn test_picks_matching_identity() {
        let other = rsa_identity();
        let target = rsa_identity();
        let der = envelope_encrypt(
            b"x",
            target.certificate(),
            EncryptionAlgorithm::Aes256Cbc,
            &mut OsRng,
        )
        .unwrap();

        let (_, recipient) = envelope_decrypt(&der, &[other.clone(), target.clone()]).unwrap();
        assert_eq!(recipient.certificate(), target.certificate());

        let err = envelope_decrypt(&der, &[other]).unwrap_err();
        assert!(matches!(err, ScepError::DecryptionFailed(_)));
    }

    #[test]
    fn test_ec_recipient_rejected() {
        let key = PrivateKey::generate_p256(&mut OsRng);
        let identity = Identity::temporary(key, &mut OsRng).unwrap();
        let err = envelope_encrypt(
            b"x",
            identity.certificate(),
            EncryptionAlgorithm::Aes128Cbc,
            &mut OsRng,
        )
        .unwrap_err();
        assert!(matches!(err, ScepError::UnsupportedRecipientAlgorithm(_)));
    }

    #[test]
    fn test_garbage_input() {
        let identity = rsa_identity();
        assert!(matches!(
            envelope_decrypt(b"not cms", &[identity]),
            Err(ScepError::DecryptionFailed(_))
        ));
    }
}
