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

//! CMS SignedData with SCEP signed attributes.
//!
//! Every SCEP message is a SignedData with one signer. The protocol
//! attributes travel as authenticated attributes next to the mandatory
//! contentType and messageDigest.

use cms::cert::CertificateChoices;
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo,
    SignerInfos,
};
use der::asn1::{Any, ObjectIdentifier, OctetString, SetOfVec};
use der::{Decode, Encode};
use tracing::debug;
use x509_cert::attr::Attribute;
use x509_cert::Certificate;

use crate::digest::DigestAlgorithm;
use crate::error::{Result, ScepError};
use crate::identity::{issuer_and_serial, Identity};
use crate::keys::verify_signature;
use crate::oids::{ID_CONTENT_TYPE, ID_DATA, ID_MESSAGE_DIGEST, ID_SIGNED_DATA};
use crate::types::{extract_signed_data, AttributeSet};

/// Which certificates to embed in a SignedData.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertChainMode {
    /// Embed nothing; the receiver must already know the signer.
    None,
    /// Embed the signer certificate.
    #[default]
    Signer,
}

/// A SignedData whose signature has been checked.
#[derive(Debug, Clone)]
pub struct VerifiedMessage {
    /// Encapsulated content (empty when absent).
    pub content: Vec<u8>,
    /// Certificate that produced the signature.
    pub signer: Certificate,
    /// SCEP attributes from the signed attributes.
    pub attributes: AttributeSet,
    /// Certificates embedded in the message.
    pub certificates: Vec<Certificate>,
}

/// Sign `content` with `signer`, carrying `attributes` as signed attributes.
///
/// An empty `content` produces a SignedData without encapsulated content.
pub fn sign_data(
    content: &[u8],
    signer: &Identity,
    attributes: &AttributeSet,
    digest: DigestAlgorithm,
    chain: CertChainMode,
) -> Result<Vec<u8>> {
    let key = signer.private_key();
    let digest = key.signature_digest(digest);

    let mut signed_attrs = vec![
        Attribute {
            oid: ID_CONTENT_TYPE,
            values: SetOfVec::try_from(vec![Any::encode_from(&ID_DATA)?])?,
        },
        Attribute {
            oid: ID_MESSAGE_DIGEST,
            values: SetOfVec::try_from(vec![Any::encode_from(&OctetString::new(
                digest.digest(content),
            )?)?])?,
        },
    ];
    signed_attrs.extend(attributes.to_attributes()?);
    let signed_attrs = SetOfVec::try_from(signed_attrs)?;

    let (signature_algorithm, signature) = key.sign(digest, &signed_attrs.to_der()?)?;

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(signer.issuer_and_serial()),
        digest_alg: digest.algorithm_identifier(),
        signed_attrs: Some(signed_attrs),
        signature_algorithm,
        signature: OctetString::new(signature)?,
        unsigned_attrs: None,
    };

    let certificates = match chain {
        CertChainMode::None => None,
        CertChainMode::Signer => Some(CertificateSet(SetOfVec::try_from(vec![
            CertificateChoices::Certificate(signer.certificate().clone()),
        ])?)),
    };

    let econtent = if content.is_empty() {
        None
    } else {
        Some(Any::encode_from(&OctetString::new(content)?)?)
    };

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![digest.algorithm_identifier()])?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ID_DATA,
            econtent,
        },
        certificates,
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
    };

    let content_info = ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    };
    Ok(content_info.to_der()?)
}

/// Parse a DER SignedData and verify its single signer.
///
/// The signer certificate is looked up by issuer and serial number among
/// the embedded certificates followed by `extra_certs`. Every failure is
/// reported as `InternalError`; callers translate it into the request or
/// reply signature error that fits the protocol step.
pub fn verify_signed_data(data: &[u8], extra_certs: &[Certificate]) -> Result<VerifiedMessage> {
    let content_info = ContentInfo::from_der(data)?;
    let signed_data = extract_signed_data(&content_info)?;

    let content = match &signed_data.encap_content_info.econtent {
        Some(econtent) => OctetString::from_der(&econtent.to_der()?)?.as_bytes().to_vec(),
        None => Vec::new(),
    };

    let certificates: Vec<Certificate> = signed_data
        .certificates
        .iter()
        .flat_map(|set| set.0.iter())
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(cert) => Some(cert.clone()),
            _ => None,
        })
        .collect();

    let mut signer_infos = signed_data.signer_infos.0.iter();
    let signer_info = match (signer_infos.next(), signer_infos.next()) {
        (Some(info), None) => info,
        (None, _) => return Err(ScepError::internal("SignedData has no signer")),
        (Some(_), Some(_)) => return Err(ScepError::internal("SignedData has several signers")),
    };

    let SignerIdentifier::IssuerAndSerialNumber(sid) = &signer_info.sid else {
        return Err(ScepError::internal(
            "signer identified by subject key identifier",
        ));
    };
    let signer = certificates
        .iter()
        .chain(extra_certs)
        .find(|cert| issuer_and_serial(cert) == *sid)
        .cloned()
        .ok_or_else(|| {
            ScepError::internal(format!("signer certificate not found for {}", sid.issuer))
        })?;

    let digest = DigestAlgorithm::from_oid(&signer_info.digest_alg.oid).ok_or_else(|| {
        ScepError::internal(format!(
            "unsupported digest algorithm {}",
            signer_info.digest_alg.oid
        ))
    })?;

    let signed_attrs = signer_info
        .signed_attrs
        .as_ref()
        .ok_or_else(|| ScepError::internal("SignerInfo has no signed attributes"))?;

    let content_type: ObjectIdentifier = single_value(signed_attrs.iter(), ID_CONTENT_TYPE)?;
    if content_type != signed_data.encap_content_info.econtent_type {
        return Err(ScepError::internal("contentType attribute mismatch"));
    }
    let message_digest: OctetString = single_value(signed_attrs.iter(), ID_MESSAGE_DIGEST)?;
    if message_digest.as_bytes() != digest.digest(&content).as_slice() {
        return Err(ScepError::internal("messageDigest does not match content"));
    }

    verify_signature(
        &signer.tbs_certificate.subject_public_key_info,
        &signer_info.signature_algorithm,
        Some(digest),
        &signed_attrs.to_der()?,
        signer_info.signature.as_bytes(),
    )?;

    debug!(
        "Verified SignedData from {} ({} bytes of content)",
        signer.tbs_certificate.subject,
        content.len()
    );

    Ok(VerifiedMessage {
        content,
        signer,
        attributes: AttributeSet::from_attributes(signed_attrs.iter())?,
        certificates,
    })
}

fn single_value<'a, T>(
    mut attributes: impl Iterator<Item = &'a Attribute>,
    oid: ObjectIdentifier,
) -> Result<T>
where
    T: for<'b> Decode<'b>,
{
    let attribute = attributes
        .find(|a| a.oid == oid)
        .ok_or_else(|| ScepError::internal(format!("missing signed attribute {oid}")))?;
    let value = attribute
        .values
        .iter()
        .next()
        .ok_or_else(|| ScepError::internal(format!("empty signed attribute {oid}")))?;
    Ok(T::from_der(&value.to_der()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PrivateKey;
    use crate::types::{MessageType, Nonce, TransactionId};
    use rand_core::OsRng;

    fn identity(rsa: bool) -> Identity {
        let key = if rsa {
            PrivateKey::generate_rsa(&mut OsRng, 1024).unwrap()
        } else {
            PrivateKey::generate_p256(&mut OsRng)
        };
        Identity::temporary(key, &mut OsRng).unwrap()
    }

    fn scep_attributes() -> AttributeSet {
        let mut attrs = AttributeSet::new();
        attrs.set_message_type(MessageType::PkcsReq);
        attrs
            .set_transaction_id(&TransactionId::new("ABCDEF"))
            .unwrap();
        attrs.set_sender_nonce(&Nonce::generate(&mut OsRng).unwrap());
        attrs
    }

    #[test]
    fn test_sign_verify_rsa() {
        let signer = identity(true);
        let attrs = scep_attributes();
        let der = sign_data(
            b"payload",
            &signer,
            &attrs,
            DigestAlgorithm::Sha256,
            CertChainMode::Signer,
        )
        .unwrap();

        let verified = verify_signed_data(&der, &[]).unwrap();
        assert_eq!(verified.content, b"payload");
        assert_eq!(&verified.signer, signer.certificate());
        assert_eq!(verified.certificates.len(), 1);
        assert_eq!(verified.attributes, attrs);
    }

    #[test]
    fn test_sign_verify_p256_without_chain() {
        let signer = identity(false);
        let der = sign_data(
            b"",
            &signer,
            &scep_attributes(),
            DigestAlgorithm::Sha1,
            CertChainMode::None,
        )
        .unwrap();

        assert!(verify_signed_data(&der, &[]).is_err());

        let verified = verify_signed_data(&der, &[signer.certificate().clone()]).unwrap();
        assert!(verified.content.is_empty());
        assert_eq!(
            verified.attributes.message_type().unwrap(),
            Some(MessageType::PkcsReq)
        );
    }

    #[test]
    fn test_wrong_signer_certificate() {
        let signer = identity(true);
        let der = sign_data(
            b"payload",
            &signer,
            &scep_attributes(),
            DigestAlgorithm::Sha256,
            CertChainMode::None,
        )
        .unwrap();

        // Same issuer and serial, different key.
        let mut imposter = identity(true).certificate().clone();
        imposter.tbs_certificate.issuer = signer.certificate().tbs_certificate.issuer.clone();
        imposter.tbs_certificate.serial_number =
            signer.certificate().tbs_certificate.serial_number.clone();

        assert!(verify_signed_data(&der, &[imposter]).is_err());
    }

    #[test]
    fn test_not_signed_data() {
        let certs_only = crate::types::create_certs_only(&[]).unwrap();
        assert!(verify_signed_data(&certs_only, &[]).is_err());
        assert!(verify_signed_data(b"\x30\x00", &[]).is_err());
    }
}
