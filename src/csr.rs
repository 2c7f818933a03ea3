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

//! PKCS#10 certificate request generation and verification.
//!
//! The request is what the CA ultimately certifies; SCEP adds a
//! challengePassword attribute for first-time enrollment and an
//! extensionRequest for the key usages the client wants.

use const_oid::db::rfc4519::{C, CN, L, O, OU, ST};
use der::asn1::{Any, BitString, ObjectIdentifier, PrintableStringRef, SetOfVec, Utf8StringRef};
use der::{Decode, Encode, Tag, Tagged};
use x509_cert::attr::{Attribute, AttributeTypeAndValue};
use x509_cert::ext::Extension;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::request::{CertReq, CertReqInfo, Version};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::certificate::KeyUsageFlags;
use crate::digest::DigestAlgorithm;
use crate::error::{Result, ScepError};
use crate::keys::{verify_signature, PrivateKey};
use crate::oids::{ID_CHALLENGE_PASSWORD, ID_EXTENSION_REQ};

/// Builder for creating Certificate Signing Requests.
///
/// # Example
///
/// ```no_run
/// use usg_scep::csr::CsrBuilder;
/// use usg_scep::keys::PrivateKey;
/// use rand_core::OsRng;
///
/// # fn example() -> usg_scep::Result<()> {
/// let key = PrivateKey::generate_rsa(&mut OsRng, 2048)?;
/// let csr_der = CsrBuilder::new()
///     .common_name("device.example.com")
///     .organization("Example Corp")
///     .challenge_password("secret")
///     .build(&key)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CsrBuilder {
    subject: Option<Name>,
    components: Vec<(ObjectIdentifier, String)>,
    challenge_password: Option<String>,
    key_usage: Option<KeyUsageFlags>,
    extensions: Vec<Extension>,
    digest: DigestAlgorithm,
}

impl Default for CsrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsrBuilder {
    /// Create a new CSR builder with an empty subject.
    pub fn new() -> Self {
        Self {
            subject: None,
            components: Vec::new(),
            challenge_password: None,
            key_usage: None,
            extensions: Vec::new(),
            digest: DigestAlgorithm::Sha256,
        }
    }

    /// Use a complete distinguished name as the subject.
    ///
    /// Components added with the individual setters are appended after it.
    pub fn subject(mut self, subject: Name) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Set the Common Name (CN) for the subject.
    pub fn common_name(mut self, cn: impl Into<String>) -> Self {
        self.components.push((CN, cn.into()));
        self
    }

    /// Set the Organization (O) for the subject.
    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.components.push((O, org.into()));
        self
    }

    /// Set the Organizational Unit (OU) for the subject.
    pub fn organizational_unit(mut self, ou: impl Into<String>) -> Self {
        self.components.push((OU, ou.into()));
        self
    }

    /// Set the Country (C) for the subject.
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.components.push((C, country.into()));
        self
    }

    /// Set the State/Province (ST) for the subject.
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.components.push((ST, state.into()));
        self
    }

    /// Set the Locality (L) for the subject.
    pub fn locality(mut self, locality: impl Into<String>) -> Self {
        self.components.push((L, locality.into()));
        self
    }

    /// Set the challenge password attribute.
    pub fn challenge_password(mut self, password: impl Into<String>) -> Self {
        self.challenge_password = Some(password.into());
        self
    }

    /// Request key usages through an extensionRequest attribute.
    pub fn key_usage(mut self, key_usage: KeyUsageFlags) -> Self {
        self.key_usage = Some(key_usage);
        self
    }

    /// Request an additional extension.
    pub fn extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Set the signature digest (default SHA-256).
    pub fn digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    fn build_subject(&self) -> Result<Name> {
        let mut rdns = self.subject.clone().map(|s| s.0).unwrap_or_default();
        for (oid, value) in &self.components {
            let value = if *oid == C {
                Any::encode_from(&PrintableStringRef::new(value)?)?
            } else {
                Any::encode_from(&Utf8StringRef::new(value)?)?
            };
            let atv = AttributeTypeAndValue { oid: *oid, value };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?));
        }
        Ok(RdnSequence(rdns))
    }

    /// Build and sign the CSR, returning its DER encoding.
    pub fn build(self, key: &PrivateKey) -> Result<Vec<u8>> {
        let subject = self.build_subject()?;
        let mut attributes = Vec::new();

        if let Some(password) = &self.challenge_password {
            let value = match PrintableStringRef::new(password) {
                Ok(printable) => Any::encode_from(&printable)?,
                Err(_) => Any::encode_from(&Utf8StringRef::new(password)?)?,
            };
            attributes.push(Attribute {
                oid: ID_CHALLENGE_PASSWORD,
                values: SetOfVec::try_from(vec![value])?,
            });
        }

        let mut extensions = Vec::new();
        if let Some(ku) = self.key_usage {
            extensions.push(ku.to_extension()?);
        }
        extensions.extend(self.extensions);
        if !extensions.is_empty() {
            attributes.push(Attribute {
                oid: ID_EXTENSION_REQ,
                values: SetOfVec::try_from(vec![Any::encode_from(&extensions)?])?,
            });
        }

        let info = CertReqInfo {
            version: Version::V1,
            subject,
            public_key: key.public_key_info()?,
            attributes: SetOfVec::try_from(attributes)?,
        };

        let (algorithm, signature) = key.sign(self.digest, &info.to_der()?)?;
        let request = CertReq {
            info,
            algorithm,
            signature: BitString::from_bytes(&signature)?,
        };
        Ok(request.to_der()?)
    }
}

/// The parts of a verified certificate request.
#[derive(Debug, Clone)]
pub struct ParsedCsr {
    /// Requested subject.
    pub subject: Name,
    /// Public key to be certified.
    pub public_key: SubjectPublicKeyInfoOwned,
    /// challengePassword, if present.
    pub challenge: Option<String>,
    /// Extensions from the extensionRequest attribute.
    pub extensions: Vec<Extension>,
}

/// Parse a DER CSR and verify its self-signature.
pub fn parse_csr(der_bytes: &[u8]) -> Result<ParsedCsr> {
    let request = CertReq::from_der(der_bytes)
        .map_err(|e| ScepError::invalid_request(format!("malformed CSR: {e}")))?;

    let info_der = request
        .info
        .to_der()
        .map_err(|e| ScepError::invalid_request(format!("cannot encode CSR info: {e}")))?;
    verify_signature(
        &request.info.public_key,
        &request.algorithm,
        None,
        &info_der,
        request.signature.raw_bytes(),
    )
    .map_err(|e| ScepError::invalid_request(format!("CSR signature: {e}")))?;

    let mut challenge = None;
    let mut extensions = Vec::new();

    for attribute in request.info.attributes.iter() {
        let Some(value) = attribute.values.iter().next() else {
            continue;
        };
        if attribute.oid == ID_CHALLENGE_PASSWORD {
            challenge = Some(directory_string(value)?);
        } else if attribute.oid == ID_EXTENSION_REQ {
            extensions = Vec::<Extension>::from_der(&value.to_der()?)
                .map_err(|e| ScepError::invalid_request(format!("extensionRequest: {e}")))?;
        }
    }

    Ok(ParsedCsr {
        subject: request.info.subject,
        public_key: request.info.public_key,
        challenge,
        extensions,
    })
}

fn directory_string(value: &Any) -> Result<String> {
    match value.tag() {
        Tag::PrintableString | Tag::Utf8String | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(value.value())
                .map(str::to_string)
                .map_err(|e| ScepError::invalid_request(format!("challengePassword: {e}")))
        }
        other => Err(ScepError::invalid_request(format!(
            "challengePassword has unsupported type {other}"
        ))),
    }
}
