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

//! PKCS#7/CMS certs-only utilities.
//!
//! SCEP distributes certificates in degenerate SignedData messages that
//! carry no content and no signers, only a certificate set. The same form
//! wraps the certificate issued in a CertRep before it is enveloped.

use base64::prelude::*;
use cms::cert::CertificateChoices;
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{CertificateSet, EncapsulatedContentInfo, SignedData, SignerInfos};
use der::asn1::{Any, SetOfVec};
use der::{Decode, Encode};
use x509_cert::Certificate;

use crate::error::{Result, ScepError};
use crate::oids::{ID_DATA, ID_SIGNED_DATA};

/// CA and RA certificates as returned by a GetCACert exchange.
#[derive(Debug, Clone, Default)]
pub struct CaCertificates {
    /// The certificates, in the order they were received.
    pub certificates: Vec<Certificate>,
}

impl CaCertificates {
    /// Create a new CA certificates collection.
    pub fn new(certificates: Vec<Certificate>) -> Self {
        Self { certificates }
    }

    /// Parse a GetCACert payload.
    ///
    /// A CA without an RA answers with a single DER certificate; otherwise
    /// the payload is a certs-only message.
    pub fn parse(der_bytes: &[u8]) -> Result<Self> {
        if let Ok(cert) = Certificate::from_der(der_bytes) {
            return Ok(Self::new(vec![cert]));
        }
        parse_certs_only(der_bytes).map(Self::new)
    }

    /// Returns true if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Returns the number of certificates.
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// The certificates as a slice.
    pub fn as_slice(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Iterate over the certificates.
    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.iter()
    }
}

impl IntoIterator for CaCertificates {
    type Item = Certificate;
    type IntoIter = std::vec::IntoIter<Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.certificates.into_iter()
    }
}

impl<'a> IntoIterator for &'a CaCertificates {
    type Item = &'a Certificate;
    type IntoIter = std::slice::Iter<'a, Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.certificates.iter()
    }
}

/// Build a DER certs-only message holding `certificates`.
///
/// The certificate set is DER sorted, so input order is not preserved.
pub fn create_certs_only(certificates: &[Certificate]) -> Result<Vec<u8>> {
    let choices: Vec<CertificateChoices> = certificates
        .iter()
        .cloned()
        .map(CertificateChoices::Certificate)
        .collect();

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::default(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(choices)?)),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::default()),
    };

    let content_info = ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    };
    Ok(content_info.to_der()?)
}

/// Parse a DER certs-only message.
pub fn parse_certs_only(der_bytes: &[u8]) -> Result<Vec<Certificate>> {
    let content_info = ContentInfo::from_der(der_bytes)?;
    let signed_data = extract_signed_data(&content_info)?;
    extract_certificates(&signed_data)
}

/// Parse a base64 certs-only message, as found in `.p7b` files and MIME bodies.
pub fn parse_certs_only_base64(body: &[u8]) -> Result<Vec<Certificate>> {
    let der_bytes = decode_base64(body)?;
    parse_certs_only(&der_bytes)
}

/// Accept a message either as DER or as base64 text.
///
/// Input starting with a SEQUENCE tag is taken as DER.
pub fn decode_der_or_base64(data: &[u8]) -> Result<Vec<u8>> {
    match data.first() {
        Some(0x30) => Ok(data.to_vec()),
        _ => decode_base64(data),
    }
}

/// Decode base64 data, handling various line ending formats.
pub(crate) fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    BASE64_STANDARD.decode(&cleaned).map_err(ScepError::Base64)
}

pub(crate) fn extract_signed_data(content_info: &ContentInfo) -> Result<SignedData> {
    if content_info.content_type != ID_SIGNED_DATA {
        return Err(ScepError::internal(format!(
            "expected SignedData content, got {}",
            content_info.content_type
        )));
    }

    let content = content_info.content.to_der()?;
    Ok(SignedData::from_der(&content)?)
}

fn extract_certificates(signed_data: &SignedData) -> Result<Vec<Certificate>> {
    let cert_set = match &signed_data.certificates {
        Some(certs) => certs,
        None => return Ok(Vec::new()),
    };

    let mut certificates = Vec::new();

    for cert_choice in cert_set.0.iter() {
        if let CertificateChoices::Certificate(cert) = cert_choice {
            certificates.push(cert.clone());
        } else {
            tracing::warn!("Skipping non-X.509 certificate choice");
        }
    }

    Ok(certificates)
}
