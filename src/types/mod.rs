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

//! SCEP message types and value encodings.
//!
//! This module provides the protocol values carried in signed attributes
//! (message type, status, failure reason, transaction ID and nonces) and
//! the certs-only PKCS#7 helpers used for certificate distribution.

pub mod attributes;
mod pkcs7;

pub use attributes::{
    attribute_identifier, decode_printable, encode_printable, AttributeSet, ProtocolAttribute,
};
pub use pkcs7::{
    create_certs_only, decode_der_or_base64, parse_certs_only, parse_certs_only_base64,
    CaCertificates,
};
pub(crate) use pkcs7::extract_signed_data;

use std::fmt;

use der::Sequence;
use rand_core::CryptoRngCore;
use sha1::{Digest, Sha1};
use x509_cert::name::Name;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::error::{Result, ScepError};

/// SCEP `messageType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Certificate response (3).
    CertRep,
    /// PKCS#10 certificate request (19).
    PkcsReq,
    /// Poll for a pending request (20).
    GetCertInitial,
    /// Retrieve a certificate by issuer and serial (21).
    GetCert,
    /// Retrieve a CRL (22).
    GetCrl,
}

impl MessageType {
    /// Numeric code as carried on the wire.
    pub fn code(&self) -> u8 {
        match self {
            Self::CertRep => 3,
            Self::PkcsReq => 19,
            Self::GetCertInitial => 20,
            Self::GetCert => 21,
            Self::GetCrl => 22,
        }
    }

    /// Parse the decimal text form.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "3" => Ok(Self::CertRep),
            "19" => Ok(Self::PkcsReq),
            "20" => Ok(Self::GetCertInitial),
            "21" => Ok(Self::GetCert),
            "22" => Ok(Self::GetCrl),
            other => Err(ScepError::malformed_attribute(format!(
                "unknown messageType '{other}'"
            ))),
        }
    }

    /// Get the message type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CertRep => "CertRep",
            Self::PkcsReq => "PKCSReq",
            Self::GetCertInitial => "GetCertInitial",
            Self::GetCert => "GetCert",
            Self::GetCrl => "GetCRL",
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        printable_code(self.code())
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// SCEP `pkiStatus` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PkiStatus {
    /// Request granted (0).
    Success,
    /// Request rejected (2). Accompanied by a failInfo.
    Failure,
    /// Request pending manual approval (3).
    Pending,
}

impl PkiStatus {
    /// Numeric code as carried on the wire.
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 2,
            Self::Pending => 3,
        }
    }

    /// Parse the decimal text form.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "0" => Ok(Self::Success),
            "2" => Ok(Self::Failure),
            "3" => Ok(Self::Pending),
            other => Err(ScepError::UnexpectedStatus(other.to_string())),
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        printable_code(self.code())
    }
}

impl fmt::Display for PkiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Pending => "PENDING",
        };
        write!(f, "{name}")
    }
}

/// SCEP `failInfo` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailInfo {
    /// Unrecognized or unsupported algorithm (0).
    BadAlg,
    /// Integrity check failed (1).
    BadMessageCheck,
    /// Transaction not permitted or supported (2).
    BadRequest,
    /// signingTime not close enough to system time (3).
    BadTime,
    /// No certificate could be identified matching the criteria (4).
    BadCertId,
}

impl FailInfo {
    /// Numeric code as carried on the wire.
    pub fn code(&self) -> u8 {
        match self {
            Self::BadAlg => 0,
            Self::BadMessageCheck => 1,
            Self::BadRequest => 2,
            Self::BadTime => 3,
            Self::BadCertId => 4,
        }
    }

    /// Parse the decimal text form.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "0" => Ok(Self::BadAlg),
            "1" => Ok(Self::BadMessageCheck),
            "2" => Ok(Self::BadRequest),
            "3" => Ok(Self::BadTime),
            "4" => Ok(Self::BadCertId),
            other => Err(ScepError::malformed_attribute(format!(
                "unknown failInfo '{other}'"
            ))),
        }
    }

    /// Get the failure reason name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadAlg => "badAlg",
            Self::BadMessageCheck => "badMessageCheck",
            Self::BadRequest => "badRequest",
            Self::BadTime => "badTime",
            Self::BadCertId => "badCertId",
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        printable_code(self.code())
    }
}

impl fmt::Display for FailInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn printable_code(code: u8) -> Vec<u8> {
    let text = code.to_string();
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(attributes::PRINTABLE_STRING_TAG);
    out.push(text.len() as u8);
    out.extend_from_slice(text.as_bytes());
    out
}

/// Identifies one enrollment across the initial request and every poll.
///
/// The value is the uppercase hex SHA-1 of the enrolling public key, so it
/// can be recomputed from the key alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap an existing transaction ID string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the transaction ID for a public key.
    ///
    /// The digest covers the BIT STRING contents of the SubjectPublicKeyInfo,
    /// which for RSA is the PKCS#1 `RSAPublicKey` encoding.
    pub fn derive(public_key: &SubjectPublicKeyInfoOwned) -> Self {
        let digest = Sha1::digest(public_key.subject_public_key.raw_bytes());
        Self(hex::encode_upper(digest))
    }

    /// The transaction ID text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// PrintableString encoding for the transactionID attribute.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_printable(&self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Length of a SCEP nonce in bytes.
pub const NONCE_LEN: usize = 16;

/// A 16-byte sender or recipient nonce.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    /// Generate a fresh nonce from a secure random source.
    pub fn generate<R: CryptoRngCore>(rng: &mut R) -> Result<Self> {
        let mut bytes = [0u8; NONCE_LEN];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|e| ScepError::randomness(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Wrap known nonce bytes.
    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }

    /// OCTET STRING encoding (`04 10` followed by the nonce).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + 2);
        out.push(0x04);
        out.push(NONCE_LEN as u8);
        out.extend_from_slice(&self.0);
        out
    }

    /// Decode an OCTET STRING nonce.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [0x04, 0x10, rest @ ..] if rest.len() == NONCE_LEN => {
                let mut out = [0u8; NONCE_LEN];
                out.copy_from_slice(rest);
                Ok(Self(out))
            }
            _ => Err(ScepError::malformed_attribute(
                "nonce must be a 16-byte OCTET STRING",
            )),
        }
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", hex::encode(self.0))
    }
}

/// GetCertInitial payload: the CA issuer name and the requested subject.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct IssuerAndSubject {
    /// Subject of the CA certificate that will issue.
    pub issuer: Name,
    /// Subject of the pending request.
    pub subject: Name,
}
