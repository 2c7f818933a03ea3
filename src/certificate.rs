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

//! X.509 certificate helpers.
//!
//! Certificates are assembled field by field from a [`CertificateBuilder`]
//! and signed with a [`PrivateKey`]. The same module answers the questions
//! the protocol asks of a certificate: which key usages it carries, whether
//! it is self-issued, and whether a given key signed it.

use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

use const_oid::db::rfc5280::{ID_CE_BASIC_CONSTRAINTS, ID_CE_KEY_USAGE};
use der::asn1::{BitString, OctetString};
use der::flagset::FlagSet;
use der::{Decode, Encode};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::ext::pkix::{BasicConstraints, KeyUsage, KeyUsages};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;
use x509_cert::Certificate;

use crate::digest::DigestAlgorithm;
use crate::error::{Result, ScepError};
use crate::keys::{verify_signature, PrivateKey};

/// The key usage bits SCEP cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeyUsageFlags(u8);

impl KeyUsageFlags {
    /// No key usage.
    pub const NONE: Self = Self(0);
    /// `digitalSignature`
    pub const DIGITAL_SIGNATURE: Self = Self(1 << 0);
    /// `keyEncipherment`
    pub const KEY_ENCIPHERMENT: Self = Self(1 << 1);
    /// `keyCertSign`
    pub const KEY_CERT_SIGN: Self = Self(1 << 2);
    /// `cRLSign`
    pub const CRL_SIGN: Self = Self(1 << 3);

    /// Returns true if every bit of `other` is set.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Convert to the X.509 extension value.
    pub fn to_key_usage(&self) -> KeyUsage {
        let mut flags = FlagSet::<KeyUsages>::default();
        if self.contains(Self::DIGITAL_SIGNATURE) {
            flags |= KeyUsages::DigitalSignature;
        }
        if self.contains(Self::KEY_ENCIPHERMENT) {
            flags |= KeyUsages::KeyEncipherment;
        }
        if self.contains(Self::KEY_CERT_SIGN) {
            flags |= KeyUsages::KeyCertSign;
        }
        if self.contains(Self::CRL_SIGN) {
            flags |= KeyUsages::CRLSign;
        }
        KeyUsage(flags)
    }

    /// Convert from the X.509 extension value, dropping bits SCEP ignores.
    pub fn from_key_usage(ku: &KeyUsage) -> Self {
        let mut flags = Self::NONE;
        if ku.digital_signature() {
            flags |= Self::DIGITAL_SIGNATURE;
        }
        if ku.key_encipherment() {
            flags |= Self::KEY_ENCIPHERMENT;
        }
        if ku.key_cert_sign() {
            flags |= Self::KEY_CERT_SIGN;
        }
        if ku.crl_sign() {
            flags |= Self::CRL_SIGN;
        }
        flags
    }

    /// Build a critical keyUsage extension.
    pub fn to_extension(&self) -> Result<Extension> {
        Ok(Extension {
            extn_id: ID_CE_KEY_USAGE,
            critical: true,
            extn_value: OctetString::new(self.to_key_usage().to_der()?)?,
        })
    }
}

impl BitOr for KeyUsageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for KeyUsageFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Key usage names accepted in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsageName {
    /// `digitalSignature`
    DigitalSignature,
    /// `keyEncipherment`
    KeyEncipherment,
    /// `keyCertSign`
    KeyCertSign,
    /// `cRLSign`
    CrlSign,
}

impl From<KeyUsageName> for KeyUsageFlags {
    fn from(name: KeyUsageName) -> Self {
        match name {
            KeyUsageName::DigitalSignature => Self::DIGITAL_SIGNATURE,
            KeyUsageName::KeyEncipherment => Self::KEY_ENCIPHERMENT,
            KeyUsageName::KeyCertSign => Self::KEY_CERT_SIGN,
            KeyUsageName::CrlSign => Self::CRL_SIGN,
        }
    }
}

impl FromIterator<KeyUsageName> for KeyUsageFlags {
    fn from_iter<I: IntoIterator<Item = KeyUsageName>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::NONE, |acc, name| acc | Self::from(name))
    }
}

/// Key usage of a certificate, or `None` if it has no keyUsage extension.
pub fn key_usage(cert: &Certificate) -> Result<Option<KeyUsageFlags>> {
    let Some(extensions) = &cert.tbs_certificate.extensions else {
        return Ok(None);
    };
    for ext in extensions.iter() {
        if ext.extn_id == ID_CE_KEY_USAGE {
            let ku = KeyUsage::from_der(ext.extn_value.as_bytes())?;
            return Ok(Some(KeyUsageFlags::from_key_usage(&ku)));
        }
    }
    Ok(None)
}

/// Key usage of a certificate, treating a missing or unreadable extension as empty.
pub fn key_usage_or_empty(cert: &Certificate) -> KeyUsageFlags {
    key_usage(cert).ok().flatten().unwrap_or_default()
}

/// Check if a certificate's issuer and subject names are equal.
pub fn is_self_issued(cert: &Certificate) -> bool {
    cert.tbs_certificate.subject == cert.tbs_certificate.issuer
}

/// Check if `cert` carries a valid signature made by the key in `issuer_key`.
pub fn is_signed_by(cert: &Certificate, issuer_key: &SubjectPublicKeyInfoOwned) -> bool {
    let Ok(tbs) = cert.tbs_certificate.to_der() else {
        return false;
    };
    verify_signature(
        issuer_key,
        &cert.signature_algorithm,
        None,
        &tbs,
        cert.signature.raw_bytes(),
    )
    .is_ok()
}

/// Extract the common name from a certificate subject.
pub fn get_subject_cn(cert: &Certificate) -> Option<String> {
    common_name(&cert.tbs_certificate.subject)
}

/// Extract the common name from a distinguished name.
pub fn common_name(name: &Name) -> Option<String> {
    use const_oid::db::rfc4519::CN;

    for rdn in name.0.iter() {
        for atv in rdn.0.iter() {
            if atv.oid == CN {
                if let Ok(s) = std::str::from_utf8(atv.value.value()) {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

/// Generate a random positive serial number.
pub fn random_serial<R: CryptoRngCore>(rng: &mut R) -> Result<Vec<u8>> {
    let mut serial = vec![0u8; 16];
    rng.try_fill_bytes(&mut serial)
        .map_err(|e| ScepError::randomness(e.to_string()))?;
    serial[0] &= 0x7F;
    Ok(serial)
}

/// Builder for X.509 v3 certificates.
#[derive(Debug, Clone)]
pub struct CertificateBuilder {
    subject: Name,
    public_key: SubjectPublicKeyInfoOwned,
    serial: Vec<u8>,
    validity: Duration,
    key_usage: Option<KeyUsageFlags>,
    ca: bool,
    extensions: Vec<Extension>,
    digest: DigestAlgorithm,
}

impl CertificateBuilder {
    /// Default certificate lifetime (one year).
    pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// Start a certificate for `subject` over `public_key`.
    pub fn new(subject: Name, public_key: SubjectPublicKeyInfoOwned) -> Self {
        Self {
            subject,
            public_key,
            serial: vec![1],
            validity: Self::DEFAULT_VALIDITY,
            key_usage: None,
            ca: false,
            extensions: Vec::new(),
            digest: DigestAlgorithm::Sha256,
        }
    }

    /// Set the serial number (big-endian, unsigned).
    pub fn serial_number(mut self, serial: impl Into<Vec<u8>>) -> Self {
        self.serial = serial.into();
        self
    }

    /// Set how long the certificate is valid, starting now.
    pub fn validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Add a critical keyUsage extension.
    pub fn key_usage(mut self, key_usage: KeyUsageFlags) -> Self {
        self.key_usage = Some(key_usage);
        self
    }

    /// Mark the certificate as a CA (basicConstraints cA=TRUE).
    pub fn ca(mut self, ca: bool) -> Self {
        self.ca = ca;
        self
    }

    /// Add extensions copied from a certificate request.
    ///
    /// A keyUsage or basicConstraints extension here is ignored when the
    /// builder sets its own.
    pub fn extensions(mut self, extensions: Vec<Extension>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Set the signature digest.
    pub fn digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Sign with the key matching the subject public key.
    pub fn self_sign(self, key: &PrivateKey) -> Result<Certificate> {
        let issuer = self.subject.clone();
        self.sign(issuer, key)
    }

    /// Sign with an issuing certificate and its key.
    pub fn sign_with(self, issuer: &Certificate, issuer_key: &PrivateKey) -> Result<Certificate> {
        self.sign(issuer.tbs_certificate.subject.clone(), issuer_key)
    }

    fn sign(self, issuer: Name, key: &PrivateKey) -> Result<Certificate> {
        let digest = key.signature_digest(self.digest);
        let signature_algorithm = key.signature_algorithm(digest)?;

        let mut extensions = Vec::new();
        if self.ca {
            let bc = BasicConstraints {
                ca: true,
                path_len_constraint: None,
            };
            extensions.push(Extension {
                extn_id: ID_CE_BASIC_CONSTRAINTS,
                critical: true,
                extn_value: OctetString::new(bc.to_der()?)?,
            });
        }
        if let Some(ku) = self.key_usage {
            extensions.push(ku.to_extension()?);
        }
        for ext in self.extensions {
            let overridden = (ext.extn_id == ID_CE_KEY_USAGE && self.key_usage.is_some())
                || (ext.extn_id == ID_CE_BASIC_CONSTRAINTS && self.ca);
            if !overridden {
                extensions.push(ext);
            }
        }

        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(&self.serial)?,
            signature: signature_algorithm.clone(),
            issuer,
            validity: Validity::from_now(self.validity)?,
            subject: self.subject,
            subject_public_key_info: self.public_key,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: if extensions.is_empty() {
                None
            } else {
                Some(extensions)
            },
        };

        let (_, signature) = key.sign(digest, &tbs_certificate.to_der()?)?;

        Ok(Certificate {
            tbs_certificate,
            signature_algorithm,
            signature: BitString::from_bytes(&signature)?,
        })
    }
}

/// Build a self-signed certificate with a random serial number.
pub fn self_signed<R: CryptoRngCore>(
    subject: &Name,
    key: &PrivateKey,
    key_usage: KeyUsageFlags,
    validity: Duration,
    rng: &mut R,
) -> Result<Certificate> {
    CertificateBuilder::new(subject.clone(), key.public_key_info()?)
        .serial_number(random_serial(rng)?)
        .key_usage(key_usage)
        .validity(validity)
        .self_sign(key)
}
