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

//! Signing identities.
//!
//! An identity pairs a certificate with the private key for its public
//! key. SCEP clients that have no certificate yet sign their first request
//! with a throwaway self-signed identity whose subject is a random UUID.

use std::str::FromStr;

use cms::cert::IssuerAndSerialNumber;
use rand_core::CryptoRngCore;
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::certificate::{random_serial, CertificateBuilder, KeyUsageFlags};
use crate::error::{Result, ScepError};
use crate::keys::PrivateKey;

/// A certificate together with its private key.
#[derive(Debug, Clone)]
pub struct Identity {
    certificate: Certificate,
    private_key: PrivateKey,
    label: Option<String>,
}

impl Identity {
    /// Pair a certificate with its private key.
    ///
    /// Fails if the key does not match the certificate's public key.
    pub fn new(certificate: Certificate, private_key: PrivateKey) -> Result<Self> {
        if private_key.public_key_info()? != certificate.tbs_certificate.subject_public_key_info {
            return Err(ScepError::signer_unavailable(
                "private key does not match certificate",
            ));
        }
        Ok(Self {
            certificate,
            private_key,
            label: None,
        })
    }

    /// Create a temporary self-signed identity for `private_key`.
    ///
    /// The subject is `CN=<random UUID>` and the key usage is
    /// digitalSignature and keyEncipherment, so the CA can both verify the
    /// request with it and encrypt the reply to it.
    pub fn temporary<R: CryptoRngCore>(private_key: PrivateKey, rng: &mut R) -> Result<Self> {
        let uuid = random_uuid(rng)?;
        let subject = Name::from_str(&format!("CN={uuid}"))
            .map_err(|e| ScepError::signer_unavailable(format!("invalid subject: {e}")))?;

        let certificate = CertificateBuilder::new(subject, private_key.public_key_info()?)
            .serial_number(random_serial(rng)?)
            .key_usage(KeyUsageFlags::DIGITAL_SIGNATURE | KeyUsageFlags::KEY_ENCIPHERMENT)
            .self_sign(&private_key)
            .map_err(|e| ScepError::signer_unavailable(format!("self-signing failed: {e}")))?;

        Ok(Self {
            certificate,
            private_key,
            label: Some(uuid),
        })
    }

    /// Attach a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// The private key.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// The label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Issuer and serial number of the certificate.
    pub fn issuer_and_serial(&self) -> IssuerAndSerialNumber {
        issuer_and_serial(&self.certificate)
    }
}

/// Issuer and serial number of a certificate.
pub fn issuer_and_serial(cert: &Certificate) -> IssuerAndSerialNumber {
    IssuerAndSerialNumber {
        issuer: cert.tbs_certificate.issuer.clone(),
        serial_number: cert.tbs_certificate.serial_number.clone(),
    }
}

/// Format 16 random bytes as an RFC 4122 version 4 UUID.
fn random_uuid<R: CryptoRngCore>(rng: &mut R) -> Result<String> {
    let mut bytes = [0u8; 16];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| ScepError::randomness(e.to_string()))?;
    let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
    Ok(uuid.hyphenated().to_string().to_uppercase())
}
