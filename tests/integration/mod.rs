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

//! Integration test utilities and helpers
//!
//! RSA CA/RA identities are generated with this crate so they can decrypt
//! and sign. ECDSA certificate hierarchies for chain discovery come from
//! `rcgen`.

#![allow(dead_code)]

use der::Decode;
use rand_core::OsRng;
use std::str::FromStr;
use std::sync::Arc;
use usg_scep::{
    Certificate, CertificateBuilder, Identity, KeyUsageFlags, MemoryCredentialStore, PrivateKey,
    RequestParameters, ScepRequester,
};
use x509_cert::name::Name;

/// Challenge the default responder configuration expects.
pub const CHALLENGE: &str = "magic";

/// RSA modulus size used in tests (small to keep key generation fast).
pub const TEST_RSA_BITS: usize = 1024;

/// Parse an RFC 4514 name.
pub fn name(s: &str) -> Name {
    Name::from_str(s).expect("valid name")
}

/// Generate an RSA key.
pub fn rsa_key() -> PrivateKey {
    PrivateKey::generate_rsa(&mut OsRng, TEST_RSA_BITS).expect("RSA key generation")
}

/// Self-signed RSA CA identity.
pub fn ca_identity(cn: &str) -> Identity {
    let key = rsa_key();
    let cert = CertificateBuilder::new(name(&format!("CN={cn}")), key.public_key_info().unwrap())
        .serial_number([1u8])
        .ca(true)
        .key_usage(
            KeyUsageFlags::DIGITAL_SIGNATURE
                | KeyUsageFlags::KEY_ENCIPHERMENT
                | KeyUsageFlags::KEY_CERT_SIGN
                | KeyUsageFlags::CRL_SIGN,
        )
        .self_sign(&key)
        .expect("CA certificate");
    Identity::new(cert, key).expect("CA identity")
}

/// RSA identity issued by `ca` with the given key usage.
pub fn issued_identity(ca: &Identity, cn: &str, serial: u8, ku: KeyUsageFlags) -> Identity {
    let key = rsa_key();
    let cert = CertificateBuilder::new(name(&format!("CN={cn}")), key.public_key_info().unwrap())
        .serial_number([serial])
        .key_usage(ku)
        .sign_with(ca.certificate(), ca.private_key())
        .expect("issued certificate");
    Identity::new(cert, key).expect("issued identity")
}

/// A CA with separate RA signing and encryption identities.
pub struct RaPki {
    pub ca: Identity,
    pub ra_signing: Identity,
    pub ra_encryption: Identity,
}

impl RaPki {
    pub fn new() -> Self {
        let ca = ca_identity("Integration CA");
        let ra_signing = issued_identity(
            &ca,
            "Integration RA Signing",
            2,
            KeyUsageFlags::DIGITAL_SIGNATURE,
        );
        let ra_encryption = issued_identity(
            &ca,
            "Integration RA Encryption",
            3,
            KeyUsageFlags::KEY_ENCIPHERMENT,
        );
        Self {
            ca,
            ra_signing,
            ra_encryption,
        }
    }

    /// The bag a GetCACert response would carry, in server order.
    pub fn bag(&self) -> Vec<Certificate> {
        vec![
            self.ra_signing.certificate().clone(),
            self.ca.certificate().clone(),
            self.ra_encryption.certificate().clone(),
        ]
    }
}

/// A requester with the default challenge and a fresh in-memory store.
pub fn requester() -> (ScepRequester, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::new());
    let requester = ScepRequester::new(
        RequestParameters::new().challenge_password(CHALLENGE),
        store.clone(),
    );
    (requester, store)
}

/// An ECDSA hierarchy generated with rcgen.
pub struct RcgenPki {
    pub ca: Certificate,
    ca_cert: rcgen::Certificate,
    ca_key: rcgen::KeyPair,
}

impl RcgenPki {
    pub fn new(cn: &str) -> Self {
        let mut params = rcgen::CertificateParams::default();
        let mut dn = rcgen::DistinguishedName::new();
        dn.push(rcgen::DnType::CommonName, cn);
        dn.push(rcgen::DnType::OrganizationName, "SCEP Test Organization");
        params.distinguished_name = dn;
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.key_usages = vec![
            rcgen::KeyUsagePurpose::DigitalSignature,
            rcgen::KeyUsagePurpose::KeyCertSign,
            rcgen::KeyUsagePurpose::CrlSign,
        ];

        let ca_key = rcgen::KeyPair::generate().expect("rcgen key");
        let ca_cert = params.self_signed(&ca_key).expect("rcgen CA");
        Self {
            ca: to_certificate(&ca_cert),
            ca_cert,
            ca_key,
        }
    }

    /// Issue a leaf with the given key usages.
    pub fn issue(&self, cn: &str, usages: Vec<rcgen::KeyUsagePurpose>) -> Certificate {
        let mut params = rcgen::CertificateParams::default();
        let mut dn = rcgen::DistinguishedName::new();
        dn.push(rcgen::DnType::CommonName, cn);
        params.distinguished_name = dn;
        // rcgen omits the extensions block for a leaf unless basicConstraints is written.
        params.is_ca = rcgen::IsCa::ExplicitNoCa;
        params.key_usages = usages;

        let key = rcgen::KeyPair::generate().expect("rcgen key");
        let cert = params
            .signed_by(&key, &self.ca_cert, &self.ca_key)
            .expect("rcgen leaf");
        to_certificate(&cert)
    }
}

fn to_certificate(cert: &rcgen::Certificate) -> Certificate {
    Certificate::from_der(cert.der().as_ref()).expect("rcgen certificate parses")
}
