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

//! CA/RA certificate discovery.
//!
//! A GetCACert reply is an unordered bag of certificates. This module
//! identifies the CA certificate, optionally pinned by a fingerprint, and
//! the RA certificate(s) used to sign replies and to encrypt requests.
//! Separate signing and encryption RA certificates are preferred; a single
//! certificate allowed to do both is the fallback.

use tracing::{debug, info, warn};
use x509_cert::Certificate;

use crate::certificate::{get_subject_cn, key_usage_or_empty, KeyUsageFlags};
use crate::digest::{fingerprint, format_fingerprint, DigestAlgorithm};
use crate::error::{Result, ScepError};
use crate::validation::TrustChainBuilder;

/// The certificates a client needs to talk to a SCEP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaCertificateSet {
    /// The CA certificate (root of the RA chains).
    pub ca: Certificate,
    /// Certificate that signs replies.
    pub ra_signing: Certificate,
    /// Certificate that requests are encrypted to.
    pub ra_encryption: Certificate,
}

impl CaCertificateSet {
    /// True when one certificate serves both RA roles.
    pub fn is_dual_role(&self) -> bool {
        self.ra_signing == self.ra_encryption
    }

    /// Certificates to encrypt requests to.
    pub fn recipients(&self) -> Vec<Certificate> {
        vec![self.ra_encryption.clone()]
    }

    /// Certificates in the order reply verification expects: CA first, then the reply signer.
    pub fn reply_signers(&self) -> Vec<Certificate> {
        if self.ca == self.ra_signing {
            vec![self.ca.clone()]
        } else {
            vec![self.ca.clone(), self.ra_signing.clone()]
        }
    }
}

/// Candidate RA certificates sorted by key usage.
#[derive(Debug, Default)]
struct RaCandidates {
    dual_role: Vec<Certificate>,
    signing: Vec<Certificate>,
    encryption: Vec<Certificate>,
}

/// Find the CA certificate and RA signing/encryption certificates in `certs`.
///
/// When `ca_fingerprint` is given, the CA is the first certificate whose
/// fingerprint matches, using the digest implied by the fingerprint length.
/// Without a fingerprint the CA is the common root of the RA chains.
pub fn validate_ca_certificates(
    certs: &[Certificate],
    ca_fingerprint: Option<&[u8]>,
) -> Result<CaCertificateSet> {
    let mut ca = match ca_fingerprint {
        Some(fp) => Some(find_ca_certificate(certs, fp)?),
        None => None,
    };

    let candidates = find_ra_candidates(certs)?;
    let builder = TrustChainBuilder::new();

    let signing_chain = find_ra_chain(&builder, &candidates.signing, certs, ca.as_ref());
    let encryption_chain = find_ra_chain(&builder, &candidates.encryption, certs, ca.as_ref());

    let mut failure = ScepError::internal("no RA certificate chains to the CA");

    if let (Some(signing), Some(encryption)) = (&signing_chain, &encryption_chain) {
        let signing_root = &signing[signing.len() - 1];
        let encryption_root = &encryption[encryption.len() - 1];
        match &ca {
            Some(ca) => return Ok(split_roles(ca.clone(), signing, encryption)),
            None if signing_root == encryption_root => {
                return Ok(split_roles(signing_root.clone(), signing, encryption))
            }
            None => {
                debug!("Signing and encryption RA chains end at different roots");
                failure = ScepError::not_trusted("signing and encryption CAs do not match");
            }
        }
    }

    debug!("No separate RA signing/encryption certificates; looking for one certificate");
    if let Some(chain) = find_ra_chain(&builder, &candidates.dual_role, certs, ca.as_ref()) {
        let ra = chain[0].clone();
        let ca = ca.take().unwrap_or_else(|| chain[chain.len() - 1].clone());
        info!("Using {} as RA for signing and encryption", describe(&ra));
        return Ok(CaCertificateSet {
            ca,
            ra_signing: ra.clone(),
            ra_encryption: ra,
        });
    }

    Err(failure)
}

fn split_roles(ca: Certificate, signing: &[Certificate], encryption: &[Certificate]) -> CaCertificateSet {
    info!(
        "Using {} for reply signing and {} for encryption",
        describe(&signing[0]),
        describe(&encryption[0])
    );
    CaCertificateSet {
        ca,
        ra_signing: signing[0].clone(),
        ra_encryption: encryption[0].clone(),
    }
}

/// Find the first certificate matching `ca_fingerprint`.
pub fn find_ca_certificate(certs: &[Certificate], ca_fingerprint: &[u8]) -> Result<Certificate> {
    let algorithm = DigestAlgorithm::from_fingerprint_len(ca_fingerprint.len())?;
    debug!("{} fingerprint digest", algorithm);

    for cert in certs {
        if fingerprint(cert, algorithm)? == ca_fingerprint {
            debug!("CA certificate is {}", describe(cert));
            return Ok(cert.clone());
        }
    }

    warn!(
        "No certificate matches CA fingerprint {}",
        format_fingerprint(ca_fingerprint)
    );
    Err(ScepError::not_trusted(
        "no certificate matches the CA fingerprint",
    ))
}

fn find_ra_candidates(certs: &[Certificate]) -> Result<RaCandidates> {
    let mut candidates = RaCandidates::default();

    for cert in certs {
        let ku = key_usage_or_empty(cert);
        let can_sign = ku.contains(KeyUsageFlags::DIGITAL_SIGNATURE);
        let can_encrypt = ku.contains(KeyUsageFlags::KEY_ENCIPHERMENT);
        match (can_sign, can_encrypt) {
            (true, true) => candidates.dual_role.push(cert.clone()),
            (true, false) => candidates.signing.push(cert.clone()),
            (false, true) => candidates.encryption.push(cert.clone()),
            (false, false) => {}
        }
    }

    debug!(
        "RA candidates: {} dual-role, {} signing, {} encryption",
        candidates.dual_role.len(),
        candidates.signing.len(),
        candidates.encryption.len()
    );

    if candidates.dual_role.is_empty()
        && (candidates.signing.is_empty() || candidates.encryption.is_empty())
    {
        return Err(ScepError::KeyUsageIncorrect(
            "no certificate usable as RA".to_string(),
        ));
    }

    Ok(candidates)
}

/// Chain of the first candidate that reaches the CA (or any root if the CA is unknown).
fn find_ra_chain(
    builder: &TrustChainBuilder,
    candidates: &[Certificate],
    certs: &[Certificate],
    ca: Option<&Certificate>,
) -> Option<Vec<Certificate>> {
    for leaf in candidates {
        match builder.build_chain(leaf, certs, ca) {
            Ok(chain) => return Some(chain),
            Err(e) => debug!("No chain from {}: {}", describe(leaf), e),
        }
    }
    None
}

fn describe(cert: &Certificate) -> String {
    get_subject_cn(cert).unwrap_or_else(|| cert.tbs_certificate.subject.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::CertificateBuilder;
    use crate::keys::PrivateKey;
    use rand_core::OsRng;
    use std::str::FromStr;
    use x509_cert::name::Name;

    struct Pki {
        ca: Certificate,
        ca_key: PrivateKey,
    }

    impl Pki {
        fn new(cn: &str) -> Self {
            let ca_key = PrivateKey::generate_p256(&mut OsRng);
            let ca = CertificateBuilder::new(
                Name::from_str(&format!("CN={cn}")).unwrap(),
                ca_key.public_key_info().unwrap(),
            )
            .ca(true)
            .key_usage(KeyUsageFlags::KEY_CERT_SIGN | KeyUsageFlags::CRL_SIGN)
            .self_sign(&ca_key)
            .unwrap();
            Self { ca, ca_key }
        }

        fn issue(&self, cn: &str, ku: KeyUsageFlags) -> Certificate {
            let key = PrivateKey::generate_p256(&mut OsRng);
            CertificateBuilder::new(
                Name::from_str(&format!("CN={cn}")).unwrap(),
                key.public_key_info().unwrap(),
            )
            .serial_number(vec![2, cn.len() as u8])
            .key_usage(ku)
            .sign_with(&self.ca, &self.ca_key)
            .unwrap()
        }
    }

    #[test]
    fn test_dual_role_ra() {
        let pki = Pki::new("Test CA");
        let ra = pki.issue(
            "RA",
            KeyUsageFlags::DIGITAL_SIGNATURE | KeyUsageFlags::KEY_ENCIPHERMENT,
        );

        let set = validate_ca_certificates(&[ra.clone(), pki.ca.clone()], None).unwrap();
        assert_eq!(set.ca, pki.ca);
        assert_eq!(set.ra_signing, ra);
        assert_eq!(set.ra_encryption, ra);
        assert!(set.is_dual_role());
        assert_eq!(set.reply_signers(), vec![pki.ca.clone(), ra]);
    }

    #[test]
    fn test_split_roles() {
        let pki = Pki::new("Test CA");
        let sign = pki.issue("RA Sign", KeyUsageFlags::DIGITAL_SIGNATURE);
        let enc = pki.issue("RA Encrypt", KeyUsageFlags::KEY_ENCIPHERMENT);

        let set =
            validate_ca_certificates(&[pki.ca.clone(), enc.clone(), sign.clone()], None).unwrap();
        assert_eq!(set.ca, pki.ca);
        assert_eq!(set.ra_signing, sign);
        assert_eq!(set.ra_encryption, enc);
        assert!(!set.is_dual_role());
    }

    #[test]
    fn test_fingerprint_pins_ca() {
        let pki = Pki::new("Test CA");
        let ra = pki.issue(
            "RA",
            KeyUsageFlags::DIGITAL_SIGNATURE | KeyUsageFlags::KEY_ENCIPHERMENT,
        );
        let certs = [pki.ca.clone(), ra.clone()];

        for alg in [DigestAlgorithm::Md5, DigestAlgorithm::Sha1, DigestAlgorithm::Sha512] {
            let fp = fingerprint(&pki.ca, alg).unwrap();
            let set = validate_ca_certificates(&certs, Some(&fp)).unwrap();
            assert_eq!(set.ca, pki.ca);
            assert_eq!(set.ra_signing, ra);
        }
    }

    #[test]
    fn test_fingerprint_mismatch() {
        let pki = Pki::new("Test CA");
        let ra = pki.issue(
            "RA",
            KeyUsageFlags::DIGITAL_SIGNATURE | KeyUsageFlags::KEY_ENCIPHERMENT,
        );

        let err = validate_ca_certificates(&[pki.ca.clone(), ra], Some(&[0u8; 32])).unwrap_err();
        assert!(matches!(err, ScepError::NotTrusted(_)));

        let err = validate_ca_certificates(&[pki.ca], Some(&[0u8; 17])).unwrap_err();
        assert!(matches!(err, ScepError::InvalidDigestAlgorithm(_)));
    }

    #[test]
    fn test_fingerprint_of_other_ca() {
        let pki = Pki::new("Test CA");
        let other = Pki::new("Other CA");
        let ra = pki.issue(
            "RA",
            KeyUsageFlags::DIGITAL_SIGNATURE | KeyUsageFlags::KEY_ENCIPHERMENT,
        );
        let fp = fingerprint(&other.ca, DigestAlgorithm::Sha256).unwrap();

        let err =
            validate_ca_certificates(&[pki.ca.clone(), other.ca.clone(), ra], Some(&fp)).unwrap_err();
        assert!(matches!(err, ScepError::InternalError(_)));
    }

    #[test]
    fn test_no_usable_key_usage() {
        let pki = Pki::new("Test CA");
        let sign = pki.issue("RA Sign", KeyUsageFlags::DIGITAL_SIGNATURE);

        let err = validate_ca_certificates(&[pki.ca, sign], None).unwrap_err();
        assert!(matches!(err, ScepError::KeyUsageIncorrect(_)));
    }

    #[test]
    fn test_split_roles_with_different_roots() {
        let a = Pki::new("CA A");
        let b = Pki::new("CA B");
        let sign = a.issue("RA Sign", KeyUsageFlags::DIGITAL_SIGNATURE);
        let enc = b.issue("RA Encrypt", KeyUsageFlags::KEY_ENCIPHERMENT);

        let err = validate_ca_certificates(&[a.ca, b.ca, sign, enc], None).unwrap_err();
        assert!(matches!(err, ScepError::NotTrusted(_)));
    }
}
