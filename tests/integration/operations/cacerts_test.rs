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

//! Integration tests for CA/RA certificate discovery

use crate::integration::{RaPki, RcgenPki};
use rcgen::KeyUsagePurpose;
use usg_scep::certificate::key_usage;
use usg_scep::digest::fingerprint;
use usg_scep::types::{create_certs_only, parse_certs_only};
use usg_scep::{validate_ca_certificates, DigestAlgorithm, KeyUsageFlags, ScepError};

#[test]
fn test_rcgen_leaf_carries_key_usage() {
    let pki = RcgenPki::new("rcgen CA");
    let ra = pki.issue(
        "rcgen RA",
        vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ],
    );

    let usage = key_usage(&ra).unwrap().expect("keyUsage extension present");
    assert!(usage.contains(KeyUsageFlags::DIGITAL_SIGNATURE | KeyUsageFlags::KEY_ENCIPHERMENT));
}

#[test]
fn test_rcgen_dual_role_ra() {
    let pki = RcgenPki::new("rcgen CA");
    let ra = pki.issue(
        "rcgen RA",
        vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ],
    );

    let set = validate_ca_certificates(&[pki.ca.clone(), ra.clone()], None).unwrap();
    assert_eq!(set.ca, pki.ca);
    assert_eq!(set.ra_signing, ra);
    assert_eq!(set.ra_encryption, ra);
    assert!(set.is_dual_role());
}

#[test]
fn test_rcgen_split_roles_with_fingerprint() {
    let pki = RcgenPki::new("rcgen CA");
    let signing = pki.issue("RA signing", vec![KeyUsagePurpose::DigitalSignature]);
    let encryption = pki.issue("RA encryption", vec![KeyUsagePurpose::KeyEncipherment]);
    let bag = vec![encryption.clone(), pki.ca.clone(), signing.clone()];

    for algorithm in [DigestAlgorithm::Sha1, DigestAlgorithm::Sha256, DigestAlgorithm::Sha512] {
        let fp = fingerprint(&pki.ca, algorithm).unwrap();
        let set = validate_ca_certificates(&bag, Some(&fp)).unwrap();
        assert_eq!(set.ca, pki.ca);
        assert_eq!(set.ra_signing, signing);
        assert_eq!(set.ra_encryption, encryption);
        assert_eq!(set.reply_signers(), vec![pki.ca.clone(), signing.clone()]);
    }
}

#[test]
fn test_ca_derived_without_fingerprint() {
    let pki = RaPki::new();
    let set = validate_ca_certificates(&pki.bag(), None).unwrap();

    assert_eq!(&set.ca, pki.ca.certificate());
    assert_eq!(&set.ra_signing, pki.ra_signing.certificate());
    assert_eq!(&set.ra_encryption, pki.ra_encryption.certificate());
    assert!(!set.is_dual_role());
}

#[test]
fn test_certs_only_transport() {
    let pki = RaPki::new();
    let der = create_certs_only(&pki.bag()).unwrap();
    let certs = parse_certs_only(&der).unwrap();

    let fp = fingerprint(pki.ca.certificate(), DigestAlgorithm::Md5).unwrap();
    let set = validate_ca_certificates(&certs, Some(&fp)).unwrap();
    assert_eq!(&set.ca, pki.ca.certificate());
}

#[test]
fn test_fingerprint_matches_nothing() {
    let pki = RcgenPki::new("rcgen CA");
    let ra = pki.issue(
        "rcgen RA",
        vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ],
    );

    let result = validate_ca_certificates(&[pki.ca.clone(), ra], Some(&[0u8; 32]));
    assert!(matches!(result, Err(ScepError::NotTrusted(_))));
}

#[test]
fn test_fingerprint_length_unknown() {
    let pki = RcgenPki::new("rcgen CA");
    let result = validate_ca_certificates(&[pki.ca.clone()], Some(&[0u8; 17]));
    assert!(matches!(result, Err(ScepError::InvalidDigestAlgorithm(_))));
}

#[test]
fn test_no_encryption_capable_certificate() {
    let pki = RcgenPki::new("rcgen CA");
    let signing = pki.issue("RA signing", vec![KeyUsagePurpose::DigitalSignature]);

    let result = validate_ca_certificates(&[pki.ca.clone(), signing], None);
    assert!(matches!(result, Err(ScepError::KeyUsageIncorrect(_))));
}

#[test]
fn test_ra_from_another_ca_is_not_used() {
    let pki = RcgenPki::new("rcgen CA");
    let stranger = RcgenPki::new("Other CA");
    let ra = stranger.issue(
        "Foreign RA",
        vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ],
    );

    let fp = fingerprint(&pki.ca, DigestAlgorithm::Sha256).unwrap();
    let result = validate_ca_certificates(&[pki.ca.clone(), ra], Some(&fp));
    assert!(result.is_err());
}
