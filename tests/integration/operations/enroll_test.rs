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

//! Integration tests for PKCSReq / CertRep exchanges

use crate::integration::{ca_identity, name, requester, rsa_key, RaPki, CHALLENGE};
use rand_core::OsRng;
use usg_scep::digest::fingerprint;
use usg_scep::{
    validate_ca_certificates, verify_reply, CertifyOptions, CredentialStore, DigestAlgorithm,
    EncryptionAlgorithm, Identity, IdentityMatcher, PkiStatus, PrivateKey, RequestParameters,
    ResponderConfig, ScepError, ScepRequester, ScepResponder,
};

#[test]
fn test_enrollment_through_ra() {
    let pki = RaPki::new();
    let fp = fingerprint(pki.ca.certificate(), DigestAlgorithm::Sha256).unwrap();
    let set = validate_ca_certificates(&pki.bag(), Some(&fp)).unwrap();

    let responder = ScepResponder::new(pki.ca.clone(), ResponderConfig::new())
        .with_decryption_identity(pki.ra_encryption.clone())
        .with_signing_identity(pki.ra_signing.clone());

    let (requester, store) = requester();
    let key = rsa_key();
    let request = requester
        .build_enrollment_request(
            &name("CN=device.example.com,O=Example"),
            &key,
            None,
            &set.recipients(),
            &mut OsRng,
        )
        .unwrap();

    let rep = responder
        .certify(&request.message, &CertifyOptions::issue([0x42u8]), &mut OsRng)
        .unwrap();
    assert_eq!(rep.status, PkiStatus::Success);

    let certs = verify_reply(
        &request.message,
        &rep.message,
        &set.reply_signers(),
        store.as_ref(),
    )
    .unwrap();

    assert_eq!(certs.len(), 1);
    let issued = &certs[0];
    assert_eq!(
        issued.tbs_certificate.subject_public_key_info,
        key.public_key_info().unwrap()
    );
    assert_eq!(
        issued.tbs_certificate.issuer,
        pki.ca.certificate().tbs_certificate.subject
    );
    assert_eq!(issued.tbs_certificate.serial_number.as_bytes(), &[0x42]);
    assert!(store.is_empty(), "temporary identity should be removed");
}

#[test]
fn test_enrollment_directly_with_ca() {
    let ca = ca_identity("Direct CA");
    let set = validate_ca_certificates(std::slice::from_ref(ca.certificate()), None).unwrap();
    assert!(set.is_dual_role());
    assert_eq!(set.reply_signers().len(), 1);

    let responder = ScepResponder::new(ca.clone(), ResponderConfig::new());
    let (requester, store) = requester();
    let key = rsa_key();
    let request = requester
        .build_enrollment_request(&name("CN=direct"), &key, None, &set.recipients(), &mut OsRng)
        .unwrap();
    let rep = responder
        .certify(&request.message, &CertifyOptions::default(), &mut OsRng)
        .unwrap();

    let certs = verify_reply(&request.message, &rep.message, &set.reply_signers(), store.as_ref())
        .unwrap();
    assert_eq!(certs[0].tbs_certificate.subject, name("CN=direct"));
}

#[test]
fn test_pending_reply_carries_transaction_id() {
    let ca = ca_identity("Pending CA");
    let responder = ScepResponder::new(ca.clone(), ResponderConfig::new());
    let (requester, store) = requester();
    let key = rsa_key();
    let request = requester
        .build_enrollment_request(
            &name("CN=pending"),
            &key,
            None,
            std::slice::from_ref(ca.certificate()),
            &mut OsRng,
        )
        .unwrap();

    let rep = responder
        .certify(&request.message, &CertifyOptions::pending(), &mut OsRng)
        .unwrap();
    let err = verify_reply(
        &request.message,
        &rep.message,
        std::slice::from_ref(ca.certificate()),
        store.as_ref(),
    )
    .unwrap_err();

    assert!(err.is_pending());
    assert_eq!(err.transaction_id(), Some(&request.transaction_id));
    // The identity is still needed to decrypt the eventual issuance.
    assert_eq!(store.len(), 1);
}

#[test]
fn test_recertify_with_existing_certificate() {
    let ca = ca_identity("Renewal CA");
    let responder = ScepResponder::new(ca.clone(), ResponderConfig::new());
    let ca_certs = [ca.certificate().clone()];

    // Initial enrollment
    let (requester, store) = requester();
    let key = rsa_key();
    let request = requester
        .build_enrollment_request(&name("CN=renewing"), &key, None, &ca_certs, &mut OsRng)
        .unwrap();
    let rep = responder
        .certify(&request.message, &CertifyOptions::issue([1u8]), &mut OsRng)
        .unwrap();
    let issued = verify_reply(&request.message, &rep.message, &ca_certs, store.as_ref())
        .unwrap()
        .remove(0);

    // Renewal signed by the issued certificate, without a challenge
    let current = Identity::new(issued, key).unwrap();
    store.add_identity(current.clone()).unwrap();
    let renewer = ScepRequester::new(RequestParameters::new(), store.clone());
    let new_key = rsa_key();
    let request = renewer
        .build_enrollment_request(
            &name("CN=renewing"),
            &new_key,
            Some(current.clone()),
            &ca_certs,
            &mut OsRng,
        )
        .unwrap();
    let rep = responder
        .certify(&request.message, &CertifyOptions::issue([2u8]), &mut OsRng)
        .unwrap();
    let renewed = verify_reply(&request.message, &rep.message, &ca_certs, store.as_ref()).unwrap();

    assert_eq!(
        renewed[0].tbs_certificate.subject_public_key_info,
        new_key.public_key_info().unwrap()
    );
    // A CA-issued signer is kept.
    assert!(store
        .find_identity(&IdentityMatcher::certificate(current.certificate()))
        .unwrap()
        .is_some());
}

#[test]
fn test_challenge_required_for_new_enrollment() {
    let ca = ca_identity("Strict CA");
    let responder = ScepResponder::new(ca.clone(), ResponderConfig::new().challenge("s3cret"));
    let (requester, _store) = requester();
    let request = requester
        .build_enrollment_request(
            &name("CN=device"),
            &rsa_key(),
            None,
            std::slice::from_ref(ca.certificate()),
            &mut OsRng,
        )
        .unwrap();

    let result = responder.certify(&request.message, &CertifyOptions::issue([1u8]), &mut OsRng);
    assert!(matches!(result, Err(ScepError::ChallengeMismatch)));
}

#[test]
fn test_ec_subject_key_not_issued() {
    let ca = ca_identity("RSA only CA");
    let responder = ScepResponder::new(ca.clone(), ResponderConfig::new());
    let (requester, _store) = requester();
    let request = requester
        .build_enrollment_request(
            &name("CN=ec-device"),
            &PrivateKey::generate_p256(&mut OsRng),
            None,
            std::slice::from_ref(ca.certificate()),
            &mut OsRng,
        )
        .unwrap();

    let result = responder.certify(&request.message, &CertifyOptions::issue([1u8]), &mut OsRng);
    assert!(matches!(result, Err(ScepError::UnsupportedSubjectAlgorithm(_))));

    // Pending does not look at the key.
    let rep = responder
        .certify(&request.message, &CertifyOptions::pending(), &mut OsRng)
        .unwrap();
    assert_eq!(rep.status, PkiStatus::Pending);
}

#[test]
fn test_algorithm_choices() {
    let ca = ca_identity("Algorithm CA");
    let responder = ScepResponder::new(ca.clone(), ResponderConfig::new());
    let store = std::sync::Arc::new(usg_scep::MemoryCredentialStore::new());
    let requester = ScepRequester::new(
        RequestParameters::new()
            .challenge_password(CHALLENGE)
            .encryption(EncryptionAlgorithm::Aes256Cbc)
            .digest(DigestAlgorithm::Sha512),
        store.clone(),
    );
    let request = requester
        .build_enrollment_request(
            &name("CN=algorithms"),
            &rsa_key(),
            None,
            std::slice::from_ref(ca.certificate()),
            &mut OsRng,
        )
        .unwrap();

    let options = CertifyOptions::issue([5u8])
        .digest(DigestAlgorithm::Sha1)
        .encryption(EncryptionAlgorithm::TripleDesCbc);
    let rep = responder
        .certify(&request.message, &options, &mut OsRng)
        .unwrap();

    let certs = verify_reply(
        &request.message,
        &rep.message,
        std::slice::from_ref(ca.certificate()),
        store.as_ref(),
    )
    .unwrap();
    assert_eq!(certs.len(), 1);
}

#[test]
fn test_reply_for_another_request() {
    let ca = ca_identity("Correlation CA");
    let responder = ScepResponder::new(ca.clone(), ResponderConfig::new());
    let (requester, store) = requester();
    let ca_certs = [ca.certificate().clone()];

    let first = requester
        .build_enrollment_request(&name("CN=first"), &rsa_key(), None, &ca_certs, &mut OsRng)
        .unwrap();
    let second = requester
        .build_enrollment_request(&name("CN=second"), &rsa_key(), None, &ca_certs, &mut OsRng)
        .unwrap();
    let rep = responder
        .certify(&first.message, &CertifyOptions::issue([1u8]), &mut OsRng)
        .unwrap();

    let result = verify_reply(&second.message, &rep.message, &ca_certs, store.as_ref());
    assert!(matches!(result, Err(ScepError::NonceMismatch)));
}
