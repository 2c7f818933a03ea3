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

//! Integration tests for enrollment sessions with GetCertInitial polling

use crate::integration::{name, requester, rsa_key, RaPki};
use rand_core::OsRng;
use usg_scep::{
    validate_ca_certificates, CertifyOptions, EnrollmentOutcome, EnrollmentSession, FailInfo,
    ResponderConfig, ScepError, ScepResponder, SessionState,
};

#[test]
fn test_poll_until_issued_through_ra() {
    let pki = RaPki::new();
    let set = validate_ca_certificates(&pki.bag(), None).unwrap();
    let responder = ScepResponder::new(pki.ca.clone(), ResponderConfig::new())
        .with_decryption_identity(pki.ra_encryption.clone())
        .with_signing_identity(pki.ra_signing.clone());

    let (requester, store) = requester();
    let mut session = EnrollmentSession::new(requester, name("CN=polled"));
    let key = rsa_key();
    let initial = session
        .start(&key, None, &set.recipients(), &mut OsRng)
        .unwrap()
        .to_vec();
    let transaction_id = session.transaction_id().cloned().unwrap();

    let rep = responder
        .certify(&initial, &CertifyOptions::pending(), &mut OsRng)
        .unwrap();
    let mut outcome = session.handle_reply(&rep.message, &set.reply_signers()).unwrap();
    assert!(matches!(
        &outcome,
        EnrollmentOutcome::Pending { transaction_id: id } if *id == transaction_id
    ));

    // Still pending after the first poll, issued after the second.
    for options in [CertifyOptions::pending(), CertifyOptions::issue([0x10u8])] {
        assert_eq!(session.state(), SessionState::Pending);
        let poll = session
            .poll(&set.ca, &set.recipients(), &mut OsRng)
            .unwrap()
            .to_vec();
        assert_eq!(session.transaction_id(), Some(&transaction_id));

        let polled = responder.verify_get_cert_initial(&poll).unwrap();
        assert_eq!(polled.transaction_id, transaction_id);
        assert_eq!(polled.issuer_and_subject.issuer, set.ca.tbs_certificate.subject);
        assert_eq!(polled.issuer_and_subject.subject, name("CN=polled"));

        let rep = responder
            .certify_poll(&poll, &initial, &options, &mut OsRng)
            .unwrap();
        outcome = session.handle_reply(&rep.message, &set.reply_signers()).unwrap();
    }

    let certificates = match outcome {
        EnrollmentOutcome::Issued { certificates } => certificates,
        other => panic!("expected issuance, got {other:?}"),
    };
    assert_eq!(
        certificates[0].tbs_certificate.subject_public_key_info,
        key.public_key_info().unwrap()
    );
    assert_eq!(session.state(), SessionState::Issued);
    assert_eq!(session.certificates(), certificates.as_slice());
    assert!(store.is_empty());
}

#[test]
fn test_rejected_session_is_terminal() {
    let pki = RaPki::new();
    let set = validate_ca_certificates(&pki.bag(), None).unwrap();
    let responder = ScepResponder::new(pki.ca.clone(), ResponderConfig::new())
        .with_decryption_identity(pki.ra_encryption.clone())
        .with_signing_identity(pki.ra_signing.clone());

    let (requester, _store) = requester();
    let mut session = EnrollmentSession::new(requester, name("CN=refused"));
    let request = session
        .start(&rsa_key(), None, &set.recipients(), &mut OsRng)
        .unwrap()
        .to_vec();

    let rep = responder
        .reject(&request, FailInfo::BadRequest, &mut OsRng)
        .unwrap();
    let outcome = session.handle_reply(&rep.message, &set.reply_signers()).unwrap();

    assert!(matches!(
        outcome,
        EnrollmentOutcome::Rejected {
            fail_info: Some(FailInfo::BadRequest)
        }
    ));
    assert_eq!(session.state(), SessionState::Rejected);
    assert!(session.state().is_terminal());
    assert!(matches!(
        session.poll(&set.ca, &set.recipients(), &mut OsRng),
        Err(ScepError::InvalidState(_))
    ));
}

#[test]
fn test_poll_for_unknown_transaction() {
    let pki = RaPki::new();
    let set = validate_ca_certificates(&pki.bag(), None).unwrap();
    let responder = ScepResponder::new(pki.ca.clone(), ResponderConfig::new())
        .with_decryption_identity(pki.ra_encryption.clone());

    let (requester, _store) = requester();
    let mut first = EnrollmentSession::new(requester.clone(), name("CN=first"));
    let first_request = first
        .start(&rsa_key(), None, &set.recipients(), &mut OsRng)
        .unwrap()
        .to_vec();
    let rep = responder
        .certify(&first_request, &CertifyOptions::pending(), &mut OsRng)
        .unwrap();
    first.handle_reply(&rep.message, &[set.ca.clone()]).unwrap();
    let poll = first
        .poll(&set.ca, &set.recipients(), &mut OsRng)
        .unwrap()
        .to_vec();

    let mut second = EnrollmentSession::new(requester, name("CN=second"));
    let second_request = second
        .start(&rsa_key(), None, &set.recipients(), &mut OsRng)
        .unwrap()
        .to_vec();

    let result = responder.certify_poll(
        &poll,
        &second_request,
        &CertifyOptions::issue([1u8]),
        &mut OsRng,
    );
    assert!(matches!(result, Err(ScepError::TransactionIdMismatch { .. })));
}
