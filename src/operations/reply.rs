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

//! Client-side verification of CertRep messages.

use tracing::{debug, info, warn};
use x509_cert::Certificate;

use crate::certificate::is_self_issued;
use crate::enveloped::envelope_decrypt;
use crate::error::{Result, ScepError};
use crate::signed::verify_signed_data;
use crate::store::{CredentialStore, IdentityMatcher};
use crate::types::{parse_certs_only, MessageType, PkiStatus};

/// Pick the certificate a reply must be signed by.
///
/// With several certificates the second one (the RA, after the CA) signs
/// replies; a single certificate signs them itself.
pub fn select_reply_signer(ca_certificates: &[Certificate]) -> Result<&Certificate> {
    match ca_certificates {
        [] => Err(ScepError::NoReplySigner),
        [only] => Ok(only),
        [_, ra, ..] => Ok(ra),
    }
}

/// Verify a CertRep against the request it answers and return the issued certificates.
///
/// `ca_certificates` lists the CA and, when one is used, the RA signing
/// certificate (see [`CaCertificateSet::reply_signers`]). The identity that
/// signed `request` must be in `store`; it decrypts the reply and, if it
/// was a temporary self-signed identity, is removed afterwards.
///
/// A Pending reply is returned as [`ScepError::Pending`] and a Failure
/// reply as [`ScepError::Rejected`]. A reply with neither messageType nor
/// pkiStatus is decrypted without the CertRep checks.
///
/// [`CaCertificateSet::reply_signers`]: crate::operations::CaCertificateSet::reply_signers
pub fn verify_reply(
    request: &[u8],
    reply: &[u8],
    ca_certificates: &[Certificate],
    store: &dyn CredentialStore,
) -> Result<Vec<Certificate>> {
    let expected_signer = select_reply_signer(ca_certificates)?;

    let request = verify_signed_data(request, &[])
        .map_err(|e| ScepError::internal(format!("cannot read request: {e}")))?;
    let request_transaction = request
        .attributes
        .transaction_id()?
        .ok_or_else(|| ScepError::malformed_attribute("request has no transactionID"))?;
    let request_nonce = request
        .attributes
        .sender_nonce()?
        .ok_or_else(|| ScepError::malformed_attribute("request has no senderNonce"))?;

    let verified = verify_signed_data(reply, std::slice::from_ref(expected_signer))
        .map_err(|e| ScepError::InvalidReplySignature(e.to_string()))?;
    if verified.signer != *expected_signer {
        return Err(ScepError::InvalidReplySignature(format!(
            "reply signed by {}, expected {}",
            verified.signer.tbs_certificate.subject, expected_signer.tbs_certificate.subject
        )));
    }
    let attributes = &verified.attributes;

    let message_type = attributes.message_type()?;
    let status = attributes.pki_status()?;
    if (message_type.is_some() || status.is_some()) && message_type != Some(MessageType::CertRep) {
        return Err(ScepError::UnexpectedMessageType {
            expected: MessageType::CertRep.to_string(),
            actual: message_type.map_or_else(|| "none".to_string(), |t| t.to_string()),
        });
    }

    match attributes.recipient_nonce()? {
        Some(nonce) if nonce == request_nonce => {}
        _ => return Err(ScepError::NonceMismatch),
    }
    let transaction_id = match attributes.transaction_id()? {
        Some(id) if id == request_transaction => id,
        Some(id) => {
            return Err(ScepError::TransactionIdMismatch {
                expected: request_transaction.to_string(),
                actual: id.to_string(),
            })
        }
        None => {
            return Err(ScepError::TransactionIdMismatch {
                expected: request_transaction.to_string(),
                actual: "none".to_string(),
            })
        }
    };

    // Replies without messageType and pkiStatus go straight to decryption.
    match status {
        Some(PkiStatus::Success) => {}
        None if message_type.is_none() => {
            debug!("Reply carries no messageType or pkiStatus");
        }
        Some(PkiStatus::Pending) => {
            debug!("Transaction {} is pending", transaction_id);
            return Err(ScepError::Pending { transaction_id });
        }
        Some(PkiStatus::Failure) => {
            let fail_info = attributes.fail_info().unwrap_or_else(|e| {
                warn!("Ignoring unreadable failInfo: {}", e);
                None
            });
            return Err(ScepError::Rejected { fail_info });
        }
        None => return Err(ScepError::UnexpectedStatus("none".to_string())),
    }

    let matcher = IdentityMatcher::certificate(&request.signer);
    let identity = store
        .find_identity(&matcher)?
        .ok_or_else(|| ScepError::decryption_failed("no stored identity for the request signer"))?;
    let (payload, recipient) = envelope_decrypt(&verified.content, std::slice::from_ref(&identity))
        .map_err(|e| match e {
            ScepError::DecryptionFailed(_) => e,
            other => ScepError::decryption_failed(other.to_string()),
        })?;

    let certificates = parse_certs_only(&payload).map_err(|e| {
        debug!("Reply payload is not a certs-only message: {}", e);
        ScepError::NoCertificatesInReply
    })?;
    if certificates.is_empty() {
        return Err(ScepError::NoCertificatesInReply);
    }

    if is_self_issued(recipient.certificate()) {
        if let Err(e) = store.delete_identity(&IdentityMatcher::certificate(recipient.certificate()))
        {
            warn!("Failed to remove temporary identity: {}", e);
        }
    }

    info!(
        "Received {} certificate(s) for transaction {}",
        certificates.len(),
        transaction_id
    );
    Ok(certificates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{CertificateBuilder, KeyUsageFlags};
    use crate::config::{RequestParameters, ResponderConfig};
    use crate::digest::DigestAlgorithm;
    use crate::enveloped::{envelope_encrypt, EncryptionAlgorithm};
    use crate::identity::Identity;
    use crate::keys::PrivateKey;
    use crate::operations::certify::{CertifyOptions, ScepResponder};
    use crate::operations::request::{PkiRequest, ScepRequester};
    use crate::signed::{sign_data, CertChainMode};
    use crate::store::MemoryCredentialStore;
    use crate::types::{create_certs_only, AttributeSet, FailInfo, Nonce};
    use rand_core::OsRng;
    use std::str::FromStr;
    use std::sync::Arc;
    use x509_cert::name::Name;

    struct Fixture {
        ca: Identity,
        responder: ScepResponder,
        store: Arc<MemoryCredentialStore>,
        request: PkiRequest,
    }

    fn fixture() -> Fixture {
        let key = PrivateKey::generate_rsa(&mut OsRng, 1024).unwrap();
        let cert = CertificateBuilder::new(
            Name::from_str("CN=Reply CA").unwrap(),
            key.public_key_info().unwrap(),
        )
        .ca(true)
        .self_sign(&key)
        .unwrap();
        let ca = Identity::new(cert, key).unwrap();

        let store = Arc::new(MemoryCredentialStore::new());
        let requester = ScepRequester::new(
            RequestParameters::new().challenge_password("magic"),
            store.clone(),
        );
        let key = PrivateKey::generate_rsa(&mut OsRng, 1024).unwrap();
        let request = requester
            .build_enrollment_request(
                &Name::from_str("CN=device").unwrap(),
                &key,
                None,
                std::slice::from_ref(ca.certificate()),
                &mut OsRng,
            )
            .unwrap();

        Fixture {
            responder: ScepResponder::new(ca.clone(), ResponderConfig::new()),
            ca,
            store,
            request,
        }
    }

    #[test]
    fn test_select_reply_signer() {
        assert!(matches!(
            select_reply_signer(&[]),
            Err(ScepError::NoReplySigner)
        ));
    }

    #[test]
    fn test_verify_reply_success_removes_temporary_identity() {
        let f = fixture();
        let rep = f
            .responder
            .certify(&f.request.message, &CertifyOptions::issue([2u8]), &mut OsRng)
            .unwrap();

        assert_eq!(f.store.len(), 1);
        let certs = verify_reply(
            &f.request.message,
            &rep.message,
            std::slice::from_ref(f.ca.certificate()),
            f.store.as_ref(),
        )
        .unwrap();

        assert_eq!(certs, vec![rep.certificate.unwrap()]);
        assert!(f.store.is_empty());
    }

    #[test]
    fn test_verify_reply_pending() {
        let f = fixture();
        let rep = f
            .responder
            .certify(&f.request.message, &CertifyOptions::pending(), &mut OsRng)
            .unwrap();

        let err = verify_reply(
            &f.request.message,
            &rep.message,
            std::slice::from_ref(f.ca.certificate()),
            f.store.as_ref(),
        )
        .unwrap_err();

        assert_eq!(err.transaction_id(), Some(&f.request.transaction_id));
        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn test_verify_reply_rejected() {
        let f = fixture();
        let rep = f
            .responder
            .reject(&f.request.message, FailInfo::BadCertId, &mut OsRng)
            .unwrap();

        let err = verify_reply(
            &f.request.message,
            &rep.message,
            std::slice::from_ref(f.ca.certificate()),
            f.store.as_ref(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ScepError::Rejected {
                fail_info: Some(FailInfo::BadCertId)
            }
        ));
    }

    #[test]
    fn test_verify_reply_wrong_signer() {
        let f = fixture();
        let other = fixture();
        let rep = f
            .responder
            .certify(&f.request.message, &CertifyOptions::issue([2u8]), &mut OsRng)
            .unwrap();

        let err = verify_reply(
            &f.request.message,
            &rep.message,
            std::slice::from_ref(other.ca.certificate()),
            f.store.as_ref(),
        )
        .unwrap_err();
        assert!(matches!(err, ScepError::InvalidReplySignature(_)));
    }

    #[test]
    fn test_verify_reply_nonce_mismatch() {
        let f = fixture();

        let mut attributes = AttributeSet::new();
        attributes
            .set_transaction_id(&f.request.transaction_id)
            .unwrap();
        attributes.set_message_type(MessageType::CertRep);
        attributes.set_pki_status(PkiStatus::Pending);
        attributes.set_recipient_nonce(&Nonce::generate(&mut OsRng).unwrap());
        let reply = sign_data(
            &[],
            &f.ca,
            &attributes,
            DigestAlgorithm::Sha256,
            CertChainMode::None,
        )
        .unwrap();

        let err = verify_reply(
            &f.request.message,
            &reply,
            std::slice::from_ref(f.ca.certificate()),
            f.store.as_ref(),
        )
        .unwrap_err();
        assert!(matches!(err, ScepError::NonceMismatch));
    }

    #[test]
    fn test_verify_reply_without_type_or_status_decrypts() {
        let f = fixture();
        let issued = f.ca.certificate().clone();
        let payload = create_certs_only(std::slice::from_ref(&issued)).unwrap();
        let envelope = envelope_encrypt(
            &payload,
            f.request.signer.certificate(),
            EncryptionAlgorithm::Aes128Cbc,
            &mut OsRng,
        )
        .unwrap();

        let mut attributes = AttributeSet::new();
        attributes
            .set_transaction_id(&f.request.transaction_id)
            .unwrap();
        attributes.set_recipient_nonce(&f.request.sender_nonce);
        let reply = sign_data(
            &envelope,
            &f.ca,
            &attributes,
            DigestAlgorithm::Sha256,
            CertChainMode::None,
        )
        .unwrap();

        let certs = verify_reply(
            &f.request.message,
            &reply,
            std::slice::from_ref(f.ca.certificate()),
            f.store.as_ref(),
        )
        .unwrap();
        assert_eq!(certs, vec![issued]);
    }

    #[test]
    fn test_verify_reply_wrong_message_type() {
        let f = fixture();

        let mut attributes = AttributeSet::new();
        attributes.set_message_type(MessageType::PkcsReq);
        attributes.set_pki_status(PkiStatus::Success);
        let reply = sign_data(
            &[],
            &f.ca,
            &attributes,
            DigestAlgorithm::Sha256,
            CertChainMode::None,
        )
        .unwrap();

        let err = verify_reply(
            &f.request.message,
            &reply,
            std::slice::from_ref(f.ca.certificate()),
            f.store.as_ref(),
        )
        .unwrap_err();
        assert!(matches!(err, ScepError::UnexpectedMessageType { .. }));
    }
}
