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

//! CA/RA-side handling of SCEP requests.
//!
//! [`ScepResponder`] verifies a PKCSReq, decides between issuing and
//! pending, and builds the signed CertRep. It also answers GetCertInitial
//! polls and can reject a request with a failure reason.

use der::Decode;
use rand_core::CryptoRngCore;
use tracing::{debug, info, warn};
use x509_cert::Certificate;

use crate::certificate::{is_signed_by, random_serial, CertificateBuilder};
use crate::config::ResponderConfig;
use crate::csr::{parse_csr, ParsedCsr};
use crate::digest::DigestAlgorithm;
use crate::enveloped::{envelope_decrypt, envelope_encrypt, EncryptionAlgorithm};
use crate::error::{Result, ScepError};
use crate::identity::Identity;
use crate::keys::{describe_key, KeyAlgorithm};
use crate::signed::{sign_data, verify_signed_data, CertChainMode, VerifiedMessage};
use crate::types::{
    create_certs_only, AttributeSet, FailInfo, IssuerAndSubject, MessageType, Nonce, PkiStatus,
    TransactionId,
};

/// Per-request issuance options.
///
/// Extensions from the CSR's extensionRequest are copied into the issued
/// certificate unfiltered, including basicConstraints. Callers that must not
/// issue CA certificates inspect the request before certifying it.
#[derive(Debug, Clone, Default)]
pub struct CertifyOptions {
    /// Serial number for the issued certificate. Empty means random.
    pub serial: Vec<u8>,
    /// Answer Pending instead of issuing.
    pub pend: bool,
    /// Signature digest; defaults to the responder configuration.
    pub digest: Option<DigestAlgorithm>,
    /// Content encryption; defaults to the responder configuration.
    pub encryption: Option<EncryptionAlgorithm>,
}

impl CertifyOptions {
    /// Issue a certificate with `serial`.
    pub fn issue(serial: impl Into<Vec<u8>>) -> Self {
        Self {
            serial: serial.into(),
            ..Self::default()
        }
    }

    /// Answer Pending.
    pub fn pending() -> Self {
        Self {
            pend: true,
            ..Self::default()
        }
    }

    /// Override the signature digest.
    pub fn digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = Some(digest);
        self
    }

    /// Override the content encryption algorithm.
    pub fn encryption(mut self, encryption: EncryptionAlgorithm) -> Self {
        self.encryption = Some(encryption);
        self
    }
}

/// A CertRep built by the responder.
#[derive(Debug, Clone)]
pub struct CertRep {
    /// DER SignedData to return to the client.
    pub message: Vec<u8>,
    /// Transaction the reply belongs to.
    pub transaction_id: TransactionId,
    /// Status carried in the reply.
    pub status: PkiStatus,
    /// Issued certificate on success.
    pub certificate: Option<Certificate>,
}

/// A verified GetCertInitial poll.
#[derive(Debug, Clone)]
pub struct PollRequest {
    /// Transaction being polled.
    pub transaction_id: TransactionId,
    /// Nonce to echo in the reply.
    pub sender_nonce: Nonce,
    /// Issuer and subject named by the client.
    pub issuer_and_subject: IssuerAndSubject,
    /// Certificate that signed the poll.
    pub signer: Certificate,
}

/// Answers SCEP requests with a CA identity.
///
/// Replies are signed by the CA unless an RA signing identity is set.
/// Requested extensions pass through to issued certificates unchanged.
#[derive(Debug, Clone)]
pub struct ScepResponder {
    identity: Identity,
    signer: Option<Identity>,
    decryption: Vec<Identity>,
    config: ResponderConfig,
}

/// The transaction and nonce a reply has to echo.
struct Correlation {
    transaction_id: TransactionId,
    sender_nonce: Nonce,
}

impl ScepResponder {
    /// Create a responder that issues and signs with `identity`.
    ///
    /// Requests encrypted to `identity` can be decrypted; add RA
    /// encryption identities with [`ScepResponder::with_decryption_identity`].
    pub fn new(identity: Identity, config: ResponderConfig) -> Self {
        Self {
            decryption: vec![identity.clone()],
            identity,
            signer: None,
            config,
        }
    }

    /// Accept requests encrypted to another identity (an RA encryption certificate).
    pub fn with_decryption_identity(mut self, identity: Identity) -> Self {
        self.decryption.push(identity);
        self
    }

    /// Sign replies with an RA identity instead of the CA.
    pub fn with_signing_identity(mut self, identity: Identity) -> Self {
        self.signer = Some(identity);
        self
    }

    /// The CA identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The identity replies are signed with.
    pub fn reply_signer(&self) -> &Identity {
        self.signer.as_ref().unwrap_or(&self.identity)
    }

    /// The responder configuration.
    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// Verify a PKCSReq and answer it.
    pub fn certify<R: CryptoRngCore>(
        &self,
        request: &[u8],
        options: &CertifyOptions,
        rng: &mut R,
    ) -> Result<CertRep> {
        let verified = verify_request(request)?;
        require_message_type(&verified.attributes, MessageType::PkcsReq)?;
        let correlation = correlation(&verified.attributes)?;
        debug!("Certifying transaction {}", correlation.transaction_id);

        self.answer(&verified, correlation, options, rng)
    }

    /// Verify a GetCertInitial poll.
    pub fn verify_get_cert_initial(&self, request: &[u8]) -> Result<PollRequest> {
        let verified = verify_request(request)?;
        require_message_type(&verified.attributes, MessageType::GetCertInitial)?;
        let Correlation {
            transaction_id,
            sender_nonce,
        } = correlation(&verified.attributes)?;

        let payload = self.decrypt(&verified.content)?;
        if payload.is_empty() {
            return Err(ScepError::invalid_request("empty GetCertInitial payload"));
        }
        let issuer_and_subject = IssuerAndSubject::from_der(&payload)
            .map_err(|e| ScepError::invalid_request(format!("malformed IssuerAndSubject: {e}")))?;

        debug!(
            "GetCertInitial for {} (transaction {})",
            issuer_and_subject.subject, transaction_id
        );

        Ok(PollRequest {
            transaction_id,
            sender_nonce,
            issuer_and_subject,
            signer: verified.signer,
        })
    }

    /// Answer a GetCertInitial poll for a request previously left pending.
    ///
    /// `original_request` is the PKCSReq the poll refers to. The reply
    /// echoes the poll's nonce; both messages must share a transaction.
    pub fn certify_poll<R: CryptoRngCore>(
        &self,
        poll: &[u8],
        original_request: &[u8],
        options: &CertifyOptions,
        rng: &mut R,
    ) -> Result<CertRep> {
        let poll = self.verify_get_cert_initial(poll)?;

        let verified = verify_request(original_request)?;
        require_message_type(&verified.attributes, MessageType::PkcsReq)?;
        let original = correlation(&verified.attributes)?;
        if original.transaction_id != poll.transaction_id {
            return Err(ScepError::TransactionIdMismatch {
                expected: original.transaction_id.to_string(),
                actual: poll.transaction_id.to_string(),
            });
        }

        self.answer(
            &verified,
            Correlation {
                transaction_id: poll.transaction_id,
                sender_nonce: poll.sender_nonce,
            },
            options,
            rng,
        )
    }

    /// Reject a PKCSReq or GetCertInitial with `fail_info`.
    pub fn reject<R: CryptoRngCore>(
        &self,
        request: &[u8],
        fail_info: FailInfo,
        rng: &mut R,
    ) -> Result<CertRep> {
        let verified = verify_request(request)?;
        match verified.attributes.message_type()? {
            Some(MessageType::PkcsReq | MessageType::GetCertInitial) => {}
            other => {
                return Err(ScepError::UnexpectedMessageType {
                    expected: MessageType::PkcsReq.to_string(),
                    actual: describe_message_type(other),
                })
            }
        }
        let correlation = correlation(&verified.attributes)?;
        info!(
            "Rejecting transaction {}: {}",
            correlation.transaction_id, fail_info
        );

        let mut attributes = self.reply_attributes(&correlation, PkiStatus::Failure, rng)?;
        attributes.set_fail_info(fail_info);
        let message = sign_data(
            &[],
            self.reply_signer(),
            &attributes,
            self.config.digest,
            CertChainMode::None,
        )?;

        Ok(CertRep {
            message,
            transaction_id: correlation.transaction_id,
            status: PkiStatus::Failure,
            certificate: None,
        })
    }

    fn answer<R: CryptoRngCore>(
        &self,
        verified: &VerifiedMessage,
        correlation: Correlation,
        options: &CertifyOptions,
        rng: &mut R,
    ) -> Result<CertRep> {
        let csr = parse_csr(&self.decrypt(&verified.content)?)?;

        let ca = self.identity.certificate();
        let recertify = is_signed_by(&verified.signer, &ca.tbs_certificate.subject_public_key_info);
        if recertify {
            debug!("Request signer is certified by this CA; skipping challenge");
        } else if csr.challenge.as_deref() != Some(self.config.challenge.as_str()) {
            warn!(
                "Challenge mismatch for transaction {}",
                correlation.transaction_id
            );
            return Err(ScepError::ChallengeMismatch);
        }

        let digest = options.digest.unwrap_or(self.config.digest);
        let (status, payload, certificate) = if options.pend {
            debug!("Leaving transaction {} pending", correlation.transaction_id);
            (PkiStatus::Pending, Vec::new(), None)
        } else {
            let serial = if options.serial.is_empty() {
                random_serial(rng)?
            } else {
                options.serial.clone()
            };
            let certificate = self.issue(csr, serial, digest)?;
            let certs_only = create_certs_only(std::slice::from_ref(&certificate))?;
            let encryption = options.encryption.unwrap_or(self.config.encryption);
            let payload = envelope_encrypt(&certs_only, &verified.signer, encryption, rng)?;
            (PkiStatus::Success, payload, Some(certificate))
        };

        let attributes = self.reply_attributes(&correlation, status, rng)?;
        let message = sign_data(
            &payload,
            self.reply_signer(),
            &attributes,
            digest,
            CertChainMode::None,
        )?;

        Ok(CertRep {
            message,
            transaction_id: correlation.transaction_id,
            status,
            certificate,
        })
    }

    fn issue(&self, csr: ParsedCsr, serial: Vec<u8>, digest: DigestAlgorithm) -> Result<Certificate> {
        if !KeyAlgorithm::of(&csr.public_key).is_some_and(|alg| alg.is_rsa()) {
            return Err(ScepError::UnsupportedSubjectAlgorithm(describe_key(
                &csr.public_key,
            )));
        }
        let subject = csr.subject.clone();
        let certificate = CertificateBuilder::new(csr.subject, csr.public_key)
            .serial_number(serial)
            .validity(self.config.validity)
            .extensions(csr.extensions)
            .digest(digest)
            .sign_with(self.identity.certificate(), self.identity.private_key())?;
        info!("Issued certificate for {}", subject);
        Ok(certificate)
    }

    fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        envelope_decrypt(envelope, &self.decryption)
            .map(|(payload, _)| payload)
            .map_err(|e| match e {
                ScepError::DecryptionFailed(_) => e,
                other => ScepError::decryption_failed(other.to_string()),
            })
    }

    fn reply_attributes<R: CryptoRngCore>(
        &self,
        correlation: &Correlation,
        status: PkiStatus,
        rng: &mut R,
    ) -> Result<AttributeSet> {
        let mut attributes = AttributeSet::new();
        attributes.set_transaction_id(&correlation.transaction_id)?;
        attributes.set_pki_status(status);
        attributes.set_message_type(MessageType::CertRep);
        attributes.set_recipient_nonce(&correlation.sender_nonce);
        attributes.set_sender_nonce(&Nonce::generate(rng)?);
        Ok(attributes)
    }
}

fn verify_request(request: &[u8]) -> Result<VerifiedMessage> {
    verify_signed_data(request, &[])
        .map_err(|e| ScepError::InvalidRequestSignature(e.to_string()))
}

fn require_message_type(attributes: &AttributeSet, expected: MessageType) -> Result<()> {
    let actual = attributes.message_type()?;
    if actual == Some(expected) {
        Ok(())
    } else {
        Err(ScepError::UnexpectedMessageType {
            expected: expected.to_string(),
            actual: describe_message_type(actual),
        })
    }
}

fn describe_message_type(message_type: Option<MessageType>) -> String {
    message_type.map_or_else(|| "none".to_string(), |t| t.to_string())
}

fn correlation(attributes: &AttributeSet) -> Result<Correlation> {
    let transaction_id = attributes
        .transaction_id()?
        .ok_or_else(|| ScepError::malformed_attribute("missing transactionID"))?;
    let sender_nonce = attributes
        .sender_nonce()?
        .ok_or_else(|| ScepError::malformed_attribute("missing senderNonce"))?;
    Ok(Correlation {
        transaction_id,
        sender_nonce,
    })
}
