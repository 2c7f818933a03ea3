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

//! Client-side request construction.
//!
//! A SCEP request is a PKCS#10 CSR (or, for polling, an issuer/subject
//! pair) encrypted to the CA/RA and then signed together with the
//! protocol attributes. A client without a certificate signs with a
//! temporary self-signed identity that is stored so the reply, which is
//! encrypted back to that identity, can be decrypted later.

use std::sync::Arc;

use der::Encode;
use rand_core::CryptoRngCore;
use tracing::{debug, info};
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::certificate::key_usage;
use crate::certificate::KeyUsageFlags;
use crate::config::RequestParameters;
use crate::csr::CsrBuilder;
use crate::enveloped::envelope_encrypt;
use crate::error::{Result, ScepError};
use crate::identity::Identity;
use crate::keys::{describe_key, KeyAlgorithm, PrivateKey};
use crate::signed::{sign_data, CertChainMode};
use crate::store::CredentialStore;
use crate::types::{AttributeSet, IssuerAndSubject, MessageType, Nonce, TransactionId};

/// A signed request ready to be sent, with the values needed to check its reply.
#[derive(Debug, Clone)]
pub struct PkiRequest {
    /// DER SignedData to hand to the transport.
    pub message: Vec<u8>,
    /// Transaction the request belongs to.
    pub transaction_id: TransactionId,
    /// Nonce the reply must echo.
    pub sender_nonce: Nonce,
    /// Identity that signed the request and will decrypt the reply.
    pub signer: Identity,
}

/// Builds PKCSReq and GetCertInitial messages.
#[derive(Clone)]
pub struct ScepRequester {
    params: RequestParameters,
    store: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for ScepRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScepRequester")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ScepRequester {
    /// Create a requester that keeps temporary identities in `store`.
    pub fn new(params: RequestParameters, store: Arc<dyn CredentialStore>) -> Self {
        Self { params, store }
    }

    /// The request parameters.
    pub fn params(&self) -> &RequestParameters {
        &self.params
    }

    /// The credential store.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Build a PKCSReq for `subject` over the public half of `private_key`.
    ///
    /// The CSR is encrypted to the first RSA certificate among the
    /// keyEncipherment-capable `recipients`. Without a `signer`, a
    /// temporary self-signed identity is created and added to the store.
    pub fn build_enrollment_request<R: CryptoRngCore>(
        &self,
        subject: &Name,
        private_key: &PrivateKey,
        signer: Option<Identity>,
        recipients: &[Certificate],
        rng: &mut R,
    ) -> Result<PkiRequest> {
        let recipient = select_recipient(recipients)?;

        let mut csr = CsrBuilder::new()
            .subject(subject.clone())
            .digest(self.params.digest);
        if let Some(password) = &self.params.challenge_password {
            csr = csr.challenge_password(password.clone());
        }
        if let Some(ku) = self.params.key_usage {
            csr = csr.key_usage(ku);
        }
        let csr = csr.build(private_key)?;

        let envelope = envelope_encrypt(&csr, recipient, self.params.encryption, rng)?;

        let transaction_id = TransactionId::derive(&private_key.public_key_info()?);
        let sender_nonce = Nonce::generate(rng)?;
        let mut attributes = AttributeSet::new();
        attributes.set_transaction_id(&transaction_id)?;
        attributes.set_message_type(MessageType::PkcsReq);
        attributes.set_sender_nonce(&sender_nonce);

        let signer = match signer {
            Some(identity) => identity,
            None => self.create_temporary_identity(private_key, rng)?,
        };

        let message = sign_data(
            &envelope,
            &signer,
            &attributes,
            self.params.digest,
            CertChainMode::Signer,
        )?;

        info!(
            "Built PKCSReq for {} (transaction {})",
            subject, transaction_id
        );

        Ok(PkiRequest {
            message,
            transaction_id,
            sender_nonce,
            signer,
        })
    }

    /// Build a GetCertInitial poll for a pending enrollment.
    ///
    /// `ca_certificate` names the issuer; `transaction_id` must be the one
    /// of the original PKCSReq.
    pub fn build_get_cert_initial<R: CryptoRngCore>(
        &self,
        ca_certificate: &Certificate,
        subject: &Name,
        transaction_id: &TransactionId,
        signer: &Identity,
        recipients: &[Certificate],
        rng: &mut R,
    ) -> Result<PkiRequest> {
        let recipient = select_recipient(recipients)?;

        let content = IssuerAndSubject {
            issuer: ca_certificate.tbs_certificate.subject.clone(),
            subject: subject.clone(),
        }
        .to_der()?;
        let envelope = envelope_encrypt(&content, recipient, self.params.encryption, rng)?;

        let sender_nonce = Nonce::generate(rng)?;
        let mut attributes = AttributeSet::new();
        attributes.set_transaction_id(transaction_id)?;
        attributes.set_message_type(MessageType::GetCertInitial);
        attributes.set_sender_nonce(&sender_nonce);

        let message = sign_data(
            &envelope,
            signer,
            &attributes,
            self.params.digest,
            CertChainMode::Signer,
        )?;

        debug!("Built GetCertInitial for transaction {}", transaction_id);

        Ok(PkiRequest {
            message,
            transaction_id: transaction_id.clone(),
            sender_nonce,
            signer: signer.clone(),
        })
    }

    fn create_temporary_identity<R: CryptoRngCore>(
        &self,
        private_key: &PrivateKey,
        rng: &mut R,
    ) -> Result<Identity> {
        let identity = Identity::temporary(private_key.clone(), rng).map_err(|e| match e {
            ScepError::RandomnessUnavailable(_) | ScepError::SignerUnavailable(_) => e,
            other => ScepError::signer_unavailable(other.to_string()),
        })?;
        self.store
            .add_identity(identity.clone())
            .map_err(|e| ScepError::signer_unavailable(format!("failed to store identity: {e}")))?;
        debug!(
            "Created temporary signing identity {}",
            identity.label().unwrap_or_default()
        );
        Ok(identity)
    }
}

/// Pick the certificate to encrypt a request to.
///
/// Certificates allowed to encipher keys are preferred (a certificate
/// without a keyUsage extension counts as allowed); if none is, every
/// certificate is considered. The first RSA certificate wins.
pub fn select_recipient(recipients: &[Certificate]) -> Result<&Certificate> {
    let capable: Vec<&Certificate> = recipients
        .iter()
        .filter(|cert| match key_usage(cert) {
            Ok(Some(ku)) => ku.contains(KeyUsageFlags::KEY_ENCIPHERMENT),
            Ok(None) => true,
            Err(_) => false,
        })
        .collect();
    let candidates: Vec<&Certificate> = if capable.is_empty() {
        recipients.iter().collect()
    } else {
        capable
    };

    let first = candidates
        .first()
        .copied()
        .ok_or(ScepError::NoEncryptionRecipient)?;

    candidates
        .iter()
        .copied()
        .find(|cert| {
            KeyAlgorithm::of(&cert.tbs_certificate.subject_public_key_info)
                .is_some_and(|alg| alg.is_rsa())
        })
        .ok_or_else(|| {
            ScepError::UnsupportedRecipientAlgorithm(describe_key(
                &first.tbs_certificate.subject_public_key_info,
            ))
        })
}
