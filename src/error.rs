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

//! Error types for SCEP message handling.
//!
//! Every public operation in this crate returns exactly one [`ScepError`]
//! kind on failure. Failures reported by the underlying ASN.1, key and
//! cipher libraries are translated into these kinds at the point where the
//! protocol step that invoked them is known.

use crate::types::{FailInfo, TransactionId};
use thiserror::Error;

/// Result type alias using [`ScepError`].
pub type Result<T> = std::result::Result<T, ScepError>;

/// Errors that can occur while building, answering or verifying SCEP messages.
#[derive(Debug, Error)]
pub enum ScepError {
    /// A protocol attribute value could not be decoded.
    #[error("Malformed attribute: {0}")]
    MalformedAttribute(String),

    /// The secure random source failed.
    #[error("Secure randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    /// No recipient certificate is usable for the encryption envelope.
    #[error("No encryption recipient available")]
    NoEncryptionRecipient,

    /// The chosen recipient certificate does not carry an RSA key.
    #[error("Unsupported recipient key algorithm: {0}")]
    UnsupportedRecipientAlgorithm(String),

    /// No signing identity could be obtained or persisted.
    #[error("Signer unavailable: {0}")]
    SignerUnavailable(String),

    /// The signature on an incoming request did not verify.
    #[error("Invalid request signature: {0}")]
    InvalidRequestSignature(String),

    /// The message carries a messageType other than the one required.
    #[error("Unexpected message type: expected {expected}, got {actual}")]
    UnexpectedMessageType {
        /// Message type required by the operation.
        expected: String,
        /// Message type found in the signed attributes.
        actual: String,
    },

    /// The enveloped payload could not be decrypted.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// The embedded certificate request could not be parsed or verified.
    #[error("Invalid certificate request: {0}")]
    InvalidCertificateRequest(String),

    /// The challenge password did not match the expected value.
    #[error("Challenge password mismatch")]
    ChallengeMismatch,

    /// The requested subject key algorithm cannot be certified.
    #[error("Unsupported subject key algorithm: {0}")]
    UnsupportedSubjectAlgorithm(String),

    /// The signature on a reply did not verify against the expected signer.
    #[error("Invalid reply signature: {0}")]
    InvalidReplySignature(String),

    /// The reply carried a pkiStatus this client does not accept.
    #[error("Unexpected PKI status: {0}")]
    UnexpectedStatus(String),

    /// The reply did not contain any certificates.
    #[error("No certificates in reply")]
    NoCertificatesInReply,

    /// No CA/RA certificate was supplied to check the reply against.
    #[error("No reply signer certificate available")]
    NoReplySigner,

    /// The fingerprint length does not identify a known digest algorithm.
    #[error("Invalid digest algorithm: {0}")]
    InvalidDigestAlgorithm(String),

    /// The candidate certificates do not provide the required key usages.
    #[error("Key usage incorrect: {0}")]
    KeyUsageIncorrect(String),

    /// No trusted chain could be established.
    #[error("Not trusted: {0}")]
    NotTrusted(String),

    /// An internal invariant failed or no chain could be built.
    #[error("Internal error: {0}")]
    InternalError(String),

    /// The server has not decided yet. Poll again with the same transaction.
    #[error("Enrollment pending (transaction {transaction_id})")]
    Pending {
        /// Transaction to use for GetCertInitial polling.
        transaction_id: TransactionId,
    },

    /// The server rejected the request.
    #[error("Enrollment rejected{}", rejection_suffix(.fail_info))]
    Rejected {
        /// Failure reason reported by the server, if any.
        fail_info: Option<FailInfo>,
    },

    /// The reply's recipientNonce does not echo the request's senderNonce.
    #[error("Recipient nonce does not match the request sender nonce")]
    NonceMismatch,

    /// The reply belongs to a different transaction.
    #[error("Transaction ID mismatch: expected {expected}, got {actual}")]
    TransactionIdMismatch {
        /// Transaction ID of the request.
        expected: String,
        /// Transaction ID found in the reply.
        actual: String,
    },

    /// An identity with the same issuer and serial number is already stored.
    #[error("Duplicate identity: {0}")]
    DuplicateIdentity(String),

    /// No stored identity matched.
    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    /// An enrollment session operation is not legal in the current state.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// ASN.1 DER encoding or decoding error.
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// Base64 decoding error.
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn rejection_suffix(fail_info: &Option<FailInfo>) -> String {
    match fail_info {
        Some(info) => format!(": {info}"),
        None => String::new(),
    }
}

impl ScepError {
    /// Create a malformed attribute error.
    pub fn malformed_attribute(msg: impl Into<String>) -> Self {
        Self::MalformedAttribute(msg.into())
    }

    /// Create a randomness error.
    pub fn randomness(msg: impl Into<String>) -> Self {
        Self::RandomnessUnavailable(msg.into())
    }

    /// Create a signer unavailable error.
    pub fn signer_unavailable(msg: impl Into<String>) -> Self {
        Self::SignerUnavailable(msg.into())
    }

    /// Create a decryption error.
    pub fn decryption_failed(msg: impl Into<String>) -> Self {
        Self::DecryptionFailed(msg.into())
    }

    /// Create an invalid certificate request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidCertificateRequest(msg.into())
    }

    /// Create a not trusted error.
    pub fn not_trusted(msg: impl Into<String>) -> Self {
        Self::NotTrusted(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid session state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Returns true if the caller should poll again later.
    ///
    /// Only a pending reply is retryable. Everything else is terminal for
    /// the message that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Returns true if this is a pending reply.
    pub fn is_pending(&self) -> bool {
        self.is_retryable()
    }

    /// Transaction ID carried by a pending reply.
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        match self {
            Self::Pending { transaction_id } => Some(transaction_id),
            _ => None,
        }
    }

    /// Failure reason carried by a rejection.
    pub fn fail_info(&self) -> Option<FailInfo> {
        match self {
            Self::Rejected { fail_info } => *fail_info,
            _ => None,
        }
    }
}
