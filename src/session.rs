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

//! Enrollment session state machine.
//!
//! An [`EnrollmentSession`] follows one enrollment from the initial PKCSReq
//! through any number of GetCertInitial polls to issuance or rejection:
//!
//! ```text
//! Building -> Sent -> Issued
//!               |  -> Rejected
//!               +---> Pending -> Sent (poll)
//! ```
//!
//! The transaction ID is fixed when the session starts and carried by
//! every poll. Scheduling polls and giving up are left to the caller.

use std::fmt;

use rand_core::CryptoRngCore;
use tracing::{debug, info};
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::error::{Result, ScepError};
use crate::identity::Identity;
use crate::keys::PrivateKey;
use crate::operations::reply::verify_reply;
use crate::operations::request::{PkiRequest, ScepRequester};
use crate::types::{FailInfo, TransactionId};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No request sent yet.
    Building,
    /// A request is outstanding.
    Sent,
    /// The server has not decided; poll to continue.
    Pending,
    /// Certificates were issued.
    Issued,
    /// The server refused the request.
    Rejected,
}

impl SessionState {
    /// True once the session cannot advance any further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Issued | Self::Rejected)
    }

    /// Name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Sent => "sent",
            Self::Pending => "pending",
            Self::Issued => "issued",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of handing a reply to a session.
#[derive(Debug, Clone)]
pub enum EnrollmentOutcome {
    /// Certificates were issued.
    Issued {
        /// The issued certificates.
        certificates: Vec<Certificate>,
    },

    /// The request is pending; call [`EnrollmentSession::poll`] later.
    Pending {
        /// Transaction to poll.
        transaction_id: TransactionId,
    },

    /// The server refused the request.
    Rejected {
        /// Failure reason reported by the server, if any.
        fail_info: Option<FailInfo>,
    },
}

/// One enrollment attempt.
#[derive(Debug)]
pub struct EnrollmentSession {
    requester: ScepRequester,
    subject: Name,
    state: SessionState,
    outstanding: Option<PkiRequest>,
    certificates: Vec<Certificate>,
}

impl EnrollmentSession {
    /// Create a session that will enroll `subject`.
    pub fn new(requester: ScepRequester, subject: Name) -> Self {
        Self {
            requester,
            subject,
            state: SessionState::Building,
            outstanding: None,
            certificates: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Subject being enrolled.
    pub fn subject(&self) -> &Name {
        &self.subject
    }

    /// Transaction ID, once the session has started.
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        self.outstanding.as_ref().map(|r| &r.transaction_id)
    }

    /// Identity signing this session's requests, once started.
    pub fn signer(&self) -> Option<&Identity> {
        self.outstanding.as_ref().map(|r| &r.signer)
    }

    /// The last request built, if any.
    pub fn last_request(&self) -> Option<&[u8]> {
        self.outstanding.as_ref().map(|r| r.message.as_slice())
    }

    /// Issued certificates (empty until the session is `Issued`).
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Build the PKCSReq. Only legal in `Building`.
    ///
    /// Returns the message to send.
    pub fn start<R: CryptoRngCore>(
        &mut self,
        private_key: &PrivateKey,
        signer: Option<Identity>,
        recipients: &[Certificate],
        rng: &mut R,
    ) -> Result<&[u8]> {
        self.expect_state(SessionState::Building, "start")?;

        let request = self.requester.build_enrollment_request(
            &self.subject,
            private_key,
            signer,
            recipients,
            rng,
        )?;
        debug!("Session {} started", request.transaction_id);
        Ok(self.send(request))
    }

    /// Process the reply to the outstanding request. Only legal in `Sent`.
    ///
    /// Pending and rejected replies are outcomes, not errors. Any error
    /// leaves the session in `Sent` so a correct reply can still be handled.
    pub fn handle_reply(
        &mut self,
        reply: &[u8],
        ca_certificates: &[Certificate],
    ) -> Result<EnrollmentOutcome> {
        self.expect_state(SessionState::Sent, "handle a reply")?;
        let request = self
            .outstanding
            .as_ref()
            .ok_or_else(|| ScepError::invalid_state("no outstanding request"))?;

        let result = verify_reply(
            &request.message,
            reply,
            ca_certificates,
            self.requester.store().as_ref(),
        );
        match result {
            Ok(certificates) => {
                info!("Session {} issued", request.transaction_id);
                self.state = SessionState::Issued;
                self.certificates = certificates.clone();
                Ok(EnrollmentOutcome::Issued { certificates })
            }
            Err(ScepError::Pending { transaction_id }) => {
                debug!("Session {} pending", transaction_id);
                self.state = SessionState::Pending;
                Ok(EnrollmentOutcome::Pending { transaction_id })
            }
            Err(ScepError::Rejected { fail_info }) => {
                info!("Session {} rejected", request.transaction_id);
                self.state = SessionState::Rejected;
                Ok(EnrollmentOutcome::Rejected { fail_info })
            }
            Err(e) => Err(e),
        }
    }

    /// Build a GetCertInitial poll. Only legal in `Pending`.
    ///
    /// `ca_certificate` is the issuing CA; the poll is encrypted to
    /// `recipients` like the initial request.
    pub fn poll<R: CryptoRngCore>(
        &mut self,
        ca_certificate: &Certificate,
        recipients: &[Certificate],
        rng: &mut R,
    ) -> Result<&[u8]> {
        self.expect_state(SessionState::Pending, "poll")?;
        let previous = self
            .outstanding
            .as_ref()
            .ok_or_else(|| ScepError::invalid_state("no outstanding request"))?;

        let request = self.requester.build_get_cert_initial(
            ca_certificate,
            &self.subject,
            &previous.transaction_id,
            &previous.signer,
            recipients,
            rng,
        )?;
        Ok(self.send(request))
    }

    fn send(&mut self, request: PkiRequest) -> &[u8] {
        self.state = SessionState::Sent;
        &self.outstanding.insert(request).message
    }

    fn expect_state(&self, expected: SessionState, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ScepError::invalid_state(format!(
                "cannot {action} in state {}, expected {expected}",
                self.state
            )))
        }
    }
}
