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

//! # usg-scep
//!
//! SCEP (Simple Certificate Enrollment Protocol) message construction and
//! verification, and discovery of the CA and RA certificates a client
//! should use.
//!
//! The crate deals only in message bytes. Moving them to and from a SCEP
//! server (HTTP GET/POST) is left to the caller.
//!
//! ## Features
//!
//! - **PKCSReq construction** with a temporary self-signed signer when the
//!   client has no certificate yet
//! - **CertRep verification** with nonce and transaction checks, pending
//!   and failure handling
//! - **GetCertInitial polling** through [`EnrollmentSession`]
//! - **Responder** that verifies requests and issues, pends or rejects
//! - **CA/RA discovery** from a GetCACert certificate bag, optionally
//!   anchored by a CA fingerprint
//!
//! ## Enrollment
//!
//! ```no_run
//! use std::str::FromStr;
//! use std::sync::Arc;
//! use rand_core::OsRng;
//! use usg_scep::{
//!     validate_ca_certificates, EnrollmentOutcome, EnrollmentSession, MemoryCredentialStore,
//!     PrivateKey, RequestParameters, ScepRequester,
//! };
//! use x509_cert::name::Name;
//!
//! # fn example(ca_bag: &[x509_cert::Certificate], fp: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! // Find the CA and RA certificates in the GetCACert response
//! let ca = validate_ca_certificates(ca_bag, Some(fp))?;
//!
//! let requester = ScepRequester::new(
//!     RequestParameters::new().challenge_password("secret"),
//!     Arc::new(MemoryCredentialStore::new()),
//! );
//! let mut session = EnrollmentSession::new(requester, Name::from_str("CN=device")?);
//!
//! let key = PrivateKey::generate_rsa(&mut OsRng, 2048)?;
//! let request = session.start(&key, None, &ca.recipients(), &mut OsRng)?.to_vec();
//!
//! // Send `request` with PKIOperation and read the reply...
//! # let reply: Vec<u8> = Vec::new();
//! match session.handle_reply(&reply, &ca.reply_signers())? {
//!     EnrollmentOutcome::Issued { certificates } => {
//!         println!("Issued {} certificate(s)", certificates.len());
//!     }
//!     EnrollmentOutcome::Pending { transaction_id } => {
//!         println!("Pending, poll later with transaction {}", transaction_id);
//!     }
//!     EnrollmentOutcome::Rejected { fail_info } => {
//!         println!("Rejected: {:?}", fail_info);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Cargo Features
//!
//! - `cli` (default): the `scep-tool` binary and `logging::init_logging`

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod certificate;
pub mod config;
pub mod csr;
pub mod digest;
pub mod enveloped;
pub mod error;
pub mod identity;
pub mod keys;
pub mod logging;
pub mod operations;
pub mod session;
pub mod signed;
pub mod store;
pub mod types;
pub mod validation;

pub(crate) mod oids;

// Re-export main types at crate root for convenience
pub use certificate::{CertificateBuilder, KeyUsageFlags};
pub use config::{RequestParameters, ResponderConfig, ScepConfig};
pub use digest::DigestAlgorithm;
pub use enveloped::EncryptionAlgorithm;
pub use error::{Result, ScepError};
pub use identity::Identity;
pub use keys::PrivateKey;
pub use operations::{
    validate_ca_certificates, verify_reply, CaCertificateSet, CertRep, CertifyOptions,
    PkiRequest, PollRequest, ScepRequester, ScepResponder,
};
pub use session::{EnrollmentOutcome, EnrollmentSession, SessionState};
pub use store::{CredentialStore, IdentityMatcher, MemoryCredentialStore};
pub use types::{
    AttributeSet, CaCertificates, FailInfo, IssuerAndSubject, MessageType, Nonce, PkiStatus,
    ProtocolAttribute, TransactionId,
};

// Re-export x509_cert::Certificate for convenience
pub use x509_cert::Certificate;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
