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

//! Credential storage for signing identities.
//!
//! Enrollment adds a temporary identity before the request is sent and
//! removes it once the reply has been decrypted. The store is the only
//! state shared between concurrent enrollments, so implementations must be
//! safe to use from several threads.

mod memory;

pub use memory::MemoryCredentialStore;

use cms::cert::IssuerAndSerialNumber;

use crate::error::Result;
use crate::identity::{issuer_and_serial, Identity};
use x509_cert::Certificate;

/// Selects identities in a [`CredentialStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityMatcher {
    /// Match the certificate's issuer and serial number.
    IssuerAndSerial(IssuerAndSerialNumber),
    /// Match the identity label.
    Label(String),
}

impl IdentityMatcher {
    /// Match the identity holding `cert`.
    pub fn certificate(cert: &Certificate) -> Self {
        Self::IssuerAndSerial(issuer_and_serial(cert))
    }

    /// Returns true if `identity` is selected.
    pub fn matches(&self, identity: &Identity) -> bool {
        match self {
            Self::IssuerAndSerial(ias) => identity.issuer_and_serial() == *ias,
            Self::Label(label) => identity.label() == Some(label.as_str()),
        }
    }
}

/// Storage for identities used to sign requests and decrypt replies.
pub trait CredentialStore: Send + Sync {
    /// Add an identity.
    ///
    /// Fails with `DuplicateIdentity` if an identity with the same issuer
    /// and serial number is already present.
    fn add_identity(&self, identity: Identity) -> Result<()>;

    /// Find the first identity selected by `matcher`.
    fn find_identity(&self, matcher: &IdentityMatcher) -> Result<Option<Identity>>;

    /// Delete every identity selected by `matcher`.
    ///
    /// Fails with `IdentityNotFound` if nothing matched.
    fn delete_identity(&self, matcher: &IdentityMatcher) -> Result<()>;

    /// All stored identities.
    fn identities(&self) -> Result<Vec<Identity>>;
}
