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

//! In-memory credential store.
//!
//! Identities live in process memory and are lost when the store is
//! dropped. Suitable for tests, short-lived tools and CA simulators.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::{CredentialStore, IdentityMatcher};
use crate::error::{Result, ScepError};
use crate::identity::Identity;

/// Thread-safe in-memory [`CredentialStore`].
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    identities: Arc<RwLock<Vec<Identity>>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities.
    pub fn len(&self) -> usize {
        self.read().map(|ids| ids.len()).unwrap_or(0)
    }

    /// Returns true if the store holds no identities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Identity>>> {
        self.identities
            .read()
            .map_err(|_| ScepError::internal("credential store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Identity>>> {
        self.identities
            .write()
            .map_err(|_| ScepError::internal("credential store lock poisoned"))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn add_identity(&self, identity: Identity) -> Result<()> {
        let mut identities = self.write()?;
        let key = identity.issuer_and_serial();
        if identities.iter().any(|existing| existing.issuer_and_serial() == key) {
            return Err(ScepError::DuplicateIdentity(format!(
                "serial {} from {}",
                key.serial_number, key.issuer
            )));
        }
        debug!("Adding identity {:?} to credential store", identity.label());
        identities.push(identity);
        Ok(())
    }

    fn find_identity(&self, matcher: &IdentityMatcher) -> Result<Option<Identity>> {
        let identities = self.read()?;
        Ok(identities.iter().find(|id| matcher.matches(id)).cloned())
    }

    fn delete_identity(&self, matcher: &IdentityMatcher) -> Result<()> {
        let mut identities = self.write()?;
        let before = identities.len();
        identities.retain(|id| !matcher.matches(id));
        if identities.len() == before {
            return Err(ScepError::IdentityNotFound(format!("{matcher:?}")));
        }
        debug!("Deleted {} identity(ies)", before - identities.len());
        Ok(())
    }

    fn identities(&self) -> Result<Vec<Identity>> {
        Ok(self.read()?.clone())
    }
}
