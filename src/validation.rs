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

//! Certificate chain building.
//!
//! Chains are built from a leaf through a pool of candidate certificates
//! by matching issuer and subject names and checking each signature with
//! the issuer's key. A chain ends at the anchor when one is given, or at a
//! self-issued certificate otherwise.
//!
//! # Example
//!
//! ```no_run
//! use usg_scep::validation::TrustChainBuilder;
//!
//! # fn example(leaf: &x509_cert::Certificate, pool: &[x509_cert::Certificate]) -> usg_scep::Result<()> {
//! let chain = TrustChainBuilder::new().build_chain(leaf, pool, None)?;
//! println!("root: {}", chain[chain.len() - 1].tbs_certificate.subject);
//! # Ok(())
//! # }
//! ```

use std::time::SystemTime;

use const_oid::db::rfc5280::ID_CE_BASIC_CONSTRAINTS;
use der::Decode;
use tracing::{debug, warn};
use x509_cert::ext::pkix::BasicConstraints;
use x509_cert::Certificate;

use crate::certificate::{is_self_issued, is_signed_by};
use crate::error::{Result, ScepError};

/// Configuration for chain building.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Maximum chain length (default: 10).
    pub max_chain_length: usize,

    /// Reject certificates outside their validity period.
    pub check_validity: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_chain_length: 10,
            check_validity: true,
        }
    }
}

/// Builds certificate chains from a leaf to a root.
#[derive(Debug, Clone, Default)]
pub struct TrustChainBuilder {
    config: ValidationConfig,
}

impl TrustChainBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with custom configuration.
    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Build the chain from `leaf` using certificates from `pool`.
    ///
    /// Returns the chain ordered from leaf to root. When `anchor` is given
    /// the root is always the anchor; otherwise it is a self-issued
    /// certificate whose self-signature verifies.
    pub fn build_chain(
        &self,
        leaf: &Certificate,
        pool: &[Certificate],
        anchor: Option<&Certificate>,
    ) -> Result<Vec<Certificate>> {
        let mut chain = vec![leaf.clone()];

        loop {
            let current = &chain[chain.len() - 1];
            self.check_validity_period(current)?;

            if let Some(anchor) = anchor {
                if current == anchor {
                    break;
                }
            }

            if is_self_issued(current) {
                if anchor.is_some() {
                    return Err(ScepError::not_trusted(format!(
                        "chain ends at {} instead of the anchor",
                        current.tbs_certificate.subject
                    )));
                }
                if !is_signed_by(current, &current.tbs_certificate.subject_public_key_info) {
                    return Err(ScepError::not_trusted(format!(
                        "root {} has an invalid self-signature",
                        current.tbs_certificate.subject
                    )));
                }
                break;
            }

            if chain.len() >= self.config.max_chain_length {
                return Err(ScepError::not_trusted(format!(
                    "Certificate chain too long (> {})",
                    self.config.max_chain_length
                )));
            }

            let issuer = self
                .find_issuer(current, anchor.into_iter().chain(pool), &chain)
                .ok_or_else(|| {
                    ScepError::not_trusted(format!(
                        "Could not find certificate issuer {}",
                        current.tbs_certificate.issuer
                    ))
                })?;
            self.check_basic_constraints(&issuer)?;
            chain.push(issuer);
        }

        debug!("Built certificate chain with {} certificates", chain.len());
        Ok(chain)
    }

    /// Find the issuer of `cert` among `candidates`, skipping certificates already in `chain`.
    fn find_issuer<'a>(
        &self,
        cert: &Certificate,
        candidates: impl Iterator<Item = &'a Certificate>,
        chain: &[Certificate],
    ) -> Option<Certificate> {
        let issuer_dn = &cert.tbs_certificate.issuer;

        for candidate in candidates {
            if &candidate.tbs_certificate.subject != issuer_dn || chain.contains(candidate) {
                continue;
            }
            if is_signed_by(cert, &candidate.tbs_certificate.subject_public_key_info) {
                return Some(candidate.clone());
            }
            debug!(
                "Candidate issuer {} did not verify the signature",
                candidate.tbs_certificate.subject
            );
        }

        None
    }

    /// Check certificate validity period.
    fn check_validity_period(&self, cert: &Certificate) -> Result<()> {
        if !self.config.check_validity {
            return Ok(());
        }

        let now = SystemTime::now();
        let validity = &cert.tbs_certificate.validity;

        if now < validity.not_before.to_system_time() {
            return Err(ScepError::not_trusted(format!(
                "Certificate {} not yet valid",
                cert.tbs_certificate.subject
            )));
        }
        if now > validity.not_after.to_system_time() {
            return Err(ScepError::not_trusted(format!(
                "Certificate {} expired",
                cert.tbs_certificate.subject
            )));
        }

        Ok(())
    }

    /// Check the basic constraints of an issuing certificate.
    fn check_basic_constraints(&self, cert: &Certificate) -> Result<()> {
        if let Some(extensions) = &cert.tbs_certificate.extensions {
            for ext in extensions.iter() {
                if ext.extn_id == ID_CE_BASIC_CONSTRAINTS {
                    let bc = BasicConstraints::from_der(ext.extn_value.as_bytes())?;
                    if !bc.ca {
                        return Err(ScepError::not_trusted(format!(
                            "{} is not a CA certificate",
                            cert.tbs_certificate.subject
                        )));
                    }
                    return Ok(());
                }
            }
        }

        warn!(
            "CA certificate {} missing basic constraints extension",
            cert.tbs_certificate.subject
        );
        Ok(())
    }
}
