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

//! Configuration types for SCEP requesters and responders.
//!
//! Parameters can be built in code or loaded from a TOML file:
//!
//! ```toml
//! [request]
//! encryption = "aes128-cbc"
//! digest = "sha256"
//! challenge_password = "secret"
//! key_usage = ["digital_signature", "key_encipherment"]
//!
//! [responder]
//! challenge = "secret"
//! validity_days = 365
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::certificate::{KeyUsageFlags, KeyUsageName};
use crate::digest::DigestAlgorithm;
use crate::enveloped::EncryptionAlgorithm;
use crate::error::{Result, ScepError};
use crate::logging::{LogConfig, LogLevel};

/// Challenge a responder expects when none is configured.
pub const DEFAULT_CHALLENGE: &str = "magic";

/// Parameters for building enrollment requests.
#[derive(Clone)]
pub struct RequestParameters {
    /// Content encryption for the request envelope.
    pub encryption: EncryptionAlgorithm,

    /// Signature digest for the CSR and the SignedData.
    pub digest: DigestAlgorithm,

    /// challengePassword placed in the CSR.
    pub challenge_password: Option<String>,

    /// Key usages requested through the CSR extensionRequest.
    pub key_usage: Option<KeyUsageFlags>,
}

impl std::fmt::Debug for RequestParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestParameters")
            .field("encryption", &self.encryption)
            .field("digest", &self.digest)
            .field(
                "challenge_password",
                &self.challenge_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("key_usage", &self.key_usage)
            .finish()
    }
}

impl Default for RequestParameters {
    fn default() -> Self {
        Self {
            encryption: EncryptionAlgorithm::Aes128Cbc,
            digest: DigestAlgorithm::Sha256,
            challenge_password: None,
            key_usage: None,
        }
    }
}

impl RequestParameters {
    /// Create parameters with the defaults (AES-128-CBC, SHA-256).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content encryption algorithm.
    pub fn encryption(mut self, encryption: EncryptionAlgorithm) -> Self {
        self.encryption = encryption;
        self
    }

    /// Set the signature digest.
    pub fn digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Set the challenge password.
    pub fn challenge_password(mut self, password: impl Into<String>) -> Self {
        self.challenge_password = Some(password.into());
        self
    }

    /// Request key usages.
    pub fn key_usage(mut self, key_usage: KeyUsageFlags) -> Self {
        self.key_usage = Some(key_usage);
        self
    }
}

/// Policy of a certifying responder.
#[derive(Clone)]
pub struct ResponderConfig {
    /// Challenge password first-time requests must carry.
    pub challenge: String,

    /// Lifetime of issued certificates.
    pub validity: Duration,

    /// Signature digest used when the caller does not pick one.
    pub digest: DigestAlgorithm,

    /// Reply encryption used when the caller does not pick one.
    pub encryption: EncryptionAlgorithm,
}

impl std::fmt::Debug for ResponderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderConfig")
            .field("challenge", &"[REDACTED]")
            .field("validity", &self.validity)
            .field("digest", &self.digest)
            .field("encryption", &self.encryption)
            .finish()
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            challenge: DEFAULT_CHALLENGE.to_string(),
            validity: Duration::from_secs(365 * 24 * 60 * 60),
            digest: DigestAlgorithm::Sha256,
            encryption: EncryptionAlgorithm::Aes128Cbc,
        }
    }
}

impl ResponderConfig {
    /// Create a configuration with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected challenge password.
    pub fn challenge(mut self, challenge: impl Into<String>) -> Self {
        self.challenge = challenge.into();
        self
    }

    /// Set the lifetime of issued certificates.
    pub fn validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Set the default signature digest.
    pub fn digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Set the default reply encryption.
    pub fn encryption(mut self, encryption: EncryptionAlgorithm) -> Self {
        self.encryption = encryption;
        self
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScepConfig {
    /// Requester settings.
    #[serde(default)]
    pub request: RequestSection,

    /// Responder settings.
    #[serde(default)]
    pub responder: ResponderSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[request]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSection {
    /// Content encryption algorithm.
    #[serde(default)]
    pub encryption: EncryptionAlgorithm,

    /// Signature digest.
    #[serde(default = "default_digest")]
    pub digest: DigestAlgorithm,

    /// CSR challenge password.
    #[serde(default)]
    pub challenge_password: Option<String>,

    /// Requested key usages.
    #[serde(default)]
    pub key_usage: Vec<KeyUsageName>,
}

impl Default for RequestSection {
    fn default() -> Self {
        Self {
            encryption: EncryptionAlgorithm::default(),
            digest: default_digest(),
            challenge_password: None,
            key_usage: Vec::new(),
        }
    }
}

/// `[responder]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponderSection {
    /// Expected challenge password.
    #[serde(default = "default_challenge")]
    pub challenge: String,

    /// Lifetime of issued certificates in days.
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,

    /// Default signature digest.
    #[serde(default = "default_digest")]
    pub digest: DigestAlgorithm,

    /// Default reply encryption.
    #[serde(default)]
    pub encryption: EncryptionAlgorithm,
}

impl Default for ResponderSection {
    fn default() -> Self {
        Self {
            challenge: default_challenge(),
            validity_days: default_validity_days(),
            digest: default_digest(),
            encryption: EncryptionAlgorithm::default(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable structured JSON logging.
    #[serde(default)]
    pub json_format: bool,

    /// Include event targets.
    #[serde(default)]
    pub include_target: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            include_target: false,
        }
    }
}

fn default_digest() -> DigestAlgorithm {
    DigestAlgorithm::Sha256
}

fn default_challenge() -> String {
    DEFAULT_CHALLENGE.to_string()
}

fn default_validity_days() -> u32 {
    365
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ScepConfig {
    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or contains unknown fields.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| ScepError::config(format!("Invalid TOML: {e}")))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ScepError::config(format!("TOML serialize: {e}")))
    }

    /// Load configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScepError::config(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Requester parameters from the `[request]` section.
    pub fn request_parameters(&self) -> RequestParameters {
        let section = &self.request;
        RequestParameters {
            encryption: section.encryption,
            digest: section.digest,
            challenge_password: section.challenge_password.clone(),
            key_usage: if section.key_usage.is_empty() {
                None
            } else {
                Some(section.key_usage.iter().copied().collect())
            },
        }
    }

    /// Responder policy from the `[responder]` section.
    pub fn responder_config(&self) -> Result<ResponderConfig> {
        let section = &self.responder;
        if section.validity_days == 0 {
            return Err(ScepError::config("validity_days must be at least 1"));
        }
        if section.digest == DigestAlgorithm::Md5 {
            return Err(ScepError::config("md5 cannot be used for signatures"));
        }
        Ok(ResponderConfig {
            challenge: section.challenge.clone(),
            validity: Duration::from_secs(u64::from(section.validity_days) * 24 * 60 * 60),
            digest: section.digest,
            encryption: section.encryption,
        })
    }

    /// Logging settings from the `[logging]` section.
    pub fn log_config(&self) -> Result<LogConfig> {
        let level = LogLevel::parse(&self.logging.level).ok_or_else(|| {
            ScepError::config(format!("Unknown log level: {}", self.logging.level))
        })?;
        Ok(LogConfig {
            level,
            json_format: self.logging.json_format,
            include_target: self.logging.include_target,
        })
    }
}
