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

//! Digest algorithms and certificate fingerprints.
//!
//! A CA fingerprint obtained out of band does not say which digest produced
//! it; the algorithm is inferred from its length.

use der::asn1::ObjectIdentifier;
use der::Encode;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;

use crate::error::{Result, ScepError};
use crate::oids;

/// Digest algorithms for fingerprints and signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// MD5 (fingerprints only)
    Md5,
    /// SHA-1
    Sha1,
    /// SHA-224
    Sha224,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// Infer the algorithm from a digest length in bytes.
    pub fn from_fingerprint_len(len: usize) -> Result<Self> {
        match len {
            16 => Ok(Self::Md5),
            20 => Ok(Self::Sha1),
            28 => Ok(Self::Sha224),
            32 => Ok(Self::Sha256),
            48 => Ok(Self::Sha384),
            64 => Ok(Self::Sha512),
            other => Err(ScepError::InvalidDigestAlgorithm(format!(
                "no digest algorithm produces {other} bytes"
            ))),
        }
    }

    /// Output length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Hash `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Md5 => Md5::digest(data).to_vec(),
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha224 => Sha224::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// Algorithm object identifier.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            Self::Md5 => oids::ID_MD5,
            Self::Sha1 => oids::ID_SHA1,
            Self::Sha224 => oids::ID_SHA224,
            Self::Sha256 => oids::ID_SHA256,
            Self::Sha384 => oids::ID_SHA384,
            Self::Sha512 => oids::ID_SHA512,
        }
    }

    /// Look up an algorithm by object identifier.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [
            Self::Md5,
            Self::Sha1,
            Self::Sha224,
            Self::Sha256,
            Self::Sha384,
            Self::Sha512,
        ]
        .into_iter()
        .find(|alg| alg.oid() == *oid)
    }

    /// AlgorithmIdentifier for CMS `digestAlgorithm` fields.
    pub fn algorithm_identifier(&self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters: None,
        }
    }

    /// Get the algorithm name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Parse an algorithm name such as `sha256` or `SHA-256`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha224" => Some(Self::Sha224),
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute the fingerprint of a certificate's DER encoding.
pub fn fingerprint(cert: &Certificate, algorithm: DigestAlgorithm) -> Result<Vec<u8>> {
    let der = cert.to_der()?;
    Ok(algorithm.digest(&der))
}

/// Format a fingerprint as a colon-separated hex string.
///
/// Example output: "AB:CD:EF:01:23:45:..."
pub fn format_fingerprint(fp: &[u8]) -> String {
    fp.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse a fingerprint from hex, with or without colon separators.
pub fn parse_fingerprint(s: &str) -> Result<Vec<u8>> {
    let digits: String = s
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .collect();

    if digits.is_empty() {
        return Err(ScepError::config("Invalid fingerprint format"));
    }
    hex::decode(&digits).map_err(|e| ScepError::config(format!("Invalid fingerprint format: {e}")))
}
