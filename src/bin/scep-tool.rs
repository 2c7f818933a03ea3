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

//! SCEP inspection tool
//!
//! Offline helpers for working with SCEP material. Nothing here talks to
//! a server.
//!
//! # Usage
//!
//! ```text
//! scep-tool [OPTIONS] <COMMAND>
//!
//! Commands:
//!   fingerprint  Print certificate fingerprints
//!   ca-certs     Find the CA and RA certificates in a GetCACert response
//!   inspect      Show the SCEP attributes of a PKI message
//!   config       Validate a configuration file
//!
//! Options:
//!   -c, --config <PATH>   Path to configuration file
//!   -v, --verbose         Enable verbose output
//!   -h, --help            Print help
//!   -V, --version         Print version
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Fingerprint a CA certificate for out-of-band verification
//! scep-tool fingerprint ca.pem --algorithm sha1
//!
//! # Check a GetCACert response against a known CA fingerprint
//! scep-tool ca-certs cacerts.p7b --fingerprint 4A:1B:...
//!
//! # Look at a reply (the CA certificate is needed to verify it)
//! scep-tool inspect reply.der --signer ca.pem
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use usg_scep::certificate::{get_subject_cn, key_usage};
use usg_scep::digest::{fingerprint, format_fingerprint, parse_fingerprint};
use usg_scep::logging::{init_logging, LogConfig, LogLevel};
use usg_scep::signed::verify_signed_data;
use usg_scep::types::{decode_der_or_base64, parse_certs_only};
use usg_scep::{
    validate_ca_certificates, Certificate, DigestAlgorithm, KeyUsageFlags, ProtocolAttribute,
    ScepConfig,
};

/// SCEP inspection tool
#[derive(Parser)]
#[command(name = "scep-tool")]
#[command(author = "U.S. Federal Government")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline SCEP certificate and message tooling", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print certificate fingerprints
    Fingerprint {
        /// Certificate file (PEM, DER or certs-only PKCS#7)
        file: PathBuf,

        /// Digest algorithm (md5, sha1, sha224, sha256, sha384, sha512)
        #[arg(short, long, default_value = "sha256")]
        algorithm: String,
    },

    /// Find the CA and RA certificates in a GetCACert response
    CaCerts {
        /// Certificates file (certs-only PKCS#7 as DER or base64, or PEM)
        file: PathBuf,

        /// Expected CA certificate fingerprint (hex, colons optional)
        #[arg(short, long, value_name = "HEX")]
        fingerprint: Option<String>,
    },

    /// Show the SCEP attributes of a PKI message
    Inspect {
        /// Signed PKI message (DER or base64)
        file: PathBuf,

        /// Signer certificate, for messages that do not embed it
        #[arg(short, long, value_name = "CERT")]
        signer: Option<PathBuf>,
    },

    /// Validate a configuration file
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match ScepConfig::load(path) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let mut log_config = match config.as_ref().map(ScepConfig::log_config) {
        Some(Ok(log_config)) => log_config,
        Some(Err(e)) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
        None => LogConfig::default().with_level(LogLevel::Warn),
    };
    if cli.verbose {
        log_config = log_config.with_level(LogLevel::Debug);
    }
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Warning: {}", e);
    }

    let result = match &cli.command {
        Commands::Fingerprint { file, algorithm } => cmd_fingerprint(file, algorithm),
        Commands::CaCerts { file, fingerprint } => cmd_ca_certs(file, fingerprint.as_deref()),
        Commands::Inspect { file, signer } => cmd_inspect(file, signer.as_deref()),
        Commands::Config { show } => cmd_config(config.as_ref(), *show),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_fingerprint(file: &Path, algorithm: &str) -> Result<(), Box<dyn std::error::Error>> {
    let algorithm = DigestAlgorithm::parse(algorithm)
        .ok_or_else(|| format!("Unknown digest algorithm: {algorithm}"))?;

    for cert in read_certificates(file)? {
        println!("{}", describe(&cert));
        println!(
            "  {}: {}",
            algorithm,
            format_fingerprint(&fingerprint(&cert, algorithm)?)
        );
    }
    Ok(())
}

fn cmd_ca_certs(file: &Path, fp: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let certs = read_certificates(file)?;
    println!("Read {} certificate(s)", certs.len());

    let fp = fp.map(parse_fingerprint).transpose()?;
    let set = validate_ca_certificates(&certs, fp.as_deref())?;

    print_certificate("CA", &set.ca)?;
    if set.is_dual_role() {
        print_certificate("RA (signing and encryption)", &set.ra_signing)?;
    } else {
        print_certificate("RA signing", &set.ra_signing)?;
        print_certificate("RA encryption", &set.ra_encryption)?;
    }
    Ok(())
}

fn cmd_inspect(file: &Path, signer: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let message = decode_der_or_base64(&std::fs::read(file)?)?;
    let extra = match signer {
        Some(path) => read_certificates(path)?,
        None => Vec::new(),
    };

    let verified = verify_signed_data(&message, &extra)?;
    println!("Signature OK");
    println!("  Signer: {}", verified.signer.tbs_certificate.subject);
    println!("  Embedded certificates: {}", verified.certificates.len());
    println!("  Content: {} bytes", verified.content.len());

    let attributes = &verified.attributes;
    for attr in ProtocolAttribute::ALL {
        if !attributes.contains(attr) {
            continue;
        }
        let value = match attr {
            ProtocolAttribute::MessageType => attributes
                .message_type()?
                .map(|t| format!("{} ({})", t, t.code())),
            ProtocolAttribute::PkiStatus => attributes
                .pki_status()?
                .map(|s| format!("{} ({})", s, s.code())),
            ProtocolAttribute::FailInfo => attributes
                .fail_info()?
                .map(|f| format!("{} ({})", f, f.code())),
            ProtocolAttribute::TransactionId => {
                attributes.transaction_id()?.map(|id| id.to_string())
            }
            ProtocolAttribute::SenderNonce => {
                attributes.sender_nonce()?.map(|n| format_fingerprint(n.as_bytes()))
            }
            ProtocolAttribute::RecipientNonce => attributes
                .recipient_nonce()?
                .map(|n| format_fingerprint(n.as_bytes())),
        };
        println!("  {}: {}", attr, value.unwrap_or_default());
    }
    Ok(())
}

fn cmd_config(config: Option<&ScepConfig>, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = config.ok_or("No configuration file given (use --config)")?;
    config.responder_config()?;
    config.log_config()?;
    println!("Configuration OK");
    if show {
        println!();
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

/// Read certificates from PEM, a single DER certificate, or a certs-only message.
fn read_certificates(path: &Path) -> Result<Vec<Certificate>, Box<dyn std::error::Error>> {
    use der::Decode;

    let data = std::fs::read(path)?;
    if data.starts_with(b"-----BEGIN") {
        return Ok(Certificate::load_pem_chain(&data)?);
    }

    let der_bytes = decode_der_or_base64(&data)?;
    match Certificate::from_der(&der_bytes) {
        Ok(cert) => Ok(vec![cert]),
        Err(_) => Ok(parse_certs_only(&der_bytes)?),
    }
}

fn describe(cert: &Certificate) -> String {
    get_subject_cn(cert).unwrap_or_else(|| cert.tbs_certificate.subject.to_string())
}

fn print_certificate(role: &str, cert: &Certificate) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}:", role);
    println!("  Subject: {}", cert.tbs_certificate.subject);
    println!("  Issuer: {}", cert.tbs_certificate.issuer);
    if let Some(ku) = key_usage(cert)? {
        let names: Vec<&str> = [
            (KeyUsageFlags::DIGITAL_SIGNATURE, "digitalSignature"),
            (KeyUsageFlags::KEY_ENCIPHERMENT, "keyEncipherment"),
            (KeyUsageFlags::KEY_CERT_SIGN, "keyCertSign"),
            (KeyUsageFlags::CRL_SIGN, "cRLSign"),
        ]
        .into_iter()
        .filter(|(flag, _)| ku.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        println!("  Key usage: {}", names.join(", "));
    }
    println!(
        "  SHA-256: {}",
        format_fingerprint(&fingerprint(cert, DigestAlgorithm::Sha256)?)
    );
    Ok(())
}
