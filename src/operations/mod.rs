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

//! SCEP operations.
//!
//! Client side: [`ScepRequester`] builds requests, [`verify_reply`] checks
//! the answer and [`validate_ca_certificates`] finds the CA and RA
//! certificates to use. Server side: [`ScepResponder`].

pub mod cacerts;
pub mod certify;
pub mod reply;
pub mod request;

pub use cacerts::{find_ca_certificate, validate_ca_certificates, CaCertificateSet};
pub use certify::{CertRep, CertifyOptions, PollRequest, ScepResponder};
pub use reply::{select_reply_signer, verify_reply};
pub use request::{select_recipient, PkiRequest, ScepRequester};
