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

//! SCEP signed attribute codec.
//!
//! SCEP carries its protocol state in CMS signed attributes under the
//! VeriSign arc `2.16.840.1.113733.1.9`. String-valued attributes
//! (messageType, pkiStatus, failInfo, transactionID) are PrintableStrings;
//! the two nonces are 16-byte OCTET STRINGs.

use std::collections::BTreeMap;

use der::asn1::{Any, ObjectIdentifier, SetOfVec};
use der::{Decode, Encode};
use x509_cert::attr::Attribute;

use crate::error::{Result, ScepError};
use crate::types::{FailInfo, MessageType, Nonce, PkiStatus, TransactionId};

/// DER tag of a PrintableString.
pub const PRINTABLE_STRING_TAG: u8 = 0x13;

/// Encoded OID body shared by every SCEP attribute (`2.16.840.1.113733.1.9`).
pub const SCEP_OID_PREFIX: [u8; 9] = [0x60, 0x86, 0x48, 0x01, 0x86, 0xF8, 0x45, 0x01, 0x09];

const SCEP_ATTRIBUTE_OIDS: [ObjectIdentifier; 6] = [
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.2"),
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.3"),
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.4"),
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.5"),
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.6"),
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.7"),
];

/// How an attribute value is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeEncoding {
    /// Decimal or hex text as a PrintableString.
    PrintableString,
    /// 16 random bytes as an OCTET STRING.
    OctetString,
}

/// SCEP protocol attributes.
///
/// The discriminant is the final arc of the attribute's object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ProtocolAttribute {
    /// `messageType`
    MessageType = 2,
    /// `pkiStatus`
    PkiStatus = 3,
    /// `failInfo`
    FailInfo = 4,
    /// `senderNonce`
    SenderNonce = 5,
    /// `recipientNonce`
    RecipientNonce = 6,
    /// `transactionID`
    TransactionId = 7,
}

impl ProtocolAttribute {
    /// All attributes, in identifier order.
    pub const ALL: [ProtocolAttribute; 6] = [
        Self::MessageType,
        Self::PkiStatus,
        Self::FailInfo,
        Self::SenderNonce,
        Self::RecipientNonce,
        Self::TransactionId,
    ];

    /// The final arc of the identifier.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up an attribute by the final arc of its identifier.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(Self::MessageType),
            3 => Some(Self::PkiStatus),
            4 => Some(Self::FailInfo),
            5 => Some(Self::SenderNonce),
            6 => Some(Self::RecipientNonce),
            7 => Some(Self::TransactionId),
            _ => None,
        }
    }

    /// The attribute's object identifier.
    pub fn oid(self) -> ObjectIdentifier {
        SCEP_ATTRIBUTE_OIDS[(self.code() - 2) as usize]
    }

    /// Look up an attribute by object identifier.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.oid() == *oid)
    }

    /// Wire encoding of the attribute's value.
    pub fn encoding(self) -> AttributeEncoding {
        match self {
            Self::SenderNonce | Self::RecipientNonce => AttributeEncoding::OctetString,
            _ => AttributeEncoding::PrintableString,
        }
    }

    /// Attribute name as used in RFC 8894.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessageType => "messageType",
            Self::PkiStatus => "pkiStatus",
            Self::FailInfo => "failInfo",
            Self::SenderNonce => "senderNonce",
            Self::RecipientNonce => "recipientNonce",
            Self::TransactionId => "transactionID",
        }
    }
}

impl std::fmt::Display for ProtocolAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map an attribute code (2..=7) to its object identifier.
pub fn attribute_identifier(code: u8) -> Option<ObjectIdentifier> {
    ProtocolAttribute::from_code(code).map(ProtocolAttribute::oid)
}

fn is_printable_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || " '()+,-./:=?".contains(c)
}

/// Encode a value as a DER PrintableString (tag, length, ASCII bytes).
pub fn encode_printable(value: &str) -> Result<Vec<u8>> {
    if let Some(c) = value.chars().find(|c| !is_printable_char(*c)) {
        return Err(ScepError::malformed_attribute(format!(
            "character {c:?} is not allowed in a PrintableString"
        )));
    }

    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + 4);
    out.push(PRINTABLE_STRING_TAG);
    push_length(&mut out, bytes.len());
    out.extend_from_slice(bytes);
    Ok(out)
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let be = len.to_be_bytes();
    let skip = be.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (be.len() - skip) as u8);
    out.extend_from_slice(&be[skip..]);
}

/// Decode a DER PrintableString produced by [`encode_printable`].
///
/// Only short-form lengths are accepted: every SCEP string attribute fits
/// in 127 bytes.
pub fn decode_printable(bytes: &[u8]) -> Result<String> {
    if bytes.len() < 2 {
        return Err(ScepError::malformed_attribute("value too short"));
    }
    if bytes[0] != PRINTABLE_STRING_TAG {
        return Err(ScepError::malformed_attribute(format!(
            "expected PrintableString tag 0x13, got 0x{:02X}",
            bytes[0]
        )));
    }
    if bytes[1] & 0x80 != 0 {
        return Err(ScepError::malformed_attribute(
            "long-form length is not supported",
        ));
    }
    if bytes[1] as usize != bytes.len() - 2 {
        return Err(ScepError::malformed_attribute(format!(
            "declared length {} does not match content length {}",
            bytes[1],
            bytes.len() - 2
        )));
    }

    let body = &bytes[2..];
    if !body.is_ascii() {
        return Err(ScepError::malformed_attribute("non-ASCII content"));
    }
    // ASCII was checked above, so this is infallible
    String::from_utf8(body.to_vec()).map_err(|e| ScepError::malformed_attribute(e.to_string()))
}

/// The SCEP attributes of one message.
///
/// Values are kept as complete DER encodings (tag, length, content) keyed by
/// attribute. Other signed attributes (contentType, messageDigest) are not
/// part of the set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    values: BTreeMap<ProtocolAttribute, Vec<Vec<u8>>>,
}

impl AttributeSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the values of `attr` with a single DER-encoded value.
    pub fn insert(&mut self, attr: ProtocolAttribute, encoded: Vec<u8>) {
        self.values.insert(attr, vec![encoded]);
    }

    /// Append another value to `attr`.
    pub fn push(&mut self, attr: ProtocolAttribute, encoded: Vec<u8>) {
        self.values.entry(attr).or_default().push(encoded);
    }

    /// Remove an attribute.
    pub fn remove(&mut self, attr: ProtocolAttribute) -> Option<Vec<Vec<u8>>> {
        self.values.remove(&attr)
    }

    /// First DER-encoded value of `attr`.
    pub fn get(&self, attr: ProtocolAttribute) -> Option<&[u8]> {
        self.values
            .get(&attr)
            .and_then(|v| v.first())
            .map(Vec::as_slice)
    }

    /// All DER-encoded values of `attr`.
    pub fn values(&self, attr: ProtocolAttribute) -> &[Vec<u8>] {
        self.values.get(&attr).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns true if `attr` has at least one value.
    pub fn contains(&self, attr: ProtocolAttribute) -> bool {
        !self.values(attr).is_empty()
    }

    /// Number of attributes present.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no attributes are present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over attributes and their values.
    pub fn iter(&self) -> impl Iterator<Item = (ProtocolAttribute, &[Vec<u8>])> {
        self.values.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Set a PrintableString-valued attribute.
    pub fn set_printable(&mut self, attr: ProtocolAttribute, value: &str) -> Result<()> {
        self.insert(attr, encode_printable(value)?);
        Ok(())
    }

    /// Decode the first value of a PrintableString-valued attribute.
    pub fn printable(&self, attr: ProtocolAttribute) -> Result<Option<String>> {
        self.get(attr).map(decode_printable).transpose()
    }

    /// Set the messageType attribute.
    pub fn set_message_type(&mut self, message_type: MessageType) {
        self.insert(ProtocolAttribute::MessageType, message_type.encode());
    }

    /// Decoded messageType, if present.
    pub fn message_type(&self) -> Result<Option<MessageType>> {
        self.printable(ProtocolAttribute::MessageType)?
            .map(|s| MessageType::parse(&s))
            .transpose()
    }

    /// Set the pkiStatus attribute.
    pub fn set_pki_status(&mut self, status: PkiStatus) {
        self.insert(ProtocolAttribute::PkiStatus, status.encode());
    }

    /// Decoded pkiStatus, if present.
    pub fn pki_status(&self) -> Result<Option<PkiStatus>> {
        self.printable(ProtocolAttribute::PkiStatus)?
            .map(|s| PkiStatus::parse(&s))
            .transpose()
    }

    /// Set the failInfo attribute.
    pub fn set_fail_info(&mut self, fail_info: FailInfo) {
        self.insert(ProtocolAttribute::FailInfo, fail_info.encode());
    }

    /// Decoded failInfo, if present.
    pub fn fail_info(&self) -> Result<Option<FailInfo>> {
        self.printable(ProtocolAttribute::FailInfo)?
            .map(|s| FailInfo::parse(&s))
            .transpose()
    }

    /// Set the transactionID attribute.
    pub fn set_transaction_id(&mut self, id: &TransactionId) -> Result<()> {
        self.insert(ProtocolAttribute::TransactionId, id.encode()?);
        Ok(())
    }

    /// Decoded transactionID, if present.
    pub fn transaction_id(&self) -> Result<Option<TransactionId>> {
        Ok(self
            .printable(ProtocolAttribute::TransactionId)?
            .map(TransactionId::new))
    }

    /// Set the senderNonce attribute.
    pub fn set_sender_nonce(&mut self, nonce: &Nonce) {
        self.insert(ProtocolAttribute::SenderNonce, nonce.encode());
    }

    /// Decoded senderNonce, if present.
    pub fn sender_nonce(&self) -> Result<Option<Nonce>> {
        self.get(ProtocolAttribute::SenderNonce)
            .map(Nonce::decode)
            .transpose()
    }

    /// Set the recipientNonce attribute.
    pub fn set_recipient_nonce(&mut self, nonce: &Nonce) {
        self.insert(ProtocolAttribute::RecipientNonce, nonce.encode());
    }

    /// Decoded recipientNonce, if present.
    pub fn recipient_nonce(&self) -> Result<Option<Nonce>> {
        self.get(ProtocolAttribute::RecipientNonce)
            .map(Nonce::decode)
            .transpose()
    }

    /// Convert into CMS attributes for a SignerInfo.
    pub fn to_attributes(&self) -> Result<Vec<Attribute>> {
        self.values
            .iter()
            .map(|(attr, encoded)| {
                let values = encoded
                    .iter()
                    .map(|v| Any::from_der(v))
                    .collect::<der::Result<Vec<_>>>()?;
                Ok(Attribute {
                    oid: attr.oid(),
                    values: SetOfVec::try_from(values)?,
                })
            })
            .collect()
    }

    /// Collect the SCEP attributes from a list of CMS attributes.
    ///
    /// Attributes outside the SCEP arc are skipped.
    pub fn from_attributes<'a>(attributes: impl IntoIterator<Item = &'a Attribute>) -> Result<Self> {
        let mut set = Self::new();
        for attribute in attributes {
            let Some(attr) = ProtocolAttribute::from_oid(&attribute.oid) else {
                continue;
            };
            for value in attribute.values.iter() {
                set.push(attr, value.to_der()?);
            }
        }
        Ok(set)
    }
}
