// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Messages and Envelopes
//!
//! A [`Message`] is a [`MessageType`] plus an ordered list of opaque payload
//! slots. The core never interprets payloads; listeners read them back with
//! [`Message::payload`] into whatever type the sender wrote.
//!
//! An [`Envelope`] is what travels through a pipe: the message plus sender and
//! destination IDs.

use crate::domain::agent::AgentId;
use crate::domain::error::CommunicationError;
use crate::domain::message_type::MessageType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    msg_type: MessageType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    payloads: Vec<serde_json::Value>,
}

impl Message {
    /// A message with no payload.
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            payloads: Vec::new(),
        }
    }

    /// Appends one payload slot.
    pub fn with_payload<T: Serialize>(mut self, value: &T) -> Result<Self, CommunicationError> {
        let value = serde_json::to_value(value)
            .map_err(|e| CommunicationError::Serialization(e.to_string()))?;
        self.payloads.push(value);
        Ok(self)
    }

    /// Appends an already-encoded payload slot.
    pub fn with_raw_payload(mut self, value: serde_json::Value) -> Self {
        self.payloads.push(value);
        self
    }

    pub fn msg_type(&self) -> &MessageType {
        &self.msg_type
    }

    pub fn arity(&self) -> usize {
        self.payloads.len()
    }

    pub fn raw_payload(&self, index: usize) -> Option<&serde_json::Value> {
        self.payloads.get(index)
    }

    /// Decodes payload slot `index` as `T`.
    pub fn payload<T: DeserializeOwned>(&self, index: usize) -> Result<T, CommunicationError> {
        let raw = self
            .payloads
            .get(index)
            .ok_or_else(|| CommunicationError::MissingPayload {
                index,
                msg_type: self.msg_type.clone(),
            })?;
        T::deserialize(raw).map_err(|e| {
            CommunicationError::Deserialization(format!(
                "payload {} of {}: {}",
                index, self.msg_type, e
            ))
        })
    }

    pub fn is_system(&self) -> bool {
        self.msg_type.is_system()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CommunicationError> {
        serde_json::to_vec(self).map_err(|e| CommunicationError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CommunicationError> {
        serde_json::from_slice(bytes).map_err(|e| CommunicationError::Deserialization(e.to_string()))
    }
}

/// A message in transit between two queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: AgentId,
    pub to: AgentId,
    pub message: Message,
}

impl Envelope {
    pub fn new(from: AgentId, to: AgentId, message: Message) -> Self {
        Self { from, to, message }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CommunicationError> {
        serde_json::to_vec(self).map_err(|e| CommunicationError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CommunicationError> {
        serde_json::from_slice(bytes).map_err(|e| CommunicationError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Assignment {
        variable: String,
        value: i64,
    }

    fn value_type() -> MessageType {
        MessageType::new(["Algorithm", "Value"])
    }

    #[test]
    fn test_zero_payload_roundtrip() {
        let msg = Message::new(value_type());
        let bytes = msg.to_bytes().unwrap();
        let back = Message::from_bytes(&bytes).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.arity(), 0);
        assert_eq!(back.msg_type(), &value_type());
    }

    #[test]
    fn test_single_payload_roundtrip() {
        let msg = Message::new(value_type())
            .with_payload(&Assignment {
                variable: "x1".into(),
                value: -3,
            })
            .unwrap();
        let back = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(back, msg);
        let a: Assignment = back.payload(0).unwrap();
        assert_eq!(a.value, -3);
    }

    #[test]
    fn test_three_payloads_keep_order_and_types() {
        let costs: BTreeMap<String, f64> = [("a".to_string(), 1.5), ("b".to_string(), 0.25)].into();
        let msg = Message::new(value_type())
            .with_payload(&"first")
            .unwrap()
            .with_payload(&costs)
            .unwrap()
            .with_payload(&Option::<bool>::None)
            .unwrap();

        let back = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.arity(), 3);
        assert_eq!(back.payload::<String>(0).unwrap(), "first");
        assert_eq!(back.payload::<BTreeMap<String, f64>>(1).unwrap(), costs);
        assert_eq!(back.payload::<Option<bool>>(2).unwrap(), None);
    }

    #[test]
    fn test_missing_and_mistyped_payloads() {
        let msg = Message::new(value_type()).with_payload(&42u32).unwrap();
        assert!(matches!(
            msg.payload::<u32>(1),
            Err(CommunicationError::MissingPayload { index: 1, .. })
        ));
        assert!(matches!(
            msg.payload::<String>(0),
            Err(CommunicationError::Deserialization(_))
        ));
    }

    #[test]
    fn test_corrupt_bytes_are_a_deserialization_fault() {
        assert!(matches!(
            Message::from_bytes(b"{not json"),
            Err(CommunicationError::Deserialization(_))
        ));
        // a type path without ROOT is rejected too
        assert!(Message::from_bytes(br#"{"type":["Algorithm"]}"#).is_err());
    }
}
