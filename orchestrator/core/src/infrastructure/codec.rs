// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Stream framing for envelopes.
//!
//! Each frame is a 4-byte big-endian length followed by the JSON encoding of one
//! [`Envelope`]. The length prefix is checked before the body is decoded, so a
//! body that fails to decode never desynchronises the stream.

use bytes::Bytes;
use tokio_util::codec::LengthDelimitedCodec;

use crate::domain::error::CommunicationError;
use crate::domain::message::Envelope;

pub fn frame_codec(max_frame_bytes: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(max_frame_bytes)
        .new_codec()
}

pub fn encode_envelope(envelope: &Envelope) -> Result<Bytes, CommunicationError> {
    envelope.to_bytes().map(Bytes::from)
}

pub fn decode_envelope(frame: &[u8]) -> Result<Envelope, CommunicationError> {
    Envelope::from_bytes(frame)
}
