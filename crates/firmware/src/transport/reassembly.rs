// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reassembly of fragmented application messages.
//!
//! The WebSocket library reports each incoming fragment with its offset and
//! the total payload length of the message it belongs to. The reassembler
//! accumulates fragments into one buffer and hands the complete text up
//! exactly once. Anything inconsistent discards the in-flight buffer; the
//! server will resend or the frame is lost, which the protocol tolerates.

/// One fragment as reported by the WebSocket library.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    /// WebSocket op code of the carrying frame. Informational only.
    pub op_code: u8,
    pub data: &'a [u8],
    /// Byte offset of `data` within the full message payload.
    pub payload_offset: usize,
    /// Total payload length of the full message.
    pub payload_len: usize,
}

impl<'a> Chunk<'a> {
    /// A chunk covering an entire unfragmented message.
    pub fn whole(data: &'a [u8]) -> Self {
        Self { op_code: 0x1, data, payload_offset: 0, payload_len: data.len() }
    }
}

/// Accumulates fragments into complete messages.
///
/// One reassembler per connection; the buffer lives from the first fragment
/// of a message to its last, and is dropped on [`reset`](Self::reset) when
/// the link goes down mid-message.
#[derive(Default)]
pub struct Reassembler {
    buf: Option<Vec<u8>>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Returns the complete message text when the final
    /// byte lands, `None` otherwise.
    pub fn push(&mut self, chunk: Chunk<'_>) -> Option<String> {
        if chunk.payload_offset == 0 {
            if self.buf.is_some() {
                tracing::warn!("new message started mid-reassembly, dropping in-flight buffer");
            }
            let mut buf = Vec::with_capacity(chunk.payload_len);
            buf.extend_from_slice(chunk.data);
            self.buf = Some(buf);
        } else {
            let Some(buf) = self.buf.as_mut() else {
                tracing::warn!(
                    offset = chunk.payload_offset,
                    "fragment without a message start, dropping"
                );
                return None;
            };
            if chunk.payload_offset != buf.len() {
                tracing::warn!(
                    offset = chunk.payload_offset,
                    accumulated = buf.len(),
                    "fragment offset out of sequence, dropping in-flight buffer"
                );
                self.buf = None;
                return None;
            }
            buf.extend_from_slice(chunk.data);
        }

        let accumulated = self.buf.as_ref().map(Vec::len).unwrap_or(0);
        if accumulated > chunk.payload_len {
            tracing::warn!(
                accumulated,
                expected = chunk.payload_len,
                "fragments overran declared payload length, dropping"
            );
            self.buf = None;
            return None;
        }
        if accumulated < chunk.payload_len {
            return None;
        }

        let buf = self.buf.take()?;
        match String::from_utf8(buf) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(err = %e, "reassembled payload is not UTF-8, dropping");
                None
            }
        }
    }

    /// Discard any in-flight buffer. Called on disconnect.
    pub fn reset(&mut self) {
        if self.buf.take().is_some() {
            tracing::debug!("in-flight reassembly buffer discarded on disconnect");
        }
    }

    /// Whether a message is currently mid-reassembly.
    pub fn in_flight(&self) -> bool {
        self.buf.is_some()
    }
}

#[cfg(test)]
#[path = "reassembly_tests.rs"]
mod tests;
