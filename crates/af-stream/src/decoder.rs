//! Record decoder: turns arbitrarily split chunks into `data: <json>` records.
//!
//! Records are newline-terminated. A chunk may end in the middle of a record
//! (or in the middle of a UTF-8 sequence), so the trailing fragment is carried
//! over to the next call.

use af_core::execution::ExecutionUpdate;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

const DATA_FIELD: &str = "data:";

/// Incremental decoder for `data: <json>\n` record streams.
pub struct UpdateDecoder<T = ExecutionUpdate> {
    buffer: Vec<u8>,
    dropped: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Default for UpdateDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> UpdateDecoder<T> {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            dropped: 0,
            _record: PhantomData,
        }
    }

    /// Feed a text chunk and return every record it completes.
    pub fn feed(&mut self, chunk: &str) -> Vec<T> {
        self.feed_bytes(chunk.as_bytes())
    }

    /// Feed a raw byte chunk and return every record it completes.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<T> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split(|&b| b == b'\n')
            .filter_map(|line| self.decode_line(line))
            .collect()
    }

    /// Flush a final record that was not newline-terminated.
    ///
    /// Call once the underlying channel has closed.
    pub fn finish(&mut self) -> Option<T> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line)
    }

    /// Number of records dropped because they could not be decoded.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Bytes held back waiting for the rest of a record.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<T> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return None;
        }

        let text = match std::str::from_utf8(line) {
            Ok(text) => text,
            Err(e) => {
                self.dropped += 1;
                tracing::warn!("dropping stream record with invalid UTF-8: {e}");
                return None;
            }
        };

        // SSE comments and non-data fields (event:, id:, retry:) carry nothing for us.
        let Some(payload) = text.strip_prefix(DATA_FIELD) else {
            if !text.starts_with(':') {
                tracing::debug!("ignoring non-data stream line: {text}");
            }
            return None;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        if payload.trim().is_empty() {
            return None;
        }

        match serde_json::from_str(payload) {
            Ok(record) => Some(record),
            Err(e) => {
                self.dropped += 1;
                tracing::warn!("dropping malformed stream record: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::execution::UpdateType;
    use serde_json::{json, Value};

    #[test]
    fn record_split_across_chunks() {
        let mut decoder = UpdateDecoder::<Value>::new();

        let first = decoder.feed("data: {\"a\":1}\nda");
        assert_eq!(first, vec![json!({"a": 1})]);
        assert_eq!(decoder.pending_len(), 2);

        let second = decoder.feed("ta: {\"a\":2}\n");
        assert_eq!(second, vec![json!({"a": 2})]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn every_split_point_yields_same_records() {
        let input = "data: {\"a\":1}\ndata: {\"a\":2}\n";
        for split in 0..=input.len() {
            let mut decoder = UpdateDecoder::<Value>::new();
            let mut out = decoder.feed(&input[..split]);
            out.extend(decoder.feed(&input[split..]));
            assert_eq!(out, vec![json!({"a": 1}), json!({"a": 2})], "split at {split}");
        }
    }

    #[test]
    fn multibyte_character_split_between_byte_chunks() {
        let bytes = "data: {\"msg\":\"héllo\"}\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = UpdateDecoder::<Value>::new();
        assert!(decoder.feed_bytes(&bytes[..split]).is_empty());
        let out = decoder.feed_bytes(&bytes[split..]);
        assert_eq!(out, vec![json!({"msg": "héllo"})]);
        assert_eq!(decoder.dropped(), 0);
    }

    #[test]
    fn malformed_record_is_dropped_and_stream_continues() {
        let mut decoder = UpdateDecoder::<Value>::new();
        let out = decoder.feed("data: {not json}\ndata: {\"ok\":true}\n");
        assert_eq!(out, vec![json!({"ok": true})]);
        assert_eq!(decoder.dropped(), 1);
    }

    #[test]
    fn ignores_comments_blank_lines_and_other_fields() {
        let mut decoder = UpdateDecoder::<Value>::new();
        let out = decoder.feed(": keep-alive\r\n\r\nevent: progress\r\ndata:{\"n\":1}\r\n\r\n");
        assert_eq!(out, vec![json!({"n": 1})]);
        assert_eq!(decoder.dropped(), 0);
    }

    #[test]
    fn finish_flushes_unterminated_record() {
        let mut decoder = UpdateDecoder::<Value>::new();
        assert!(decoder.feed("data: {\"last\":true}").is_empty());
        assert_eq!(decoder.finish(), Some(json!({"last": true})));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn decodes_execution_updates_by_default() {
        let mut decoder: UpdateDecoder = UpdateDecoder::new();
        let out = decoder.feed(concat!(
            "data: {\"execution_id\":\"r1\",\"type\":\"node_start\",\"data\":{\"node_id\":\"n1\"}}\n",
            "data: {\"execution_id\":\"r1\",\"type\":\"bogus\"}\n",
        ));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].update_type, UpdateType::NodeStart);
        assert_eq!(out[0].node_id(), Some("n1"));
        assert_eq!(decoder.dropped(), 1);
    }
}
