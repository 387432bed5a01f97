//! af-stream: Streaming update decoder.
//!
//! [`UpdateDecoder`] is the synchronous core; [`decode_stream`] adapts a
//! stream of byte chunks (e.g. an HTTP response body) into a stream of
//! decoded records.

pub mod decoder;

pub use decoder::UpdateDecoder;

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("transport error: {0}")]
    Transport(String),
}

struct DecodeState<S, T> {
    inner: Pin<Box<S>>,
    decoder: UpdateDecoder<T>,
    ready: VecDeque<T>,
    done: bool,
}

/// Decode a stream of byte chunks into records, in arrival order.
///
/// A transport error is yielded once and ends the stream. When the
/// underlying channel closes, any unterminated trailing record is flushed.
pub fn decode_stream<S, B, E, T>(chunks: S) -> impl Stream<Item = Result<T, StreamError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    T: DeserializeOwned,
{
    let state = DecodeState {
        inner: Box::pin(chunks),
        decoder: UpdateDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(record) = st.ready.pop_front() {
                return Some((Ok(record), st));
            }
            if st.done {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    let records = st.decoder.feed_bytes(chunk.as_ref());
                    st.ready.extend(records);
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(StreamError::Transport(e.to_string())), st));
                }
                None => {
                    st.done = true;
                    if let Some(record) = st.decoder.finish() {
                        st.ready.push_back(record);
                    }
                    if st.decoder.dropped() > 0 {
                        tracing::debug!(dropped = st.decoder.dropped(), "stream closed");
                    }
                }
            }
        }
    })
}
