//! Incremental decoding of newline-delimited JSON generation responses
//!
//! Each line looks like:
//! ```json
//! {"model":"llama3","response":"Hel","done":false}
//! ```
//! The final line carries `"done": true`. A line with an `"error"` field
//! reports a backend failure.

use bytes::Bytes;
use futures::stream::Stream;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::Fragment;
use crate::error::UpstreamError;

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Stream adapter turning raw body chunks into text fragments
///
/// Fragments are yielded as soon as the line carrying them is complete, so a
/// fragment never waits for the rest of the response.
pub struct NdjsonFragments<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<Fragment, UpstreamError>>,
    finished: bool,
}

impl<S> NdjsonFragments<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn drain_complete_lines(&mut self) {
        while !self.finished {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&line);
        }
    }

    fn decode_line(&mut self, line: &[u8]) {
        let line = line.trim_ascii();
        if line.is_empty() {
            return;
        }

        let chunk: GenerateChunk = match serde_json::from_slice(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.fail(UpstreamError::Decode(format!(
                    "{e}: {}",
                    String::from_utf8_lossy(&line[..line.len().min(100)])
                )));
                return;
            }
        };

        if let Some(message) = chunk.error {
            self.fail(UpstreamError::Backend(message));
            return;
        }

        if !chunk.response.is_empty() {
            self.pending.push_back(Ok(chunk.response));
        }

        if chunk.done {
            self.finished = true;
            self.buffer.clear();
        }
    }

    fn fail(&mut self, error: UpstreamError) {
        self.pending.push_back(Err(error));
        self.finished = true;
        self.buffer.clear();
    }
}

impl<S, E> Stream for NdjsonFragments<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    type Item = Result<Fragment, UpstreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    this.drain_complete_lines();
                }
                Poll::Ready(Some(Err(e))) => {
                    this.fail(UpstreamError::Interrupted(e.to_string()));
                }
                Poll::Ready(None) => {
                    // Connection closed normally; a final line may lack its newline
                    let rest = std::mem::take(&mut this.buffer);
                    this.decode_line(&rest);
                    this.finished = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, StreamExt};

    fn chunks(parts: &[&'static str]) -> Vec<Result<Bytes, std::io::Error>> {
        parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect()
    }

    async fn collect(
        parts: Vec<Result<Bytes, std::io::Error>>,
    ) -> Vec<Result<Fragment, UpstreamError>> {
        NdjsonFragments::new(stream::iter(parts)).collect().await
    }

    #[tokio::test]
    async fn test_decodes_fragments_in_order() {
        let out = collect(chunks(&[
            "{\"response\":\"Hello\",\"done\":false}\n",
            "{\"response\":\", \",\"done\":false}\n{\"response\":\"world\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true,\"eval_count\":3}\n",
        ]))
        .await;

        assert_eq!(
            out,
            vec![
                Ok("Hello".to_string()),
                Ok(", ".to_string()),
                Ok("world".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_reassembles_lines_split_across_chunks() {
        let out = collect(chunks(&[
            "{\"respo",
            "nse\":\"Hel\",\"do",
            "ne\":false}\n{\"response\":\"lo\"",
            ",\"done\":true}\n",
        ]))
        .await;

        assert_eq!(out, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn test_stops_at_done_marker() {
        let out = collect(chunks(&[
            "{\"response\":\"a\",\"done\":true}\n{\"response\":\"ignored\"}\n",
        ]))
        .await;

        assert_eq!(out, vec![Ok("a".to_string())]);
    }

    #[tokio::test]
    async fn test_close_without_done_ends_normally() {
        let out = collect(chunks(&["{\"response\":\"a\"}\n{\"response\":\"b\"}"])).await;
        assert_eq!(out, vec![Ok("a".to_string()), Ok("b".to_string())]);
    }

    #[tokio::test]
    async fn test_crlf_and_blank_lines_are_tolerated() {
        let out = collect(chunks(&["\r\n{\"response\":\"x\"}\r\n\r\n"])).await;
        assert_eq!(out, vec![Ok("x".to_string())]);
    }

    #[tokio::test]
    async fn test_backend_error_line() {
        let out = collect(chunks(&[
            "{\"response\":\"Hel\"}\n{\"error\":\"model crashed\"}\n{\"response\":\"lo\"}\n",
        ]))
        .await;

        assert_eq!(
            out,
            vec![
                Ok("Hel".to_string()),
                Err(UpstreamError::Backend("model crashed".to_string()))
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_line_is_decode_error() {
        let out = collect(chunks(&["{\"response\":\"ok\"}\nnot json\n"])).await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok("ok".to_string()));
        assert!(matches!(out[1], Err(UpstreamError::Decode(_))));
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let parts = vec![
            Ok(Bytes::from_static(b"{\"response\":\"Hel\"}\n")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )),
            Ok(Bytes::from_static(b"{\"response\":\"lo\"}\n")),
        ];

        let out = collect(parts).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok("Hel".to_string()));
        assert!(matches!(&out[1], Err(UpstreamError::Interrupted(msg)) if msg.contains("reset")));
    }

    #[tokio::test]
    async fn test_fragments_available_before_response_completes() {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(4);
        let mut fragments =
            NdjsonFragments::new(tokio_stream::wrappers::ReceiverStream::new(rx));

        tx.send(Ok(Bytes::from_static(b"{\"response\":\"first\"}\n")))
            .await
            .unwrap();
        assert_eq!(fragments.next().await, Some(Ok("first".to_string())));

        tx.send(Ok(Bytes::from_static(b"{\"response\":\"second\"}\n")))
            .await
            .unwrap();
        assert_eq!(fragments.next().await, Some(Ok("second".to_string())));

        drop(tx);
        assert_eq!(fragments.next().await, None);
    }
}
