//! Server-Sent Events framing for streaming provider responses

use super::LlmError;
use futures::{Stream, StreamExt};

/// Turn a streaming HTTP response into the `data:` payloads of its events.
pub(super) fn data_payloads(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, LlmError>> + Send {
    let byte_stream = response.bytes_stream();

    async_stream::try_stream! {
        let mut buf = Vec::<u8>::new();

        futures::pin_mut!(byte_stream);
        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::network(format!("Stream interrupted: {e}")))?;
            buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

            for payload in drain_frames(&mut buf) {
                yield payload;
            }
        }

        // Some servers close without the final blank line
        if !buf.is_empty() {
            buf.extend_from_slice(b"\n\n");
            for payload in drain_frames(&mut buf) {
                yield payload;
            }
        }
    }
}

/// Reply text carried by a provider's event payloads.
///
/// The stream finishes cleanly only once `is_end` matches a payload. A body
/// that closes before that is a truncated reply and ends with a network
/// error, so partial text is never mistaken for a finished answer.
pub(super) fn reply_fragments(
    payloads: impl Stream<Item = Result<String, LlmError>> + Send + 'static,
    is_end: fn(&str) -> bool,
    parse: fn(&str) -> Result<Option<String>, LlmError>,
) -> impl Stream<Item = Result<String, LlmError>> + Send {
    async_stream::try_stream! {
        let mut finished = false;

        futures::pin_mut!(payloads);
        while let Some(payload) = payloads.next().await {
            let data = payload?;
            if is_end(&data) {
                finished = true;
                break;
            }
            if let Some(text) = parse(&data)? {
                yield text;
            }
        }

        if !finished {
            Err::<(), _>(LlmError::network("Stream ended before completion"))?;
        }
    }
}

/// Remove every complete event from `buf` and return their data payloads.
///
/// Multi-line `data:` fields are joined with `\n`. Events without data
/// (comments, bare `event:` lines) are dropped.
pub(super) fn drain_frames(buf: &mut Vec<u8>) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(pos) = buf.windows(2).position(|w| w == b"\n\n") {
        let frame: Vec<u8> = buf.drain(..pos + 2).collect();
        let text = String::from_utf8_lossy(&frame);

        let data: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|d| d.strip_prefix(' ').unwrap_or(d))
            .collect();

        if !data.is_empty() {
            payloads.push(data.join("\n"));
        }
    }

    payloads
}
