//! Incremental decoder for the `text/event-stream` framing used by `/eth/v1/events`.

use tracing::warn;

use super::types::BeaconEvent;

/// Pending bytes beyond this without a frame terminator are discarded.
const MAX_BUFFERED: usize = 1 << 20;

/// Buffers raw stream chunks and yields complete events.
///
/// Frames end with a blank line. `event:` names the topic, `data:` lines are
/// joined with `\n`, and lines starting with `:` are keep-alive comments.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk, returning every event completed by it in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<BeaconEvent> {
        // CR only ever appears as part of a CRLF line ending here.
        self.buffer
            .extend(chunk.iter().copied().filter(|&byte| byte != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|pair| pair == b"\n\n") {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = decode_frame(&String::from_utf8_lossy(&frame[..end])) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_BUFFERED {
            warn!(
                buffered = self.buffer.len(),
                "event stream frame too large, discarding"
            );
            self.buffer.clear();
        }
        events
    }
}

fn decode_frame(frame: &str) -> Option<BeaconEvent> {
    let mut topic = None;
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => topic = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    let topic = topic?;
    let raw = data.join("\n");
    let data = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
    Some(BeaconEvent::new(topic, data))
}
