use crate::events::StreamEvent;

/// Incremental parser for newline-delimited JSON streams.
///
/// Envelopes may span or combine within network chunks; only complete lines
/// are parsed. The buffer holds raw bytes so a multi-byte character split
/// across chunks reassembles intact. A malformed line never fails the
/// stream: one corrupt envelope must not abort an otherwise-healthy
/// generation, so bad lines are skipped.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    /// Feed arbitrary bytes into the decoder and drain complete events.
    ///
    /// After a `Complete` or `Error` event the caller must stop reading;
    /// the decoder itself keeps no terminal state.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(split) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(0..=split).collect();
            let line = match std::str::from_utf8(&raw[..split]) {
                Ok(line) => line.trim(),
                Err(error) => {
                    tracing::debug!(%error, "skipping non-utf8 stream line");
                    continue;
                }
            };

            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<StreamEvent>(line) {
                Ok(event) => events.push(event),
                Err(error) => {
                    tracing::debug!(%error, "skipping malformed stream envelope");
                }
            }
        }

        events
    }

    /// Parse a complete stream payload in one shot.
    pub fn parse_lines(input: &str) -> Vec<StreamEvent> {
        let mut decoder = Self::default();
        decoder.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(|byte| byte.is_ascii_whitespace())
    }
}
