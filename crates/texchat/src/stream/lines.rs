/// Splits a chunked byte stream into UTF-8 lines.
///
/// A multi-byte sequence cut by a chunk boundary is held back until the next
/// chunk completes it; invalid sequences are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct LineBuffer {
    undecoded: Vec<u8>,
    partial: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed, without terminators
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.undecoded.extend_from_slice(chunk);
        self.decode();

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find('\n') {
            let mut line: String = self.partial.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Drain whatever is left once the transport has ended
    pub fn finish(&mut self) -> Option<String> {
        if !self.undecoded.is_empty() {
            self.partial
                .push_str(&String::from_utf8_lossy(&std::mem::take(&mut self.undecoded)));
        }
        let mut rest = std::mem::take(&mut self.partial);
        if rest.ends_with('\r') {
            rest.pop();
        }
        (!rest.is_empty()).then_some(rest)
    }

    fn decode(&mut self) {
        let mut bytes = std::mem::take(&mut self.undecoded);
        loop {
            match std::str::from_utf8(&bytes) {
                Ok(s) => {
                    self.partial.push_str(s);
                    bytes.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    // valid_up_to guarantees this prefix decodes
                    self.partial
                        .push_str(&String::from_utf8_lossy(&bytes[..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            self.partial.push(char::REPLACEMENT_CHARACTER);
                            bytes.drain(..valid + invalid);
                        }
                        None => {
                            bytes.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        self.undecoded = bytes;
    }
}
