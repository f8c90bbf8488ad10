/// Accumulates raw stream bytes and yields complete server-sent event blocks.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: String,
}

impl SseBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        if text.contains('\r') {
            self.buffer.push_str(&text.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(&text);
        }
    }

    pub fn next_event_block(&mut self) -> Option<String> {
        let boundary = self.buffer.find("\n\n")?;
        let remaining = self.buffer.split_off(boundary + 2);
        let event_block = std::mem::take(&mut self.buffer);
        self.buffer = remaining;
        Some(event_block)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

pub fn parse_data_lines(event_block: &str) -> Vec<&str> {
    event_block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect()
}

/// Payload of one event block: its `data:` lines joined with `\n`, or `None`
/// for comment and keep-alive blocks.
pub fn event_payload(event_block: &str) -> Option<String> {
    let lines = parse_data_lines(event_block);
    if lines.is_empty() {
        return None;
    }
    let payload = lines.join("\n");
    (!payload.trim().is_empty()).then_some(payload)
}
