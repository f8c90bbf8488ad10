pub mod events;
pub mod sse;
pub mod stream;

pub use events::{ArtifactEvent, GITHUB_FILES_EVENT, IngestEvent, decode_event};
pub use sse::{SseBuffer, event_payload, parse_data_lines};
pub use stream::{DEFAULT_RECONNECT_DELAY, EventStream};
