pub mod http_client;
pub mod openai;
pub mod response;
pub mod scrub;
pub mod traits;

pub use http_client::{build_client_with_timeout, build_provider_client, build_stream_client};
pub use openai::OpenAiProvider;
pub use response::{ContentBlock, MessageRole, ProviderMessage, ProviderResponse, StopReason};
pub use scrub::{api_error, sanitize_api_error, scrub_secret_patterns};
pub use traits::Provider;
