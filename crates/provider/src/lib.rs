pub mod error;
pub mod http;
pub mod message;
pub mod retry;
pub mod rng;

pub use error::{ErrorClass, ProviderError};
pub use http::HttpProvider;
pub use message::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, GenerationConfig,
    GenerationProvider, ToolCall, ToolOutcome, ToolResult,
};
pub use retry::{CredentialObserver, CredentialWatch, RetryPolicy};
pub use rng::{RandomSource, ThreadRandom};
