pub mod openai;
pub mod provider;
pub mod service;
pub mod types;


pub use openai::OpenAiProvider;
pub use provider::{LlmProvider, TokenStream};
pub use service::LlmService;
pub use types::{ChatMessage, ChatRequest, Role};
