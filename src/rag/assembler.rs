//! Final prompt construction and answer generation, with the citation section
//! appended either to the full reply or as the last chunk of a token stream.

use tokio::sync::mpsc;

use super::filter::RetrievedContext;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, LlmService, TokenStream};

const RELAY_BUFFER: usize = 32;

/// Renders the "Learn more" section. Empty when there is nothing to cite.
pub fn format_learn_more(citations: &[String]) -> String {
    if citations.is_empty() {
        return String::new();
    }
    let list = citations
        .iter()
        .enumerate()
        .map(|(i, url)| format!("{}. [{}]({})", i + 1, url, url))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n\n**Learn more:**\n\n{}", list)
}

/// `[system prompt, retrieved context, ...history, question]`
pub fn build_messages(
    system_prompt: &str,
    context_chunks: &[String],
    history: &[ChatMessage],
    question: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ChatMessage::system(system_prompt));
    messages.push(ChatMessage::system(format!(
        "Additional context:\n{}",
        context_chunks.join("\n\n")
    )));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(question));
    messages
}

#[derive(Clone)]
pub struct AnswerAssembler {
    llm: LlmService,
}

impl AnswerAssembler {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }

    pub async fn answer(
        &self,
        context: &RetrievedContext,
        system_prompt: &str,
        history: &[ChatMessage],
        question: &str,
    ) -> Result<String, ApiError> {
        let messages = build_messages(system_prompt, &context.context_chunks, history, question);
        let mut answer = self.llm.chat(messages).await?;
        answer.push_str(&format_learn_more(context.citations.urls()));
        Ok(answer)
    }

    /// Starts the model stream and relays its tokens through a new channel.
    ///
    /// A failure before the first token is returned directly. After that,
    /// an upstream error is forwarded as the final item and no citations
    /// follow. Dropping the returned receiver stops the relay and releases
    /// the upstream stream.
    pub async fn stream(
        &self,
        context: &RetrievedContext,
        system_prompt: &str,
        history: &[ChatMessage],
        question: &str,
    ) -> Result<TokenStream, ApiError> {
        let messages = build_messages(system_prompt, &context.context_chunks, history, question);
        let upstream = self.llm.stream_chat(messages).await?;
        let suffix = format_learn_more(context.citations.urls());

        let (tx, rx) = mpsc::channel(RELAY_BUFFER);
        tokio::spawn(relay(upstream, tx, suffix));
        Ok(rx)
    }
}

async fn relay(
    mut upstream: TokenStream,
    tx: mpsc::Sender<Result<String, ApiError>>,
    suffix: String,
) {
    let mut tokens = 0usize;
    loop {
        let item = tokio::select! {
            _ = tx.closed() => {
                tracing::info!("Client disconnected after {} tokens; dropping model stream", tokens);
                return;
            }
            item = upstream.recv() => item,
        };

        match item {
            Some(Ok(token)) => {
                tokens += 1;
                if tx.send(Ok(token)).await.is_err() {
                    tracing::info!("Client disconnected after {} tokens; dropping model stream", tokens);
                    return;
                }
            }
            Some(Err(err)) => {
                tracing::error!("Model stream failed after {} tokens: {}", tokens, err);
                let _ = tx.send(Err(err)).await;
                return;
            }
            None => break,
        }
    }

    if !suffix.is_empty() {
        let _ = tx.send(Ok(suffix)).await;
    }
    tracing::debug!("Relayed {} tokens", tokens);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::llm::tests::{service_with, ScriptedProvider};
    use crate::llm::Role;
    use crate::rag::filter::CitationList;

    fn context(chunks: &[&str], urls: &[&str]) -> RetrievedContext {
        RetrievedContext {
            context_chunks: chunks.iter().map(|c| c.to_string()).collect(),
            citations: urls.iter().collect::<CitationList>(),
        }
    }

    async fn drain(mut rx: TokenStream) -> Vec<Result<String, ApiError>> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[test]
    fn learn_more_section_is_exact() {
        let urls = vec!["https://a".to_string(), "https://b".to_string()];
        assert_eq!(
            format_learn_more(&urls),
            "\n\n**Learn more:**\n\n1. [https://a](https://a)\n2. [https://b](https://b)"
        );
        assert_eq!(format_learn_more(&[]), "");
    }

    #[test]
    fn messages_are_ordered_prompt_context_history_question() {
        let history = vec![
            ChatMessage::user("earlier question"),
            ChatMessage {
                role: Role::Assistant,
                content: "earlier answer".to_string(),
            },
        ];
        let chunks = vec!["first".to_string(), "second".to_string()];

        let messages = build_messages("be helpful", &chunks, &history, "now?");

        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0], ChatMessage::system("be helpful"));
        assert_eq!(
            messages[1],
            ChatMessage::system("Additional context:\nfirst\n\nsecond")
        );
        assert_eq!(messages[2..4], history[..]);
        assert_eq!(messages[4], ChatMessage::user("now?"));
    }

    #[tokio::test]
    async fn answer_appends_citations() {
        let provider = Arc::new(ScriptedProvider::new().reply(Ok("Use Restart-Service.".to_string())));
        let assembler = AnswerAssembler::new(service_with(provider));

        let answer = assembler
            .answer(&context(&["c"], &["https://a"]), "sys", &[], "q")
            .await
            .unwrap();

        assert_eq!(
            answer,
            "Use Restart-Service.\n\n**Learn more:**\n\n1. [https://a](https://a)"
        );
    }

    #[tokio::test]
    async fn empty_context_still_answers_without_section() {
        let provider = Arc::new(ScriptedProvider::new().reply(Ok("I am not sure.".to_string())));
        let assembler = AnswerAssembler::new(service_with(provider.clone()));

        let answer = assembler
            .answer(&RetrievedContext::default(), "sys", &[], "q")
            .await
            .unwrap();

        assert_eq!(answer, "I am not sure.");
        let chats = provider.recorded_chats();
        assert_eq!(chats[0].messages[1].content, "Additional context:\n");
    }

    #[tokio::test]
    async fn answer_failure_is_fatal() {
        let provider = Arc::new(
            ScriptedProvider::new().reply(Err(ApiError::Internal("model down".to_string()))),
        );
        let assembler = AnswerAssembler::new(service_with(provider));

        let result = assembler
            .answer(&context(&["c"], &["https://a"]), "sys", &[], "q")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stream_relays_tokens_then_citations() {
        let provider = Arc::new(ScriptedProvider::new().stream_tokens(&["Use ", "Get-", "Service."]));
        let assembler = AnswerAssembler::new(service_with(provider));

        let rx = assembler
            .stream(&context(&["c"], &["https://a", "https://b"]), "sys", &[], "q")
            .await
            .unwrap();
        let items: Vec<String> = drain(rx).await.into_iter().map(Result::unwrap).collect();

        assert_eq!(
            items,
            vec![
                "Use ".to_string(),
                "Get-".to_string(),
                "Service.".to_string(),
                "\n\n**Learn more:**\n\n1. [https://a](https://a)\n2. [https://b](https://b)"
                    .to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn stream_without_citations_ends_after_tokens() {
        let provider = Arc::new(ScriptedProvider::new().stream_tokens(&["only"]));
        let assembler = AnswerAssembler::new(service_with(provider));

        let rx = assembler
            .stream(&RetrievedContext::default(), "sys", &[], "q")
            .await
            .unwrap();
        let items = drain(rx).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "only");
    }

    #[tokio::test]
    async fn mid_stream_error_is_terminal_and_skips_citations() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .stream_tokens(&["partial"])
                .stream_item(Err(ApiError::Internal("connection reset".to_string())))
                .stream_tokens(&["never"]),
        );
        let assembler = AnswerAssembler::new(service_with(provider));

        let rx = assembler
            .stream(&context(&["c"], &["https://a"]), "sys", &[], "q")
            .await
            .unwrap();
        let items = drain(rx).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn stream_start_failure_is_returned_directly() {
        let provider = Arc::new(ScriptedProvider::new().fail_stream_start("unauthorized"));
        let assembler = AnswerAssembler::new(service_with(provider));

        let err = assembler
            .stream(&RetrievedContext::default(), "sys", &[], "q")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unauthorized"));
    }

    #[tokio::test]
    async fn dropping_the_receiver_releases_the_model_stream() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .stream_tokens(&["first"])
                .hold_stream_open(),
        );
        let released = provider.stream_released();
        let assembler = AnswerAssembler::new(service_with(provider));

        let mut rx = assembler
            .stream(&context(&["c"], &["https://a"]), "sys", &[], "q")
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), "first");
        drop(rx);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !released.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("model stream was not released");
    }
}
