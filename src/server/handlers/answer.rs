use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream;
use serde::Deserialize;
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, TokenStream};
use crate::rag::AnswerInput;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl AnswerRequest {
    fn into_input(self) -> Result<AnswerInput, ApiError> {
        let question = self
            .prompt
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("Prompt is required".to_string()))?;

        Ok(AnswerInput {
            question,
            system_prompt: self.system_prompt,
            history: self.messages,
        })
    }
}

pub async fn answer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let streaming = request.streaming;
    let input = request.into_input()?;

    let span = tracing::info_span!("answer", request_id = %Uuid::new_v4(), streaming);
    async move {
        tracing::info!("Received question: {}", input.question);

        if streaming {
            let tokens = state.pipeline.stream_answer(&input).await?;
            Ok::<_, ApiError>(event_stream(tokens))
        } else {
            let answer = state.pipeline.answer(&input).await?;
            Ok::<_, ApiError>(Json(json!({ "answer": answer })).into_response())
        }
    }
    .instrument(span)
    .await
}

/// Raw token relay. An `Err` item aborts the body; dropping the body drops
/// the receiver, which cancels the upstream relay.
fn event_stream(tokens: TokenStream) -> Response {
    let body = stream::unfold(tokens, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
