//! services/journal/src/adapters/companion_llm.rs
//!
//! Adapters for the `BookCompanionService` port: one backed by the OpenAI chat
//! API, and an offline one that always returns the deterministic defaults.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use booktalk_core::domain::{Book, Message, Sender};
use booktalk_core::ports::{
    fallback_welcome, BookCompanionService, PortError, PortResult, CHAT_HISTORY_LIMIT,
    FALLBACK_CHAT_REPLY, MAX_KEYWORDS,
};

//=========================================================================================
// OpenAI Adapter
//=========================================================================================

pub struct OpenAiCompanionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCompanionAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Sends the conversation and returns the text of the first choice.
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> PortResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                PortError::Unexpected("Companion LLM returned no text content.".to_string())
            })
    }
}

fn system_message(content: String) -> PortResult<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestSystemMessageArgs::default()
        .content(content)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

fn user_message(content: String) -> PortResult<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestUserMessageArgs::default()
        .content(content)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

fn assistant_message(content: String) -> PortResult<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestAssistantMessageArgs::default()
        .content(content)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

/// Parses a JSON array of strings, keeping at most `MAX_KEYWORDS` non-empty entries.
fn parse_keywords(raw: &str) -> PortResult<Vec<String>> {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let keywords: Vec<String> = serde_json::from_str(trimmed).map_err(|e| {
        PortError::Unexpected(format!("Keyword response was not a JSON array: {}", e))
    })?;
    Ok(keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .take(MAX_KEYWORDS)
        .collect())
}

#[async_trait]
impl BookCompanionService for OpenAiCompanionAdapter {
    async fn generate_welcome(&self, title: &str, author: &str) -> PortResult<String> {
        let messages = vec![user_message(format!(
            "I am starting to read the book \"{}\" by {}. Write a short, friendly, 1-sentence \
             welcome message as if you are the book welcoming me to read you. Be charming.",
            title, author
        ))?];
        self.complete(messages).await
    }

    async fn chat(&self, book: &Book, history: &[Message], user_text: &str) -> PortResult<String> {
        let mut messages = vec![system_message(format!(
            "You are the book \"{}\" by {}. Your persona is friendly, knowledgeable, and helpful. \
             You are chatting with a reader who is currently reading you. Answer their questions \
             about your plot, characters, themes, or author. If they ask for a summary, give a \
             brief one. If they share a quote, appreciate it. Keep your responses concise (under \
             100 words) and conversational, like a chat message.",
            book.title, book.author
        ))?];

        let start = history.len().saturating_sub(CHAT_HISTORY_LIMIT);
        for msg in &history[start..] {
            messages.push(match msg.sender {
                Sender::User => user_message(msg.text.clone())?,
                Sender::Book => assistant_message(msg.text.clone())?,
            });
        }
        messages.push(user_message(user_text.to_string())?);

        self.complete(messages).await
    }

    async fn extract_keywords(&self, text: &str) -> PortResult<Vec<String>> {
        let messages = vec![user_message(format!(
            "Analyze this book quote and extract exactly {} short, relevant keywords or themes \
             (e.g. Love, War, Regret). Return ONLY a JSON array of strings. Quote: \"{}\"",
            MAX_KEYWORDS, text
        ))?];
        let raw = self.complete(messages).await?;
        parse_keywords(&raw)
    }
}

//=========================================================================================
// Offline Adapter
//=========================================================================================

/// Used when no AI credentials are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineCompanion;

#[async_trait]
impl BookCompanionService for OfflineCompanion {
    async fn generate_welcome(&self, title: &str, _author: &str) -> PortResult<String> {
        Ok(fallback_welcome(title))
    }

    async fn chat(
        &self,
        _book: &Book,
        _history: &[Message],
        _user_text: &str,
    ) -> PortResult<String> {
        Ok(FALLBACK_CHAT_REPLY.to_string())
    }

    async fn extract_keywords(&self, _text: &str) -> PortResult<Vec<String>> {
        Ok(Vec::new())
    }
}
