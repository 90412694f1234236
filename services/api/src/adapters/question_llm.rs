//! services/api/src/adapters/question_llm.rs
//!
//! This module contains the adapter for the Question-Generating LLM.
//! It implements the `QuestionGenerationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use quiz_platform_core::{
    domain::{GeneratedQuestion, GenerationParams, QuestionKind},
    ports::{PortError, PortResult, QuestionGenerationService},
};
use tracing::debug;

const SYSTEM_PROMPT: &str = "You write quiz questions for teachers. Reply with a single JSON object \
and nothing else, using exactly these keys: \"question\" (string), \"correct_answer\" (string), \
\"incorrect_answers\" (array of strings) and \"explanation\" (string, one or two sentences).";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `QuestionGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiQuestionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiQuestionAdapter {
    /// Creates a new `OpenAiQuestionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

fn user_prompt(params: &GenerationParams) -> String {
    let shape = match params.kind {
        QuestionKind::Boolean => {
            "a true/false statement; correct_answer must be \"True\" or \"False\" and \
             incorrect_answers must hold only the other value"
                .to_string()
        }
        QuestionKind::Multiple => {
            "a multiple-choice question with exactly 3 plausible, distinct incorrect answers".to_string()
        }
    };
    let mut prompt = format!(
        "TOPIC: {}\nDIFFICULTY: {}\nFORMAT: {}",
        params.topic,
        params.difficulty.as_str(),
        shape
    );
    if let Some(style) = params.style.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("\nSTYLE: {}", style));
    }
    prompt
}

/// Models sometimes wrap JSON in a markdown fence even when asked not to.
fn parse_generated(content: &str) -> PortResult<GeneratedQuestion> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).map_err(|e| {
        PortError::Unexpected(format!("Question generation LLM returned malformed JSON: {}", e))
    })
}

//=========================================================================================
// `QuestionGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuestionGenerationService for OpenAiQuestionAdapter {
    async fn generate_question(&self, params: &GenerationParams) -> PortResult<GeneratedQuestion> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt(params))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

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

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected(
                    "Question generation LLM response contained no text content.".to_string(),
                )
            })?;

        debug!("Generated question for topic '{}'", params.topic);
        parse_generated(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_platform_core::domain::Difficulty;

    #[test]
    fn fenced_json_is_accepted() {
        let content = "```json\n{\"question\":\"2+2?\",\"correct_answer\":\"4\",\"incorrect_answers\":[\"3\",\"5\",\"22\"]}\n```";
        let generated = parse_generated(content).unwrap();
        assert_eq!(generated.correct_answer, "4");
        assert_eq!(generated.incorrect_answers.len(), 3);
        assert_eq!(generated.explanation, None);
    }

    #[test]
    fn prose_is_rejected() {
        assert!(matches!(
            parse_generated("Here is a question about rivers."),
            Err(PortError::Unexpected(_))
        ));
    }

    #[test]
    fn boolean_prompt_pins_the_answer_values() {
        let prompt = user_prompt(&GenerationParams {
            topic: "Photosynthesis".to_string(),
            kind: QuestionKind::Boolean,
            difficulty: Difficulty::Hard,
            style: Some("  ".to_string()),
        });
        assert!(prompt.contains("TOPIC: Photosynthesis"));
        assert!(prompt.contains("DIFFICULTY: hard"));
        assert!(prompt.contains("\"True\" or \"False\""));
        assert!(!prompt.contains("STYLE"));
    }
}
