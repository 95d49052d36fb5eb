use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::collab::prompts::{self, SYSTEM_PROMPT};
use crate::collab::{CollabError, GeneratedWord, Judge, Tutor, Verdict, WordGenerator};
use crate::config::OpenAiConfig;
use crate::engine::difficulty::GenerationRequest;

const TUTOR_MAX_TOKENS: u32 = 150;
const JUDGE_TEMPERATURE: f64 = 0.0;

/// Chat-completions client used for word generation, tutoring and judging.
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
    api_key: String,
    affirmation: String,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig, api_key: String, affirmation: &str) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("OPENAI_API_KEY is not set");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            api_key,
            affirmation: affirmation.to_string(),
        })
    }

    fn complete(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, CollabError> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();
        for attempt in 0..attempts {
            if attempt > 0 {
                let wait = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?wait, "retrying chat completion");
                thread::sleep(wait);
            }

            let response = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, error = %e, "chat completion request failed");
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                warn!(attempt, %status, "chat completion throttled or unavailable");
                last_error = format!("HTTP {status}");
                continue;
            }
            if !status.is_success() {
                let text = response.text().unwrap_or_default();
                return Err(CollabError::Rejected(format!("HTTP {status}: {text}")));
            }

            let payload: Value = response
                .json()
                .map_err(|e| CollabError::Malformed(e.to_string()))?;
            return payload["choices"][0]["message"]["content"]
                .as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| CollabError::Malformed("response has no message content".into()));
        }

        Err(CollabError::Transient(format!(
            "chat completion failed after {attempts} attempts: {last_error}"
        )))
    }
}

impl WordGenerator for OpenAiClient {
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedWord, CollabError> {
        let prompt = prompts::word_generation_prompt(request);
        let raw = self.complete(&prompt, self.config.temperature, self.config.max_tokens)?;
        parse_word_response(&raw)
    }
}

impl Tutor for OpenAiClient {
    fn respond(
        &self,
        thread_context: &str,
        latest_message: &str,
        word: &str,
        theme: Option<&str>,
    ) -> Result<String, CollabError> {
        let prompt =
            prompts::tutor_prompt(thread_context, latest_message, word, theme, &self.affirmation);
        self.complete(&prompt, self.config.temperature, TUTOR_MAX_TOKENS)
    }
}

impl Judge for OpenAiClient {
    fn judge(
        &self,
        response: &str,
        reference_context: &str,
        tolerance: &str,
    ) -> Result<Verdict, CollabError> {
        let prompt = prompts::judge_prompt(response, reference_context, tolerance);
        let raw = self.complete(&prompt, JUDGE_TEMPERATURE, TUTOR_MAX_TOKENS)?;
        let value = parse_json_object(&raw)?;
        let correct = value["correct"]
            .as_bool()
            .ok_or_else(|| CollabError::Malformed("verdict is missing 'correct'".into()))?;
        let feedback = value["feedback"].as_str().unwrap_or_default().trim().to_string();
        Ok(Verdict { correct, feedback })
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn parse_json_object(raw: &str) -> Result<Value, CollabError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| CollabError::Malformed(format!("not JSON ({e}): {raw}")))?;
    if !value.is_object() {
        return Err(CollabError::Malformed(format!("expected a JSON object: {raw}")));
    }
    Ok(value)
}

/// A bare string where a list is expected is treated as a one-element list.
fn string_list(value: &Value, field: &str) -> Result<Vec<String>, CollabError> {
    let items: Vec<String> = match value {
        Value::String(s) => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .collect(),
        _ => return Err(CollabError::Malformed(format!("missing field '{field}'"))),
    };
    let items: Vec<String> = items.into_iter().filter(|s| !s.is_empty()).collect();
    if items.is_empty() {
        return Err(CollabError::Malformed(format!("field '{field}' is empty")));
    }
    Ok(items)
}

pub fn parse_word_response(raw: &str) -> Result<GeneratedWord, CollabError> {
    let value = parse_json_object(raw)?;
    let word = value["word"]
        .as_str()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .ok_or_else(|| CollabError::Malformed("missing field 'word'".into()))?
        .to_string();
    Ok(GeneratedWord {
        word,
        meanings: string_list(&value["meanings"], "meanings")?,
        examples: string_list(&value["examples"], "examples")?,
    })
}
