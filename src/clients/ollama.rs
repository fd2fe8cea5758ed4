//! Ollama互換チャットエンドポイントに対する言語分類クライアント。

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clients::TitleClassifier;
use crate::language::{LabelVocabulary, Verdict};
use crate::util::retry::RetryConfig;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// 言語判定をOllamaのチャットAPIへ委譲するクライアント。
///
/// 1試行につきちょうど1回のネットワーク呼び出しを行い、失敗時は
/// [`RetryConfig`] に従って再試行する。全試行が失敗した場合は
/// `unknown` 判定を返し、エラーを呼び出し側へ伝播しない。
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: Url,
    model: String,
    system_instruction: String,
    vocabulary: LabelVocabulary,
    request_timeout: Duration,
    retry: RetryConfig,
}

impl OllamaClient {
    /// 新しい分類クライアントを作成する。
    ///
    /// `max_connections` はトランスポート層のコネクション数の上限で、
    /// 論理リミッターより緩い第二の天井として働く。
    ///
    /// # Errors
    /// HTTPクライアントの構築、またはベースURLのパースに失敗した場合。
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        vocabulary: LabelVocabulary,
        request_timeout: Duration,
        max_connections: usize,
        retry: RetryConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .build()
            .context("failed to build classifier HTTP client")?;

        let base_url = Url::parse(&base_url.into()).context("invalid classifier base URL")?;
        let system_instruction = system_instruction(&vocabulary);

        Ok(Self {
            client,
            base_url,
            model: model.into(),
            system_instruction,
            vocabulary,
            request_timeout,
            retry,
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base_url: impl Into<String>) -> Self {
        let vocabulary = LabelVocabulary::new(
            "Ikinyarwanda",
            &["english".to_string(), "french".to_string()],
        );
        Self::new(
            base_url,
            "llama3.2:3b",
            vocabulary,
            Duration::from_secs(5),
            10,
            RetryConfig::new(3, 10, 40),
        )
        .expect("test client should build")
    }

    /// 1試行分のチャット呼び出しを行い、レスポンス本文のテキストを返す。
    async fn chat(&self, title: &str) -> Result<String> {
        let url = self
            .base_url
            .join("api/chat")
            .context("failed to build classifier chat URL")?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: title,
                },
            ],
            stream: false,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .timeout(self.request_timeout)
            .send()
            .await
            .context("classifier chat request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow!("classifier endpoint returned error status {status}"));
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("failed to deserialize classifier response")?;

        Ok(body.message.content)
    }
}

#[async_trait]
impl TitleClassifier for OllamaClient {
    async fn classify_title(&self, title: &str) -> Verdict {
        let mut attempt = 0;

        loop {
            match self.chat(title).await {
                Ok(raw) => {
                    // 語彙内のラベルは即時に信頼する。明確な否定回答
                    // （既知言語ラベル）も失敗ではないため再試行しない。
                    if let Some(verdict) = self.vocabulary.classify_response(&raw) {
                        if attempt > 0 {
                            debug!(attempt, verdict = %verdict, "classification succeeded after retry");
                        }
                        return verdict;
                    }
                    warn!(
                        attempt,
                        response = raw.trim(),
                        "classifier returned unrecognized label"
                    );
                }
                Err(error) => {
                    warn!(attempt, error = %error, "classification attempt failed");
                }
            }

            attempt += 1;
            if !self.retry.can_retry(attempt) {
                warn!(
                    attempts = attempt,
                    "classification retries exhausted, folding to unknown verdict"
                );
                return Verdict::unknown();
            }

            let delay = self.retry.delay_for_attempt(attempt);
            debug!(
                attempt,
                delay_ms = delay.as_millis(),
                "waiting before classification retry"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// 出力語彙を固定するシステム指示を語彙から組み立てる。
fn system_instruction(vocabulary: &LabelVocabulary) -> String {
    let known_list = vocabulary.known().join(" or ");
    let known_quoted = vocabulary
        .known()
        .iter()
        .map(|label| format!("\"{label}\""))
        .collect::<Vec<_>>()
        .join(" or ");
    let target = vocabulary.target();

    format!(
        "You are a language detection assistant. You will receive text in {known_list} or \
         {target}, and must respond with only {known_quoted} or \"{target}\". If the text is in \
         {known_list}, respond accordingly. If it is in {target} or any language other than \
         {known_list}, respond with \"{target}\". If the text mixes the known languages, respond \
         with one of {known_quoted}, but never \"{target}\". Use only these exact words with no \
         variations, explanations, or extra text."
    )
}
