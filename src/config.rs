use std::{env, num::NonZeroUsize, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::language::LabelVocabulary;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    ollama_base_url: String,
    ollama_model: String,
    classify_max_concurrency: NonZeroUsize,
    classify_request_timeout: Duration,
    classify_max_attempts: usize,
    classify_backoff_base_ms: u64,
    classify_backoff_cap_ms: u64,
    http_max_connections: usize,
    articles_dir: PathBuf,
    storage_dir: PathBuf,
    target_label: String,
    known_labels: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数からワーカーの設定値を読み込み、検証する。
    ///
    /// すべての変数に既定値があるため、未設定でも動作する。数値のパースに
    /// 失敗した場合のみエラーを返す。
    ///
    /// # Errors
    /// 数値・真偽値のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let ollama_base_url = env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434/".to_string());
        let ollama_model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2:3b".to_string());

        // Fan-out throttling (logical limiter + transport connection cap)
        let classify_max_concurrency = parse_non_zero_usize("CLASSIFY_MAX_CONCURRENCY", 5)?;
        let http_max_connections = parse_usize("HTTP_MAX_CONNECTIONS", 10)?;

        // Per-attempt timeout and retry settings (exponential backoff, no jitter)
        let classify_request_timeout = parse_duration_secs("CLASSIFY_REQUEST_TIMEOUT_SECS", 60)?;
        let classify_max_attempts = parse_usize("CLASSIFY_MAX_ATTEMPTS", 3)?;
        let classify_backoff_base_ms = parse_u64("CLASSIFY_BACKOFF_BASE_MS", 1000)?;
        let classify_backoff_cap_ms = parse_u64("CLASSIFY_BACKOFF_CAP_MS", 8000)?;

        // Input / output locations
        let articles_dir = parse_path("ARTICLES_DIR", "apps/article-urls-grabber/storage");
        let storage_dir = parse_path("STORAGE_DIR", "storage");

        // Label vocabulary: the catch-all target label plus the labels the
        // classifier may answer for the excluded languages. Historically the
        // spelling of these labels has drifted, so they stay configurable.
        let target_label = env::var("TARGET_LANGUAGE_LABEL")
            .unwrap_or_else(|_| "ikinyarwanda".to_string());
        let known_labels = parse_csv("KNOWN_LANGUAGE_LABELS", "english,french");

        Ok(Self {
            ollama_base_url,
            ollama_model,
            classify_max_concurrency,
            classify_request_timeout,
            classify_max_attempts,
            classify_backoff_base_ms,
            classify_backoff_cap_ms,
            http_max_connections,
            articles_dir,
            storage_dir,
            target_label,
            known_labels,
        })
    }

    #[must_use]
    pub fn ollama_base_url(&self) -> &str {
        &self.ollama_base_url
    }

    #[must_use]
    pub fn ollama_model(&self) -> &str {
        &self.ollama_model
    }

    #[must_use]
    pub fn classify_max_concurrency(&self) -> NonZeroUsize {
        self.classify_max_concurrency
    }

    #[must_use]
    pub fn classify_request_timeout(&self) -> Duration {
        self.classify_request_timeout
    }

    #[must_use]
    pub fn classify_max_attempts(&self) -> usize {
        self.classify_max_attempts
    }

    #[must_use]
    pub fn classify_backoff_base_ms(&self) -> u64 {
        self.classify_backoff_base_ms
    }

    #[must_use]
    pub fn classify_backoff_cap_ms(&self) -> u64 {
        self.classify_backoff_cap_ms
    }

    #[must_use]
    pub fn http_max_connections(&self) -> usize {
        self.http_max_connections
    }

    #[must_use]
    pub fn articles_dir(&self) -> &std::path::Path {
        &self.articles_dir
    }

    #[must_use]
    pub fn storage_dir(&self) -> &std::path::Path {
        &self.storage_dir
    }

    /// 設定された分類ラベル語彙を組み立てる。
    #[must_use]
    pub fn label_vocabulary(&self) -> LabelVocabulary {
        LabelVocabulary::new(&self.target_label, &self.known_labels)
    }
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_csv(name: &'static str, default: &str) -> Vec<String> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_path(name: &'static str, default: &str) -> PathBuf {
    env::var(name).map_or_else(|_| PathBuf::from(default), PathBuf::from)
}
