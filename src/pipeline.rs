use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clients::{OllamaClient, TitleClassifier};
use crate::config::Config;
use crate::util::{limiter::ConcurrencyLimiter, retry::RetryConfig};

pub mod classify;
pub mod dedup;
pub mod partition;
pub mod persist;
pub mod prefilter;
pub mod source;

use classify::{ClassifyStage, FanOutClassifyStage};
use dedup::{DedupStage, UrlDedupStage};
use persist::{JsonFilePersistStage, PersistResult, PersistStage};
use prefilter::{PrefilterStage, StoplistPrefilterStage};
use source::{JsonDirSourceStage, SourceStage};

/// 1回のパイプライン実行のコンテキスト。
///
/// `started_at` は両出力ファイルが共有する実行タイムスタンプの源になる。
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// 両出力ファイル名に埋め込まれる共有タイムスタンプ。
    #[must_use]
    pub fn timestamp_tag(&self) -> String {
        self.started_at.format("%Y%m%d_%H%M%S").to_string()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 記事の収集から分類・永続化までを順に実行するオーケストレーター。
///
/// 実行は `source → dedup → prefilter → classify → persist` と進む。
/// 候補取得の失敗のみが実行を中断させる。分類の失敗は `unknown` 判定に
/// 畳み込まれ、実行を止めない。
pub struct PipelineOrchestrator {
    stages: PipelineStages,
}

struct PipelineStages {
    source: Arc<dyn SourceStage>,
    dedup: Arc<dyn DedupStage>,
    prefilter: Arc<dyn PrefilterStage>,
    classify: Arc<dyn ClassifyStage>,
    persist: Arc<dyn PersistStage>,
}

pub struct PipelineBuilder {
    source: Option<Arc<dyn SourceStage>>,
    dedup: Option<Arc<dyn DedupStage>>,
    prefilter: Option<Arc<dyn PrefilterStage>>,
    classify: Option<Arc<dyn ClassifyStage>>,
    persist: Option<Arc<dyn PersistStage>>,
}

impl PipelineOrchestrator {
    /// 設定から既定のステージ構成を組み立てる。
    ///
    /// # Errors
    /// 分類クライアントの構築に失敗した場合。
    pub fn from_config(config: &Config) -> Result<Self> {
        let vocabulary = config.label_vocabulary();
        let retry = RetryConfig::new(
            config.classify_max_attempts(),
            config.classify_backoff_base_ms(),
            config.classify_backoff_cap_ms(),
        );
        let classifier = OllamaClient::new(
            config.ollama_base_url(),
            config.ollama_model(),
            vocabulary.clone(),
            config.classify_request_timeout(),
            config.http_max_connections(),
            retry,
        )
        .context("failed to build classifier client")?;
        let classifier: Arc<dyn TitleClassifier> = Arc::new(classifier);

        // リミッターはドライバが所有し、ステージへ注入する
        let limiter = ConcurrencyLimiter::new(config.classify_max_concurrency());

        Ok(Self::builder()
            .with_source_stage(Arc::new(JsonDirSourceStage::new(
                config.articles_dir().to_path_buf(),
            )))
            .with_dedup_stage(Arc::new(UrlDedupStage::new()))
            .with_prefilter_stage(Arc::new(StoplistPrefilterStage::new()))
            .with_classify_stage(Arc::new(FanOutClassifyStage::new(
                classifier, limiter, vocabulary,
            )))
            .with_persist_stage(Arc::new(JsonFilePersistStage::new(
                config.storage_dir().to_path_buf(),
            )))
            .build())
    }

    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// パイプラインを最後まで実行する。
    ///
    /// # Errors
    /// 候補取得または永続化の失敗時。分類段階は候補を失わない限り失敗
    /// しない。
    pub async fn execute(&self, run: &RunContext) -> Result<PersistResult> {
        tracing::info!(run_id = %run.run_id, "article language filter run started");

        let sourced = self.stages.source.collect(run).await?;
        let deduplicated = self.stages.dedup.deduplicate(run, sourced).await?;
        let candidates = self.stages.prefilter.filter(run, deduplicated).await?;
        let buckets = self.stages.classify.classify(run, candidates).await?;
        let persisted = self.stages.persist.persist(run, buckets).await?;

        tracing::info!(
            run_id = %run.run_id,
            target_count = persisted.target_count,
            other_count = persisted.other_count,
            "article language filter run completed"
        );
        Ok(persisted)
    }
}

impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: None,
            dedup: None,
            prefilter: None,
            classify: None,
            persist: None,
        }
    }

    #[must_use]
    pub fn with_source_stage(mut self, stage: Arc<dyn SourceStage>) -> Self {
        self.source = Some(stage);
        self
    }

    #[must_use]
    pub fn with_dedup_stage(mut self, stage: Arc<dyn DedupStage>) -> Self {
        self.dedup = Some(stage);
        self
    }

    #[must_use]
    pub fn with_prefilter_stage(mut self, stage: Arc<dyn PrefilterStage>) -> Self {
        self.prefilter = Some(stage);
        self
    }

    #[must_use]
    pub fn with_classify_stage(mut self, stage: Arc<dyn ClassifyStage>) -> Self {
        self.classify = Some(stage);
        self
    }

    #[must_use]
    pub fn with_persist_stage(mut self, stage: Arc<dyn PersistStage>) -> Self {
        self.persist = Some(stage);
        self
    }

    /// # Panics
    /// いずれかのステージが未設定の場合。
    #[must_use]
    pub fn build(self) -> PipelineOrchestrator {
        let stages = PipelineStages {
            source: self.source.expect("source stage must be configured before build"),
            dedup: self.dedup.expect("dedup stage must be configured before build"),
            prefilter: self
                .prefilter
                .expect("prefilter stage must be configured before build"),
            classify: self
                .classify
                .expect("classify stage must be configured before build"),
            persist: self
                .persist
                .expect("persist stage must be configured before build"),
        };

        PipelineOrchestrator { stages }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
