use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::RunContext;
use super::partition::Buckets;
use super::source::ArticleRecord;

/// 永続化結果。
#[derive(Debug, Clone)]
pub struct PersistResult {
    pub run_id: Uuid,
    pub target_count: usize,
    pub other_count: usize,
    pub target_path: PathBuf,
    pub other_path: PathBuf,
}

#[async_trait]
pub trait PersistStage: Send + Sync {
    /// 両バケットを耐久ストレージへ書き出す。
    ///
    /// # Errors
    /// いずれかのファイルの書き込みに失敗した場合。片方だけ書けた場合は
    /// エラーに両方のパスが含まれ、再実行前の確認を促す。
    async fn persist(&self, run: &RunContext, buckets: Buckets) -> Result<PersistResult>;
}

/// 2つのバケットを実行タイムスタンプ付きのJSON配列ファイルとして保存する。
///
/// 両ファイルは同一の実行タイムスタンプを名前に含み、1回の実行の対として
/// 識別できる。内容は整形済みUTF-8で、非ASCII文字はエスケープしない。
pub struct JsonFilePersistStage {
    storage_dir: PathBuf,
}

impl JsonFilePersistStage {
    #[must_use]
    pub fn new(storage_dir: PathBuf) -> Self {
        Self { storage_dir }
    }
}

#[async_trait]
impl PersistStage for JsonFilePersistStage {
    async fn persist(&self, run: &RunContext, buckets: Buckets) -> Result<PersistResult> {
        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create storage directory {}",
                    self.storage_dir.display()
                )
            })?;

        let tag = run.timestamp_tag();
        let target_path = self
            .storage_dir
            .join(format!("articles_in_kirundi_{tag}.json"));
        let other_path = self
            .storage_dir
            .join(format!("articles_not_in_kirundi_{tag}.json"));

        write_bucket(&target_path, &buckets.target).await?;

        // 1つ目が着地した後の失敗は、どちらが書けたかを添えて報告する。
        // この実行は盲目的に再実行してよい状態ではない。
        if let Err(error) = write_bucket(&other_path, &buckets.other).await {
            return Err(error.context(format!(
                "bucket file {} was already written; inspect both outputs before re-running",
                target_path.display()
            )));
        }

        info!(
            run_id = %run.run_id,
            target_count = buckets.target.len(),
            other_count = buckets.other.len(),
            target_path = %target_path.display(),
            other_path = %other_path.display(),
            "persisted classification buckets"
        );

        Ok(PersistResult {
            run_id: run.run_id,
            target_count: buckets.target.len(),
            other_count: buckets.other.len(),
            target_path,
            other_path,
        })
    }
}

async fn write_bucket(path: &Path, records: &[ArticleRecord]) -> Result<()> {
    let body = serde_json::to_string_pretty(records).context("failed to serialize bucket")?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("failed to write bucket file {}", path.display()))
}
