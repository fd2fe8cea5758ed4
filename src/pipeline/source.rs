use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::RunContext;

/// スクレイプ済み記事のメタデータ1件。
///
/// `title` と `url` 以外のフィールドは不透明なまま保持し、出力時に
/// そのまま書き戻す。パイプラインに入った後は不変。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourcedCorpus {
    pub run_id: Uuid,
    pub articles: Vec<ArticleRecord>,
}

/// 候補記事メタデータの取得ステージ。
///
/// 取得の失敗は実行全体にとって致命的であり、分類のネットワーク呼び出しが
/// 始まる前に実行を中断させる。
#[async_trait]
pub trait SourceStage: Send + Sync {
    /// 入力ディレクトリから全記事メタデータを収集する。
    ///
    /// # Errors
    /// ディレクトリやファイルの読み取り・パースに失敗した場合。エラーには
    /// 問題のパスが含まれる。
    async fn collect(&self, run: &RunContext) -> Result<SourcedCorpus>;
}

/// URLグラバーが書き出したJSON配列ファイル群を読み込むステージ。
pub struct JsonDirSourceStage {
    articles_dir: PathBuf,
}

impl JsonDirSourceStage {
    #[must_use]
    pub fn new(articles_dir: PathBuf) -> Self {
        Self { articles_dir }
    }
}

#[async_trait]
impl SourceStage for JsonDirSourceStage {
    async fn collect(&self, run: &RunContext) -> Result<SourcedCorpus> {
        let mut entries = tokio::fs::read_dir(&self.articles_dir).await.with_context(|| {
            format!(
                "failed to read article metadata directory {}",
                self.articles_dir.display()
            )
        })?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.with_context(|| {
            format!(
                "failed to list article metadata directory {}",
                self.articles_dir.display()
            )
        })? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        // ファイル列挙の順序はOS依存のため、決定的になるようソートする
        paths.sort();

        let mut articles = Vec::new();
        for path in &paths {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read article metadata file {}", path.display()))?;
            let mut batch: Vec<ArticleRecord> = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse article metadata file {}", path.display()))?;
            articles.append(&mut batch);
        }

        info!(
            run_id = %run.run_id,
            file_count = paths.len(),
            article_count = articles.len(),
            "collected article metadata"
        );

        Ok(SourcedCorpus {
            run_id: run.run_id,
            articles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &std::path::Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).expect("test file written");
    }

    #[tokio::test]
    async fn collect_merges_files_in_sorted_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "b_batch.json",
            r#"[{"url": "/b", "title": "Second batch"}]"#,
        );
        write_file(
            dir.path(),
            "a_batch.json",
            r#"[{"url": "/a", "title": "First batch", "author": "Jane"}]"#,
        );
        write_file(dir.path(), "notes.txt", "not json, ignored");

        let stage = JsonDirSourceStage::new(dir.path().to_path_buf());
        let run = RunContext::new();
        let corpus = stage.collect(&run).await.expect("collect succeeds");

        assert_eq!(corpus.run_id, run.run_id);
        assert_eq!(corpus.articles.len(), 2);
        assert_eq!(corpus.articles[0].url, "/a");
        assert_eq!(corpus.articles[1].url, "/b");
        assert_eq!(
            corpus.articles[0].extra.get("author"),
            Some(&serde_json::Value::String("Jane".to_string()))
        );
    }

    #[tokio::test]
    async fn collect_of_empty_directory_is_valid() {
        let dir = tempfile::tempdir().expect("tempdir");

        let stage = JsonDirSourceStage::new(dir.path().to_path_buf());
        let corpus = stage
            .collect(&RunContext::new())
            .await
            .expect("empty input is a valid run");

        assert!(corpus.articles.is_empty());
    }

    #[tokio::test]
    async fn collect_fails_with_path_on_missing_directory() {
        let stage = JsonDirSourceStage::new(PathBuf::from("/nonexistent/articles"));

        let error = stage
            .collect(&RunContext::new())
            .await
            .expect_err("missing directory is fatal");

        assert!(error.to_string().contains("/nonexistent/articles"));
    }

    #[tokio::test]
    async fn collect_fails_with_path_on_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "bad.json", "{ not an array");

        let stage = JsonDirSourceStage::new(dir.path().to_path_buf());
        let error = stage
            .collect(&RunContext::new())
            .await
            .expect_err("corrupt input is fatal");

        assert!(error.to_string().contains("bad.json"));
    }
}
