use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use super::RunContext;
use super::source::{ArticleRecord, SourcedCorpus};

#[derive(Debug, Clone, PartialEq)]
pub struct DeduplicatedCorpus {
    pub run_id: Uuid,
    pub articles: Vec<ArticleRecord>,
}

#[async_trait]
pub trait DedupStage: Send + Sync {
    /// Drop records whose `url` was already seen in an earlier file.
    ///
    /// # Errors
    /// The default implementation is infallible; the `Result` is part of the
    /// stage seam.
    async fn deduplicate(
        &self,
        run: &RunContext,
        corpus: SourcedCorpus,
    ) -> anyhow::Result<DeduplicatedCorpus>;
}

/// First-seen-wins dedup keyed by the exact article URL.
#[derive(Debug, Default, Clone)]
pub struct UrlDedupStage;

impl UrlDedupStage {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DedupStage for UrlDedupStage {
    async fn deduplicate(
        &self,
        run: &RunContext,
        corpus: SourcedCorpus,
    ) -> anyhow::Result<DeduplicatedCorpus> {
        let mut seen = HashSet::new();
        let mut articles = Vec::with_capacity(corpus.articles.len());

        for article in corpus.articles {
            if seen.insert(article.url.clone()) {
                articles.push(article);
            }
        }

        Ok(DeduplicatedCorpus {
            run_id: run.run_id,
            articles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(url: &str, title: &str) -> ArticleRecord {
        ArticleRecord {
            title: title.into(),
            url: url.into(),
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn deduplicate_keeps_first_occurrence_per_url() {
        let stage = UrlDedupStage::new();
        let run = RunContext::new();
        let corpus = SourcedCorpus {
            run_id: run.run_id,
            articles: vec![
                article("/a", "X"),
                article("/b", "Y"),
                article("/a", "X-dup"),
            ],
        };

        let result = stage
            .deduplicate(&run, corpus)
            .await
            .expect("dedup succeeds");

        assert_eq!(result.articles.len(), 2);
        assert_eq!(result.articles[0].title, "X");
        assert_eq!(result.articles[1].url, "/b");
    }

    #[tokio::test]
    async fn deduplicate_is_case_sensitive_on_urls() {
        let stage = UrlDedupStage::new();
        let run = RunContext::new();
        let corpus = SourcedCorpus {
            run_id: run.run_id,
            articles: vec![article("/a", "X"), article("/A", "Y")],
        };

        let result = stage
            .deduplicate(&run, corpus)
            .await
            .expect("dedup succeeds");

        assert_eq!(result.articles.len(), 2);
    }
}
