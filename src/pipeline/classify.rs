use std::sync::Arc;

use anyhow::{Result, ensure};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::clients::TitleClassifier;
use crate::language::LabelVocabulary;
use crate::util::limiter::ConcurrencyLimiter;

use super::RunContext;
use super::partition::{Buckets, ClassificationOutcome, route};
use super::prefilter::CandidateSet;

#[async_trait]
pub trait ClassifyStage: Send + Sync {
    /// 全候補を分類し、振り分け済みのバケットを返す。
    ///
    /// # Errors
    /// 個々の分類は失敗しない（`unknown` に畳み込まれる）。投入した候補の
    /// 一部が結果を返さなかった場合のみエラーになる。
    async fn classify(&self, run: &RunContext, candidates: CandidateSet) -> Result<Buckets>;
}

/// 候補ごとに1タスクを起動し、完了順に結果を回収するステージ。
///
/// 新規呼び出しの投入はリミッターで絞られる。バックオフ中の候補もスロットを
/// 保持し続けるため、同時に試行中の呼び出しは容量を超えない。結果は投入順
/// ではなく完了順にfan-inチャネルから取り出され、遅い候補が速い候補の
/// 振り分けを妨げない。
pub struct FanOutClassifyStage {
    classifier: Arc<dyn TitleClassifier>,
    limiter: ConcurrencyLimiter,
    vocabulary: LabelVocabulary,
}

impl FanOutClassifyStage {
    #[must_use]
    pub fn new(
        classifier: Arc<dyn TitleClassifier>,
        limiter: ConcurrencyLimiter,
        vocabulary: LabelVocabulary,
    ) -> Self {
        Self {
            classifier,
            limiter,
            vocabulary,
        }
    }
}

#[async_trait]
impl ClassifyStage for FanOutClassifyStage {
    async fn classify(&self, run: &RunContext, candidates: CandidateSet) -> Result<Buckets> {
        let total = candidates.candidates.len();
        info!(
            run_id = %run.run_id,
            candidate_count = total,
            concurrency = self.limiter.capacity(),
            "starting classification fan-out"
        );

        let (tx, mut rx) = mpsc::channel::<ClassificationOutcome>(total.max(1));

        for record in candidates.candidates {
            let classifier = Arc::clone(&self.classifier);
            let limiter = self.limiter.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                // スロットは最初の試行前に取得し、リトライ待機中も保持する
                let _permit = limiter.acquire().await;
                let verdict = classifier.classify_title(&record.title).await;
                // 受信側が先に消えるのは実行が破棄された場合のみ
                let _ = tx.send(ClassificationOutcome { record, verdict }).await;
            });
        }
        drop(tx);

        let mut buckets = Buckets::new();
        let mut completed = 0_usize;

        while let Some(outcome) = rx.recv().await {
            completed += 1;
            info!(
                run_id = %run.run_id,
                url = %outcome.record.url,
                verdict = %outcome.verdict,
                progress.current = completed,
                progress.total = total,
                "candidate classified"
            );
            route(outcome, &self.vocabulary, &mut buckets);
        }

        // チャネルは全ワーカーが結果を送って初めて閉じる
        ensure!(
            completed == total,
            "classification fan-out lost {} of {total} candidates",
            total - completed
        );

        info!(
            run_id = %run.run_id,
            target_count = buckets.target.len(),
            other_count = buckets.other.len(),
            "classification fan-out completed"
        );

        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::time::Duration;

    use crate::language::Verdict;
    use crate::pipeline::source::ArticleRecord;

    use super::*;

    /// 固定の判定を返すテスト用分類器。
    struct FixedClassifier {
        target_titles: Vec<String>,
        delay: Duration,
    }

    #[async_trait]
    impl TitleClassifier for FixedClassifier {
        async fn classify_title(&self, title: &str) -> Verdict {
            tokio::time::sleep(self.delay).await;
            let raw = if self.target_titles.iter().any(|t| t == title) {
                "ikinyarwanda"
            } else {
                "french"
            };
            vocabulary()
                .classify_response(raw)
                .expect("test label is in vocabulary")
        }
    }

    fn vocabulary() -> LabelVocabulary {
        LabelVocabulary::new(
            "ikinyarwanda",
            &["english".to_string(), "french".to_string()],
        )
    }

    fn candidate_set(run: &RunContext, titles: &[&str]) -> CandidateSet {
        CandidateSet {
            run_id: run.run_id,
            candidates: titles
                .iter()
                .enumerate()
                .map(|(i, title)| ArticleRecord {
                    title: (*title).to_string(),
                    url: format!("/{i}"),
                    extra: serde_json::Map::new(),
                })
                .collect(),
            excluded_count: 0,
        }
    }

    fn stage(classifier: Arc<dyn TitleClassifier>, capacity: usize) -> FanOutClassifyStage {
        FanOutClassifyStage::new(
            classifier,
            ConcurrencyLimiter::new(NonZeroUsize::new(capacity).expect("non-zero")),
            vocabulary(),
        )
    }

    #[tokio::test]
    async fn classify_yields_exactly_one_outcome_per_candidate() {
        let classifier = Arc::new(FixedClassifier {
            target_titles: vec!["Amakuru".to_string()],
            delay: Duration::from_millis(1),
        });
        let run = RunContext::new();
        let candidates = candidate_set(&run, &["Amakuru", "Bonjour", "Hello"]);

        let buckets = stage(classifier, 2)
            .classify(&run, candidates)
            .await
            .expect("classification succeeds");

        assert_eq!(buckets.total(), 3);
        assert_eq!(buckets.target.len(), 1);
        assert_eq!(buckets.other.len(), 2);
    }

    #[tokio::test]
    async fn classify_of_empty_candidate_set_returns_empty_buckets() {
        let classifier = Arc::new(FixedClassifier {
            target_titles: Vec::new(),
            delay: Duration::from_millis(0),
        });
        let run = RunContext::new();

        let buckets = stage(classifier, 5)
            .classify(&run, candidate_set(&run, &[]))
            .await
            .expect("empty run succeeds");

        assert_eq!(buckets.total(), 0);
    }

    /// 遅い候補が速い候補の回収をブロックしないこと。
    struct StaggeredClassifier {
        slow_title: String,
    }

    #[async_trait]
    impl TitleClassifier for StaggeredClassifier {
        async fn classify_title(&self, title: &str) -> Verdict {
            if title == self.slow_title {
                tokio::time::sleep(Duration::from_millis(250)).await;
            } else {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Verdict::unknown()
        }
    }

    #[tokio::test]
    async fn results_are_collected_in_completion_order() {
        let classifier = Arc::new(StaggeredClassifier {
            slow_title: "slowest".to_string(),
        });
        let run = RunContext::new();
        // 最初に投入された候補が最後に完了する
        let candidates = candidate_set(&run, &["slowest", "b", "c", "d"]);

        let buckets = stage(classifier, 4)
            .classify(&run, candidates)
            .await
            .expect("classification succeeds");

        assert_eq!(buckets.other.len(), 4);
        assert_eq!(
            buckets.other.last().expect("non-empty").title,
            "slowest",
            "slowest candidate must be partitioned last despite being submitted first"
        );
    }
}
