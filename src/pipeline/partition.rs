use crate::language::{LabelVocabulary, Verdict};

use super::source::ArticleRecord;

/// 分類結果1件。候補ごとにちょうど1回生成され、振り分けで消費される。
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutcome {
    pub record: ArticleRecord,
    pub verdict: Verdict,
}

/// 実行の2つの出力バケット。
///
/// 不変条件: 両バケットは互いに素で、合計は分類へ投入された候補集合と
/// 一致する。`unknown` 判定の候補も捨てられず `other` 側へ入る。
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Buckets {
    /// 対象言語と判定された記事（完了順）
    pub target: Vec<ArticleRecord>,
    /// それ以外の判定（既知言語および `unknown`）の記事（完了順）
    pub other: Vec<ArticleRecord>,
}

impl Buckets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.target.len() + self.other.len()
    }
}

/// 1件の結果をちょうど1つのバケットへ振り分ける。
///
/// 判定が catch-all ラベルと完全一致（正規化済み比較）する場合のみ
/// 対象バケット、それ以外はすべて other バケット。
pub fn route(outcome: ClassificationOutcome, vocabulary: &LabelVocabulary, buckets: &mut Buckets) {
    if outcome.verdict.is_target(vocabulary) {
        buckets.target.push(outcome.record);
    } else {
        buckets.other.push(outcome.record);
    }
}
