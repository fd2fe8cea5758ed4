use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;
use uuid::Uuid;

use super::RunContext;
use super::dedup::DeduplicatedCorpus;
use super::source::ArticleRecord;

/// タイトルの先頭ユニット（空白まで、またはアポストロフィ付き冠詞）。
static FIRST_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+’\b|^\w+\s").expect("first unit pattern is valid"));

/// フランス語の機能語で始まるタイトルを除外するための接頭辞リスト。
static FRENCH_PREFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "l’", "le ", "la ", "les ", "un ", "une ", "des ", "du ", "d’", "de ",
        "qui ", "qu’", "que ", "quoi ", "quel ", "quelle ", "quels ", "quelles ",
        "comment ", "pourquoi ", "quand ", "où ", "combien ", "jusqu’", "sur ",
        "je ", "j’", "tu ", "il ", "elle ", "on ", "nous ", "vous ", "ils ", "elles ",
        "ce ", "cette ", "ces ", "ceux ", "celles ", "c’",
        "après ", "avant ", "au-delà ", "aujourd'hui ", "hier ", "demain ", "là ", "ici ",
        "là-bas ", "là-haut ",
        "en ", "dans ", "avec ", "pour ", "mais ", "donc ", "car ",
        "parce ", "lorsque ", "pendant ", "depuis ", "sans ", "et ",
        "à ", "au ", "aux ", "par ", "voici ", "voilà ", "ainsi ", "oui, ",
        "sont ", "était ", "avait ", "ont ", "doit ", "peut ", "va ", "aller ", "faire ",
        "être",
    ])
});

/// ヒューリスティック前段フィルタを通過した候補集合。
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSet {
    pub run_id: Uuid,
    pub candidates: Vec<ArticleRecord>,
    pub excluded_count: usize,
}

#[async_trait]
pub trait PrefilterStage: Send + Sync {
    /// ネットワーク呼び出しの前に、明らかに対象外のタイトルを除外する。
    ///
    /// # Errors
    /// 既定実装は失敗しない。`Result` はステージ接合面の一部。
    async fn filter(
        &self,
        run: &RunContext,
        corpus: DeduplicatedCorpus,
    ) -> anyhow::Result<CandidateSet>;
}

/// タイトル先頭の機能語をストップリストと照合するフィルタ。
///
/// 先頭ユニットが一致した記事は分類対象から外れ、どちらの出力にも
/// 含まれない。
#[derive(Debug, Default, Clone)]
pub struct StoplistPrefilterStage;

impl StoplistPrefilterStage {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PrefilterStage for StoplistPrefilterStage {
    async fn filter(
        &self,
        run: &RunContext,
        corpus: DeduplicatedCorpus,
    ) -> anyhow::Result<CandidateSet> {
        let total = corpus.articles.len();
        let mut candidates = Vec::with_capacity(total);
        let mut excluded_count = 0;

        for article in corpus.articles {
            let first_unit = extract_first_unit(&article.title).to_lowercase();
            if FRENCH_PREFIXES.contains(first_unit.as_str()) {
                excluded_count += 1;
            } else {
                candidates.push(article);
            }
        }

        info!(
            run_id = %run.run_id,
            candidate_count = candidates.len(),
            excluded_count,
            "applied stoplist prefilter"
        );

        Ok(CandidateSet {
            run_id: run.run_id,
            candidates,
            excluded_count,
        })
    }
}

/// テキストの先頭ユニットを取り出す。
///
/// ユニットは空白が続く単語、またはアポストロフィで終わる語（冠詞の縮約）。
/// 先頭の二重山括弧は無視する。
fn extract_first_unit(text: &str) -> String {
    let cleaned = text.replace('«', "");
    let cleaned = cleaned.trim();

    FIRST_UNIT
        .find(cleaned)
        .map_or_else(String::new, |unit| unit.as_str().to_string())
}
