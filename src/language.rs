//! 分類ラベル語彙と判定結果の正規化。
//!
//! 外部分類サービスが返すラベルの綴りは過去に変わっているため、語彙は
//! ハードコードせず設定から組み立てる。

use std::fmt;

use serde::Serialize;

/// 分類サービスに許可するラベルの集合。
///
/// `target` は捕捉対象言語のラベル（catch-all）、`known` は除外対象として
/// 明示的に答えさせる言語のラベル。すべて小文字・trim 済みで保持する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVocabulary {
    target: String,
    known: Vec<String>,
}

impl LabelVocabulary {
    #[must_use]
    pub fn new(target: &str, known: &[String]) -> Self {
        Self {
            target: normalize_label(target),
            known: known.iter().map(|label| normalize_label(label)).collect(),
        }
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn known(&self) -> &[String] {
        &self.known
    }

    /// 生のレスポンス本文を正規化し、語彙に含まれる場合のみ判定結果にする。
    ///
    /// 語彙外のテキスト（空文字列や句読点付きの亜種を含む）は `None` を返し、
    /// 呼び出し側で失敗試行として扱う。
    #[must_use]
    pub fn classify_response(&self, raw: &str) -> Option<Verdict> {
        let normalized = normalize_label(raw);
        if normalized == self.target || self.known.iter().any(|label| *label == normalized) {
            Some(Verdict(normalized))
        } else {
            None
        }
    }
}

/// 1候補に対する最終的な言語判定。
///
/// リトライ枯渇時は [`Verdict::unknown`] を用いる。判定値として扱い、
/// エラーとしては扱わない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict(String);

/// リトライ枯渇を表す番兵値。
pub const UNKNOWN_LABEL: &str = "unknown";

impl Verdict {
    /// すべての試行が失敗したことを示す判定。
    #[must_use]
    pub fn unknown() -> Self {
        Self(UNKNOWN_LABEL.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_LABEL
    }

    /// 判定が catch-all ラベルと一致するか。一致した候補のみが
    /// 対象言語バケットへ振り分けられる。
    #[must_use]
    pub fn is_target(&self, vocabulary: &LabelVocabulary) -> bool {
        self.0 == vocabulary.target()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_label(raw: &str) -> String {
    raw.trim().to_lowercase()
}
