use async_trait::async_trait;

use crate::language::Verdict;

pub mod ollama;

pub use ollama::OllamaClient;

/// タイトル分類バックエンドの接合面。
///
/// 実装は必ず判定値を返す。失敗はクライアント内部で再試行され、枯渇時は
/// `unknown` 判定に畳み込まれる。呼び出し側が例外処理で成功と枯渇を
/// 区別することはない。
#[async_trait]
pub trait TitleClassifier: Send + Sync {
    /// 1つのタイトルの言語を判定する。
    async fn classify_title(&self, title: &str) -> Verdict;
}
