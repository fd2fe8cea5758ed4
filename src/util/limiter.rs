//! 分類呼び出しの同時実行数を制限するアドミッション制御。

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 同時に実行できる分類呼び出し数の上限。
///
/// プロセス全体の暗黙状態ではなく、ドライバが所有して各ステージへ注入する
/// 明示的な値。容量はテストごと・実行ごとに差し替えられる。
///
/// スロットは最初のネットワーク試行の前に取得され、その候補のバックオフ
/// 待機中も保持され続ける。リトライ中の候補が枠を手放さないことで、同時
/// ソケット数の上限が成立する。
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.get())),
            capacity: capacity.get(),
        }
    }

    /// スロットが空くまで待ち、取得した許可を返す。
    ///
    /// リミッター自体は失敗しない。ブロックするだけである。
    ///
    /// # Panics
    /// 内部のセマフォは閉じられないため、実際には発生しない。
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("limiter semaphore is never closed")
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 現在の空きスロット数。進捗計測やテストの計装に使う。
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}
