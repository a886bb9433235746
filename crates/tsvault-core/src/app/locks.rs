//! KeyedLocks - external id ごとの排他制御
//!
//! create と delete は同じ external id に対して直列化します。
//! 別の id 同士、また enumerate（読み取り）はロックしません。
//!
//! # 学習ポイント
//! - `std::sync::Mutex` はマップの更新だけに使う（await を跨がない）
//! - 実際の待ち合わせは `tokio::sync::Mutex`（OwnedMutexGuard で返す）
//! - `Weak` を持つので、使われなくなった id のエントリは自然に消える

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::ExternalId;

#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<ExternalId, Weak<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `key` のロックを取得（他が保持していれば待つ）
    pub async fn lock(&self, key: &ExternalId) -> OwnedMutexGuard<()> {
        let slot = self.slot(key);
        slot.lock_owned().await
    }

    fn slot(&self, key: &ExternalId) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = slots.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        slots.retain(|_, weak| weak.strong_count() > 0);
        let slot = Arc::new(AsyncMutex::new(()));
        slots.insert(key.clone(), Arc::downgrade(&slot));
        slot
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or_default()
    }
}
