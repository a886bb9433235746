//! IdGenerator port - ステージング ID 生成の抽象化
//!
//! CorrelationId は秒単位なので、同じ秒に始まった create 同士を区別できません。
//! ステージングディレクトリには ULID を付けて試行ごとに一意にします。

use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は create 試行ごとの一意な ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数の create から同時に使える）
pub trait IdGenerator: Send + Sync {
    fn generate_attempt_id(&self) -> Ulid;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使うので、FixedClock を渡せば timestamp 部分が固定されます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_attempt_id(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}
