//! Domain identifiers - 型付き ID
//!
//! ULID ベースの ID を Phantom type で型付けしています。
//! `LoopId` と `HandleId` は同じ表現（16 bytes）ですが、別の型なので混同できません。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: 生成順に並ぶのでログを追いやすい
//! - **調整不要**: どのスレッドからでも独立に生成できる

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は ID の種類ごとのマーカー
///
/// `Display` で使う prefix（"loop-", "handle-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Id は ULID ベースの汎用 ID
///
/// `T` はサイズ 0 のマーカー。実行時コストはなく、
/// `LoopId` と `HandleId` をコンパイル時に区別します。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 現在時刻 + 乱数で新しい ID を生成
    pub fn generate() -> Self {
        let timestamp_ms = Utc::now().timestamp_millis().max(0) as u64;
        Self::from_ulid(Ulid::from_parts(timestamp_ms, rand::random()))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoopMarker {}

impl IdMarker for LoopMarker {
    fn prefix() -> &'static str {
        "loop-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleMarker {}

impl IdMarker for HandleMarker {
    fn prefix() -> &'static str {
        "handle-"
    }
}

/// LoopId はループの ID（ループスレッドごとに 1 つ）
pub type LoopId = Id<LoopMarker>;

/// HandleId は Handle の ID（bind ごとに 1 つ、clone は共有）
pub type HandleId = Id<HandleMarker>;
