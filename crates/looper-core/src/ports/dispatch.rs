//! Dispatch port - ペイロードメッセージの処理
//!
//! Handle は dispatcher を 1 つ持てます。その Handle から送ったメッセージは、
//! ループスレッド上でキュー順に dispatcher へ届きます。

/// Message はタグ付きのペイロード
///
/// `tag` の意味は dispatcher 側が決める
/// （典型的には `TryFrom<i32>` で enum に変換して `match`）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<P> {
    pub tag: i32,
    pub payload: P,
}

impl<P> Message<P> {
    pub fn new(tag: i32, payload: P) -> Self {
        Self { tag, payload }
    }
}

/// Dispatch はループスレッド上でペイロードメッセージを処理
///
/// # スレッド安全性
/// - `Send + Sync`: Handle の全 clone で共有され、ループスレッドから呼ばれる
/// - 未知のタグは明示的に扱う（何もしない default arm でよい）。
///   どちらの場合も呼び出し後にペイロードは drop される
pub trait Dispatch: Send + Sync + 'static {
    type Payload: Send + 'static;

    fn dispatch(&self, message: Message<Self::Payload>);
}
