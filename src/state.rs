//! 割り込み間で共有される状態
//!
//! ## メモリ順序の規約
//! - `SharedState::currents`: 書き込みはサンプリング割り込みのみ（シーケンスロック）
//! - `SharedState::slow_loop`: 加算は制御割り込みのみ、判定・リセットはフォアグラウンド
//! - `VectorControl`: `ControlAccess` 経由でのみアクセスし、制御割り込みとフォアグラウンドが
//!   同時に触らないことを実装側が保証する

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::current_sense::CurrentSamples;
use crate::vector_control::VectorControl;

/// スローループ実行ゲート（制御割り込み回数による分周器）
pub struct SlowLoopGate {
    ticks: AtomicU32,
}

impl SlowLoopGate {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU32::new(0),
        }
    }

    /// 制御割り込みごとに1回呼ぶ
    #[inline(always)]
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Release);
    }

    /// `threshold` 回以上進んでいればカウンタを0に戻して `true`
    ///
    /// 判定とリセットは1回のアトミック操作で行う
    pub fn try_fire(&self, threshold: u32) -> bool {
        self.ticks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |ticks| {
                (ticks >= threshold).then_some(0)
            })
            .is_ok()
    }

    pub fn reset(&self) {
        self.ticks.store(0, Ordering::Release);
    }

    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Default for SlowLoopGate {
    fn default() -> Self {
        Self::new()
    }
}

/// ロックなしで共有される状態一式
pub struct SharedState {
    pub currents: CurrentSamples,
    pub slow_loop: SlowLoopGate,
}

impl SharedState {
    pub const fn new() -> Self {
        Self {
            currents: CurrentSamples::new(),
            slow_loop: SlowLoopGate::new(),
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// フォアグラウンドから `VectorControl` へアクセスする手段
///
/// 実装は、クロージャ実行中に制御割り込みが `VectorControl` に触れないことを保証します。
pub trait ControlAccess {
    fn with_control<R>(&self, f: impl FnOnce(&mut VectorControl) -> R) -> R;
}

impl<M: RawMutex> ControlAccess for Mutex<M, RefCell<VectorControl>> {
    fn with_control<R>(&self, f: impl FnOnce(&mut VectorControl) -> R) -> R {
        self.lock(|control| f(&mut control.borrow_mut()))
    }
}
