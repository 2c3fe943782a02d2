//! 割り込みハンドラと割り込み間共有状態
//!
//! - `TIM6_DAC`（最高優先度）: SNSカウンタを読み、デシメーションフィルタを1サンプル進める
//! - `TIM1_UP_TIM16`: QDECカウンタを読み、ベクトル制御を1回実行する
//!
//! フォアグラウンドは `CONTROL` に `ControlAccess` 経由でのみアクセスします。
//! アクセス中は制御割り込みだけをマスクし、サンプリング割り込みは止めません。

use core::cell::UnsafeCell;

use cortex_m::peripheral::NVIC;
use embassy_stm32::pac;
use encoder_foc::config::{ControlConfig, FilterConfig};
use encoder_foc::{ControlAccess, DecimationFilter, SharedState, VectorControl};

use crate::board::Tim1Duty;
use crate::config::sampling;
use crate::hardware;

/// ロックなし共有状態（デシメーション出力・スローループゲート）
pub static SHARED: SharedState = SharedState::new();

/// 割り込みハンドラが単独で所有する状態
struct IsrCell<T>(UnsafeCell<T>);

// 単一の割り込みハンドラからのみ参照される
unsafe impl<T> Sync for IsrCell<T> {}

impl<T> IsrCell<T> {
    const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// # Safety
    /// 所有者の割り込みハンドラ内でのみ呼ぶこと
    #[allow(clippy::mut_from_ref)]
    unsafe fn get_mut(&self) -> &mut T {
        &mut *self.0.get()
    }
}

static FILTER: IsrCell<DecimationFilter> = IsrCell::new(DecimationFilter::new(
    FilterConfig::DEFAULT,
    sampling::MASK_U,
    sampling::MASK_V,
));

/// 制御割り込みとフォアグラウンドで共有する `VectorControl`
pub struct ControlCell {
    inner: UnsafeCell<VectorControl>,
}

// 制御割り込みのマスクで排他する
unsafe impl Sync for ControlCell {}

impl ControlCell {
    const fn new(control: VectorControl) -> Self {
        Self {
            inner: UnsafeCell::new(control),
        }
    }
}

impl ControlAccess for ControlCell {
    fn with_control<R>(&self, f: impl FnOnce(&mut VectorControl) -> R) -> R {
        let irq = pac::Interrupt::TIM1_UP_TIM16;
        let was_enabled = NVIC::is_enabled(irq);
        NVIC::mask(irq);
        cortex_m::asm::dsb();
        cortex_m::asm::isb();

        let result = f(unsafe { &mut *self.inner.get() });

        if was_enabled {
            unsafe { NVIC::unmask(irq) };
        }
        result
    }
}

pub static CONTROL: ControlCell = ControlCell::new(VectorControl::new(ControlConfig::DEFAULT));

/// サンプリング割り込み（100kHz）
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn TIM6_DAC() {
    pac::TIM6.sr().modify(|w| w.set_uif(false));

    let (raw_u, raw_v) = hardware::sns_counts();
    FILTER.get_mut().sample(raw_u, raw_v, &SHARED);
}

/// 制御割り込み（PWM周期）
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn TIM1_UP_TIM16() {
    pac::TIM1.sr().modify(|w| w.set_uif(false));

    let counter = hardware::position_count();
    let control = &mut *CONTROL.inner.get();
    control.step(&SHARED, counter, &mut Tim1Duty);
}
