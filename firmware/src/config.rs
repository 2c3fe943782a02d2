//! ボード設定
//!
//! 制御パラメータは `encoder_foc::config` を使い、ここにはSTM32G431固有の
//! タイマ・ピン設定のみを置きます。

use encoder_foc::config::{control, current_sense};

/// システムクロック [Hz]
pub const SYSTEM_CLOCK_HZ: u32 = 170_000_000;

/// PWM設定（TIM1）
pub mod pwm {
    use embassy_stm32::time::Hertz;

    /// PWM周波数（制御割り込み周波数と同じ）
    pub const DEFAULT_FREQUENCY: Hertz = Hertz(super::control::PWM_FREQUENCY_HZ);

    /// デッドタイム [タイマクロック]
    pub const DEFAULT_DEAD_TIME: u16 = 170;

    /// 制御割り込み（TIM1_UP）の優先度
    pub const IRQ_PRIORITY: u8 = 0x20;
}

/// 電流サンプリング設定（TIM6 + TIM2/TIM3）
pub mod sampling {
    /// TIM6 自動リロード値（170MHz / 100kHz - 1）
    pub const TIM6_ARR: u16 =
        (super::SYSTEM_CLOCK_HZ / super::current_sense::SAMPLING_FREQUENCY_HZ - 1) as u16;

    /// SNSカウンタ（TIM2/TIM3）のプリスケーラ（170MHz / 8 = 21.25MHz）
    pub const COUNTER_PSC: u16 = 7;

    /// サンプリング割り込み（TIM6_DAC）の優先度（最高）
    pub const IRQ_PRIORITY: u8 = 0x00;

    /// U相カウンタ（TIM2, 32bit）のマスク
    pub const MASK_U: u32 = u32::MAX;

    /// V相カウンタ（TIM3, 16bit）のマスク
    pub const MASK_V: u32 = 0xFFFF;
}
