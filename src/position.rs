//! QDECカウンタからの電気角・速度推定
//!
//! エンコーダカウンタは16bitでラップします。電気角は「生カウンタ + ラップ補正」を
//! 1電気回転あたりのパルス数で割った余りから求め、補正量自体も毎回剰余を取るため
//! 長時間運転でも桁あふれしません。

use core::f32::consts::TAU;

use libm::fmodf;

use crate::config::EncoderConfig;

/// 電気角を [0, 2π) に正規化
///
/// 通常は範囲内でそのまま返ります。範囲外の場合は 2π の整数倍だけずらします。
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = if angle >= TAU {
        fmodf(angle, TAU)
    } else if angle < 0.0 {
        fmodf(angle, TAU) + TAU
    } else {
        angle
    };

    // -ε + 2π が丸めで 2π になる場合
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// 制御割り込み側の電気角トラッカー
#[derive(Debug, Clone, Copy)]
pub struct AngleTracker {
    config: EncoderConfig,
    prev_raw: u16,
    compensation: u32,
    position: u32,
}

impl AngleTracker {
    pub const fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            prev_raw: 0,
            compensation: 0,
            position: 0,
        }
    }

    /// 生カウンタ値から電気角 [rad] を更新
    pub fn update(&mut self, raw: u16) -> f32 {
        let upper = self.config.upper_threshold;
        let lower = self.config.lower_threshold;

        if raw > upper && self.prev_raw < lower {
            // 0 → 0xFFFF（逆転方向のラップ）
            self.compensation += self.config.underflow_compensation();
        } else if self.prev_raw > upper && raw < lower {
            // 0xFFFF → 0（正転方向のラップ）
            self.compensation += self.config.overflow_compensation();
        }

        let pper = self.config.pulses_per_erev;
        self.compensation %= pper;
        self.position = (raw as u32 + self.compensation) % pper;
        self.prev_raw = raw;

        self.angle()
    }

    /// 現在のカウンタ位置を電気角0とする（オープンループ → クローズドループ移行時）
    pub fn rezero(&mut self, raw: u16) {
        let pper = self.config.pulses_per_erev;
        self.compensation = (pper - raw as u32 % pper) % pper;
        self.prev_raw = raw;
        self.position = 0;
    }

    /// 補正後の位置 [0, pulses_per_erev)
    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn angle(&self) -> f32 {
        wrap_angle(self.position as f32 * (TAU / self.config.pulses_per_erev as f32))
    }
}

/// スローループ側の速度推定
#[derive(Debug, Clone, Copy)]
pub struct SpeedEstimator {
    rad_per_count_per_s: f32,
    prev_raw: u16,
    velocity: f32,
}

impl SpeedEstimator {
    /// # 引数
    /// * `pulses_per_erev` - 1電気回転あたりのパルス数
    /// * `period_s` - スローループ周期 [s]
    pub const fn new(pulses_per_erev: u32, period_s: f32) -> Self {
        Self {
            rad_per_count_per_s: TAU / (pulses_per_erev as f32 * period_s),
            prev_raw: 0,
            velocity: 0.0,
        }
    }

    /// 電気角速度 [rad/s] を更新
    ///
    /// # 引数
    /// * `raw` - 生カウンタ値
    /// * `resync` - `true` の場合は基準を現在値に合わせる（停止→運転直後のスパイク防止）
    pub fn update(&mut self, raw: u16, resync: bool) -> f32 {
        if resync {
            self.prev_raw = raw;
        }
        // 16bit符号付き差分として解釈（ラップを跨いでも符号が正しい）
        let delta = raw.wrapping_sub(self.prev_raw) as i16;
        self.prev_raw = raw;

        self.velocity = delta as f32 * self.rad_per_count_per_s;
        self.velocity
    }

    pub fn reset(&mut self, raw: u16) {
        self.prev_raw = raw;
        self.velocity = 0.0;
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }
}
