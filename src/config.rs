//! Configuration module
//!
//! コンパイル時定数（`params`）と、それをまとめた実行時設定構造体を提供します。
//! 各構造体の `DEFAULT` は `params` の値から組み立てられ、テストでは
//! 必要なフィールドだけ差し替えて使います。

pub mod params;

pub use params::*;

/// デシメーションフィルタ設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterConfig {
    pub decimation_factor: u32,
    pub delta_clamp: u32,
}

impl FilterConfig {
    pub const DEFAULT: Self = Self {
        decimation_factor: current_sense::DECIMATION_FACTOR,
        delta_clamp: current_sense::DELTA_CLAMP,
    };
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// 起動時のセトリング待ちとオフセットキャリブレーション設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationConfig {
    pub settle_samples: u32,
    pub offset_samples: u32,
    pub offset_min: u32,
    pub offset_max: u32,
    /// 出力サンプル1つあたりのポーリング上限（待ちの上限 = サンプル数 × この値）
    pub max_polls_per_sample: u32,
}

impl CalibrationConfig {
    pub const DEFAULT: Self = Self {
        settle_samples: current_sense::SETTLE_SAMPLES,
        offset_samples: current_sense::CURRENTS_OFFSET_SAMPLES,
        offset_min: current_sense::CURRENT_OFFSET_MIN,
        offset_max: current_sense::CURRENT_OFFSET_MAX,
        max_polls_per_sample: current_sense::MAX_POLLS_PER_SAMPLE,
    };
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// エンコーダ設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderConfig {
    pub pulses_per_erev: u32,
    pub upper_threshold: u16,
    pub lower_threshold: u16,
}

impl EncoderConfig {
    pub const DEFAULT: Self = Self {
        pulses_per_erev: encoder::PULSES_PER_ELECTRICAL_REV,
        upper_threshold: encoder::UPPER_THRESHOLD,
        lower_threshold: encoder::LOWER_THRESHOLD,
    };

    /// 上方向ラップ（0xFFFF → 0）の補正量
    pub const fn overflow_compensation(&self) -> u32 {
        encoder::COUNTER_SPAN % self.pulses_per_erev
    }

    /// 下方向ラップ（0 → 0xFFFF）の補正量
    pub const fn underflow_compensation(&self) -> u32 {
        (self.pulses_per_erev - self.overflow_compensation()) % self.pulses_per_erev
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// PIゲイン一式（出力は ±out_max で対称制限）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PiGains {
    pub kp: f32,
    pub ki: f32,
    pub kc: f32,
    pub out_max: f32,
}

/// ベクトル制御設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlConfig {
    pub encoder: EncoderConfig,
    /// 界磁ロック1段あたりの制御割り込み回数
    pub lock_ticks: u32,
    pub openloop_iq_ref: f32,
    pub v_dc: f32,
    pub max_voltage: f32,
    pub current_scale: f32,
    pub d_current: PiGains,
    pub q_current: PiGains,
    pub speed: PiGains,
    pub ramp_step: f32,
    pub slow_loop_period_s: f32,
    pub torque_mode: bool,
    pub default_target: f32,
    pub target_step: f32,
    pub target_min: f32,
    pub target_max: f32,
}

impl ControlConfig {
    pub const DEFAULT: Self = Self {
        encoder: EncoderConfig::DEFAULT,
        lock_ticks: control::LOCK_COUNT_FOR_LOCK_TIME,
        openloop_iq_ref: control::Q_CURRENT_REF_OPENLOOP,
        v_dc: control::V_DC_BUS,
        max_voltage: control::MAX_VOLTAGE,
        current_scale: current_sense::CURRENT_SCALE_A_PER_COUNT,
        d_current: PiGains {
            kp: control::D_CURRCNTR_PTERM,
            ki: control::D_CURRCNTR_ITERM,
            kc: control::D_CURRCNTR_CTERM,
            out_max: control::D_CURRCNTR_OUTMAX,
        },
        q_current: PiGains {
            kp: control::Q_CURRCNTR_PTERM,
            ki: control::Q_CURRCNTR_ITERM,
            kc: control::Q_CURRCNTR_CTERM,
            out_max: control::Q_CURRCNTR_OUTMAX,
        },
        speed: PiGains {
            kp: control::SPEEDCNTR_PTERM,
            ki: control::SPEEDCNTR_ITERM,
            kc: control::SPEEDCNTR_CTERM,
            out_max: control::SPEEDCNTR_OUTMAX,
        },
        ramp_step: control::SPEED_RAMP_INC_SLOW_LOOP,
        slow_loop_period_s: control::SLOW_LOOP_TIME_SEC,
        torque_mode: control::TORQUE_MODE,
        default_target: speed::DEFAULT_TARGET,
        target_step: speed::TARGET_STEP,
        target_min: speed::TARGET_MIN,
        target_max: speed::TARGET_MAX,
    };
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// アプリケーションスケジューラ設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    pub calibration: CalibrationConfig,
    /// スローループゲートのしきい値 [制御割り込み回数]
    pub slow_loop_ticks: u32,
    pub inactivity_stop: u32,
    pub inactivity_warn: u32,
    pub debounce_count: u16,
    pub stop_velocity: f32,
    pub stop_margin: f32,
    pub status_log_interval: u32,
}

impl SchedulerConfig {
    pub const DEFAULT: Self = Self {
        calibration: CalibrationConfig::DEFAULT,
        slow_loop_ticks: control::SLOW_LOOP_TIME_PWM_COUNT,
        inactivity_stop: scheduler::INACTIVITY_STOP_COUNT,
        inactivity_warn: scheduler::INACTIVITY_WARN_COUNT,
        debounce_count: scheduler::DEBOUNCE_COUNT,
        stop_velocity: speed::STOP_VELOCITY,
        stop_margin: speed::STOP_MARGIN,
        status_log_interval: scheduler::STATUS_LOG_INTERVAL,
    };
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
