//! 起動時の電流オフセットキャリブレーション
//!
//! 出力サンプル世代カウンタをポーリングして新しいサンプルを待ちます。
//! 待ちはすべて `max_polls_per_sample` で上限が決まり、超えた場合は
//! `StartupError` を返します（サンプリングが動いていない場合でも起動処理は有限時間で終わる）。

use super::CurrentSamples;
use crate::config::CalibrationConfig;

/// 起動シーケンスのエラー
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartupError {
    /// セトリング待ち中に出力サンプルが進まなかった
    SettleTimeout,
    /// オフセット平均中に出力サンプルが進まなかった
    CalibrationTimeout,
}

/// 相電流オフセット（デシメーション出力の単位）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetCalibration {
    pub u: u32,
    pub v: u32,
    /// 平均値が許容範囲外で飽和させた場合 `true`
    pub u_clamped: bool,
    pub v_clamped: bool,
}

impl OffsetCalibration {
    pub const UNCALIBRATED: Self = Self {
        u: 0,
        v: 0,
        u_clamped: false,
        v_clamped: false,
    };
}

impl Default for OffsetCalibration {
    fn default() -> Self {
        Self::UNCALIBRATED
    }
}

/// 出力サンプルが `count` 個進むまで待つ
///
/// # 引数
/// * `idle` - ポーリング1回ごとに呼ばれる（実機では spin_loop）
///
/// # 戻り値
/// 上限 `count × max_polls_per_sample` 回以内に進んだら `true`
pub fn wait_samples(
    samples: &CurrentSamples,
    count: u32,
    max_polls_per_sample: u32,
    idle: &mut impl FnMut(),
) -> bool {
    let start = samples.sample_count();
    let budget = count.saturating_mul(max_polls_per_sample);

    let mut polls: u32 = 0;
    while samples.sample_count().wrapping_sub(start) < count {
        if polls >= budget {
            return false;
        }
        idle();
        polls += 1;
    }
    true
}

/// 停止状態から再開したフィルタの過渡応答を読み捨てる
pub fn settle(
    samples: &CurrentSamples,
    config: &CalibrationConfig,
    idle: &mut impl FnMut(),
) -> Result<(), StartupError> {
    if wait_samples(samples, config.settle_samples, config.max_polls_per_sample, idle) {
        Ok(())
    } else {
        Err(StartupError::SettleTimeout)
    }
}

/// オフセットキャリブレーション
///
/// 新しい出力サンプルを `offset_samples` 個平均し、[offset_min, offset_max] に飽和させます。
pub fn calibrate_offsets(
    samples: &CurrentSamples,
    config: &CalibrationConfig,
    idle: &mut impl FnMut(),
) -> Result<OffsetCalibration, StartupError> {
    let n = config.offset_samples.max(1);
    let mut sum_u: u64 = 0;
    let mut sum_v: u64 = 0;

    for _ in 0..n {
        if !wait_samples(samples, 1, config.max_polls_per_sample, idle) {
            return Err(StartupError::CalibrationTimeout);
        }
        let snap = samples.snapshot();
        sum_u += snap.u[0] as u64;
        sum_v += snap.v[0] as u64;
    }

    let mean_u = (sum_u / n as u64) as u32;
    let mean_v = (sum_v / n as u64) as u32;

    let u = mean_u.clamp(config.offset_min, config.offset_max);
    let v = mean_v.clamp(config.offset_min, config.offset_max);
    let result = OffsetCalibration {
        u,
        v,
        u_clamped: u != mean_u,
        v_clamped: v != mean_v,
    };

    if result.u_clamped || result.v_clamped {
        warn!(
            "Current offset out of range: mean U={} V={}, clamped to U={} V={}",
            mean_u, mean_v, u, v
        );
    } else {
        info!("Current offsets calibrated: U={} V={}", u, v);
    }

    Ok(result)
}
