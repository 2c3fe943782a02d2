//! SNSパルスカウント電流デシメーションフィルタ
//!
//! 各相の電流センサ出力（パルス密度変調）をゲート付きカウンタで積算し、
//! サンプリング割り込みごとの差分から3次CIC（Sinc3）フィルタで電流値を得ます。
//!
//! ## 処理の流れ（1サンプリング割り込みあたり、相ごと）
//! 1. 前回値との差分（カウンタ幅でラップ）
//! 2. 差分を `delta_clamp` で飽和（カウンタ異常の除去）
//! 3. 現在・1つ前・2つ前の差分の中央値
//! 4. 3段カスケード積分器
//! 5. `decimation_factor` 回に1回、3段コム（微分器）で出力を作り、
//!    4段の出力履歴を進めて `CurrentSamples` に公開
//!
//! ## 共有メモリ規約
//! `CurrentSamples` の書き込みはサンプリング割り込みのみ、読み出しは制御割り込みと
//! フォアグラウンド（キャリブレーション）です。出力履歴はシーケンスロックで保護し、
//! 読み出し側は書き込み途中の値を観測しません（書き込み側は読み出し側より高優先度のため、
//! 読み出し側のリトライは有限回で終わります）。

pub mod calibration;

pub use calibration::{calibrate_offsets, settle, wait_samples, OffsetCalibration, StartupError};

use core::sync::atomic::{fence, AtomicU32, Ordering};

use crate::config::FilterConfig;

/// 出力履歴の深さ（out, out_p, out_pp, out_ppp）
pub const HISTORY_LEN: usize = 4;

/// 3点中央値
#[inline(always)]
pub fn median3(a: u32, b: u32, c: u32) -> u32 {
    a.max(b).min(a.min(b).max(c))
}

/// 1相分のSinc3フィルタ状態
///
/// サンプリング割り込みからのみ変更されます。
#[derive(Debug, Clone, Copy)]
pub struct SincChannel {
    counter_mask: u32,
    prev_raw: u32,
    /// 飽和後の差分の遅延線 [1つ前, 2つ前]
    delay: [u32; 2],
    integrators: [u32; 3],
    combs: [u32; 3],
    outputs: [u32; HISTORY_LEN],
}

impl SincChannel {
    /// # 引数
    /// * `counter_mask` - カウンタ幅のマスク（16bitタイマなら 0xFFFF）
    pub const fn new(counter_mask: u32) -> Self {
        Self {
            counter_mask,
            prev_raw: 0,
            delay: [0; 2],
            integrators: [0; 3],
            combs: [0; 3],
            outputs: [0; HISTORY_LEN],
        }
    }

    /// 生カウンタ値を1サンプル取り込み、積分器を進める
    ///
    /// # 戻り値
    /// `(中央値, 飽和したか)`
    pub fn integrate(&mut self, raw: u32, delta_clamp: u32) -> (u32, bool) {
        let delta = raw.wrapping_sub(self.prev_raw) & self.counter_mask;
        self.prev_raw = raw;

        let clamped = delta > delta_clamp;
        let delta = delta.min(delta_clamp);

        let median = median3(delta, self.delay[0], self.delay[1]);
        self.delay = [delta, self.delay[0]];

        // 積分器はラップ前提（コム段で差を取るため桁あふれは相殺される）
        self.integrators[0] = self.integrators[0].wrapping_add(median);
        self.integrators[1] = self.integrators[1].wrapping_add(self.integrators[0]);
        self.integrators[2] = self.integrators[2].wrapping_add(self.integrators[1]);

        (median, clamped)
    }

    /// デシメーション点：出力履歴を進め、コム段から新しい出力を得る
    pub fn decimate(&mut self) -> u32 {
        self.outputs.copy_within(0..HISTORY_LEN - 1, 1);

        let mut x = self.integrators[2];
        for comb in self.combs.iter_mut() {
            let y = x.wrapping_sub(*comb);
            *comb = x;
            x = y;
        }

        self.outputs[0] = x;
        x
    }

    /// 出力履歴（新しい順）
    pub fn outputs(&self) -> &[u32; HISTORY_LEN] {
        &self.outputs
    }
}

/// U/V 2相分のデシメーションフィルタ
///
/// サンプリング割り込みが唯一の所有者です。
pub struct DecimationFilter {
    config: FilterConfig,
    u: SincChannel,
    v: SincChannel,
    phase: u32,
}

impl DecimationFilter {
    pub const fn new(config: FilterConfig, mask_u: u32, mask_v: u32) -> Self {
        Self {
            config,
            u: SincChannel::new(mask_u),
            v: SincChannel::new(mask_v),
            phase: 0,
        }
    }

    /// サンプリング割り込みのエントリーポイント
    ///
    /// # 引数
    /// * `raw_u`, `raw_v` - 各相のゲート付きカウンタの生値
    /// * `out` - 公開先
    ///
    /// # 戻り値
    /// デシメーション出力を公開した場合 `true`
    pub fn sample(&mut self, raw_u: u32, raw_v: u32, out: &CurrentSamples) -> bool {
        let (_, glitch_u) = self.u.integrate(raw_u, self.config.delta_clamp);
        let (_, glitch_v) = self.v.integrate(raw_v, self.config.delta_clamp);
        let glitches = glitch_u as u32 + glitch_v as u32;
        if glitches != 0 {
            out.glitches.fetch_add(glitches, Ordering::Relaxed);
        }

        self.phase += 1;
        if self.phase < self.config.decimation_factor {
            return false;
        }
        self.phase = 0;

        self.u.decimate();
        self.v.decimate();
        out.publish(self.u.outputs(), self.v.outputs());
        true
    }
}

/// デシメーション出力の公開領域
///
/// 書き込み: サンプリング割り込み / 読み出し: 制御割り込み・キャリブレーション
pub struct CurrentSamples {
    seq: AtomicU32,
    u: [AtomicU32; HISTORY_LEN],
    v: [AtomicU32; HISTORY_LEN],
    /// 出力サンプル世代カウンタ（新サンプルごとに+1）
    generation: AtomicU32,
    /// 差分飽和の累計回数（診断用）
    glitches: AtomicU32,
}

impl CurrentSamples {
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            u: [const { AtomicU32::new(0) }; HISTORY_LEN],
            v: [const { AtomicU32::new(0) }; HISTORY_LEN],
            generation: AtomicU32::new(0),
            glitches: AtomicU32::new(0),
        }
    }

    fn publish(&self, u: &[u32; HISTORY_LEN], v: &[u32; HISTORY_LEN]) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        for i in 0..HISTORY_LEN {
            self.u[i].store(u[i], Ordering::Relaxed);
            self.v[i].store(v[i], Ordering::Relaxed);
        }

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// 最新の出力履歴を一貫した状態で読み出す
    pub fn snapshot(&self) -> CurrentSnapshot {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 != 0 {
                core::hint::spin_loop();
                continue;
            }

            let mut snap = CurrentSnapshot::default();
            for i in 0..HISTORY_LEN {
                snap.u[i] = self.u[i].load(Ordering::Relaxed);
                snap.v[i] = self.v[i].load(Ordering::Relaxed);
            }

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return snap;
            }
        }
    }

    /// 出力サンプル世代カウンタ
    #[inline(always)]
    pub fn sample_count(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// 差分飽和の累計回数
    pub fn glitch_count(&self) -> u32 {
        self.glitches.load(Ordering::Relaxed)
    }
}

impl Default for CurrentSamples {
    fn default() -> Self {
        Self::new()
    }
}

/// ある時点の出力履歴（インデックス0が最新）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CurrentSnapshot {
    pub u: [u32; HISTORY_LEN],
    pub v: [u32; HISTORY_LEN],
}

impl CurrentSnapshot {
    /// 直近4サンプルの重み付き平均 (2·out + 4·out_p + 3·out_pp + out_ppp) / 10
    pub fn weighted(history: &[u32; HISTORY_LEN]) -> f32 {
        const WEIGHTS: [f32; HISTORY_LEN] = [2.0, 4.0, 3.0, 1.0];
        let sum: f32 = history
            .iter()
            .zip(WEIGHTS.iter())
            .map(|(&x, &w)| w * x as f32)
            .sum();
        sum / 10.0
    }

    /// オフセット除去・換算後の相電流 [A]
    ///
    /// # 戻り値
    /// `(i_u, i_v)`
    pub fn phase_currents(&self, offsets: &OffsetCalibration, scale: f32) -> (f32, f32) {
        let i_u = (Self::weighted(&self.u) - offsets.u as f32) * scale;
        let i_v = (Self::weighted(&self.v) - offsets.v as f32) * scale;
        (i_u, i_v)
    }
}
