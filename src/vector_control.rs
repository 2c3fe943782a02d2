//! ベクトル制御ステートマシン
//!
//! 制御割り込み（PWM周期同期）ごとに `VectorControl::step` を1回実行します。
//!
//! ## 1回の処理順序（順序を入れ替えてはいけない）
//! 1. 最新のデシメーション出力から相電流を取得
//! 2. Clarke → Park 変換（前回の電気角を使用）
//! 3. 電流制御（d/q軸PI）
//! 4. 電気角の更新
//! 5. sin/cos → 逆Park → 電圧制限 → SVPWM
//! 6. Duty書き込み
//! 7. スローループゲートを進める
//!
//! ## 制御モード
//! - `OpenLoop`: 界磁ロック（角度π）→ 強制回転（π ± π/2）→ クローズドループへ移行
//! - `ClosedLoop`: エンコーダ角度でFOC。移行直後の1回だけ速度PI積分をクリアする

use core::f32::consts::{FRAC_PI_2, PI};

use crate::config::ControlConfig;
use crate::current_sense::OffsetCalibration;
use crate::foc::{calculate_svpwm, clarke, inverse_park, limit_voltage, park, sin_cos, PiController};
use crate::motor_driver::PwmDuty;
use crate::position::{wrap_angle, AngleTracker, SpeedEstimator};
use crate::state::SharedState;

/// 回転方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// +1.0 / -1.0
    pub const fn sign(self) -> f32 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reverse => -1.0,
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// モーター運転状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorStatus {
    Stopped,
    Running,
}

/// 制御モード（常にどちらか一方）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlMode {
    /// 界磁合わせ中。`lock_count` は経過した制御割り込み回数
    OpenLoop { lock_count: u32 },
    /// クローズドループ。`handover_pending` は移行直後の1回だけ立つ
    ClosedLoop { handover_pending: bool },
}

/// 制御パラメータ（速度は電気角速度 [rad/s]、電流は [A]）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlParameters {
    pub direction: Direction,
    /// 操作スイッチで変更される目標速度
    pub target_velocity: f32,
    /// ランプの到達点
    pub end_velocity: f32,
    /// ランプ後の速度指令
    pub velocity_ref: f32,
    pub id_ref: f32,
    pub iq_ref: f32,
    pub motor_status: MotorStatus,
    /// 前回スローループ時点の運転状態
    pub old_status: MotorStatus,
    pub ramp_step: f32,
}

impl ControlParameters {
    pub const fn new(direction: Direction, target_velocity: f32, ramp_step: f32) -> Self {
        Self {
            direction,
            target_velocity,
            end_velocity: 0.0,
            velocity_ref: 0.0,
            id_ref: 0.0,
            iq_ref: 0.0,
            motor_status: MotorStatus::Stopped,
            old_status: MotorStatus::Stopped,
            ramp_step,
        }
    }
}

/// ベクトル制御の状態一式
pub struct VectorControl {
    config: ControlConfig,
    mode: ControlMode,
    params: ControlParameters,
    d_pi: PiController,
    q_pi: PiController,
    speed_pi: PiController,
    tracker: AngleTracker,
    speed: SpeedEstimator,
    offsets: OffsetCalibration,
    /// 電気角 [0, 2π)
    angle: f32,
    /// 電気角の (sin, cos)。次回の Park 変換にも使う
    sin_cos: (f32, f32),
    i_dq: (f32, f32),
    v_dq: (f32, f32),
}

impl VectorControl {
    pub const fn new(config: ControlConfig) -> Self {
        Self {
            mode: ControlMode::OpenLoop { lock_count: 0 },
            params: ControlParameters::new(
                Direction::Forward,
                config.default_target,
                config.ramp_step,
            ),
            d_pi: PiController::from_gains(&config.d_current),
            q_pi: PiController::from_gains(&config.q_current),
            speed_pi: PiController::from_gains(&config.speed),
            tracker: AngleTracker::new(config.encoder),
            speed: SpeedEstimator::new(config.encoder.pulses_per_erev, config.slow_loop_period_s),
            offsets: OffsetCalibration::UNCALIBRATED,
            angle: 0.0,
            sin_cos: (0.0, 1.0),
            i_dq: (0.0, 0.0),
            v_dq: (0.0, 0.0),
            config,
        }
    }

    /// 制御変数の初期化（起動・停止シーケンスから呼ぶ）
    ///
    /// 目標速度と電流オフセットは保持します。
    pub fn reset(&mut self, direction: Direction) {
        self.mode = ControlMode::OpenLoop { lock_count: 0 };
        self.params = ControlParameters::new(
            direction,
            self.params.target_velocity,
            self.config.ramp_step,
        );
        self.d_pi.reset();
        self.q_pi.reset();
        self.speed_pi.reset();
        self.tracker = AngleTracker::new(self.config.encoder);
        self.speed = SpeedEstimator::new(
            self.config.encoder.pulses_per_erev,
            self.config.slow_loop_period_s,
        );
        self.angle = 0.0;
        self.sin_cos = (0.0, 1.0);
        self.i_dq = (0.0, 0.0);
        self.v_dq = (0.0, 0.0);
    }

    /// 停止シーケンス：制御変数と速度ループを初期化し、停止状態にする
    pub fn stop(&mut self) {
        self.reset(self.params.direction);
    }

    /// 制御割り込みのエントリーポイント
    ///
    /// # 引数
    /// * `shared` - デシメーション出力とスローループゲート
    /// * `counter` - QDECカウンタの生値
    /// * `pwm` - Duty書き込み先
    pub fn step(&mut self, shared: &SharedState, counter: u16, pwm: &mut impl PwmDuty) {
        if self.params.motor_status == MotorStatus::Stopped {
            return;
        }

        let snapshot = shared.currents.snapshot();
        let (i_u, i_v) = snapshot.phase_currents(&self.offsets, self.config.current_scale);
        let (i_alpha, i_beta) = clarke(i_u, i_v);
        self.i_dq = park(i_alpha, i_beta, self.sin_cos);

        self.current_control(shared);

        self.update_angle(counter);
        self.sin_cos = sin_cos(self.angle);

        let (vd, vq) = self.v_dq;
        let (v_alpha, v_beta) = inverse_park(vd, vq, self.sin_cos);
        let (v_alpha, v_beta) = limit_voltage(v_alpha, v_beta, self.config.max_voltage);
        let (duty_u, duty_v, duty_w) =
            calculate_svpwm(v_alpha, v_beta, self.config.v_dc, pwm.max_duty());
        pwm.set_duty_uvw(duty_u, duty_v, duty_w);

        shared.slow_loop.tick();
    }

    fn current_control(&mut self, shared: &SharedState) {
        let dir = self.params.direction.sign();

        match self.mode {
            ControlMode::OpenLoop { .. } => {
                self.params.iq_ref = self.config.openloop_iq_ref * dir;
                self.params.id_ref = 0.0;
            }
            ControlMode::ClosedLoop { handover_pending } => {
                if handover_pending {
                    // 移行直後：速度ループを空の状態から始める
                    self.mode = ControlMode::ClosedLoop {
                        handover_pending: false,
                    };
                    self.speed_pi.reset();
                    self.params.id_ref = 0.0;
                    shared.slow_loop.reset();
                    self.params.target_velocity = self.config.default_target;
                    info!("Switched to closed loop FOC");
                }

                if self.config.torque_mode {
                    self.params.iq_ref = self.config.openloop_iq_ref * dir;
                }
            }
        }

        let (id, iq) = self.i_dq;
        let vd = self.d_pi.update(self.params.id_ref, id);
        let vq = self.q_pi.update(self.params.iq_ref, iq);
        self.v_dq = (vd, vq);
    }

    fn update_angle(&mut self, counter: u16) {
        let raw_angle = match self.mode {
            ControlMode::OpenLoop { lock_count } => {
                let lock = self.config.lock_ticks;
                if lock_count < lock {
                    // 界磁ロック
                    self.mode = ControlMode::OpenLoop {
                        lock_count: lock_count + 1,
                    };
                    PI
                } else if lock_count < lock.saturating_mul(2) {
                    // 90°進めてロータを引き込む
                    self.mode = ControlMode::OpenLoop {
                        lock_count: lock_count + 1,
                    };
                    PI + FRAC_PI_2 * self.params.direction.sign()
                } else {
                    self.mode = ControlMode::ClosedLoop {
                        handover_pending: true,
                    };
                    self.tracker.rezero(counter);
                    self.speed.reset(counter);
                    0.0
                }
            }
            ControlMode::ClosedLoop { .. } => self.tracker.update(counter),
        };

        self.angle = wrap_angle(raw_angle);
    }

    /// スローループ：速度ランプ・速度推定・速度PI
    ///
    /// クローズドループ中のみ動作します（トルクモードでは何もしない）。
    ///
    /// # 戻り値
    /// 電気角速度 [rad/s]
    pub fn slow_loop(&mut self, counter: u16) -> f32 {
        let closed_loop = matches!(self.mode, ControlMode::ClosedLoop { .. });
        if self.config.torque_mode || !closed_loop {
            return self.speed.velocity();
        }

        self.params.end_velocity = self.params.target_velocity;
        self.ramp_velocity_ref();

        let resync = self.params.old_status == MotorStatus::Stopped
            && self.params.motor_status == MotorStatus::Running;
        let velocity = self.speed.update(counter, resync);

        let reference = self.params.velocity_ref * self.params.direction.sign();
        self.params.iq_ref = self.speed_pi.update(reference, velocity);
        self.params.old_status = self.params.motor_status;

        velocity
    }

    fn ramp_velocity_ref(&mut self) {
        let step = self.params.ramp_step;
        let end = self.params.end_velocity;
        let current = self.params.velocity_ref;

        self.params.velocity_ref = if end > current + step {
            current + step
        } else if end < current - step {
            current - step
        } else {
            end
        };
    }

    /// 目標速度を1段上げる
    pub fn increase_target(&mut self) {
        self.params.target_velocity =
            (self.params.target_velocity + self.config.target_step).min(self.config.target_max);
    }

    /// 目標速度を1段下げる
    pub fn decrease_target(&mut self) {
        self.params.target_velocity =
            (self.params.target_velocity - self.config.target_step).max(self.config.target_min);
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.params.direction = direction;
    }

    pub fn set_offsets(&mut self, offsets: OffsetCalibration) {
        self.offsets = offsets;
    }

    /// キャリブレーション完了後に呼ぶ（以降 `step` が動作する）
    pub fn set_running(&mut self) {
        self.params.motor_status = MotorStatus::Running;
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn handover_pending(&self) -> bool {
        matches!(
            self.mode,
            ControlMode::ClosedLoop {
                handover_pending: true
            }
        )
    }

    pub fn params(&self) -> &ControlParameters {
        &self.params
    }

    pub fn direction(&self) -> Direction {
        self.params.direction
    }

    pub fn motor_status(&self) -> MotorStatus {
        self.params.motor_status
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// 最新の電気角速度 [rad/s]
    pub fn velocity(&self) -> f32 {
        self.speed.velocity()
    }

    pub fn velocity_ref(&self) -> f32 {
        self.params.velocity_ref
    }

    pub fn target_velocity(&self) -> f32 {
        self.params.target_velocity
    }

    pub fn offsets(&self) -> &OffsetCalibration {
        &self.offsets
    }

    /// 最新の (vd, vq) [V]
    pub fn voltages_dq(&self) -> (f32, f32) {
        self.v_dq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakePwm {
        writes: u32,
        duty: (u16, u16, u16),
    }

    impl PwmDuty for FakePwm {
        fn max_duty(&self) -> u16 {
            1000
        }

        fn set_duty_uvw(&mut self, duty_u: u16, duty_v: u16, duty_w: u16) {
            self.writes += 1;
            self.duty = (duty_u, duty_v, duty_w);
        }
    }

    fn running(config: ControlConfig, direction: Direction) -> VectorControl {
        let mut vc = VectorControl::new(config);
        vc.reset(direction);
        vc.set_running();
        vc
    }

    fn short_lock() -> ControlConfig {
        ControlConfig {
            lock_ticks: 100,
            ..ControlConfig::DEFAULT
        }
    }

    #[test]
    fn test_stopped_step_is_inert() {
        let shared = SharedState::new();
        let mut pwm = FakePwm::default();
        let mut vc = VectorControl::new(ControlConfig::DEFAULT);
        for _ in 0..10 {
            vc.step(&shared, 0, &mut pwm);
        }
        assert_eq!(pwm.writes, 0);
        assert_eq!(shared.slow_loop.ticks(), 0);
        assert_eq!(vc.mode(), ControlMode::OpenLoop { lock_count: 0 });
    }

    #[test]
    fn test_alignment_sequence_and_single_handover() {
        for direction in [Direction::Forward, Direction::Reverse] {
            let shared = SharedState::new();
            let mut pwm = FakePwm::default();
            let mut vc = running(short_lock(), direction);
            let forced = PI + FRAC_PI_2 * direction.sign();

            let mut edges = Vec::new();
            let mut was_pending = false;
            for tick in 1..=1000u32 {
                vc.step(&shared, 5_000, &mut pwm);

                if tick <= 100 {
                    assert_eq!(vc.angle(), PI, "tick {}", tick);
                } else if tick <= 200 {
                    assert_eq!(vc.angle(), forced, "tick {}", tick);
                } else if tick == 201 {
                    assert_eq!(vc.angle(), 0.0);
                }

                let pending = vc.handover_pending();
                if pending && !was_pending {
                    edges.push(tick);
                }
                was_pending = pending;
            }

            assert_eq!(edges, vec![201]);
            assert_eq!(
                vc.mode(),
                ControlMode::ClosedLoop {
                    handover_pending: false
                }
            );
            assert_eq!(pwm.writes, 1000);
        }
    }

    #[test]
    fn test_handover_resets_slow_loop_gate_and_target() {
        let shared = SharedState::new();
        let mut pwm = FakePwm::default();
        let mut vc = running(short_lock(), Direction::Forward);
        vc.increase_target();
        for _ in 0..201 {
            vc.step(&shared, 0, &mut pwm);
        }
        assert!(vc.handover_pending());
        assert_eq!(shared.slow_loop.ticks(), 201);

        // 次の割り込みで移行処理が1回だけ走る
        vc.step(&shared, 0, &mut pwm);
        assert!(!vc.handover_pending());
        assert_eq!(shared.slow_loop.ticks(), 1);
        assert_eq!(vc.target_velocity(), ControlConfig::DEFAULT.default_target);
    }

    #[test]
    fn test_closed_loop_angle_follows_encoder() {
        let shared = SharedState::new();
        let mut pwm = FakePwm::default();
        let mut vc = running(short_lock(), Direction::Forward);
        for _ in 0..201 {
            vc.step(&shared, 40_000, &mut pwm);
        }
        // 移行時のカウンタ値が電気角0
        vc.step(&shared, 40_000 + 200, &mut pwm);
        assert!((vc.angle() - FRAC_PI_2).abs() < 1e-5);
        vc.step(&shared, 40_000 + 400, &mut pwm);
        assert!((vc.angle() - PI).abs() < 1e-5);
        vc.step(&shared, 40_000 + 800, &mut pwm);
        assert!(vc.angle() < 1e-5);
    }

    #[test]
    fn test_openloop_commands_q_current_by_direction() {
        let shared = SharedState::new();
        let mut pwm = FakePwm::default();

        let mut fwd = running(short_lock(), Direction::Forward);
        fwd.step(&shared, 0, &mut pwm);
        assert_eq!(fwd.params().iq_ref, 1.0);
        assert_eq!(fwd.params().id_ref, 0.0);
        assert!(fwd.voltages_dq().1 > 0.0);

        let mut rev = running(short_lock(), Direction::Reverse);
        rev.step(&shared, 0, &mut pwm);
        assert_eq!(rev.params().iq_ref, -1.0);
        assert!(rev.voltages_dq().1 < 0.0);
    }

    #[test]
    fn test_slow_loop_idle_until_closed_loop() {
        let mut vc = running(short_lock(), Direction::Forward);
        assert_eq!(vc.slow_loop(1234), 0.0);
        assert_eq!(vc.velocity_ref(), 0.0);
    }

    #[test]
    fn test_slow_loop_ramps_and_drives_iq_by_direction() {
        for direction in [Direction::Forward, Direction::Reverse] {
            let shared = SharedState::new();
            let mut pwm = FakePwm::default();
            let mut vc = running(short_lock(), direction);
            for _ in 0..202 {
                vc.step(&shared, 0, &mut pwm);
            }

            // 最初のスローループは基準合わせのみ
            assert_eq!(vc.slow_loop(1000), 0.0);
            assert_eq!(vc.velocity_ref(), 1.0);
            assert_eq!(vc.params().old_status, MotorStatus::Running);

            // 静止したまま → 指令方向に q 軸電流
            for _ in 0..10 {
                vc.slow_loop(1000);
            }
            assert_eq!(vc.velocity_ref(), 11.0);
            assert!(vc.params().iq_ref * direction.sign() > 0.0);

            // 回転方向の速度は符号付きで出る
            let counts = (10.0 * direction.sign()) as i32;
            let w = vc.slow_loop((1000 + counts) as u16);
            assert!(w * direction.sign() > 0.0);
        }
    }

    #[test]
    fn test_target_limits() {
        let mut vc = VectorControl::new(ControlConfig::DEFAULT);
        for _ in 0..10 {
            vc.increase_target();
        }
        assert_eq!(vc.target_velocity(), 800.0);
        for _ in 0..10 {
            vc.decrease_target();
        }
        assert_eq!(vc.target_velocity(), 100.0);
    }

    #[test]
    fn test_reset_keeps_target_and_stops() {
        let shared = SharedState::new();
        let mut pwm = FakePwm::default();
        let mut vc = running(short_lock(), Direction::Forward);
        vc.decrease_target();
        vc.step(&shared, 0, &mut pwm);
        vc.stop();
        assert_eq!(vc.motor_status(), MotorStatus::Stopped);
        assert_eq!(vc.mode(), ControlMode::OpenLoop { lock_count: 0 });
        assert_eq!(vc.target_velocity(), 300.0);
        assert_eq!(vc.direction(), Direction::Forward);
    }
}
