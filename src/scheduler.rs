//! アプリケーションスケジューラ
//!
//! フォアグラウンドのメインループから `Scheduler::dispatch` を繰り返し呼びます。
//! 状態遷移は `dispatch` の中でのみ起こり、各状態の処理関数が次の状態を返します。
//!
//! ## 状態遷移
//! ```text
//! Init → WaitStart → Start → Running → StopDecrease → Stopped → WaitStart
//!                      │                                  ↑
//!                      └──── 起動失敗 ────────────────────┘
//! ```
//!
//! ## 実行コンテキスト
//! - サンプリング割り込み（最高優先度）: `DecimationFilter::sample`
//! - 制御割り込み（PWM同期）: `VectorControl::step`
//! - フォアグラウンド: この `Scheduler`（スローループはゲート経由で実行）

pub mod switch;

pub use switch::{Debouncer, SwitchBank};

use crate::config::SchedulerConfig;
use crate::current_sense::{calibrate_offsets, settle, StartupError};
use crate::motor_driver::{Board, Switch};
use crate::state::{ControlAccess, SharedState};
use crate::vector_control::Direction;

/// アプリケーション状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppState {
    Init,
    WaitStart,
    Start,
    Running,
    StopDecrease,
    Stopped,
}

/// フォアグラウンドのアプリケーション状態機械
pub struct Scheduler<'a, B: Board, C: ControlAccess> {
    config: SchedulerConfig,
    shared: &'a SharedState,
    control: &'a C,
    board: B,
    state: AppState,
    direction: Direction,
    /// 操作なしで実行したスローループ回数
    inactivity: u32,
    switches: SwitchBank,
    slow_loops: u32,
}

impl<'a, B: Board, C: ControlAccess> Scheduler<'a, B, C> {
    pub fn new(config: SchedulerConfig, shared: &'a SharedState, control: &'a C, board: B) -> Self {
        Self {
            switches: SwitchBank::new(config.debounce_count),
            config,
            shared,
            control,
            board,
            state: AppState::Init,
            direction: Direction::Forward,
            inactivity: 0,
            slow_loops: 0,
        }
    }

    /// 1パス分の処理
    ///
    /// # 戻り値
    /// 処理後の状態
    pub fn dispatch(&mut self) -> AppState {
        let next = match self.state {
            AppState::Init => self.on_init(),
            AppState::WaitStart => self.on_wait_start(),
            AppState::Start => self.on_start(),
            AppState::Running => self.on_running(),
            AppState::StopDecrease => self.on_stop_decrease(),
            AppState::Stopped => self.on_stopped(),
        };

        if next != self.state {
            info!("App state: {} -> {}", self.state, next);
            self.state = next;
        }
        next
    }

    fn on_init(&mut self) -> AppState {
        self.board.disable_outputs();
        self.board.arm_interrupts();

        self.direction = Direction::Forward;
        let direction = self.direction;
        self.control.with_control(|c| c.set_direction(direction));
        AppState::WaitStart
    }

    fn on_wait_start(&mut self) -> AppState {
        if self.poll_switch(Switch::Direction) {
            self.direction = self.direction.toggled();
            let direction = self.direction;
            self.control.with_control(|c| c.set_direction(direction));
            self.board.set_direction_indicator(Some(direction));
            info!("Direction: {}", direction);
        }

        if self.poll_switch(Switch::Start) {
            AppState::Start
        } else {
            AppState::WaitStart
        }
    }

    fn on_start(&mut self) -> AppState {
        self.board.set_power_indicator(true);
        self.board.set_direction_indicator(Some(self.direction));

        match self.start_motor() {
            Ok(()) => {
                self.inactivity = 0;
                self.board.set_idle_warning(false);
                AppState::Running
            }
            Err(e) => {
                error!("Motor start failed: {}", e);
                AppState::Stopped
            }
        }
    }

    fn on_running(&mut self) -> AppState {
        if self.shared.slow_loop.try_fire(self.config.slow_loop_ticks) {
            self.run_slow_loop();
            self.inactivity = self.inactivity.saturating_add(1);

            if self.inactivity >= self.config.inactivity_stop {
                info!("No switch activity for {} slow loops, stopping", self.inactivity);
                return AppState::StopDecrease;
            }
            if self.inactivity >= self.config.inactivity_warn {
                self.board.set_idle_warning(true);
            }
        }

        let mut next = AppState::Running;

        if self.poll_switch(Switch::Start) {
            self.note_activity();
            next = AppState::StopDecrease;
        }
        if self.poll_switch(Switch::Increment) {
            self.note_activity();
            let target = self.control.with_control(|c| {
                c.increase_target();
                c.target_velocity()
            });
            info!("Target velocity: {}", target);
        }
        if self.poll_switch(Switch::Decrement) {
            self.note_activity();
            let target = self.control.with_control(|c| {
                c.decrease_target();
                c.target_velocity()
            });
            info!("Target velocity: {}", target);
        }
        if self.poll_switch(Switch::Reset) {
            self.note_activity();
            self.board.toggle_reset_indicator();
        }

        next
    }

    fn on_stop_decrease(&mut self) -> AppState {
        let sign = self.direction.sign();
        let velocity = self.control.with_control(|c| c.velocity()) * sign;
        if velocity <= self.config.stop_velocity {
            return AppState::Stopped;
        }

        if self.shared.slow_loop.try_fire(self.config.slow_loop_ticks) {
            let velocity = self.run_slow_loop() * sign;
            let margin = self.config.stop_margin;
            self.control.with_control(|c| {
                if velocity <= c.target_velocity() + margin {
                    c.decrease_target();
                }
            });
        }

        AppState::StopDecrease
    }

    fn on_stopped(&mut self) -> AppState {
        self.board.set_power_indicator(false);
        self.board.set_direction_indicator(None);
        self.board.set_idle_warning(false);
        self.stop_motor();
        self.switches.clear();
        AppState::WaitStart
    }

    /// 起動シーケンス
    ///
    /// 制御変数初期化 → 位置カウンタ・電流サンプリング開始 → セトリング →
    /// オフセットキャリブレーション → 運転状態 → フォルトクリア → 出力有効化
    pub fn start_motor(&mut self) -> Result<(), StartupError> {
        let direction = self.direction;
        self.control.with_control(|c| c.reset(direction));

        self.board.start_position_counter();
        self.board.start_current_sampling();

        let shared = self.shared;
        let calibration = self.config.calibration;
        let board = &mut self.board;
        let mut idle = || board.idle();
        settle(&shared.currents, &calibration, &mut idle)?;
        let offsets = calibrate_offsets(&shared.currents, &calibration, &mut idle)?;

        self.control.with_control(|c| {
            c.set_offsets(offsets);
            c.set_running();
        });
        self.board.clear_fault();
        self.board.enable_outputs();

        info!("Motor started: direction={}", direction);
        Ok(())
    }

    /// 停止シーケンス
    pub fn stop_motor(&mut self) {
        self.board.disable_outputs();
        self.control.with_control(|c| c.stop());
        self.board.stop_position_counter();
        self.board.stop_current_sampling();
        info!("Motor stopped");
    }

    fn run_slow_loop(&mut self) -> f32 {
        let counter = self.board.position_count();
        let velocity = self.control.with_control(|c| c.slow_loop(counter));

        self.slow_loops = self.slow_loops.wrapping_add(1);
        if self.config.status_log_interval != 0
            && self.slow_loops % self.config.status_log_interval == 0
        {
            let (velocity_ref, target) =
                self.control.with_control(|c| (c.velocity_ref(), c.target_velocity()));
            debug!(
                "w={} ref={} target={} idle={} glitches={}",
                velocity,
                velocity_ref,
                target,
                self.inactivity,
                self.shared.currents.glitch_count()
            );
        }

        velocity
    }

    fn poll_switch(&mut self, switch: Switch) -> bool {
        let down = self.board.switch_pressed(switch);
        self.switches.get_mut(switch).poll(down)
    }

    fn note_activity(&mut self) {
        self.inactivity = 0;
        self.board.set_idle_warning(false);
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn inactivity(&self) -> u32 {
        self.inactivity
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use core::f64::consts::TAU;

    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::blocking_mutex::Mutex;

    use crate::config::{ControlConfig, FilterConfig};
    use crate::current_sense::DecimationFilter;
    use crate::motor_driver::PwmDuty;
    use crate::vector_control::{MotorStatus, VectorControl};

    type Control = Mutex<CriticalSectionRawMutex, RefCell<VectorControl>>;

    const LOCK_TICKS: u32 = 10;

    /// 疑似ボード。idle のたびにサンプリング割り込みを1回進める
    struct FakeBoard<'a> {
        shared: &'a SharedState,
        filter: DecimationFilter,
        raw: u32,
        sampling: bool,
        /// `false` ならサンプリングを開始してもカウンタが進まない
        sns_alive: bool,
        counting: bool,
        counter: u16,
        held: Option<Switch>,
        outputs_enabled: bool,
        armed: bool,
        faults_cleared: u32,
        power: bool,
        direction_led: Option<Direction>,
        idle_warning: bool,
        reset_led: bool,
    }

    impl<'a> FakeBoard<'a> {
        fn new(shared: &'a SharedState) -> Self {
            Self {
                shared,
                filter: DecimationFilter::new(FilterConfig::DEFAULT, 0xFFFF, 0xFFFF),
                raw: 0,
                sampling: false,
                sns_alive: true,
                counting: false,
                counter: 0,
                held: None,
                outputs_enabled: false,
                armed: false,
                faults_cleared: 0,
                power: false,
                direction_led: None,
                idle_warning: false,
                reset_led: false,
            }
        }
    }

    impl Board for FakeBoard<'_> {
        fn disable_outputs(&mut self) {
            self.outputs_enabled = false;
        }

        fn enable_outputs(&mut self) {
            self.outputs_enabled = true;
        }

        fn clear_fault(&mut self) {
            self.faults_cleared += 1;
        }

        fn arm_interrupts(&mut self) {
            self.armed = true;
        }

        fn start_position_counter(&mut self) {
            self.counting = true;
        }

        fn stop_position_counter(&mut self) {
            self.counting = false;
        }

        fn position_count(&self) -> u16 {
            self.counter
        }

        fn start_current_sampling(&mut self) {
            self.sampling = true;
        }

        fn stop_current_sampling(&mut self) {
            self.sampling = false;
        }

        fn set_power_indicator(&mut self, on: bool) {
            self.power = on;
        }

        fn set_direction_indicator(&mut self, direction: Option<Direction>) {
            self.direction_led = direction;
        }

        fn set_idle_warning(&mut self, on: bool) {
            self.idle_warning = on;
        }

        fn toggle_reset_indicator(&mut self) {
            self.reset_led = !self.reset_led;
        }

        fn switch_pressed(&self, switch: Switch) -> bool {
            self.held == Some(switch)
        }

        fn idle(&mut self) {
            if self.sampling && self.sns_alive {
                // 中点付近（85 × 125 = 10625）
                self.raw = self.raw.wrapping_add(85);
                self.filter.sample(self.raw, self.raw, &self.shared.currents);
            }
        }
    }

    struct NullPwm;

    impl PwmDuty for NullPwm {
        fn max_duty(&self) -> u16 {
            4250
        }

        fn set_duty_uvw(&mut self, _: u16, _: u16, _: u16) {}
    }

    fn control() -> Control {
        Mutex::new(RefCell::new(VectorControl::new(ControlConfig {
            lock_ticks: LOCK_TICKS,
            ..ControlConfig::DEFAULT
        })))
    }

    fn press<C: ControlAccess>(app: &mut Scheduler<'_, FakeBoard<'_>, C>, switch: Switch) {
        app.board_mut().held = Some(switch);
        for _ in 0..SchedulerConfig::DEFAULT.debounce_count {
            app.dispatch();
        }
        app.board_mut().held = None;
    }

    fn control_steps(shared: &SharedState, control: &Control, counter: u16, n: u32) {
        let mut pwm = NullPwm;
        for _ in 0..n {
            control.with_control(|c| c.step(shared, counter, &mut pwm));
        }
    }

    #[test]
    fn test_init_and_start_sequence() {
        let shared = SharedState::new();
        let control = control();
        let mut app = Scheduler::new(
            SchedulerConfig::DEFAULT,
            &shared,
            &control,
            FakeBoard::new(&shared),
        );

        assert_eq!(app.dispatch(), AppState::WaitStart);
        assert!(app.board().armed);
        assert!(!app.board().outputs_enabled);

        press(&mut app, Switch::Start);
        assert_eq!(app.state(), AppState::WaitStart);
        assert_eq!(app.dispatch(), AppState::Start);
        assert_eq!(app.dispatch(), AppState::Running);

        let board = app.board();
        assert!(board.power && board.outputs_enabled && board.counting && board.sampling);
        assert_eq!(board.faults_cleared, 1);
        assert_eq!(board.direction_led, Some(Direction::Forward));

        // 待機中のサンプリングが共有領域に公開されている
        assert!(shared.currents.sample_count() > 0);
        assert_eq!(shared.currents.glitch_count(), 0);

        control.with_control(|c| {
            assert_eq!(c.motor_status(), MotorStatus::Running);
            assert_eq!(c.offsets().u, 85 * 125);
            assert!(!c.offsets().u_clamped);
        });
    }

    #[test]
    fn test_direction_only_changes_while_waiting() {
        let shared = SharedState::new();
        let control = control();
        let mut app = Scheduler::new(
            SchedulerConfig::DEFAULT,
            &shared,
            &control,
            FakeBoard::new(&shared),
        );
        app.dispatch();

        press(&mut app, Switch::Direction);
        app.dispatch();
        assert_eq!(app.direction(), Direction::Reverse);
        assert_eq!(app.board().direction_led, Some(Direction::Reverse));
        assert_eq!(control.with_control(|c| c.direction()), Direction::Reverse);

        press(&mut app, Switch::Start);
        app.dispatch();
        assert_eq!(app.dispatch(), AppState::Running);

        // 運転中は方向スイッチを無視
        press(&mut app, Switch::Direction);
        app.dispatch();
        assert_eq!(app.direction(), Direction::Reverse);
        assert_eq!(control.with_control(|c| c.direction()), Direction::Reverse);
    }

    #[test]
    fn test_start_failure_goes_to_stopped() {
        let shared = SharedState::new();
        let control = control();
        let mut board = FakeBoard::new(&shared);
        board.sns_alive = false;
        let config = SchedulerConfig {
            calibration: crate::config::CalibrationConfig {
                max_polls_per_sample: 50,
                ..crate::config::CalibrationConfig::DEFAULT
            },
            ..SchedulerConfig::DEFAULT
        };
        let mut app = Scheduler::new(config, &shared, &control, board);
        app.dispatch();
        press(&mut app, Switch::Start);
        app.dispatch();

        assert_eq!(app.start_motor(), Err(StartupError::SettleTimeout));
        assert_eq!(app.dispatch(), AppState::Stopped);
        assert!(!app.board().outputs_enabled);

        assert_eq!(app.dispatch(), AppState::WaitStart);
        assert!(!app.board().power);
        assert!(!app.board().sampling);
        assert_eq!(control.with_control(|c| c.motor_status()), MotorStatus::Stopped);
    }

    #[test]
    fn test_running_switches() {
        let shared = SharedState::new();
        let control = control();
        let mut app = Scheduler::new(
            SchedulerConfig::DEFAULT,
            &shared,
            &control,
            FakeBoard::new(&shared),
        );
        app.dispatch();
        press(&mut app, Switch::Start);
        app.dispatch();
        app.dispatch();
        assert_eq!(app.state(), AppState::Running);
        control_steps(&shared, &control, 0, 2 * LOCK_TICKS + 2);

        // スローループを数回回して無操作カウンタを進める
        for _ in 0..5 {
            control_steps(&shared, &control, 0, 100);
            app.dispatch();
        }
        assert_eq!(app.inactivity(), 5);

        press(&mut app, Switch::Increment);
        app.dispatch();
        assert_eq!(app.inactivity(), 0);
        assert_eq!(control.with_control(|c| c.target_velocity()), 500.0);

        press(&mut app, Switch::Decrement);
        app.dispatch();
        press(&mut app, Switch::Decrement);
        app.dispatch();
        assert_eq!(control.with_control(|c| c.target_velocity()), 300.0);

        assert!(!app.board().reset_led);
        press(&mut app, Switch::Reset);
        app.dispatch();
        assert!(app.board().reset_led);

        press(&mut app, Switch::Start);
        assert_eq!(app.dispatch(), AppState::StopDecrease);
    }

    #[test]
    fn test_inactivity_timeout_and_ramped_stop() {
        let shared = SharedState::new();
        let control = control();
        let config = SchedulerConfig::DEFAULT;
        let mut app = Scheduler::new(config, &shared, &control, FakeBoard::new(&shared));

        app.dispatch();
        press(&mut app, Switch::Start);
        app.dispatch();
        assert_eq!(app.dispatch(), AppState::Running);
        assert_eq!(app.inactivity(), 0);

        // 界磁合わせを終えてクローズドループへ
        control_steps(&shared, &control, 0, 2 * LOCK_TICKS + 2);
        assert!(!control.with_control(|c| c.handover_pending()));

        let mut position: f64 = 0.0;

        let mut stop_decrease_at = None;
        for tick in 1..=60_001u32 {
            let state = advance(&mut app, &shared, &control, &mut position);
            if tick < config.inactivity_warn {
                assert!(!app.board().idle_warning, "tick {}", tick);
            } else if tick < config.inactivity_stop {
                assert!(app.board().idle_warning, "tick {}", tick);
            }

            if tick < 60_000 {
                assert_eq!(state, AppState::Running, "tick {}", tick);
            } else if tick == 60_000 {
                assert_eq!(state, AppState::StopDecrease);
                stop_decrease_at = Some(tick);
            }
        }
        assert_eq!(stop_decrease_at, Some(60_000));

        let w = control.with_control(|c| c.velocity());
        assert!(w > 300.0, "w = {}", w);

        // 目標を段階的に下げながら減速し、停止しきい値で Stopped へ
        let mut stopped = false;
        let mut last_target = control.with_control(|c| c.target_velocity());
        for _ in 0..5_000 {
            let state = advance(&mut app, &shared, &control, &mut position);
            let target = control.with_control(|c| c.target_velocity());
            assert!(target <= last_target);
            last_target = target;

            if state == AppState::Stopped {
                stopped = true;
                break;
            }
            assert_eq!(state, AppState::StopDecrease);
        }
        assert!(stopped);
        assert!(control.with_control(|c| c.velocity()) <= 110.0);

        assert_eq!(app.dispatch(), AppState::WaitStart);
        let board = app.board();
        assert!(!board.outputs_enabled && !board.power && !board.idle_warning);
        assert_eq!(board.direction_led, None);
        control.with_control(|c| {
            assert_eq!(c.motor_status(), MotorStatus::Stopped);
            assert_eq!(c.velocity_ref(), 0.0);
        });
    }

    /// 速度指令どおりに回る疑似モータを1スローループ分進めてから1パス実行
    fn advance(
        app: &mut Scheduler<'_, FakeBoard<'_>, Control>,
        shared: &SharedState,
        control: &Control,
        position: &mut f64,
    ) -> AppState {
        let period = ControlConfig::DEFAULT.slow_loop_period_s as f64;
        let counts_per_rad = 800.0 * period / TAU;

        let w = control.with_control(|c| c.velocity_ref() * c.direction().sign()) as f64;
        *position += w * counts_per_rad;
        let counter = position.round().rem_euclid(65_536.0) as u16;
        app.board_mut().counter = counter;
        control_steps(shared, control, counter, SchedulerConfig::DEFAULT.slow_loop_ticks);
        app.dispatch()
    }
}
