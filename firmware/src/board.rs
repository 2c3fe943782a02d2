//! STM32G431 ボード実装
//!
//! ## ピン配置
//! - PWM: PE8/PE9 (U), PE10/PE11 (V), PE12/PE13 (W)
//! - LED: PC13 電源, PC14 無操作予告, PC15 リセット確認, PB10/PB11 回転方向
//! - スイッチ（アクティブロー、内部プルアップ）: PD0 起動/停止, PD1 速度+, PD2 速度-,
//!   PD3 リセット, PD4 回転方向

use embassy_stm32::{
    gpio::{Input, Output},
    pac, peripherals,
    timer::{complementary_pwm::ComplementaryPwm, Channel},
};
use encoder_foc::{Board, Direction, PwmDuty, Switch};

use crate::hardware;

/// 制御割り込みから使うTIM1のDuty書き込み
///
/// チャネルの有効/無効は `G4Board` が管理し、ここではCCRのみ書き込みます。
pub struct Tim1Duty;

impl PwmDuty for Tim1Duty {
    #[inline(always)]
    fn max_duty(&self) -> u16 {
        pac::TIM1.arr().read().arr().saturating_add(1)
    }

    #[inline(always)]
    fn set_duty_uvw(&mut self, duty_u: u16, duty_v: u16, duty_w: u16) {
        let tim1 = pac::TIM1;
        tim1.ccr(0).write(|w| w.set_ccr(duty_u));
        tim1.ccr(1).write(|w| w.set_ccr(duty_v));
        tim1.ccr(2).write(|w| w.set_ccr(duty_w));
    }
}

/// 表示LED
pub struct Leds {
    pub power: Output<'static>,
    pub idle: Output<'static>,
    pub reset: Output<'static>,
    pub forward: Output<'static>,
    pub reverse: Output<'static>,
}

/// 操作スイッチ入力
pub struct Switches {
    pub start: Input<'static>,
    pub increment: Input<'static>,
    pub decrement: Input<'static>,
    pub reset: Input<'static>,
    pub direction: Input<'static>,
}

/// スケジューラが所有するボード資源
pub struct G4Board {
    pwm: ComplementaryPwm<'static, peripherals::TIM1>,
    leds: Leds,
    switches: Switches,
}

impl G4Board {
    pub fn new(pwm: ComplementaryPwm<'static, peripherals::TIM1>, leds: Leds, switches: Switches) -> Self {
        Self { pwm, leds, switches }
    }
}

impl Board for G4Board {
    fn disable_outputs(&mut self) {
        Tim1Duty.set_duty_uvw(0, 0, 0);
        self.pwm.disable(Channel::Ch1);
        self.pwm.disable(Channel::Ch2);
        self.pwm.disable(Channel::Ch3);
    }

    fn enable_outputs(&mut self) {
        let half = Tim1Duty.max_duty() / 2;
        Tim1Duty.set_duty_uvw(half, half, half);
        self.pwm.enable(Channel::Ch1);
        self.pwm.enable(Channel::Ch2);
        self.pwm.enable(Channel::Ch3);
    }

    fn clear_fault(&mut self) {
        hardware::clear_pwm_fault();
    }

    fn arm_interrupts(&mut self) {
        unsafe {
            hardware::arm_interrupts();
        }
    }

    fn start_position_counter(&mut self) {
        hardware::start_position_counter();
    }

    fn stop_position_counter(&mut self) {
        hardware::stop_position_counter();
    }

    fn position_count(&self) -> u16 {
        hardware::position_count()
    }

    fn start_current_sampling(&mut self) {
        hardware::start_current_sampling();
    }

    fn stop_current_sampling(&mut self) {
        hardware::stop_current_sampling();
    }

    fn set_power_indicator(&mut self, on: bool) {
        if on {
            self.leds.power.set_high();
        } else {
            self.leds.power.set_low();
        }
    }

    fn set_direction_indicator(&mut self, direction: Option<Direction>) {
        match direction {
            Some(Direction::Forward) => {
                self.leds.forward.set_high();
                self.leds.reverse.set_low();
            }
            Some(Direction::Reverse) => {
                self.leds.forward.set_low();
                self.leds.reverse.set_high();
            }
            None => {
                self.leds.forward.set_low();
                self.leds.reverse.set_low();
            }
        }
    }

    fn set_idle_warning(&mut self, on: bool) {
        if on {
            self.leds.idle.set_high();
        } else {
            self.leds.idle.set_low();
        }
    }

    fn toggle_reset_indicator(&mut self) {
        self.leds.reset.toggle();
    }

    fn switch_pressed(&self, switch: Switch) -> bool {
        let input = match switch {
            Switch::Start => &self.switches.start,
            Switch::Increment => &self.switches.increment,
            Switch::Decrement => &self.switches.decrement,
            Switch::Reset => &self.switches.reset,
            Switch::Direction => &self.switches.direction,
        };
        input.is_low()
    }
}
