#![no_std]
#![no_main]

mod fmt;

mod board;
mod config;
mod hardware;
mod interrupts;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::Spawner;
use embassy_stm32::{
    gpio::{Input, Level, Output, OutputType, Pull, Speed},
    timer::{
        complementary_pwm::{ComplementaryPwm, ComplementaryPwmPin},
        low_level::CountingMode,
        simple_pwm::PwmPin,
        Channel,
    },
};
use embassy_time::{Duration, Timer};

use board::{G4Board, Leds, Switches};
use fmt::*;
use tasks::motor_app_task;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let config = hardware::create_clock_config();
    let p = embassy_stm32::init(config);

    info!("═══════════════════════════════════════════════════════════════════");
    info!("     Encoder FOC Motor Controller • STM32G431VB @ 170MHz");
    info!("═══════════════════════════════════════════════════════════════════");

    // PWM初期化（TIM1、3相相補PWM）。出力は起動シーケンスまで無効
    let mut uvw_pwm = ComplementaryPwm::new(
        p.TIM1,
        Some(PwmPin::new(p.PE9, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE8, OutputType::PushPull)),
        Some(PwmPin::new(p.PE11, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE10, OutputType::PushPull)),
        Some(PwmPin::new(p.PE13, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE12, OutputType::PushPull)),
        None,
        None,
        config::pwm::DEFAULT_FREQUENCY,
        CountingMode::EdgeAlignedUp,
    );
    uvw_pwm.disable(Channel::Ch1);
    uvw_pwm.disable(Channel::Ch2);
    uvw_pwm.disable(Channel::Ch3);
    uvw_pwm.set_dead_time(config::pwm::DEFAULT_DEAD_TIME);
    info!("PWM max duty: {}", uvw_pwm.get_max_duty());

    // 電流センス（TIM2/TIM3/TIM6）とエンコーダ（TIM4）
    unsafe {
        hardware::init_current_sense();
        hardware::init_encoder();
    }

    let leds = Leds {
        power: Output::new(p.PC13, Level::Low, Speed::Low),
        idle: Output::new(p.PC14, Level::Low, Speed::Low),
        reset: Output::new(p.PC15, Level::Low, Speed::Low),
        forward: Output::new(p.PB10, Level::Low, Speed::Low),
        reverse: Output::new(p.PB11, Level::Low, Speed::Low),
    };
    let switches = Switches {
        start: Input::new(p.PD0, Pull::Up),
        increment: Input::new(p.PD1, Pull::Up),
        decrement: Input::new(p.PD2, Pull::Up),
        reset: Input::new(p.PD3, Pull::Up),
        direction: Input::new(p.PD4, Pull::Up),
    };

    let board = G4Board::new(uvw_pwm, leds, switches);

    info!("Starting motor application...");
    spawner.spawn(motor_app_task(board)).unwrap();

    // 制御は割り込みと motor_app_task で動作する
    loop {
        Timer::after(Duration::from_millis(100)).await;
    }
}
