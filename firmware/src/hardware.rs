//! ハードウェア初期化モジュール
//!
//! ## タイマ割り当て
//! - TIM1: 3相相補PWM（embassy `ComplementaryPwm`）+ 更新割り込み = 制御割り込み
//! - TIM2 (PA0, AF1): U相SNSゲート付きカウンタ（32bit）
//! - TIM3 (PA6, AF2): V相SNSゲート付きカウンタ（16bit）
//! - TIM4 (PB6/PB7, AF2): エンコーダモード（QDEC）
//! - TIM6: 100kHz サンプリング割り込み
//! - TIM15: embassy-time ドライバ

use embassy_stm32::{pac, Config};

use crate::config::{pwm, sampling};
use crate::fmt::*;

/// RCCクロック設定を初期化
///
/// HSI → PLL（÷4 × 85 ÷ 2）で170MHz生成
pub fn create_clock_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::{Pll, PllMul, PllPreDiv, PllRDiv, PllSource, Sysclk};

        config.rcc.hsi = true;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL85,
            divp: None,
            divq: None,
            divr: Some(PllRDiv::DIV2),
        });
        config.rcc.sys = Sysclk::PLL1_R;
    }
    config
}

/// GPIOをオルタネート機能（入力）に設定
unsafe fn set_alternate(gpio: pac::gpio::Gpio, pin: usize, af: u8) {
    gpio.moder().modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::ALTERNATE));
    gpio.afr(pin / 8).modify(|w| w.set_afr(pin % 8, af));
    gpio.pupdr().modify(|w| w.set_pupdr(pin, pac::gpio::vals::Pupdr::FLOATING));
}

/// SNSゲート付きカウンタ（TIM2/TIM3）とサンプリングタイマ（TIM6）の初期化
///
/// カウンタは TI1FP1 がHighの間だけ内部クロックを数えます（ゲートモード）。
/// 開始は `start_current_sampling` で行います。
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
pub unsafe fn init_current_sense() {
    let rcc = pac::RCC;

    rcc.ahb2enr().modify(|w| w.set_gpioaen(true));
    rcc.apb1enr1().modify(|w| {
        w.set_tim2en(true);
        w.set_tim3en(true);
        w.set_tim6en(true);
    });

    set_alternate(pac::GPIOA, 0, 1); // TIM2_CH1
    set_alternate(pac::GPIOA, 6, 2); // TIM3_CH1

    // TIM2 (32bit) / TIM3 (16bit) 共通設定
    macro_rules! init_gated_counter {
        ($tim:expr) => {{
            let tim = $tim;
            tim.cr1().modify(|w| w.set_cen(false));

            // CC1S = 01（IC1 ← TI1）
            tim.ccmr_input(0).modify(|w| {
                w.set_ccs(0, pac::timer::vals::CcmrInputCcs::TI4);
                w.set_icf(0, pac::timer::vals::FilterValue::FCK_INT_N2);
            });

            tim.smcr().modify(|w| {
                w.set_ts(pac::timer::vals::Ts::TI1FP1);
                w.set_sms(pac::timer::vals::Sms::GATED_MODE);
            });

            tim.psc().write_value(sampling::COUNTER_PSC);
        }};
    }
    init_gated_counter!(pac::TIM2);
    init_gated_counter!(pac::TIM3);

    pac::TIM2.arr().write_value(sampling::MASK_U); // 32bit フルスパン
    pac::TIM3.arr().write_value(pac::timer::regs::ArrCore(sampling::MASK_V));
    pac::TIM2.egr().write(|w| w.set_ug(true));
    pac::TIM3.egr().write(|w| w.set_ug(true));

    let tim6 = pac::TIM6;
    tim6.cr1().modify(|w| w.set_cen(false));
    tim6.psc().write_value(0);
    tim6.arr().write_value(pac::timer::regs::ArrCore(sampling::TIM6_ARR as u32));
    tim6.egr().write(|w| w.set_ug(true));
    tim6.sr().modify(|w| w.set_uif(false));

    info!(
        "Current sense initialized: TIM6 ARR={}, counter PSC={}",
        sampling::TIM6_ARR,
        sampling::COUNTER_PSC
    );
}

/// TIM4 エンコーダインターフェース初期化
///
/// PB6=A相、PB7=B相（両エッジカウント、16bitでラップ）
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
pub unsafe fn init_encoder() {
    let rcc = pac::RCC;
    let tim4 = pac::TIM4;

    rcc.ahb2enr().modify(|w| w.set_gpioben(true));
    rcc.apb1enr1().modify(|w| w.set_tim4en(true));

    set_alternate(pac::GPIOB, 6, 2); // TIM4_CH1
    set_alternate(pac::GPIOB, 7, 2); // TIM4_CH2

    tim4.cr1().modify(|w| w.set_cen(false));

    // CC1S = 01、CC2S = 01
    tim4.ccmr_input(0).modify(|w| {
        w.set_ccs(0, pac::timer::vals::CcmrInputCcs::TI4);
        w.set_ccs(1, pac::timer::vals::CcmrInputCcs::TI4);
        w.set_icf(0, pac::timer::vals::FilterValue::FCK_INT_N8);
        w.set_icf(1, pac::timer::vals::FilterValue::FCK_INT_N8);
    });

    // エンコーダモード3：TI1/TI2両エッジ
    tim4.smcr()
        .modify(|w| w.set_sms(pac::timer::vals::Sms::ENCODER_MODE_3));

    tim4.psc().write_value(0);
    tim4.arr().write_value(pac::timer::regs::ArrCore(0xFFFF));
    tim4.egr().write(|w| w.set_ug(true));

    info!("TIM4 encoder interface initialized");
}

/// サンプリング割り込みと制御割り込みを有効化
///
/// 優先度はサンプリング > 制御 > embassy タスク
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
pub unsafe fn arm_interrupts() {
    pac::TIM6.dier().modify(|w| w.set_uie(true));
    pac::TIM1.dier().modify(|w| w.set_uie(true));

    let mut cp = cortex_m::Peripherals::steal();
    cp.NVIC
        .set_priority(pac::Interrupt::TIM6_DAC, sampling::IRQ_PRIORITY);
    cp.NVIC
        .set_priority(pac::Interrupt::TIM1_UP_TIM16, pwm::IRQ_PRIORITY);
    cortex_m::peripheral::NVIC::unmask(pac::Interrupt::TIM6_DAC);
    cortex_m::peripheral::NVIC::unmask(pac::Interrupt::TIM1_UP_TIM16);

    info!("Sampling and control interrupts armed");
}

/// SNSカウンタとサンプリングタイマを開始
pub fn start_current_sampling() {
    pac::TIM6.cnt().write_value(pac::timer::regs::CntCore(0));
    pac::TIM2.cr1().modify(|w| w.set_cen(true));
    pac::TIM3.cr1().modify(|w| w.set_cen(true));
    pac::TIM6.cr1().modify(|w| w.set_cen(true));
}

pub fn stop_current_sampling() {
    pac::TIM6.cr1().modify(|w| w.set_cen(false));
    pac::TIM2.cr1().modify(|w| w.set_cen(false));
    pac::TIM3.cr1().modify(|w| w.set_cen(false));
}

pub fn start_position_counter() {
    pac::TIM4.cnt().write_value(pac::timer::regs::CntCore(0));
    pac::TIM4.cr1().modify(|w| w.set_cen(true));
}

pub fn stop_position_counter() {
    pac::TIM4.cr1().modify(|w| w.set_cen(false));
}

/// QDECカウンタの現在値
#[inline(always)]
pub fn position_count() -> u16 {
    pac::TIM4.cnt().read().cnt()
}

/// SNSカウンタの生値 (U, V)
#[inline(always)]
pub fn sns_counts() -> (u32, u32) {
    (
        pac::TIM2.cnt().read(),
        pac::TIM3.cnt().read().cnt() as u32,
    )
}

/// ブレーク入力によるフォルト状態をクリアし、主出力を再許可
pub fn clear_pwm_fault() {
    pac::TIM1.sr().modify(|w| w.set_bif(false));
    pac::TIM1.bdtr().modify(|w| w.set_moe(true));
}
