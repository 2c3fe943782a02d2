//! モータードライバー抽象化レイヤー
//!
//! 制御コアが使うハードウェア操作をトレイトで定義します。
//! 実機（STM32G431）の実装は `firmware/src/board.rs` にあります。
//!
//! - `PwmDuty`: 制御割り込みが使うDuty書き込みのみ
//! - `Board`: スケジューラが所有するペリフェラルのライフサイクル・LED・スイッチ

use crate::vector_control::Direction;

/// 3相PWMのDuty書き込み
///
/// 制御割り込みからのみ呼ばれます。チャネルの有効/無効などの
/// ライフサイクル操作は含みません。
pub trait PwmDuty {
    /// PWMの最大Duty値（100%）を取得
    fn max_duty(&self) -> u16;

    /// 3相全てのDuty比を設定
    ///
    /// # 引数
    /// * `duty_u` - U相のDuty比
    /// * `duty_v` - V相のDuty比
    /// * `duty_w` - W相のDuty比
    fn set_duty_uvw(&mut self, duty_u: u16, duty_v: u16, duty_w: u16);
}

/// 操作スイッチ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Switch {
    Start,
    Increment,
    Decrement,
    Reset,
    Direction,
}

/// スケジューラが所有するボード資源
pub trait Board {
    /// PWM出力ピン・チャネルを無効化
    fn disable_outputs(&mut self);

    /// PWM出力ピン・チャネルを有効化
    fn enable_outputs(&mut self);

    /// PWMフォルト（ブレーク入力）状態をクリア
    fn clear_fault(&mut self);

    /// サンプリング割り込みと制御割り込みを有効化
    fn arm_interrupts(&mut self);

    fn start_position_counter(&mut self);
    fn stop_position_counter(&mut self);

    /// QDECカウンタの現在値（16bitでラップ）
    fn position_count(&self) -> u16;

    /// SNSカウンタとサンプリングタイマを開始
    fn start_current_sampling(&mut self);
    fn stop_current_sampling(&mut self);

    /// 電源（運転中）LED
    fn set_power_indicator(&mut self, on: bool);

    /// 回転方向LED（`None` で消灯）
    fn set_direction_indicator(&mut self, direction: Option<Direction>);

    /// 無操作停止の予告LED
    fn set_idle_warning(&mut self, on: bool);

    /// リセットスイッチ確認用LEDを反転
    fn toggle_reset_indicator(&mut self);

    /// スイッチが押されているか（アクティブロー等の極性は実装側で吸収）
    fn switch_pressed(&self, switch: Switch) -> bool;

    /// 起動時のサンプル待ちループで毎回呼ばれる
    fn idle(&mut self) {
        core::hint::spin_loop();
    }
}
