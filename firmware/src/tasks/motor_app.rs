//! モーターアプリケーションタスク
//!
//! アプリケーション状態機械（`Scheduler`）を一定周期で回します。
//! スイッチのデバウンスはこの周期 × 255 回で確定します。

use embassy_time::{Duration, Ticker};
use encoder_foc::config::SchedulerConfig;
use encoder_foc::Scheduler;

use crate::board::G4Board;
use crate::fmt::*;
use crate::interrupts::{CONTROL, SHARED};

/// スケジューラ実行周期 [μs]
const DISPATCH_PERIOD_US: u64 = 100;

/// モーターアプリケーションタスク
#[embassy_executor::task]
pub async fn motor_app_task(board: G4Board) {
    info!("Motor application task started");

    let mut app = Scheduler::new(SchedulerConfig::DEFAULT, &SHARED, &CONTROL, board);
    let mut ticker = Ticker::every(Duration::from_micros(DISPATCH_PERIOD_US));

    loop {
        app.dispatch();
        ticker.next().await;
    }
}
