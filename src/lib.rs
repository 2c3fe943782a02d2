//! エンコーダ・センサ付きFOCモーター制御コア
//!
//! SNSパルスカウントの電流デシメーション、QDECカウンタからの電気角・速度推定、
//! ベクトル制御ステートマシン、アプリケーションスケジューラを提供します。
//! ハードウェア依存部分は `motor_driver` のトレイト越しにアクセスし、
//! 実機実装は `firmware/` パッケージにあります。

#![cfg_attr(not(test), no_std)]

// fmt.rs は他モジュールより先に宣言する（マクロのテキストスコープ）
mod fmt;

pub mod config;
pub mod current_sense;
pub mod foc;
pub mod motor_driver;
pub mod position;
pub mod scheduler;
pub mod state;
pub mod vector_control;

pub use current_sense::{CurrentSamples, DecimationFilter, OffsetCalibration, StartupError};
pub use motor_driver::{Board, PwmDuty, Switch};
pub use scheduler::{AppState, Scheduler};
pub use state::{ControlAccess, SharedState, SlowLoopGate};
pub use vector_control::{ControlMode, Direction, MotorStatus, VectorControl};
