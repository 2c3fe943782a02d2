//! タスクモジュール
//!
//! 各タスクの実装を分離して管理します。

pub mod motor_app;

pub use motor_app::motor_app_task;
