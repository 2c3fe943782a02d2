//! モーター制御とハードウェアの設定パラメータ

/// 電流センス（SNSパルス数カウント）設定
pub mod current_sense {
    /// サンプリング割り込み周波数 [Hz]（100kHz = 10μs）
    pub const SAMPLING_FREQUENCY_HZ: u32 = 100_000;

    /// デシメーション比（5サンプルで1出力 = 20kHz）
    pub const DECIMATION_FACTOR: u32 = 5;

    /// 1サンプルあたりの最大パルス差分（超えた場合はカウンタ異常として飽和）
    pub const DELTA_CLAMP: u32 = 200;

    /// 起動直後に読み捨てる出力サンプル数
    pub const SETTLE_SAMPLES: u32 = 10;

    /// オフセット平均に使う出力サンプル数
    pub const CURRENTS_OFFSET_SAMPLES: u32 = 128;

    /// オフセット許容範囲（無電流時の理論値 ≈ 11800）
    pub const CURRENT_OFFSET_MIN: u32 = 10_000;
    pub const CURRENT_OFFSET_MAX: u32 = 13_500;

    /// 電流換算係数 [A/count]
    pub const CURRENT_SCALE_A_PER_COUNT: f32 = 0.000_85;

    /// 出力サンプル1つを待つ間のポーリング上限
    pub const MAX_POLLS_PER_SAMPLE: u32 = 100_000;
}

/// インクリメンタルエンコーダ（QDEC）設定
pub mod encoder {
    /// 1電気回転あたりのパルス数（1000ライン×4逓倍 / 5極対）
    pub const PULSES_PER_ELECTRICAL_REV: u32 = 800;

    /// QDECカウンタのスパン（16bit）
    pub const COUNTER_SPAN: u32 = 65_536;

    /// ラップアラウンド判定しきい値
    pub const UPPER_THRESHOLD: u16 = 49_152;
    pub const LOWER_THRESHOLD: u16 = 16_384;
}

/// 電流・速度制御設定
pub mod control {
    /// PWM周波数 = 制御割り込み周波数 [Hz]
    pub const PWM_FREQUENCY_HZ: u32 = 20_000;

    /// スローループ周期 [s]
    pub const SLOW_LOOP_TIME_SEC: f32 = 0.005;

    /// スローループ1回あたりの制御割り込み回数
    pub const SLOW_LOOP_TIME_PWM_COUNT: u32 = 100;

    /// 界磁ロック時間 [制御割り込み回数]（0.2s）
    pub const LOCK_COUNT_FOR_LOCK_TIME: u32 = 4_000;

    /// オープンループ時のq軸電流指令 [A]
    pub const Q_CURRENT_REF_OPENLOOP: f32 = 1.0;

    /// DCバス電圧 [V]
    pub const V_DC_BUS: f32 = 24.0;

    /// 出力電圧ベクトルの最大振幅 [V]（Vdc / √3）
    pub const MAX_VOLTAGE: f32 = V_DC_BUS / 1.732_050_8;

    /// d軸電流PI
    pub const D_CURRCNTR_PTERM: f32 = 2.0;
    pub const D_CURRCNTR_ITERM: f32 = 0.05;
    pub const D_CURRCNTR_CTERM: f32 = 0.5;
    pub const D_CURRCNTR_OUTMAX: f32 = MAX_VOLTAGE;

    /// q軸電流PI
    pub const Q_CURRCNTR_PTERM: f32 = 2.0;
    pub const Q_CURRCNTR_ITERM: f32 = 0.05;
    pub const Q_CURRCNTR_CTERM: f32 = 0.5;
    pub const Q_CURRCNTR_OUTMAX: f32 = MAX_VOLTAGE;

    /// 速度PI（出力はq軸電流指令 [A]）
    pub const SPEEDCNTR_PTERM: f32 = 0.005;
    pub const SPEEDCNTR_ITERM: f32 = 0.000_2;
    pub const SPEEDCNTR_CTERM: f32 = 0.5;
    pub const SPEEDCNTR_OUTMAX: f32 = 2.0;

    /// 速度指令ランプ [rad/s / スローループ]
    pub const SPEED_RAMP_INC_SLOW_LOOP: f32 = 1.0;

    /// トルクモード（速度ループを使わずq軸電流を固定）
    pub const TORQUE_MODE: bool = false;
}

/// 目標速度設定（電気角速度 [rad/s]）
pub mod speed {
    /// クローズドループ移行時の目標速度
    pub const DEFAULT_TARGET: f32 = 400.0;

    /// スイッチ1回あたりの増減量
    pub const TARGET_STEP: f32 = 100.0;

    pub const TARGET_MIN: f32 = 100.0;
    pub const TARGET_MAX: f32 = 800.0;

    /// 減速停止でこの速度以下になったら停止
    pub const STOP_VELOCITY: f32 = 110.0;

    /// 減速停止時、目標+マージン以下に追従したら目標をさらに下げる
    pub const STOP_MARGIN: f32 = 10.0;
}

/// アプリケーションスケジューラ設定
pub mod scheduler {
    /// 60秒あたりのスローループ回数
    pub const MOTOR_ACTIVITY_SLOW_LOOP_COUNT_60_SEC: u32 = 12_000;

    /// 無操作5分で減速停止
    pub const INACTIVITY_STOP_COUNT: u32 = 5 * MOTOR_ACTIVITY_SLOW_LOOP_COUNT_60_SEC;

    /// 無操作4分で警告LED
    pub const INACTIVITY_WARN_COUNT: u32 = 4 * MOTOR_ACTIVITY_SLOW_LOOP_COUNT_60_SEC;

    /// スイッチ押下確定までの連続ポーリング回数
    pub const DEBOUNCE_COUNT: u16 = 0xFF;

    /// ステータスログ間隔 [スローループ回数]（1秒）
    pub const STATUS_LOG_INTERVAL: u32 = 200;
}
