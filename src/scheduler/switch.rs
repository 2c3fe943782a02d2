//! 操作スイッチのデバウンス
//!
//! 押下中の連続読み取り回数を数え、しきい値に達したら「押下」を確定します。
//! 確定後に離された時点で1回だけ発火します。

use crate::motor_driver::Switch;

/// 1スイッチ分のデバウンス状態
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    threshold: u16,
    count: u16,
    pressed: bool,
}

impl Debouncer {
    pub const fn new(threshold: u16) -> Self {
        Self {
            threshold,
            count: 0,
            pressed: false,
        }
    }

    /// 1回分の読み取りを反映
    ///
    /// # 戻り値
    /// 押下確定後に離された場合 `true`
    pub fn poll(&mut self, is_down: bool) -> bool {
        if is_down {
            self.count = self.count.saturating_add(1);
            if self.count >= self.threshold {
                self.pressed = true;
                self.count = 0;
            }
            false
        } else {
            self.count = 0;
            core::mem::take(&mut self.pressed)
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}

/// 全スイッチのデバウンス状態
#[derive(Debug, Clone, Copy)]
pub struct SwitchBank {
    start: Debouncer,
    increment: Debouncer,
    decrement: Debouncer,
    reset: Debouncer,
    direction: Debouncer,
}

impl SwitchBank {
    pub const fn new(threshold: u16) -> Self {
        Self {
            start: Debouncer::new(threshold),
            increment: Debouncer::new(threshold),
            decrement: Debouncer::new(threshold),
            reset: Debouncer::new(threshold),
            direction: Debouncer::new(threshold),
        }
    }

    pub fn get_mut(&mut self, switch: Switch) -> &mut Debouncer {
        match switch {
            Switch::Start => &mut self.start,
            Switch::Increment => &mut self.increment,
            Switch::Decrement => &mut self.decrement,
            Switch::Reset => &mut self.reset,
            Switch::Direction => &mut self.direction,
        }
    }

    /// 全スイッチの状態を破棄
    pub fn clear(&mut self) {
        *self = Self::new(self.start.threshold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_on_release_after_threshold() {
        let mut sw = Debouncer::new(255);
        for _ in 0..254 {
            assert!(!sw.poll(true));
        }
        assert!(!sw.is_pressed());
        assert!(!sw.poll(true));
        assert!(sw.is_pressed());

        // 押し続けても発火しない
        for _ in 0..1000 {
            assert!(!sw.poll(true));
        }
        assert!(sw.poll(false));
        assert!(!sw.poll(false));
    }

    #[test]
    fn test_short_press_is_ignored() {
        let mut sw = Debouncer::new(255);
        for _ in 0..200 {
            sw.poll(true);
        }
        assert!(!sw.poll(false));

        // チャタリングでカウントが途切れると最初から
        for _ in 0..200 {
            sw.poll(true);
        }
        sw.poll(false);
        for _ in 0..100 {
            sw.poll(true);
        }
        assert!(!sw.poll(false));
    }

    #[test]
    fn test_bank_keeps_switches_independent() {
        let mut bank = SwitchBank::new(3);
        for _ in 0..3 {
            bank.get_mut(Switch::Start).poll(true);
            bank.get_mut(Switch::Reset).poll(false);
        }
        assert!(bank.get_mut(Switch::Start).poll(false));
        assert!(!bank.get_mut(Switch::Reset).poll(false));

        for _ in 0..3 {
            bank.get_mut(Switch::Direction).poll(true);
        }
        bank.clear();
        assert!(!bank.get_mut(Switch::Direction).poll(false));
    }
}
