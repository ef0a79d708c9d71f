//! Retrain trigger: a stateful latch counting consecutive hard-drift
//! windows, firing one-shot per crossing of `required_hard_windows`.

/// Per-bundle consecutive-hard-drift-window counter.
#[derive(Debug, Default)]
pub struct RetrainTrigger {
    consecutive_hard: u32,
    required_hard_windows: u32,
}

/// One evaluation of the trigger against a fresh drift score.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerResult {
    pub triggered: bool,
    pub reason: Option<String>,
    pub consecutive_hard: u32,
}

impl RetrainTrigger {
    #[must_use]
    pub const fn new(required_hard_windows: u32) -> Self {
        Self {
            consecutive_hard: 0,
            required_hard_windows,
        }
    }

    /// Feed one drift update. `hard_drift` is `drift_score >= hard_threshold`
    /// for this window. Fires exactly once per crossing, then re-arms.
    pub fn observe(&mut self, hard_drift: bool) -> TriggerResult {
        if hard_drift {
            self.consecutive_hard += 1;
        } else {
            self.consecutive_hard = 0;
        }

        if self.consecutive_hard >= self.required_hard_windows {
            let n = self.consecutive_hard;
            self.consecutive_hard = 0;
            return TriggerResult {
                triggered: true,
                reason: Some(format!("HARD_DRIFT_{n}_WINDOWS")),
                consecutive_hard: 0,
            };
        }

        TriggerResult {
            triggered: false,
            reason: None,
            consecutive_hard: self.consecutive_hard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_exactly_once_at_required_count_then_rearms() {
        let mut trigger = RetrainTrigger::new(3);
        assert!(!trigger.observe(true).triggered);
        assert!(!trigger.observe(true).triggered);
        let third = trigger.observe(true);
        assert!(third.triggered);
        assert_eq!(third.reason.as_deref(), Some("HARD_DRIFT_3_WINDOWS"));
        assert!(!trigger.observe(true).triggered);
    }

    #[test]
    fn non_hard_window_resets_the_counter() {
        let mut trigger = RetrainTrigger::new(3);
        trigger.observe(true);
        trigger.observe(true);
        assert_eq!(trigger.observe(false).consecutive_hard, 0);
        assert!(!trigger.observe(true).triggered);
        assert!(!trigger.observe(true).triggered);
        assert!(trigger.observe(true).triggered);
    }

    #[test]
    fn required_of_one_fires_on_every_hard_window() {
        let mut trigger = RetrainTrigger::new(1);
        assert!(trigger.observe(true).triggered);
        assert!(trigger.observe(true).triggered);
        assert!(!trigger.observe(false).triggered);
    }
}
