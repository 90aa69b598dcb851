/// Per-episode step counter. One step is consumed per loop iteration, whatever the
/// decision turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepBudget {
    max_steps: u32,
    used: u32,
}

impl StepBudget {
    pub fn new(max_steps: u32) -> Self {
        Self { max_steps, used: 0 }
    }

    /// Take one step if any remain.
    pub fn try_consume(&mut self) -> bool {
        if self.used < self.max_steps {
            self.used += 1;
            true
        } else {
            false
        }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_exactly_max_steps() {
        let mut budget = StepBudget::new(3);
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.used(), 3);
        assert_eq!(budget.max_steps(), 3);
    }

    #[test]
    fn zero_budget_never_yields_a_step() {
        let mut budget = StepBudget::new(0);
        assert!(!budget.try_consume());
        assert_eq!(budget.used(), 0);
    }
}
