use std::sync::Mutex;

use chrono::{NaiveDate, Utc};

/// Per-namespace daily token budget for cluster summarization (spec.md
/// §4.8). Owned by the caller (the orchestrator/API process) and shared
/// across recompute runs; resets the moment the wall-clock date rolls
/// over rather than on a fixed schedule.
pub struct DailyTokenBudget {
    budget: u64,
    state: Mutex<(NaiveDate, u64)>,
}

impl DailyTokenBudget {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            state: Mutex::new((Utc::now().date_naive(), 0)),
        }
    }

    /// Reserves `tokens` against today's budget; returns `false` (and
    /// reserves nothing) if doing so would exceed it.
    pub fn try_consume(&self, tokens: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let today = Utc::now().date_naive();
        if state.0 != today {
            *state = (today, 0);
        }
        if state.1.saturating_add(tokens) > self.budget {
            return false;
        }
        state.1 += tokens;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_fails_once_budget_exhausted() {
        let budget = DailyTokenBudget::new(100);
        assert!(budget.try_consume(60));
        assert!(!budget.try_consume(60));
        assert!(budget.try_consume(40));
    }
}
