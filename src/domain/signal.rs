//! Entry/exit signal aggregation.
//!
//! Every condition in a group is evaluated over the whole table, then the
//! per-bar results are folded with the group's combinator. An empty group
//! never fires.

use crate::domain::condition::{Combinator, ConditionGroup};
use crate::domain::condition_eval::ConditionEvaluator;
use crate::domain::error::ConfigurationError;

/// Entry and exit signal series for one instrument.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signals {
    pub entry: Vec<bool>,
    pub exit: Vec<bool>,
}

impl Signals {
    pub fn len(&self) -> usize {
        self.entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_empty()
    }

    pub fn at(&self, bar_index: usize) -> (bool, bool) {
        (
            self.entry.get(bar_index).copied().unwrap_or(false),
            self.exit.get(bar_index).copied().unwrap_or(false),
        )
    }
}

pub struct SignalAggregator<'e, 'a> {
    evaluator: &'e mut ConditionEvaluator<'a>,
}

impl<'e, 'a> SignalAggregator<'e, 'a> {
    pub fn new(evaluator: &'e mut ConditionEvaluator<'a>) -> Self {
        Self { evaluator }
    }

    pub fn combine(&mut self, group: &ConditionGroup) -> Result<Vec<bool>, ConfigurationError> {
        let len = self.evaluator.table().len();
        if group.is_empty() {
            return Ok(vec![false; len]);
        }

        let mut combined = match group.combinator {
            Combinator::And => vec![true; len],
            Combinator::Or => vec![false; len],
        };
        for condition in &group.conditions {
            let series = self.evaluator.evaluate(condition)?;
            for (acc, value) in combined.iter_mut().zip(series) {
                *acc = match group.combinator {
                    Combinator::And => *acc && value,
                    Combinator::Or => *acc || value,
                };
            }
        }
        Ok(combined)
    }

    pub fn signals(
        &mut self,
        entry: &ConditionGroup,
        exit: &ConditionGroup,
    ) -> Result<Signals, ConfigurationError> {
        Ok(Signals {
            entry: self.combine(entry)?,
            exit: self.combine(exit)?,
        })
    }
}
