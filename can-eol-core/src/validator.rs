//! Signal validator
//!
//! Accumulates signal observations for one test run and evaluates the rule set
//! on demand. Rule failures are data: `validate_all` always returns one result
//! per rule and never fails.

use crate::rules::{RuleCheck, RuleSet, ValidationRule};
use crate::types::SignalValue;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Reason reported by a rule with no failing check
pub const PASS_REASON: &str = "PASS";

/// Separator between the failure reasons of one rule
pub const REASON_SEPARATOR: &str = "; ";

/// Outcome of one rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub rule_name: String,
    pub passed: bool,
    /// `"PASS"`, or every failing check joined by `"; "`
    pub reason: String,
}

/// Stateful accumulator for one test run
#[derive(Debug, Clone)]
pub struct SignalValidator {
    rules: Arc<RuleSet>,
    /// signal name -> every distinct value seen
    state_history: HashMap<String, HashSet<SignalValue>>,
    /// signal name -> most recent value
    last_value: HashMap<String, SignalValue>,
}

impl SignalValidator {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self {
            rules,
            state_history: HashMap::new(),
            last_value: HashMap::new(),
        }
    }

    /// Record one observation
    pub fn feed(&mut self, signal_name: &str, value: SignalValue) {
        match self.state_history.get_mut(signal_name) {
            Some(seen) => {
                seen.insert(value.clone());
            }
            None => {
                self.state_history
                    .insert(signal_name.to_string(), HashSet::from([value.clone()]));
            }
        }
        self.last_value.insert(signal_name.to_string(), value);
    }

    /// Distinct values observed for a signal
    pub fn history(&self, signal_name: &str) -> Option<&HashSet<SignalValue>> {
        self.state_history.get(signal_name)
    }

    /// Most recent value observed for a signal
    pub fn last_value(&self, signal_name: &str) -> Option<&SignalValue> {
        self.last_value.get(signal_name)
    }

    /// The rules this validator evaluates
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Forget every observation, keeping the rules
    pub fn reset(&mut self) {
        self.state_history.clear();
        self.last_value.clear();
    }

    /// Evaluate every rule in definition order
    pub fn validate_all(&self) -> Vec<TestResult> {
        self.rules.iter().map(|rule| self.evaluate(rule)).collect()
    }

    /// Evaluate a single rule
    pub fn evaluate(&self, rule: &ValidationRule) -> TestResult {
        let failures: Vec<String> = rule
            .checks
            .iter()
            .filter_map(|check| self.check(&rule.signal, check))
            .collect();

        if failures.is_empty() {
            TestResult {
                rule_name: rule.name.clone(),
                passed: true,
                reason: PASS_REASON.to_string(),
            }
        } else {
            log::debug!("Rule '{}' failed: {}", rule.name, failures.join(REASON_SEPARATOR));
            TestResult {
                rule_name: rule.name.clone(),
                passed: false,
                reason: failures.join(REASON_SEPARATOR),
            }
        }
    }

    /// Run one check, returning the failure reason if it fails
    fn check(&self, signal: &str, check: &RuleCheck) -> Option<String> {
        match check {
            RuleCheck::RequiredStates(required) => {
                let seen = self.state_history.get(signal);
                let mut missing: Vec<String> = required
                    .iter()
                    .filter(|req| !seen.map_or(false, |seen| Self::observed(seen, req)))
                    .map(|req| req.to_string())
                    .collect();
                if missing.is_empty() {
                    return None;
                }
                missing.sort();
                missing.dedup();
                Some(format!(
                    "State History Failure: missing required states [{}]",
                    missing.join(", ")
                ))
            }

            RuleCheck::RequiredFinal(expected) => match self.last_value.get(signal) {
                Some(actual) if actual.matches(expected) => None,
                Some(actual) => Some(format!(
                    "Final State Failure: expected {}, found {}",
                    expected, actual
                )),
                None => Some(format!(
                    "Final State Failure: expected {}, found None",
                    expected
                )),
            },

            RuleCheck::Range { min, max } => match self.last_value.get(signal) {
                None => Some("Range Failure: signal value is missing".to_string()),
                Some(value) => match value.as_f64() {
                    None => Some(format!("Range Failure: value {} is not numeric", value)),
                    Some(v) if v >= *min && v <= *max => None,
                    Some(_) => Some(format!(
                        "Range Failure: value {} is out of range [{}, {}]",
                        value, min, max
                    )),
                },
            },
        }
    }

    fn observed(seen: &HashSet<SignalValue>, required: &SignalValue) -> bool {
        seen.contains(required) || seen.iter().any(|v| v.matches(required))
    }
}

/// Aggregate of a rule evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestResult>,
}

impl TestSummary {
    pub fn new(results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            results,
        }
    }

    /// True when no rule failed
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Failing results only
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
