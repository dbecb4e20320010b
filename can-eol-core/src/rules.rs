//! Validation rule set
//!
//! Immutable, ordered collection of named pass/fail rules. Each rule refers to
//! one signal and carries one or more checks; all checks of a rule are ANDed.
//!
//! ```yaml
//! tests:
//!   - name: power_mode_cycle
//!     signal: Vehicle_Power_Mode
//!     required_states: [OFF, RUN]
//!     require_final: RUN
//!   - name: battery_voltage
//!     signal: Battery_Voltage
//!     range: {min: 11.5, max: 14.8}
//! ```

use crate::config::{load_document, DocumentFormat};
use crate::types::{Error, Result, SignalValue};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// The kind of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    RequiredStates,
    RequiredFinal,
    Range,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::RequiredStates => write!(f, "required_states"),
            RuleKind::RequiredFinal => write!(f, "require_final"),
            RuleKind::Range => write!(f, "range"),
        }
    }
}

/// One check of a rule
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCheck {
    /// Every listed value must have been observed at least once
    RequiredStates(Vec<SignalValue>),
    /// The last observed value must equal this one
    RequiredFinal(SignalValue),
    /// The last observed value must be numeric and within `[min, max]`
    Range { min: f64, max: f64 },
}

impl RuleCheck {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleCheck::RequiredStates(_) => RuleKind::RequiredStates,
            RuleCheck::RequiredFinal(_) => RuleKind::RequiredFinal,
            RuleCheck::Range { .. } => RuleKind::Range,
        }
    }
}

/// A named rule over one signal
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRule {
    pub name: String,
    pub signal: String,
    /// Evaluated in this order: required states, final value, range
    pub checks: Vec<RuleCheck>,
}

impl ValidationRule {
    /// Start a rule with no checks; add them with the builder methods
    pub fn new(name: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signal: signal.into(),
            checks: Vec::new(),
        }
    }

    /// Builder method: require that all states were observed
    pub fn with_required_states<I, V>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SignalValue>,
    {
        self.checks
            .push(RuleCheck::RequiredStates(states.into_iter().map(Into::into).collect()));
        self
    }

    /// Builder method: require a final value
    pub fn with_required_final(mut self, value: impl Into<SignalValue>) -> Self {
        self.checks.push(RuleCheck::RequiredFinal(value.into()));
        self
    }

    /// Builder method: require the final value within `[min, max]`
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.checks.push(RuleCheck::Range { min, max });
        self
    }

    /// Kinds of check this rule carries
    pub fn kinds(&self) -> Vec<RuleKind> {
        self.checks.iter().map(RuleCheck::kind).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Configuration("Rule with an empty name".to_string()));
        }
        if self.signal.is_empty() {
            return Err(Error::Configuration(format!(
                "Rule '{}' does not name a signal",
                self.name
            )));
        }
        if self.checks.is_empty() {
            return Err(Error::Configuration(format!(
                "Rule '{}' has no required_states, require_final or range check",
                self.name
            )));
        }
        for check in &self.checks {
            if let RuleCheck::Range { min, max } = check {
                if min.is_nan() || max.is_nan() || min > max {
                    return Err(Error::Configuration(format!(
                        "Rule '{}': invalid range [{}, {}]",
                        self.name, min, max
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Ordered, immutable set of rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ValidationRule>,
}

impl RuleSet {
    /// Build a rule set, rejecting invalid or duplicate rules
    pub fn new(rules: Vec<ValidationRule>) -> Result<Self> {
        let mut names = HashSet::new();
        for rule in &rules {
            rule.validate()?;
            if !names.insert(rule.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "Duplicate rule name '{}'",
                    rule.name
                )));
            }
        }
        Ok(Self { rules })
    }

    /// Rules in definition order
    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Distinct signal names referenced by the rules
    pub fn signals(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.rules
            .iter()
            .map(|r| r.signal.as_str())
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Load a rule set from a YAML or JSON file
    pub fn load(path: &Path) -> Result<RuleSet> {
        log::info!("Loading validation rules: {:?}", path);
        let document: RuleDocument = load_document(path)?;
        build_rule_set(document).map_err(|e| match e {
            Error::Configuration(msg) => Error::Configuration(format!("{:?}: {}", path, msg)),
            other => other,
        })
    }

    /// Parse a rule set from a YAML string
    pub fn from_yaml_str(content: &str) -> Result<RuleSet> {
        build_rule_set(DocumentFormat::Yaml.parse(content)?)
    }

    /// Parse a rule set from a JSON string
    pub fn from_json_str(content: &str) -> Result<RuleSet> {
        build_rule_set(DocumentFormat::Json.parse(content)?)
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a ValidationRule;
    type IntoIter = std::slice::Iter<'a, ValidationRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// Top-level rule document
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub tests: Vec<RuleEntry>,
}

/// One rule as written in the document
#[derive(Debug, Clone, Deserialize)]
pub struct RuleEntry {
    pub name: String,
    pub signal: String,
    #[serde(default)]
    pub required_states: Option<Vec<SignalValue>>,
    #[serde(default, alias = "required_final")]
    pub require_final: Option<SignalValue>,
    #[serde(default)]
    pub range: Option<RangeEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RangeEntry {
    pub min: f64,
    pub max: f64,
}

impl From<RuleEntry> for ValidationRule {
    fn from(entry: RuleEntry) -> Self {
        let mut checks = Vec::new();
        if let Some(states) = entry.required_states {
            checks.push(RuleCheck::RequiredStates(states));
        }
        if let Some(value) = entry.require_final {
            checks.push(RuleCheck::RequiredFinal(value));
        }
        if let Some(range) = entry.range {
            checks.push(RuleCheck::Range {
                min: range.min,
                max: range.max,
            });
        }
        ValidationRule {
            name: entry.name,
            signal: entry.signal,
            checks,
        }
    }
}

fn build_rule_set(document: RuleDocument) -> Result<RuleSet> {
    let rules = document.tests.into_iter().map(ValidationRule::from).collect();
    let rule_set = RuleSet::new(rules)?;
    log::info!("Rule set loaded: {} rules", rule_set.len());
    Ok(rule_set)
}
