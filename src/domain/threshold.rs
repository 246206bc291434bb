// Threshold rules and alert evaluation
use crate::domain::metric::Metric;
use std::collections::BTreeMap;

pub const DEFAULT_MESSAGE: &str = "${metric} reading ${value} outside [${lower}, ${upper}]";

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub metric: Metric,
    pub lower: f64,
    pub upper: f64,
    pub message: String,
}

impl ThresholdRule {
    pub fn new(metric: Metric, lower: f64, upper: f64) -> Self {
        Self {
            metric,
            lower,
            upper,
            message: DEFAULT_MESSAGE.to_string(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Values on either bound are accepted.
    pub fn is_violated_by(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }

    fn render_message(&self, value: f64) -> String {
        render_template(
            &self.message,
            &[
                ("metric", self.metric.to_string()),
                ("value", value.to_string()),
                ("lower", self.lower.to_string()),
                ("upper", self.upper.to_string()),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandedState {
    On,
    Off,
}

impl CommandedState {
    pub fn command_name(&self) -> &'static str {
        match self {
            CommandedState::On => "on",
            CommandedState::Off => "off",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub rule: ThresholdRule,
    pub observed: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertDecision {
    pub violations: Vec<Violation>,
    pub commanded_state: CommandedState,
}

impl AlertDecision {
    pub fn messages(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.message.as_str()).collect()
    }
}

/// Evaluate every rule, in order, against the latest reading of its metric.
///
/// Rules whose metric has no reading are skipped rather than treated as
/// violations. With no readings at all the decision is `Off`.
pub fn evaluate(latest: &BTreeMap<Metric, f64>, rules: &[ThresholdRule]) -> AlertDecision {
    let violations: Vec<Violation> = rules
        .iter()
        .filter_map(|rule| {
            let observed = *latest.get(&rule.metric)?;
            rule.is_violated_by(observed).then(|| Violation {
                rule: rule.clone(),
                observed,
                message: rule.render_message(observed),
            })
        })
        .collect();

    let commanded_state = if violations.is_empty() {
        CommandedState::Off
    } else {
        CommandedState::On
    };

    AlertDecision {
        violations,
        commanded_state,
    }
}

/// Fill `${name}` placeholders in one left-to-right pass. Substituted text is
/// never rescanned and unknown names are left as written.
pub fn render_template(template: &str, vars: &[(&str, String)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            rest = &rest[start..];
            break;
        };
        let name = &after[..end];
        match vars.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => rendered.push_str(value),
            None => rendered.push_str(&rest[start..start + end + 3]),
        }
        rest = &after[end + 1..];
    }

    rendered.push_str(rest);
    rendered
}
