//! Rule file validation with structured errors.
//!
//! Returns a [`ValidationResult`] with errors (block save) and warnings (advisory).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::format::{RuleFormat, RuleGroupFormat, RuleGroupsFile};

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Location such as `"groups[0].rules[2].expr"`.
    pub path: String,
    pub message: String,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate every group in a rule file.
pub fn validate_groups_file(file: &RuleGroupsFile) -> ValidationResult {
    let mut result = ValidationResult::new();
    let mut names = HashSet::new();

    for (i, group) in file.groups.iter().enumerate() {
        let path = format!("groups[{i}]");
        if !group.name.is_empty() && !names.insert(group.name.as_str()) {
            result.error(
                format!("{path}.name"),
                format!("duplicate group name '{}'", group.name),
            );
        }
        validate_group(group, &path, &mut result);
    }
    result
}

/// Validate a single group.
pub fn validate_group_format(group: &RuleGroupFormat) -> ValidationResult {
    let mut result = ValidationResult::new();
    validate_group(group, "group", &mut result);
    result
}

fn validate_group(group: &RuleGroupFormat, path: &str, result: &mut ValidationResult) {
    if group.name.trim().is_empty() {
        result.error(format!("{path}.name"), "group name must not be empty");
    } else if group.name.contains('/') {
        result.error(
            format!("{path}.name"),
            format!("group name '{}' must not contain '/'", group.name),
        );
    }

    if group.interval.is_some_and(|d| d.is_zero()) {
        result.warn(
            format!("{path}.interval"),
            "interval of 0 re-evaluates the group on every scheduler tick",
        );
    }

    if group.rules.is_empty() {
        result.warn(format!("{path}.rules"), "group has no rules");
    }

    for (j, rule) in group.rules.iter().enumerate() {
        validate_rule(rule, &format!("{path}.rules[{j}]"), result);
    }
}

fn validate_rule(rule: &RuleFormat, path: &str, result: &mut ValidationResult) {
    match (&rule.record, &rule.alert) {
        (Some(_), Some(_)) => {
            result.error(path, "only one of 'record' or 'alert' may be set, but both are present");
        }
        (None, None) => {
            result.error(path, "one of 'record' or 'alert' must be set, but neither is present");
        }
        (Some(record), None) => {
            if !is_metric_name(record) {
                result.error(
                    format!("{path}.record"),
                    format!("invalid recording rule name '{record}'"),
                );
            }
            if rule.hold.is_some() {
                result.error(format!("{path}.for"), "'for' is only valid on alerting rules");
            }
            if !rule.annotations.is_empty() {
                result.error(
                    format!("{path}.annotations"),
                    "annotations are only valid on alerting rules",
                );
            }
        }
        (None, Some(alert)) => {
            if alert.trim().is_empty() {
                result.error(format!("{path}.alert"), "alert name must not be empty");
            }
        }
    }

    if rule.expr.trim().is_empty() {
        result.error(format!("{path}.expr"), "expression must not be empty");
    }

    for name in rule.labels.keys() {
        if !is_label_name(name) {
            result.error(
                format!("{path}.labels.{name}"),
                format!("invalid label name '{name}'"),
            );
        }
        if name == "__name__" {
            result.error(
                format!("{path}.labels.{name}"),
                "label '__name__' cannot be set by a rule",
            );
        }
    }
    for name in rule.annotations.keys() {
        if !is_label_name(name) {
            result.error(
                format!("{path}.annotations.{name}"),
                format!("invalid annotation name '{name}'"),
            );
        }
    }
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
pub fn is_metric_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`
pub fn is_label_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
