//! Minijinja expansion of alert annotations.
//!
//! Templates see `labels` (the alert's label set), `value` (the sample value)
//! and `external_url`. A fresh [`minijinja::Environment`] is built per render
//! since annotation templates are arbitrary strings, not registered files.

use serde::Serialize;

use crate::engine::Labels;
use crate::error::RuleError;

/// Data visible to annotation templates.
#[derive(Debug, Clone, Serialize)]
pub struct AlertTemplateContext<'a> {
    pub labels: &'a Labels,
    pub value: f64,
    pub external_url: &'a str,
}

fn build_env<'source>() -> minijinja::Environment<'source> {
    let mut env = minijinja::Environment::new();
    env.add_filter("humanize", humanize_filter);
    env
}

/// Render every annotation. A template that fails to render keeps an
/// error marker as its value so the alert is still delivered.
pub fn expand_annotations(
    annotations: &Labels,
    ctx: &AlertTemplateContext<'_>,
) -> (Labels, Vec<RuleError>) {
    let env = build_env();
    let mut out = Labels::new();
    let mut errors = Vec::new();
    for (name, template) in annotations {
        if !template.contains("{{") && !template.contains("{%") {
            out.insert(name.clone(), template.clone());
            continue;
        }
        match env.render_str(template, ctx) {
            Ok(rendered) => {
                out.insert(name.clone(), rendered);
            }
            Err(e) => {
                out.insert(
                    name.clone(),
                    format!("<error expanding template: {e}>"),
                );
                errors.push(RuleError::Template {
                    name: name.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
    (out, errors)
}

/// Check template syntax without rendering.
pub fn validate_template(name: &str, template: &str) -> Result<(), RuleError> {
    let env = build_env();
    env.template_from_str(template)
        .map(|_| ())
        .map_err(|e| RuleError::Template {
            name: name.to_string(),
            message: e.to_string(),
        })
}

/// `1234567` → `1.235M`; values are rounded to three decimals.
fn humanize_filter(value: f64) -> String {
    const UNITS: &[(f64, &str)] = &[(1e12, "T"), (1e9, "G"), (1e6, "M"), (1e3, "k")];
    if !value.is_finite() {
        return value.to_string();
    }
    for (size, suffix) in UNITS {
        if value.abs() >= *size {
            return format!("{}{}", trim_float(value / size), suffix);
        }
    }
    trim_float(value).to_string()
}

fn trim_float(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
