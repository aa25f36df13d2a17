//! Typed parameter schemas for module instances.
//!
//! Every module declares its parameters as a list of [`ParamSpec`]s. Each
//! spec has a declared [`ParamKind`] (enumerated choice, bounded integer or
//! float range, boolean) and a typed default. Values only reach a module
//! through [`ParameterSet::set`], which validates against the declared kind
//! and leaves the previous value untouched on rejection.
//!
//! Text input (from a batch descriptor or GUI entry) is converted according
//! to the declared kind of the target parameter, never by guessing from the
//! shape of the string.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::errors::{GaapError, Result};

// ─── Values ─────────────────────────────────────────────────────────────────

/// A parameter value as stored on a module and carried across processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

// ─── Schema ─────────────────────────────────────────────────────────────────

/// Declared kind of a parameter; determines which values are accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamKind {
    Choice { options: Vec<String> },
    IntRange { min: i64, max: i64 },
    FloatRange { min: f64, max: f64 },
    Bool,
}

/// How a front end should present the parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    OptionMenu,
    Slider,
    Tick,
}

/// Declaration of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamValue,
    pub widget: Widget,
    pub visible: bool,
}

impl ParamSpec {
    pub fn choice(name: &'static str, options: &[&str], default: &str) -> Self {
        Self {
            name,
            kind: ParamKind::Choice {
                options: options.iter().map(|s| s.to_string()).collect(),
            },
            default: ParamValue::Text(default.to_string()),
            widget: Widget::OptionMenu,
            visible: true,
        }
    }

    pub fn int_range(name: &'static str, min: i64, max: i64, default: i64) -> Self {
        Self {
            name,
            kind: ParamKind::IntRange { min, max },
            default: ParamValue::Int(default),
            widget: Widget::OptionMenu,
            visible: true,
        }
    }

    pub fn float_range(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::FloatRange { min, max },
            default: ParamValue::Float(default),
            widget: Widget::Slider,
            visible: true,
        }
    }

    pub fn flag(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: ParamKind::Bool,
            default: ParamValue::Bool(default),
            widget: Widget::Tick,
            visible: true,
        }
    }

    /// Builder method: override the presentation widget
    pub fn with_widget(mut self, widget: Widget) -> Self {
        self.widget = widget;
        self
    }

    /// Builder method: hide from front ends
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Check `value` against the declared kind and return its canonical form.
    ///
    /// Text values are parsed as the declared kind (so `"3"` is accepted for
    /// an integer range); values of any other mismatched type are rejected.
    pub fn check(&self, value: &ParamValue) -> std::result::Result<ParamValue, String> {
        match (&self.kind, value) {
            (ParamKind::Choice { options }, ParamValue::Text(s)) => {
                if options.iter().any(|o| o == s) {
                    Ok(value.clone())
                } else {
                    Err(format!("'{s}' is not one of [{}]", options.join(", ")))
                }
            }
            (ParamKind::IntRange { min, max }, ParamValue::Int(i)) => {
                if (*min..=*max).contains(i) {
                    Ok(ParamValue::Int(*i))
                } else {
                    Err(format!("{i} is outside {min}..={max}"))
                }
            }
            (ParamKind::IntRange { .. }, ParamValue::Text(s)) => {
                let parsed = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| format!("'{s}' is not an integer"))?;
                self.check(&ParamValue::Int(parsed))
            }
            (ParamKind::FloatRange { min, max }, ParamValue::Float(x)) => {
                if x.is_finite() && *x >= *min && *x <= *max {
                    Ok(ParamValue::Float(*x))
                } else {
                    Err(format!("{x} is outside {min}..={max}"))
                }
            }
            (ParamKind::FloatRange { .. }, ParamValue::Int(i)) => {
                self.check(&ParamValue::Float(*i as f64))
            }
            (ParamKind::FloatRange { .. }, ParamValue::Text(s)) => {
                let parsed = s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("'{s}' is not a number"))?;
                self.check(&ParamValue::Float(parsed))
            }
            (ParamKind::Bool, ParamValue::Bool(b)) => Ok(ParamValue::Bool(*b)),
            (ParamKind::Bool, ParamValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str()
            {
                "true" | "1" | "yes" => Ok(ParamValue::Bool(true)),
                "false" | "0" | "no" => Ok(ParamValue::Bool(false)),
                _ => Err(format!("'{s}' is not a boolean")),
            },
            (kind, other) => Err(format!("{other:?} does not match declared kind {kind:?}")),
        }
    }
}

// ─── Errors ─────────────────────────────────────────────────────────────────

/// A rejected parameter assignment.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid parameter '{parameter}' for {module}: {reason}")]
pub struct ParameterValidationError {
    pub module: String,
    pub parameter: String,
    pub reason: String,
}

// ─── Parameter set ──────────────────────────────────────────────────────────

/// The declared schema of one module instance plus its current values.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    module: &'static str,
    specs: Vec<ParamSpec>,
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    /// Build from a schema, applying every default.
    pub fn new(module: &'static str, specs: Vec<ParamSpec>) -> Self {
        let values = specs
            .iter()
            .map(|s| (s.name.to_string(), s.default.clone()))
            .collect();
        Self {
            module,
            specs,
            values,
        }
    }

    /// A module without parameters.
    pub fn empty(module: &'static str) -> Self {
        Self::new(module, Vec::new())
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    pub fn spec(&self, name: &str) -> Option<&ParamSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Current values, keyed by parameter name.
    pub fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Validate and assign. On error the previous value is kept.
    pub fn set(
        &mut self,
        name: &str,
        value: ParamValue,
    ) -> std::result::Result<(), ParameterValidationError> {
        let reject = |reason: String| ParameterValidationError {
            module: self.module.to_string(),
            parameter: name.to_string(),
            reason,
        };
        let spec = self
            .spec(name)
            .ok_or_else(|| reject("unknown parameter".to_string()))?;
        let canonical = spec.check(&value).map_err(reject)?;
        self.values.insert(name.to_string(), canonical);
        Ok(())
    }

    /// Assign several values; stops at the first rejection.
    pub fn apply(
        &mut self,
        values: &BTreeMap<String, ParamValue>,
    ) -> std::result::Result<(), ParameterValidationError> {
        for (name, value) in values {
            self.set(name, value.clone())?;
        }
        Ok(())
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.get(name) {
            Some(ParamValue::Int(i)) => Ok(*i),
            other => Err(self.missing(name, "integer", other)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        match self.get(name) {
            Some(ParamValue::Float(x)) => Ok(*x),
            Some(ParamValue::Int(i)) => Ok(*i as f64),
            other => Err(self.missing(name, "float", other)),
        }
    }

    pub fn flag(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            Some(ParamValue::Bool(b)) => Ok(*b),
            other => Err(self.missing(name, "boolean", other)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(ParamValue::Text(s)) => Ok(s),
            other => Err(self.missing(name, "choice", other)),
        }
    }

    fn missing(&self, name: &str, expected: &str, found: Option<&ParamValue>) -> GaapError {
        GaapError::internal(format!(
            "{}: parameter '{name}' expected {expected}, found {found:?}",
            self.module
        ))
    }
}
