//! Structural validation helpers.
//!
//! Each payload implements [`Validate`] by walking its fields through a
//! [`FieldScope`], which keeps track of the dotted path so errors name the
//! exact offending field (`vehicles[0].address.postalCode`).

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ValidationError;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

/// Payloads that can check their own structure before dispatch
pub trait Validate {
    /// Returns the first violation found, if any
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Field path prefix used while validating nested structures
#[derive(Debug, Clone, Default)]
pub struct FieldScope {
    prefix: String,
}

impl FieldScope {
    /// Scope rooted at the top-level object
    pub fn root() -> Self {
        Self::default()
    }

    /// Scope for a nested object field
    pub fn nested(&self, name: &str) -> Self {
        Self { prefix: self.path(name) }
    }

    /// Scope for an element of an array field
    pub fn index(&self, name: &str, idx: usize) -> Self {
        Self {
            prefix: format!("{}[{}]", self.path(name), idx),
        }
    }

    /// Full dotted path of a field in this scope
    pub fn path(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }

    pub fn required(&self, name: &str, value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::missing(self.path(name)));
        }
        Ok(())
    }

    pub fn email(&self, name: &str, value: &str) -> Result<(), ValidationError> {
        self.required(name, value)?;
        if !EMAIL_RE.is_match(value.trim()) {
            return Err(ValidationError::invalid(
                self.path(name),
                "must be a valid email address",
            ));
        }
        Ok(())
    }

    /// Exact character length, e.g. 13-digit national ID numbers
    pub fn exact_len(&self, name: &str, value: &str, len: usize) -> Result<(), ValidationError> {
        if value.chars().count() != len {
            return Err(ValidationError::invalid(
                self.path(name),
                format!("must be exactly {} characters", len),
            ));
        }
        Ok(())
    }

    pub fn one_of(&self, name: &str, value: &str, allowed: &[&str]) -> Result<(), ValidationError> {
        self.required(name, value)?;
        if !allowed.contains(&value) {
            return Err(ValidationError::invalid(
                self.path(name),
                format!("must be one of [{}], got '{}'", allowed.join(" "), value),
            ));
        }
        Ok(())
    }

    pub fn positive(&self, name: &str, value: f64) -> Result<(), ValidationError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::invalid(self.path(name), "must be greater than 0"));
        }
        Ok(())
    }

    pub fn non_negative(&self, name: &str, value: f64) -> Result<(), ValidationError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::invalid(self.path(name), "must not be negative"));
        }
        Ok(())
    }

    /// Inclusive range check
    pub fn in_range(&self, name: &str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
        if !value.is_finite() || value < min || value > max {
            return Err(ValidationError::invalid(
                self.path(name),
                format!("must be between {} and {}", min, max),
            ));
        }
        Ok(())
    }

    /// Calendar date in `YYYY-MM-DD`
    pub fn date(&self, name: &str, value: &str) -> Result<(), ValidationError> {
        self.required(name, value)?;
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
            ValidationError::invalid(self.path(name), "must be a date in YYYY-MM-DD format")
        })?;
        Ok(())
    }
}
