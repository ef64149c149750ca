//! Deriving artefact names from request parameters.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::RequestSpec;

/// How the artefact identifier is chosen from the request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierRule {
    /// Walk the parameters in order and keep the last value.
    ///
    /// Kept for compatibility with artefacts named by earlier tooling; prefer
    /// [`IdentifierRule::Parameter`] when a request carries more than one
    /// parameter.
    #[default]
    LastParameter,
    /// Use the value of the named parameter.
    Parameter(String),
}

/// Errors raised while deriving an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The request carried no query parameters at all.
    #[error("request has no query parameters to derive an identifier from")]
    NoParameters,
    /// The configured parameter is absent from the request.
    #[error("request has no `{name}` parameter to derive an identifier from")]
    MissingParameter {
        /// Parameter the rule asked for.
        name: String,
    },
    /// Sanitising the value left nothing usable as a file stem.
    #[error("parameter value {value:?} does not yield a usable file name")]
    Unusable {
        /// The raw parameter value.
        value: String,
    },
}

/// File stem plus extension naming the artefacts of one pipeline run.
///
/// # Examples
///
/// ```
/// use fetchsink_core::{Identifier, IdentifierRule, RequestSpec};
///
/// # fn main() -> Result<(), fetchsink_core::IdentifierError> {
/// let request = RequestSpec::new("https://api.datamuse.com/words").with_param("rel_rhy", "forgetful");
/// let id = Identifier::derive(&request, &IdentifierRule::LastParameter, "json")?;
/// assert_eq!(id.file_name(), "forgetful.json");
/// assert_eq!(id.with_extension("csv"), "forgetful.csv");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    stem: String,
    extension: String,
}

impl Identifier {
    /// Build an identifier from a raw value, sanitising it into a file stem.
    pub fn from_value(value: &str, extension: &str) -> Result<Self, IdentifierError> {
        let stem = sanitize_stem(value);
        if stem.is_empty() || stem.chars().all(|ch| ch == '.') {
            return Err(IdentifierError::Unusable {
                value: value.to_owned(),
            });
        }
        Ok(Self {
            stem,
            extension: extension.to_owned(),
        })
    }

    /// Derive an identifier from `request` according to `rule`.
    pub fn derive(
        request: &RequestSpec,
        rule: &IdentifierRule,
        extension: &str,
    ) -> Result<Self, IdentifierError> {
        let value = match rule {
            IdentifierRule::LastParameter => request
                .params
                .values()
                .last()
                .ok_or(IdentifierError::NoParameters)?,
            IdentifierRule::Parameter(name) => {
                request
                    .params
                    .get(name)
                    .ok_or_else(|| IdentifierError::MissingParameter { name: name.clone() })?
            }
        };
        Self::from_value(value, extension)
    }

    /// The sanitised stem.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// The extension of the primary artefact.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `stem.extension`.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.with_extension(&self.extension)
    }

    /// `stem.<extension>` for sibling artefacts (CSV, XLSX, ...).
    #[must_use]
    pub fn with_extension(&self, extension: &str) -> String {
        format!("{}.{extension}", self.stem)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stem, self.extension)
    }
}

/// Keep ASCII alphanumerics, `.`, `-` and `_`; every other character becomes
/// one `_`, so distinct values keep distinct stems.
fn sanitize_stem(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
