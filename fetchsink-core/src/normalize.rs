//! Turning raw response bodies into records.

use thiserror::Error;

use crate::identifier::{Identifier, IdentifierError, IdentifierRule};
use crate::record::{Payload, Record};
use crate::request::{RawResponse, RequestSpec, ResponseFormat};

/// Errors raised by [`normalize`].
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The body did not parse as the declared format.
    #[error("response from {url} is not valid JSON: {source}")]
    Malformed {
        /// URL the body was fetched from.
        url: String,
        /// Parser failure.
        #[source]
        source: serde_json::Error,
    },
    /// No identifier could be derived from the request parameters.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

/// Parse `response` according to `format` and derive the artefact identifier.
///
/// JSON bodies become [`Payload::Structured`]; anything else is kept verbatim
/// as [`Payload::Text`]. The identifier extension follows the format
/// (`json` or `txt`).
///
/// # Examples
///
/// ```
/// use fetchsink_core::{
///     IdentifierRule, Payload, RawResponse, RequestSpec, ResponseFormat, normalize,
/// };
///
/// # fn main() -> Result<(), fetchsink_core::NormalizeError> {
/// let request = RequestSpec::new("https://api.datamuse.com/words").with_param("rel_rhy", "forgetful");
/// let response = RawResponse {
///     url: "https://api.datamuse.com/words?rel_rhy=forgetful".into(),
///     status: 200,
///     content_type: Some("application/json".into()),
///     body: br#"{"word": "nostalgic"}"#.to_vec(),
/// };
/// let (payload, id) = normalize(&response, &request, ResponseFormat::Json, &IdentifierRule::LastParameter)?;
/// assert_eq!(id.file_name(), "forgetful.json");
/// assert!(matches!(payload, Payload::Structured(_)));
/// # Ok(())
/// # }
/// ```
pub fn normalize(
    response: &RawResponse,
    request: &RequestSpec,
    format: ResponseFormat,
    rule: &IdentifierRule,
) -> Result<(Payload, Identifier), NormalizeError> {
    let identifier = Identifier::derive(request, rule, format.extension())?;
    let payload = match format {
        ResponseFormat::Json => {
            let record =
                Record::from_slice(&response.body).map_err(|source| NormalizeError::Malformed {
                    url: response.url.clone(),
                    source,
                })?;
            Payload::Structured(record)
        }
        ResponseFormat::Text => Payload::Text(String::from_utf8_lossy(&response.body).into_owned()),
    };
    Ok((payload, identifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn request() -> RequestSpec {
        RequestSpec::new("https://api.datamuse.com/words").with_param("rel_rhy", "forgetful")
    }

    fn response(body: &[u8]) -> RawResponse {
        RawResponse {
            url: "https://api.datamuse.com/words?rel_rhy=forgetful".to_owned(),
            status: 200,
            content_type: Some("application/json".to_owned()),
            body: body.to_vec(),
        }
    }

    #[rstest]
    fn parses_json_body(request: RequestSpec) {
        let (payload, id) = normalize(
            &response(br#"{"word": "nostalgic"}"#),
            &request,
            ResponseFormat::Json,
            &IdentifierRule::LastParameter,
        )
        .expect("normalise");
        assert_eq!(id.file_name(), "forgetful.json");
        let record = payload.as_record().expect("structured payload");
        assert_eq!(record.as_value(), &json!({"word": "nostalgic"}));
    }

    #[rstest]
    fn rejects_malformed_json(request: RequestSpec) {
        let err = normalize(
            &response(b"<html>nope</html>"),
            &request,
            ResponseFormat::Json,
            &IdentifierRule::LastParameter,
        )
        .expect_err("should fail");
        assert!(matches!(err, NormalizeError::Malformed { .. }));
    }

    #[rstest]
    fn text_format_keeps_body(request: RequestSpec) {
        let (payload, id) = normalize(
            &response(b"<html>ok</html>"),
            &request,
            ResponseFormat::Text,
            &IdentifierRule::LastParameter,
        )
        .expect("normalise");
        assert_eq!(payload, Payload::Text("<html>ok</html>".to_owned()));
        assert_eq!(id.file_name(), "forgetful.txt");
    }

    #[rstest]
    fn identifier_failure_precedes_parsing() {
        let err = normalize(
            &response(b"not json"),
            &RequestSpec::new("http://example.test"),
            ResponseFormat::Json,
            &IdentifierRule::LastParameter,
        )
        .expect_err("should fail");
        assert!(matches!(
            err,
            NormalizeError::Identifier(IdentifierError::NoParameters)
        ));
    }
}
