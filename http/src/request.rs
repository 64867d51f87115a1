//! Building an outgoing request (`spec.md` §4.4).

use crate::{error::Error, multipart::Form, route::Route};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{Map, Value};

/// Characters the audit-log reason header must escape; `/` and space are
/// deliberately kept literal (`spec.md` §4.4, §6).
const REASON: &AsciiSet = &CONTROLS.add(b'%').add(b'"').add(b'<').add(b'>').add(b'`');

/// Percent-encode an audit-log reason, keeping `/` and space literal.
#[must_use]
pub fn encode_reason(reason: &str) -> String {
    utf8_percent_encode(reason, REASON).to_string()
}

/// A fully-assembled outgoing request.
#[derive(Debug)]
pub struct Request {
    pub(crate) route: Route,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) form: Option<Form>,
    pub(crate) reason: Option<String>,
    pub(crate) use_authorization_token: bool,
}

impl Request {
    /// Start building a request against `route`.
    #[must_use]
    pub fn builder(route: Route) -> RequestBuilder {
        RequestBuilder::new(route)
    }

    /// Construct a bodiless request directly from its route.
    #[must_use]
    pub fn from_route(route: Route) -> Self {
        Self {
            route,
            body: None,
            form: None,
            reason: None,
            use_authorization_token: true,
        }
    }
}

/// Builder for [`Request`].
#[derive(Debug)]
pub struct RequestBuilder(Request);

impl RequestBuilder {
    /// Start building a request against `route`.
    #[must_use]
    pub fn new(route: Route) -> Self {
        Self(Request::from_route(route))
    }

    /// Finish building, returning the assembled [`Request`].
    #[must_use]
    pub fn build(self) -> Request {
        self.0
    }

    /// Set a pre-serialized JSON body directly.
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.0.body = Some(body);

        self
    }

    /// Set the body from a JSON object, dropped of any key whose value is
    /// JSON `null` produced by an [omitted](crate::field::Nullable::Omitted)
    /// field -- callers build `fields` with [`crate::field::Nullable`] so
    /// that distinction is made before this point; this only serializes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ErrorType::Json`] if serialization fails.
    pub fn json_object(self, fields: Map<String, Value>) -> Result<Self, Error> {
        let bytes = serde_json::to_vec(&Value::Object(fields))
            .map_err(|source| Error::with_source(crate::error::ErrorType::Json, source))?;

        Ok(self.body(bytes))
    }

    /// Set the multipart form, switching the request to
    /// `multipart/form-data`.
    #[must_use]
    pub fn form(mut self, form: Form) -> Self {
        self.0.form = Some(form);

        self
    }

    /// Set an audit-log reason, sent as `X-Audit-Log-Reason`.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.0.reason = Some(reason.into());

        self
    }

    /// Whether to send the client's configured authorization token with
    /// this request. Webhook execution is the primary case where this
    /// should be turned off.
    #[must_use]
    pub const fn use_authorization_token(mut self, use_it: bool) -> Self {
        self.0.use_authorization_token = use_it;

        self
    }
}

#[cfg(test)]
mod tests {
    use super::encode_reason;

    #[test]
    fn reason_keeps_space_and_slash_literal() {
        assert_eq!(encode_reason("spam/scam cleanup"), "spam/scam cleanup");
    }

    #[test]
    fn reason_escapes_percent_and_quotes() {
        assert_eq!(encode_reason("100% \"bad\""), "100%25 %22bad%22");
    }
}
