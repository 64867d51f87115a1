//! Endpoint identity used for both URL construction and rate-limit bucketing.
//!
//! The real API surface has hundreds of endpoints, one per REST route; that
//! enumeration is the "thin endpoint wrappers" collaborator this crate
//! treats as out of scope (only a handful of named constructors are
//! provided, to demonstrate the pattern). What *is* in scope is how a
//! [`Route`] turns into a rate-limit bucket key and a URL.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt::Write;

/// Characters that must be percent-encoded in a path segment.
///
/// Mirrors the escape set the source ecosystem uses for path parameters:
/// anything outside of unreserved characters.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

/// HTTP verb of a [`Route`].
pub type Method = hyper::Method;

/// A single path parameter value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RouteParam {
    /// An integer parameter (snowflake IDs, counts); inserted verbatim, no
    /// percent-encoding needed.
    Integer(u64),
    /// A string parameter; percent-encoded when building a URL.
    Str(Box<str>),
}

impl RouteParam {
    fn write_into(&self, url: &mut String) {
        match self {
            Self::Integer(value) => {
                let _ = write!(url, "{value}");
            }
            Self::Str(value) => {
                for piece in utf8_percent_encode(value, PATH_SEGMENT) {
                    url.push_str(piece);
                }
            }
        }
    }

    /// The value rendered into the bare string used for major-parameter
    /// bucketing, unescaped.
    fn as_major_param(&self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            Self::Str(value) => value.to_string(),
        }
    }
}

impl From<u64> for RouteParam {
    fn from(value: u64) -> Self {
        Self::Integer(value)
    }
}

impl From<String> for RouteParam {
    fn from(value: String) -> Self {
        Self::Str(value.into_boxed_str())
    }
}

impl From<&str> for RouteParam {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

/// Path parameters that partition a bucket's quota independently of the
/// endpoint template (`spec.md` §3/§4.1, Glossary "Major parameters").
const MAJOR_PARAMS: [&str; 3] = ["webhook_id", "channel_id", "guild_id"];

/// A single HTTP route: a verb, a path template with `{placeholder}`
/// tokens, and the parameter values to substitute into it.
///
/// Two routes are equal, and hash equally, iff their [`Route::endpoint`]
/// strings match: the template, not the filled-in URL, is the rate-limit
/// lookup key, so two requests with different parameters to the same
/// template share one entry in [`crate::Client`]'s endpoint-to-bucket map.
#[derive(Clone, Debug)]
pub struct Route {
    method: Method,
    path_template: &'static str,
    params: Vec<(&'static str, RouteParam)>,
}

impl Route {
    /// Build a route from its parts.
    ///
    /// Prefer the named constructors below for the handful of endpoints
    /// this crate demonstrates; this is the constructor they (and any
    /// embedding crate's own endpoint wrappers) are built on.
    #[must_use]
    pub fn new(
        method: Method,
        path_template: &'static str,
        params: Vec<(&'static str, RouteParam)>,
    ) -> Self {
        Self {
            method,
            path_template,
            params,
        }
    }

    /// The pre-discovery rate-limit lookup key: verb plus unfilled
    /// template, e.g. `"GET /channels/{channel_id}/messages"`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        let mut endpoint = String::with_capacity(self.path_template.len() + 8);
        endpoint.push_str(self.method.as_str());
        endpoint.push(' ');
        endpoint.push_str(self.path_template);

        endpoint
    }

    /// The value of whichever of `webhook_id`, `channel_id`, `guild_id` is
    /// present among this route's parameters, or an empty string.
    ///
    /// Two routes with the same [`endpoint`](Self::endpoint) but different
    /// major parameters get independent rate-limit quotas.
    #[must_use]
    pub fn major_params(&self) -> String {
        for name in MAJOR_PARAMS {
            if let Some((_, value)) = self.params.iter().find(|(key, _)| *key == name) {
                return value.as_major_param();
            }
        }

        String::new()
    }

    /// The HTTP verb of this route.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Build the full URL against `base` (e.g.
    /// `https://discord.com/api/v10`), substituting each `{placeholder}`
    /// with its percent-encoded (string) or verbatim (integer) value.
    #[must_use]
    pub fn url(&self, base: &str) -> String {
        let mut url = String::with_capacity(base.len() + self.path_template.len() + 16);
        url.push_str(base);

        let mut rest = self.path_template;

        while let Some(start) = rest.find('{') {
            url.push_str(&rest[..start]);
            let end = rest[start..]
                .find('}')
                .map_or(rest.len(), |offset| start + offset);
            let name = &rest[start + 1..end.min(rest.len())];

            if let Some((_, value)) = self.params.iter().find(|(key, _)| *key == name) {
                value.write_into(&mut url);
            }

            rest = if end < rest.len() { &rest[end + 1..] } else { "" };
        }

        url.push_str(rest);

        url
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint() == other.endpoint()
    }
}

impl Eq for Route {}

impl std::hash::Hash for Route {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.endpoint().hash(state);
    }
}

/// Named constructors demonstrating the parameter/major-param pattern real
/// endpoint wrappers build on. A full endpoint surface is out of scope.
impl Route {
    /// `POST /channels/{channel_id}/messages`
    #[must_use]
    pub fn create_message(channel_id: u64) -> Self {
        Self::new(
            Method::POST,
            "/channels/{channel_id}/messages",
            vec![("channel_id", channel_id.into())],
        )
    }

    /// `GET /channels/{channel_id}/messages`
    #[must_use]
    pub fn get_channel_messages(channel_id: u64) -> Self {
        Self::new(
            Method::GET,
            "/channels/{channel_id}/messages",
            vec![("channel_id", channel_id.into())],
        )
    }

    /// `POST /webhooks/{webhook_id}/{webhook_token}`
    #[must_use]
    pub fn execute_webhook(webhook_id: u64, webhook_token: &str) -> Self {
        Self::new(
            Method::POST,
            "/webhooks/{webhook_id}/{webhook_token}",
            vec![
                ("webhook_id", webhook_id.into()),
                ("webhook_token", webhook_token.into()),
            ],
        )
    }

    /// `GET /guilds/{guild_id}/members/{user_id}`
    #[must_use]
    pub fn get_guild_member(guild_id: u64, user_id: u64) -> Self {
        Self::new(
            Method::GET,
            "/guilds/{guild_id}/members/{user_id}",
            vec![("guild_id", guild_id.into()), ("user_id", user_id.into())],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Method, Route};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Route: Clone, Debug, Eq, PartialEq, Send, Sync);

    #[test]
    fn endpoint_is_stable_across_parameter_values() {
        let a = Route::create_message(1);
        let b = Route::create_message(2);

        assert_eq!(a.endpoint(), b.endpoint());
        assert_eq!(a, b);
    }

    #[test]
    fn different_templates_are_different_endpoints() {
        let message = Route::create_message(1);
        let listing = Route::get_channel_messages(1);

        assert_ne!(message.endpoint(), listing.endpoint());
        assert_ne!(message, listing);
    }

    #[test]
    fn major_params_is_the_channel_id() {
        let route = Route::create_message(42);

        assert_eq!(route.major_params(), "42");
    }

    #[test]
    fn major_params_empty_when_absent() {
        let route = Route::new(Method::GET, "/gateway", Vec::new());

        assert_eq!(route.major_params(), "");
    }

    #[test]
    fn url_substitutes_integer_verbatim_and_string_percent_encoded() {
        let route = Route::execute_webhook(7, "a token/with space");
        let url = route.url("https://discord.com/api/v10");

        assert_eq!(
            url,
            "https://discord.com/api/v10/webhooks/7/a%20token%2Fwith%20space"
        );
    }

    #[test]
    fn url_with_two_params() {
        let route = Route::get_guild_member(1, 2);

        assert_eq!(
            route.url("https://discord.com/api/v10"),
            "https://discord.com/api/v10/guilds/1/members/2"
        );
    }
}
