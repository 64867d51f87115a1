//! [`Client`]: request assembly, the retry-with-backoff loop, and status
//! classification (`spec.md` §4.3, §4.4).

use crate::{
    abort,
    api_error::ApiError,
    error::{Error, ErrorType, Result},
    multipart::Form,
    request::Request,
    BASE_URL,
};
use discord_ratelimiting::{headers::RatelimitHeaders, InMemoryRatelimiter, Ratelimiter};
use hyper::{
    body::{self, Buf},
    client::{Client as HyperClient, HttpConnector},
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT},
    Body, Method, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

#[cfg(any(feature = "rustls-native-roots", feature = "rustls-webpki-roots"))]
use hyper_rustls::HttpsConnector;
#[cfg(all(feature = "native", not(feature = "rustls-native-roots"), not(feature = "rustls-webpki-roots")))]
use hyper_tls::HttpsConnector;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Number of attempts (`spec.md` §4.3) before a request gives up with
/// [`ErrorType::RetriesExhausted`].
const RETRY_LIMIT: u8 = 3;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// User-Agent sent with every request unless overridden by an embedding
/// crate (`spec.md` §4.4).
const USER_AGENT_VALUE: &str = concat!(
    "DiscordBot (https://github.com/discord-core/discord-core, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// 429 response body (`spec.md` §6).
#[derive(Debug, Deserialize)]
struct RateLimitedBody {
    retry_after: f64,
    #[serde(default)]
    global: bool,
}

#[cfg(any(feature = "rustls-native-roots", feature = "rustls-webpki-roots"))]
type Connector = HttpsConnector<HttpConnector>;
#[cfg(all(feature = "native", not(feature = "rustls-native-roots"), not(feature = "rustls-webpki-roots")))]
type Connector = HttpsConnector<HttpConnector>;

/// A successful response: status plus the raw body, lazily deserialized.
pub struct Response {
    status: StatusCode,
    bytes: Vec<u8>,
}

impl Response {
    /// The response's HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// The raw response body.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the response, returning the raw body.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Deserialize the response body as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorType::Parsing`] if the body isn't valid JSON for `T`.
    pub fn model<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.bytes)
            .map_err(|source| Error::with_source(ErrorType::Parsing, source))
    }
}

impl Debug for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A client for a bucketed REST API.
///
/// Cheaply [`Clone`]: everything behind the clone is reference-counted, so
/// clones share the same ratelimiter state and connection pool. See
/// [`Client::builder`] for configuration.
#[derive(Clone)]
pub struct Client {
    default_headers: Option<HeaderMap>,
    endpoint_to_bucket: Arc<Mutex<HashMap<String, String>>>,
    http: HyperClient<Connector>,
    ratelimiter: Arc<dyn Ratelimiter>,
    remember_invalid_token: bool,
    timeout: Duration,
    token: Option<Box<str>>,
    token_invalid: Arc<AtomicBool>,
}

impl Debug for Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Client")
            .field("timeout", &self.timeout)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client with the given bot token and otherwise-default
    /// configuration.
    #[must_use]
    pub fn new(token: String) -> Self {
        ClientBuilder::new().token(token).build()
    }

    /// Start building a client with non-default configuration.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Run `fut` with this client installed as the ambient "current API"
    /// (`spec.md` §4.4, §5 "Resource scopes").
    ///
    /// Model types elsewhere in an embedding crate can self-dispatch REST
    /// calls via [`Client::current`] without being threaded an explicit
    /// handle. Nesting is legal: the previous ambient client, if any, is
    /// restored once `fut` resolves.
    pub async fn scope<F, T>(self: Arc<Self>, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        CURRENT_CLIENT.scope(self, fut).await
    }

    /// The client installed by the nearest enclosing [`Client::scope`] call
    /// on this task, if any.
    #[must_use]
    pub fn current() -> Option<Arc<Self>> {
        CURRENT_CLIENT.try_with(Arc::clone).ok()
    }

    /// Execute a request, returning the raw [`Response`] on success.
    ///
    /// Implements the retry loop of `spec.md` §4.3/§4.4: transient server
    /// errors and rate limits are retried internally (up to
    /// [`RETRY_LIMIT`] attempts); everything else surfaces immediately.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ErrorType`] for the final, non-retried
    /// outcome.
    pub async fn request(&self, request: Request) -> Result<Response> {
        if self.remember_invalid_token && self.token_invalid.load(Ordering::Relaxed) {
            return Err(Error::new(ErrorType::Unauthorized));
        }

        let endpoint = request.route.endpoint();
        let major_params = request.route.major_params();

        for attempt in 0..RETRY_LIMIT {
            let key = self.bucket_key(&endpoint, &major_params);

            if abort::is_active() && self.would_block(&key).await? {
                #[cfg(feature = "tracing")]
                debug!(%key, "aborting instead of waiting out a ratelimit");

                return Err(Error::new(ErrorType::RateLimited {
                    global: false,
                    retry_after: 0.0,
                }));
            }

            let receiver = self
                .ratelimiter
                .ticket(key)
                .await
                .map_err(|source| Error::with_source(ErrorType::BuildingRequest, source))?;
            let sender = receiver
                .await
                .map_err(|source| Error::with_source(ErrorType::RequestCanceled, source))?;

            let sent = self.send_once(&request).await;

            let (headers, outcome) = match sent {
                Ok((status, headers, bytes)) => {
                    self.migrate_bucket(&endpoint, &headers);
                    let _ = sender.headers(Some(headers.clone()));

                    if status == StatusCode::UNAUTHORIZED {
                        self.token_invalid.store(true, Ordering::Relaxed);
                    }

                    if status.is_success() {
                        return Ok(Response { status, bytes });
                    }

                    (Some(headers.clone()), self.classify(status, &bytes, &headers)?)
                }
                Err(error) => {
                    let _ = sender.headers(None);

                    return Err(error);
                }
            };

            match outcome {
                Classification::Forbidden => return Err(Error::new(ErrorType::Forbidden)),
                Classification::NotFound => return Err(Error::new(ErrorType::NotFound)),
                Classification::ServiceUnavailable => {
                    return Err(Error::new(ErrorType::ServiceUnavailable))
                }
                Classification::Other { status, error } => {
                    return Err(Error::new(ErrorType::Request { status, error }))
                }
                Classification::ServerError { status } => {
                    if abort::is_active() {
                        return Err(Error::new(ErrorType::ServerError { status }));
                    }

                    let backoff = Duration::from_secs(1 + 2 * u64::from(attempt));

                    #[cfg(feature = "tracing")]
                    warn!(%status, ?backoff, "transient server error, retrying");

                    tokio::time::sleep(backoff).await;
                }
                Classification::RateLimited { global, retry_after } => {
                    if abort::is_active() {
                        return Err(Error::new(ErrorType::RateLimited {
                            global,
                            retry_after,
                        }));
                    }

                    #[cfg(feature = "tracing")]
                    warn!(global, retry_after, "ratelimited, sleeping before retry");

                    tokio::time::sleep(Duration::from_secs_f64(retry_after.max(0.0))).await;
                }
            }

            drop(headers);
        }

        Err(Error::new(ErrorType::RetriesExhausted {
            attempts: RETRY_LIMIT,
        }))
    }

    /// Execute a request, deserializing the response body as `T`.
    ///
    /// # Errors
    ///
    /// See [`Client::request`]; additionally returns [`ErrorType::Parsing`]
    /// if the body doesn't deserialize as `T`.
    pub async fn request_model<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        self.request(request).await?.model()
    }

    /// The bucket key to acquire a ticket under: the discovered bucket id
    /// if one is known for this endpoint, else the pre-discovery fallback
    /// key (`spec.md` §4.3 "migrate").
    fn bucket_key(&self, endpoint: &str, major_params: &str) -> String {
        let bucket_id = self
            .endpoint_to_bucket
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(endpoint)
            .cloned();

        match bucket_id {
            Some(id) => format!("{id}{major_params}"),
            None => format!("{endpoint}{major_params}"),
        }
    }

    /// Record a response's disclosed bucket identity for `endpoint`, if
    /// this is the first response to reveal one (`spec.md` §4.3 "update").
    ///
    /// Subsequent requests to this endpoint use the real bucket id as
    /// their key instead of the pre-discovery fallback; the fallback entry
    /// itself is left to the ratelimiter's own bucket eviction (see
    /// `discord_ratelimiting::bucket::BucketQueueTask::evict`) once its
    /// queue drains.
    fn migrate_bucket(&self, endpoint: &str, headers: &RatelimitHeaders) {
        if let RatelimitHeaders::Present(present) = headers {
            if let Some(bucket_id) = present.bucket() {
                self.endpoint_to_bucket
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .entry(endpoint.to_owned())
                    .or_insert_with(|| bucket_id.to_owned());
            }
        }
    }

    /// Whether acquiring a ticket under `key` right now would make the
    /// caller wait (`spec.md` §4.3 "Abort semantics").
    ///
    /// A snapshot-based approximation: an exact answer would require the
    /// ratelimiter to expose a "would block" primitive distinct from
    /// actually joining the queue, which `discord_ratelimiting::Ratelimiter`
    /// does not. Only a bucket with a known, unexpired reset window is
    /// treated as blocking; a bucket not yet observed is optimistically
    /// treated as free, matching the source's own behaviour (the first
    /// request to an endpoint can never have been rate-limited yet). The
    /// global lock is deliberately not consulted here: `spec.md` §4.3 says
    /// it "is always honored regardless of abort mode", so a global 429's
    /// sleep is waited out even inside an abort scope rather than aborted.
    async fn would_block(&self, key: &str) -> Result<bool> {
        let bucket = self
            .ratelimiter
            .bucket(key)
            .await
            .map_err(|source| Error::with_source(ErrorType::BuildingRequest, source))?;

        Ok(bucket.map_or(false, |bucket| {
            bucket.remaining() == 0 && bucket.time_remaining().is_some()
        }))
    }

    /// Merge a response's status and structured body into a
    /// [`Classification`] (`spec.md` §4.4 status table).
    ///
    /// A 429's retry delay is sourced from the body's `retry_after` field
    /// first, falling back to `X-RateLimit-Reset-After`, and finally to a
    /// one-second guess if neither is present (`spec.md` §4.3).
    fn classify(
        &self,
        status: StatusCode,
        bytes: &[u8],
        headers: &RatelimitHeaders,
    ) -> Result<Classification> {
        Ok(match status {
            StatusCode::FORBIDDEN => Classification::Forbidden,
            StatusCode::NOT_FOUND => Classification::NotFound,
            StatusCode::SERVICE_UNAVAILABLE => Classification::ServiceUnavailable,
            StatusCode::TOO_MANY_REQUESTS => {
                let body: Option<RateLimitedBody> = serde_json::from_slice(bytes).ok();

                let global = body.as_ref().map_or(false, |body| body.global)
                    || matches!(headers, RatelimitHeaders::GlobalLimited(_));
                let retry_after = body.map(|body| body.retry_after).unwrap_or_else(|| match headers {
                    RatelimitHeaders::GlobalLimited(limited) => limited.retry_after() as f64,
                    RatelimitHeaders::Present(present) => present.reset_after() as f64 / 1000.0,
                    RatelimitHeaders::None => 1.0,
                });

                Classification::RateLimited {
                    global,
                    retry_after,
                }
            }
            StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::GATEWAY_TIMEOUT => Classification::ServerError { status },
            _ => Classification::Other {
                status,
                error: serde_json::from_slice::<ApiError>(bytes).ok(),
            },
        })
    }

    /// Build, send, and read back a single attempt's response, without any
    /// retry logic (that lives in [`Client::request`]).
    async fn send_once(
        &self,
        request: &Request,
    ) -> Result<(StatusCode, RatelimitHeaders, Vec<u8>)> {
        let url = request.route.url(BASE_URL);

        #[cfg(feature = "tracing")]
        debug!(%url, "sending request");

        let mut builder = hyper::Request::builder()
            .method(request.route.method().clone())
            .uri(url);

        if let (true, Some(token)) = (request.use_authorization_token, &self.token) {
            let value = HeaderValue::from_str(token)
                .map_err(|source| Error::with_source(ErrorType::BuildingRequest, source))?;

            if let Some(headers) = builder.headers_mut() {
                headers.insert(AUTHORIZATION, value);
            }
        }

        if let Some(headers) = builder.headers_mut() {
            headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

            if let Some(default_headers) = &self.default_headers {
                for (name, value) in default_headers {
                    headers.insert(name, value.clone());
                }
            }

            if let Some(reason) = &request.reason {
                let encoded = crate::request::encode_reason(reason);

                if let Ok(value) = HeaderValue::from_str(&encoded) {
                    headers.insert(
                        hyper::header::HeaderName::from_static("x-audit-log-reason"),
                        value,
                    );
                }
            }
        }

        let body = self.build_body(request, &mut builder)?;

        let req = builder
            .body(body)
            .map_err(|source| Error::with_source(ErrorType::BuildingRequest, source))?;

        let sent = tokio::time::timeout(self.timeout, self.http.request(req))
            .await
            .map_err(|source| Error::with_source(ErrorType::RequestTimedOut, source))?
            .map_err(|source| Error::with_source(ErrorType::BuildingRequest, source))?;

        let status = sent.status();

        let pairs: Vec<(String, Vec<u8>)> = sent
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_owned(), value.as_bytes().to_owned()))
            .collect();
        let headers = RatelimitHeaders::from_pairs(
            pairs.iter().map(|(name, value)| (name.as_str(), value.as_slice())),
        )
        .unwrap_or(RatelimitHeaders::None);

        let mut buf = body::aggregate(sent.into_body())
            .await
            .map_err(|source| Error::with_source(ErrorType::ChunkingResponse, source))?;
        let mut bytes = vec![0; buf.remaining()];
        buf.copy_to_slice(&mut bytes);

        Ok((status, headers, bytes))
    }

    /// Attach the request's JSON or multipart body, setting `Content-Type`
    /// and `Content-Length` as appropriate (`spec.md` §4.4 body rules).
    fn build_body(
        &self,
        request: &Request,
        builder: &mut hyper::http::request::Builder,
    ) -> Result<Body> {
        if let Some(mut form) = request.form.clone() {
            let content_type = form.content_type();
            let bytes = form.build();

            if let Some(headers) = builder.headers_mut() {
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    headers.insert(CONTENT_TYPE, value);
                }
                headers.insert(CONTENT_LENGTH, bytes.len().into());
            }

            return Ok(Body::from(bytes));
        }

        if let Some(bytes) = request.body.clone() {
            if let Some(headers) = builder.headers_mut() {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.insert(CONTENT_LENGTH, bytes.len().into());
            }

            return Ok(Body::from(bytes));
        }

        if matches!(
            request.route.method(),
            &Method::PUT | &Method::POST | &Method::PATCH
        ) {
            if let Some(headers) = builder.headers_mut() {
                headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
            }
        }

        Ok(Body::empty())
    }
}

/// Outcome of classifying a non-success response (`spec.md` §4.4).
#[derive(Debug)]
enum Classification {
    Forbidden,
    NotFound,
    ServiceUnavailable,
    ServerError { status: StatusCode },
    RateLimited { global: bool, retry_after: f64 },
    Other {
        status: StatusCode,
        error: Option<ApiError>,
    },
}

tokio::task_local! {
    static CURRENT_CLIENT: Arc<Client>;
}

/// Builder for [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
    default_headers: Option<HeaderMap>,
    ratelimiter: Option<Arc<dyn Ratelimiter>>,
    remember_invalid_token: bool,
    timeout: Duration,
    token: Option<Box<str>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            default_headers: None,
            ratelimiter: None,
            remember_invalid_token: true,
            timeout: DEFAULT_TIMEOUT,
            token: None,
        }
    }
}

impl ClientBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bot (or bearer) token used for the `Authorization` header.
    ///
    /// A token without a `Bot `/`Bearer ` prefix is assumed to be a bot
    /// token and has `Bot ` prepended, matching the source ecosystem's own
    /// `ClientBuilder::token`.
    #[must_use]
    pub fn token(mut self, mut token: String) -> Self {
        let is_bot = token.starts_with("Bot ");
        let is_bearer = token.starts_with("Bearer ");

        if !is_bot && !is_bearer {
            token.insert_str(0, "Bot ");
        }

        self.token = Some(token.into_boxed_str());

        self
    }

    /// Set headers sent with every request.
    #[must_use]
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);

        self
    }

    /// Set the request timeout. Defaults to 10 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;

        self
    }

    /// Use a non-default ratelimiter backend. Defaults to
    /// [`InMemoryRatelimiter`].
    #[must_use]
    pub fn ratelimiter(mut self, ratelimiter: Arc<dyn Ratelimiter>) -> Self {
        self.ratelimiter = Some(ratelimiter);

        self
    }

    /// Whether to remember a 401 Unauthorized response and short-circuit
    /// every later request instead of sending it.
    ///
    /// A token does not recover from being rejected once; remembering it
    /// avoids hammering the API with a doomed token. Defaults to `true`.
    #[must_use]
    pub const fn remember_invalid_token(mut self, remember: bool) -> Self {
        self.remember_invalid_token = remember;

        self
    }

    /// Finish building the [`Client`].
    #[must_use]
    pub fn build(self) -> Client {
        #[cfg(feature = "rustls-native-roots")]
        let connector = HttpsConnector::with_native_roots();
        #[cfg(all(feature = "rustls-webpki-roots", not(feature = "rustls-native-roots")))]
        let connector = HttpsConnector::with_webpki_roots();
        #[cfg(all(
            feature = "native",
            not(feature = "rustls-native-roots"),
            not(feature = "rustls-webpki-roots")
        ))]
        let connector = HttpsConnector::new();

        let http = HyperClient::builder().build(connector);

        Client {
            default_headers: self.default_headers,
            endpoint_to_bucket: Arc::new(Mutex::new(HashMap::new())),
            http,
            ratelimiter: self
                .ratelimiter
                .unwrap_or_else(|| Arc::new(InMemoryRatelimiter::new())),
            remember_invalid_token: self.remember_invalid_token,
            timeout: self.timeout,
            token: self.token,
            token_invalid: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Classification, Client, ClientBuilder, StatusCode};
    use crate::error::ErrorType;
    use discord_ratelimiting::headers::RatelimitHeaders;
    use static_assertions::assert_impl_all;
    use std::sync::atomic::Ordering;

    assert_impl_all!(Client: Clone, Send, Sync);
    assert_impl_all!(ClientBuilder: Send, Sync);

    #[tokio::test]
    async fn remembered_invalid_token_short_circuits_without_sending() {
        let client = ClientBuilder::new().build();
        client.token_invalid.store(true, Ordering::Relaxed);

        let request = crate::request::Request::from_route(crate::route::Route::new(
            crate::route::Method::GET,
            "/gateway",
            Vec::new(),
        ));

        let error = client.request(request).await.unwrap_err();

        assert!(matches!(error.kind(), ErrorType::Unauthorized));
    }

    #[tokio::test]
    async fn disabling_remember_invalid_token_does_not_short_circuit() {
        let client = ClientBuilder::new().remember_invalid_token(false).build();
        client.token_invalid.store(true, Ordering::Relaxed);

        assert!(!(client.remember_invalid_token && client.token_invalid.load(Ordering::Relaxed)));
    }

    #[test]
    fn builder_prefixes_bare_token_with_bot() {
        let builder = ClientBuilder::new().token("abc123".to_owned());

        assert_eq!(builder.token.as_deref(), Some("Bot abc123"));
    }

    #[test]
    fn builder_keeps_existing_bot_prefix() {
        let builder = ClientBuilder::new().token("Bot abc123".to_owned());

        assert_eq!(builder.token.as_deref(), Some("Bot abc123"));
    }

    #[test]
    fn builder_keeps_bearer_prefix() {
        let builder = ClientBuilder::new().token("Bearer abc123".to_owned());

        assert_eq!(builder.token.as_deref(), Some("Bearer abc123"));
    }

    #[test]
    fn bucket_key_falls_back_to_endpoint_before_discovery() {
        let client = ClientBuilder::new().build();

        assert_eq!(client.bucket_key("GET /foo", "1"), "GET /foo1");
    }

    fn present_headers(bucket: &str) -> RatelimitHeaders {
        RatelimitHeaders::from_pairs(
            [
                ("x-ratelimit-bucket", bucket.as_bytes()),
                ("x-ratelimit-limit", b"1"),
                ("x-ratelimit-remaining", b"1"),
                ("x-ratelimit-reset", b"0"),
                ("x-ratelimit-reset-after", b"0"),
            ]
            .into_iter(),
        )
        .unwrap()
    }

    #[test]
    fn migrate_bucket_updates_key_for_endpoint() {
        let client = ClientBuilder::new().build();
        let headers = present_headers("abc123");

        client.migrate_bucket("GET /foo", &headers);

        assert_eq!(client.bucket_key("GET /foo", "1"), "abc1231");
    }

    #[test]
    fn migrate_bucket_keeps_first_discovered_id() {
        let client = ClientBuilder::new().build();
        let first = present_headers("abc123");
        let second = present_headers("different");

        client.migrate_bucket("GET /foo", &first);
        client.migrate_bucket("GET /foo", &second);

        assert_eq!(client.bucket_key("GET /foo", ""), "abc123");
    }

    fn classify(status: StatusCode, bytes: &[u8], headers: &RatelimitHeaders) -> Classification {
        ClientBuilder::new().build().classify(status, bytes, headers).unwrap()
    }

    /// `Present` headers reporting `remaining: 0` with the given
    /// reset-after window, as a bucket that just got exhausted would.
    fn exhausted_present(reset_after_secs: &str) -> RatelimitHeaders {
        RatelimitHeaders::from_pairs(
            [
                ("x-ratelimit-limit", b"1".as_slice()),
                ("x-ratelimit-remaining", b"0".as_slice()),
                ("x-ratelimit-reset", b"0".as_slice()),
                (
                    "x-ratelimit-reset-after",
                    reset_after_secs.as_bytes(),
                ),
            ]
            .into_iter(),
        )
        .unwrap()
    }

    #[test]
    fn classifies_403_404_and_503() {
        let none = RatelimitHeaders::None;

        assert!(matches!(
            classify(StatusCode::FORBIDDEN, b"{}", &none),
            Classification::Forbidden
        ));
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, b"{}", &none),
            Classification::NotFound
        ));
        assert!(matches!(
            classify(StatusCode::SERVICE_UNAVAILABLE, b"{}", &none),
            Classification::ServiceUnavailable
        ));
    }

    #[test]
    fn classifies_500_502_504_as_retryable_server_errors() {
        let none = RatelimitHeaders::None;

        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::GATEWAY_TIMEOUT,
        ] {
            assert!(matches!(
                classify(status, b"{}", &none),
                Classification::ServerError { .. }
            ));
        }
    }

    #[test]
    fn classifies_unknown_status_with_parsed_api_error() {
        let none = RatelimitHeaders::None;
        let body = br#"{"code": 50001, "message": "Missing Access"}"#;

        match classify(StatusCode::BAD_REQUEST, body, &none) {
            Classification::Other { status, error } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(error.unwrap().code, 50001);
            }
            other => panic!("expected Other, got a different classification: {other:?}"),
        }
    }

    #[test]
    fn rate_limited_prefers_body_retry_after_over_headers() {
        let headers = exhausted_present("9");

        match classify(
            StatusCode::TOO_MANY_REQUESTS,
            br#"{"retry_after": 0.5, "global": false}"#,
            &headers,
        ) {
            Classification::RateLimited {
                global,
                retry_after,
            } => {
                assert!(!global);
                assert!((retry_after - 0.5).abs() < f64::EPSILON);
            }
            other => panic!("expected RateLimited, got a different classification: {other:?}"),
        }
    }

    #[test]
    fn rate_limited_falls_back_to_reset_after_header_without_a_body() {
        let headers = exhausted_present("2");

        match classify(StatusCode::TOO_MANY_REQUESTS, b"not json", &headers) {
            Classification::RateLimited { retry_after, .. } => {
                assert!((retry_after - 2.0).abs() < f64::EPSILON);
            }
            other => panic!("expected RateLimited, got a different classification: {other:?}"),
        }
    }

    #[test]
    fn rate_limited_is_global_when_headers_say_so_even_without_a_body() {
        let headers = RatelimitHeaders::from_pairs(
            [
                ("x-ratelimit-global", b"true".as_slice()),
                ("retry-after", b"1".as_slice()),
            ]
            .into_iter(),
        )
        .unwrap();

        match classify(StatusCode::TOO_MANY_REQUESTS, b"not json", &headers) {
            Classification::RateLimited { global, .. } => assert!(global),
            other => panic!("expected RateLimited, got a different classification: {other:?}"),
        }
    }
}
