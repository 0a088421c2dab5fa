//! Client identity resolution for the rate limiting middleware.
//!
//! Every request is mapped to a stable identity string that keys its token
//! bucket. Resolution order:
//!
//! 1. First entry of the `X-Forwarded-For` header (trimmed), when non-empty
//! 2. IP of the connection peer from Axum's `ConnectInfo` extension, with
//!    the port dropped so one client maps to one bucket across reconnects
//! 3. The shared [`UNKNOWN_CLIENT`] key
//!
//! # Security Warning: IP Spoofing Risk
//!
//! **Step 1 trusts a client-provided header.** A caller that reaches this
//! service directly can rotate `X-Forwarded-For` values to dodge rate
//! limiting or frame another address. Deploy behind a trusted reverse proxy
//! that overwrites (not appends to) the header, and block direct access:
//!
//! ```nginx
//! # nginx example - overwrites any client-provided header
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```
//!
//! The header is still checked first because behind a proxy the connection
//! peer is always the proxy itself, which would fold every client into one
//! bucket.
//!
//! # The "unknown" Fallback
//!
//! Requests with neither header nor `ConnectInfo` (a server built without
//! `into_make_service_with_connect_info`, or in-process test calls) all
//! share the `"unknown"` key and therefore one bucket. Monitor for high
//! "unknown" traffic in production logs.

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::debug;

/// Header consulted first when resolving a client identity.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Shared identity for requests whose origin cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the identity string that keys a request's token bucket.
///
/// When `X-Forwarded-For` carries several addresses (`"client, proxy1,
/// proxy2"`) only the first is used; the rest are intermediate hops. The
/// value is passed through as-is, ports included, since it is an opaque
/// bucket key rather than a parsed address.
///
/// Returns `Cow<'static, str>`: borrowed for the `"unknown"` fallback,
/// owned otherwise. Call `.into_owned()` for async contexts that outlive
/// the request reference.
#[inline]
pub fn client_identity<B>(req: &Request<B>) -> Cow<'static, str> {
    if let Some(forwarded) = req.headers().get(FORWARDED_FOR_HEADER)
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return Cow::Owned(first.to_string());
        }
    }

    // SocketAddr::ip drops the port, so repeated connections from the same
    // host land in the same bucket.
    if let Some(connect_info) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Cow::Owned(connect_info.0.ip().to_string());
    }

    debug!("No forwarded header or peer address on request; using shared identity");
    Cow::Borrowed(UNKNOWN_CLIENT)
}
