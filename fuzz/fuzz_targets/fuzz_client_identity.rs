//! Fuzz testing for client identity resolution.
//!
//! This fuzz target tests the robustness of the identity resolver against
//! arbitrary header bytes and peer addresses. It ensures that resolution:
//!
//! - Never panics on any input
//! - Always produces a non-empty identity (the "unknown" fallback closes
//!   the gap when nothing usable is present)
//! - Never leaks a port into an IPv4 peer identity
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the identity fuzz target
//! cargo +nightly fuzz run fuzz_client_identity
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_client_identity -- -max_total_time=60
//! ```

#![no_main]

use std::net::{Ipv4Addr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderValue, Request};
use libfuzzer_sys::fuzz_target;
use tollgate::middleware::{FORWARDED_FOR_HEADER, client_identity};

fuzz_target!(|data: &[u8]| {
    // Forwarded-header branch: any bytes that form a legal header value
    // must resolve without panicking, and never to an empty identity.
    if let Ok(value) = HeaderValue::from_bytes(data) {
        let req = Request::builder()
            .header(FORWARDED_FOR_HEADER, value)
            .body(())
            .expect("request with a validated header value");

        let identity = client_identity(&req);
        assert!(!identity.is_empty());
    }

    // Peer-address branch: build a connection address from the leading
    // bytes and check the port never leaks into the identity.
    if data.len() >= 6 {
        let ip = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
        let port = u16::from_le_bytes([data[4], data[5]]);

        let mut req = Request::new(());
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, port))));

        let identity = client_identity(&req);
        assert!(!identity.is_empty());
        assert!(!identity.contains(':'));
    }
});
