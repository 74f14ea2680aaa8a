//! Loopback socket availability for network-bound tests.
//!
//! Sandboxed CI runners sometimes forbid binding even `127.0.0.1`. Tests
//! then skip with a note on stderr, unless `CHUNKFETCH_REQUIRE_SOCKET_TESTS`
//! is set to `1`, `true` or `yes`, in which case they fail loudly.

use std::io;
use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "CHUNKFETCH_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV).is_ok_and(|value| {
        let value = value.trim().to_ascii_lowercase();
        value == "1" || value == "true" || value == "yes"
    })
}

fn unavailable(err: &io::Error) {
    let message = format!("cannot bind a loopback socket ({err})");
    assert!(!sockets_required(), "{message}; unset {REQUIRE_ENV} to skip instead");
    eprintln!("{message}; skipping network-bound test");
}

/// Binds an ephemeral `127.0.0.1` listener, or `None` when the test should
/// be skipped.
#[must_use]
pub fn bind_loopback() -> Option<TcpListener> {
    match TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => Some(listener),
        Err(err) => {
            unavailable(&err);
            None
        }
    }
}

/// Starts a wiremock server on a fresh loopback listener.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    let listener = bind_loopback()?;
    Some(MockServer::builder().listener(listener).start().await)
}
