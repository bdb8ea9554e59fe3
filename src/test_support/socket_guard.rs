//! Lets unit tests that need a wiremock server skip where localhost sockets
//! are unavailable, unless `REGSCRAPE_REQUIRE_SOCKET_TESTS` is set.

use std::net::TcpListener;

use wiremock::MockServer;

fn socket_tests_required() -> bool {
    std::env::var("REGSCRAPE_REQUIRE_SOCKET_TESTS")
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return Some(MockServer::start().await);
    }
    assert!(
        !socket_tests_required(),
        "[socket-bound-test] cannot bind a localhost socket"
    );
    eprintln!("[socket-bound-test] cannot bind a localhost socket; skipping");
    None
}
