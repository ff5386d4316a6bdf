//! APRS-IS login handshake

use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::config::LoginConfig;
use crate::transport::Link;
use crate::{FeedError, Result};

/// How the server answered a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginResponse {
    /// Passcode accepted; the link may transmit
    Verified { server: Option<String> },
    /// Receive-only login
    Unverified { server: Option<String> },
}

/// The `user ... pass ... vers ...` line sent right after the link opens.
pub(crate) fn login_line(login: &LoginConfig, server_filter: Option<&str>) -> String {
    let mut line = format!(
        "user {} pass {} vers {} {}",
        login.callsign, login.passcode, login.software, login.version
    );
    if let Some(filter) = server_filter.map(str::trim).filter(|f| !f.is_empty()) {
        line.push_str(" filter ");
        line.push_str(filter);
    }
    line
}

/// Recognize `# logresp CALL verified, server NAME`.
pub(crate) fn parse_logresp(line: &str) -> Option<LoginResponse> {
    let rest = line.strip_prefix('#')?.trim_start().strip_prefix("logresp ")?;
    let mut words = rest.split_whitespace();
    let _callsign = words.next()?;
    let verdict = words.next()?.trim_end_matches(',');

    let server = rest
        .split_once("server")
        .map(|(_, name)| name.trim().to_string())
        .filter(|name| !name.is_empty());

    match verdict {
        "verified" => Some(LoginResponse::Verified { server }),
        "unverified" => Some(LoginResponse::Unverified { server }),
        other => {
            warn!(verdict = other, "Unrecognized login response, treating as unverified");
            Some(LoginResponse::Unverified { server })
        }
    }
}

/// Send the login line and wait for the server's verdict.
///
/// Banner comments before the response are skipped. No response within
/// `wait` is a retryable connection failure.
pub(crate) async fn handshake(
    link: &mut dyn Link,
    login: &LoginConfig,
    server_filter: Option<&str>,
    wait: Duration,
) -> Result<LoginResponse> {
    debug!(callsign = %login.callsign, filter = ?server_filter, "Logging in");
    link.write_frame(&login_line(login, server_filter)).await?;

    let response = tokio::time::timeout(wait, async {
        loop {
            let Some(bytes) = link.read_frame().await? else {
                return Err(FeedError::connection_failed("server closed the connection during login"));
            };
            let line = String::from_utf8_lossy(&bytes);
            if let Some(response) = parse_logresp(line.trim_end()) {
                return Ok(response);
            }
            trace!(line = %line, "Skipping pre-login line");
        }
    })
    .await
    .map_err(|_| FeedError::connection_failed(format!("no login response within {wait:?}")))??;

    info!(callsign = %login.callsign, response = ?response, "Logged in");
    Ok(response)
}
