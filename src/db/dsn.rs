//! DSN handling.
//!
//! Accepts either a `mysql://` URL or the `user:pass@tcp(host:port)/db?params`
//! form used by Go MySQL drivers, so existing `DATA_SOURCE_NAME` values keep working.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// The password may contain `@`; the greedy match splits credentials at the
/// last `@` that still leaves a valid address part, like the Go driver.
fn go_dsn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?P<user>[^:@/]*)(?::(?P<pass>.*))?@)?(?:(?P<net>tcp|unix)\((?P<addr>[^)]*)\))?/(?P<db>[^?]*)(?:\?(?P<params>.*))?$")
            .expect("static DSN pattern is valid")
    })
}

/// Convert a DSN to the URL form understood by sqlx.
///
/// URLs (`mysql://` / `mariadb://`) pass through untouched. Credentials of Go
/// DSNs are percent-encoded. Unix-socket Go DSNs become
/// `mysql://user@localhost/db?socket=/path`.
pub fn normalize_dsn(dsn: &str) -> Option<String> {
    let dsn = dsn.trim();
    if dsn.starts_with("mysql://") || dsn.starts_with("mariadb://") {
        return Some(dsn.to_string());
    }

    let caps = go_dsn_regex().captures(dsn)?;
    let user = caps.name("user").map_or("", |m| m.as_str());
    let pass = caps.name("pass").map(|m| m.as_str());
    let net = caps.name("net").map_or("tcp", |m| m.as_str());
    let addr = caps.name("addr").map_or("", |m| m.as_str());
    let db = caps.name("db").map_or("", |m| m.as_str());

    let host = match net {
        "unix" => "localhost",
        _ if addr.is_empty() => "127.0.0.1:3306",
        _ => addr,
    };
    let mut url = Url::parse(&format!("mysql://{}/", host)).ok()?;
    if !user.is_empty() {
        url.set_username(user).ok()?;
        url.set_password(pass).ok()?;
    }
    url.set_path(&format!("/{}", db));

    let mut params: Vec<(&str, &str)> = Vec::new();
    if net == "unix" {
        params.push(("socket", addr));
    }
    // Go driver parameters (parseTime, timeout, ...) have no sqlx equivalent
    if let Some(extra) = caps.name("params") {
        params.extend(
            extra
                .as_str()
                .split('&')
                .filter_map(|p| p.split_once('='))
                .filter(|(key, _)| matches!(*key, "ssl-mode" | "charset")),
        );
    }
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }

    Some(url.into())
}

/// Replace the password portion of a DSN with `***` for logging
pub fn mask_dsn(dsn: &str) -> String {
    let (scheme, rest) = match dsn.find("://") {
        Some(idx) => dsn.split_at(idx + 3),
        None => ("", dsn),
    };

    let Some(at) = rest.rfind('@') else {
        return dsn.to_string();
    };
    let credentials = &rest[..at];
    match credentials.find(':') {
        Some(colon) => format!("{}{}:***{}", scheme, &credentials[..colon], &rest[at..]),
        None => dsn.to_string(),
    }
}
