//! Post-login open-redirect guard.
//!
//! A stored `original_url` is only honoured if it is a same-origin relative
//! reference: no scheme and no authority. Anything else redirects to `/`.

/// Fallback redirect target after a successful login.
pub const DEFAULT_TARGET: &str = "/";

/// Returns `true` if `candidate` is a relative reference without scheme or host.
pub fn is_relative_url(candidate: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }
    // Browsers treat `\` like `/`, so `/\evil` is scheme-relative in practice.
    if candidate
        .chars()
        .any(|c| c == '\\' || c.is_control() || c.is_whitespace())
    {
        return false;
    }
    if candidate.starts_with("//") {
        return false;
    }
    // A ':' before the first '/', '?' or '#' is a scheme (or an unparseable
    // first segment); either way not a relative path.
    let head_end = candidate
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .unwrap_or(candidate.len());
    !candidate[..head_end].contains(':')
}

/// Where to send the client after a successful login.
pub fn redirect_target(original_url: Option<&str>) -> &str {
    match original_url {
        Some(url) if is_relative_url(url) => url,
        _ => DEFAULT_TARGET,
    }
}
