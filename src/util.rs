use reqwest::Url;
use std::time::Duration;

/// Parse "true"/"false"/"1"/"0" style flags.
pub fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a whole number of milliseconds.
pub fn parse_millis(s: &str) -> Option<Duration> {
    s.trim().parse::<u64>().ok().map(Duration::from_millis)
}

pub fn is_http_url(url: &str) -> bool {
    let trimmed = url.trim();
    trimmed.starts_with("http://") || trimmed.starts_with("https://")
}

/// Loopback and wildcard hosts. These endpoints may run without an API key.
pub fn is_local_endpoint_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    matches!(host.as_str(), "localhost" | "[::1]" | "::1" | "0.0.0.0") || host.starts_with("127.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_helpers() {
        assert_eq!(parse_bool_str("true"), Some(true));
        assert_eq!(parse_bool_str("0"), Some(false));
        assert_eq!(parse_bool_str(" YES "), Some(true));
        assert_eq!(parse_bool_str("off"), Some(false));
        assert_eq!(parse_bool_str("maybe"), None);
    }

    #[test]
    fn test_parse_millis() {
        assert_eq!(parse_millis("150"), Some(Duration::from_millis(150)));
        assert_eq!(parse_millis(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_millis("-5"), None);
        assert_eq!(parse_millis("1.5"), None);
    }

    #[test]
    fn test_is_local_endpoint_url_normalizes_case_and_space() {
        assert!(is_local_endpoint_url(" HTTP://LOCALHOST:8000/v1/chat/completions "));
        assert!(is_local_endpoint_url("https://127.0.0.1/v1/chat/completions"));
        assert!(is_local_endpoint_url("http://[::1]:8080/v1"));
        assert!(!is_local_endpoint_url("https://evil-localhost.com/v1"));
        assert!(!is_local_endpoint_url("https://api.openai.com/v1/chat/completions"));
    }
}
