use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

/// Parse `Name: Value` strings into a HeaderMap. Malformed entries are
/// skipped with a warning.
pub fn parse_headers(header_strings: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for header_str in header_strings {
        let Some((name, value)) = header_str.split_once(':') else {
            warn!(header = %header_str, "Invalid header format, expected 'Name: Value'");
            continue;
        };
        let (name, value) = (name.trim(), value.trim());

        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!(name, "Invalid header name");
            continue;
        };
        let Ok(header_value) = HeaderValue::from_str(value) else {
            warn!(name, "Invalid header value");
            continue;
        };

        debug!(name, "Adding request header");
        headers.insert(header_name, header_value);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_headers_are_kept() {
        let headers = parse_headers(&[
            "Referer: https://example.com/".to_string(),
            "Cookie: a=b; c=d".to_string(),
            "not a header".to_string(),
            "Bad Name: x".to_string(),
        ]);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["referer"], "https://example.com/");
        assert_eq!(headers["cookie"], "a=b; c=d");
    }
}
