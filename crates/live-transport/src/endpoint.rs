//! Endpoint addressing.

use live_protocol::auth::{CHANNEL_PATH, TOKEN_QUERY_PARAM};
use url::Url;

use crate::error::TransportError;

fn parse(endpoint: &str) -> Result<Url, TransportError> {
    Url::parse(endpoint).map_err(|source| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        source,
    })
}

/// The URL to open for `endpoint` with `credential` as the `token` query
/// parameter. An existing `token` parameter is replaced; other parameters
/// are kept.
pub fn channel_url(endpoint: &str, credential: &str) -> Result<Url, TransportError> {
    let mut url = parse(endpoint)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
    }

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != TOKEN_QUERY_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(TOKEN_QUERY_PARAM, credential);

    Ok(url)
}

/// Derive the channel endpoint from the REST API base URL.
///
/// `http` becomes `ws`, `https` becomes `wss`, and a trailing `/api` path
/// segment is replaced by the channel path:
/// `http://localhost:8000/api` → `ws://localhost:8000/ws/connect`.
pub fn endpoint_from_api_url(api_url: &str) -> Result<String, TransportError> {
    let mut url = parse(api_url)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(TransportError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| TransportError::UnsupportedScheme(url.scheme().to_string()))?;

    let base = url.path().trim_end_matches('/');
    let base = base.strip_suffix("/api").unwrap_or(base);
    let path = format!("{base}{CHANNEL_PATH}");
    url.set_path(&path);
    url.set_query(None);

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_token() {
        let url = channel_url("ws://localhost:8000/ws/connect", "abc").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/ws/connect?token=abc");
    }

    #[test]
    fn token_is_url_encoded() {
        let url = channel_url("ws://localhost:8000/ws/connect", "a b&c=d").unwrap();
        assert_eq!(url.query(), Some("token=a+b%26c%3Dd"));
    }

    #[test]
    fn replaces_existing_token_and_keeps_other_params() {
        let url = channel_url("wss://example.com/ws/connect?token=old&lang=en", "new").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![("lang".into(), "en".into()), ("token".into(), "new".into())]
        );
    }

    #[test]
    fn rejects_http_endpoint() {
        let err = channel_url("http://localhost:8000/ws/connect", "abc").unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedScheme(s) if s == "http"));
    }

    #[test]
    fn rejects_garbage_endpoint() {
        let err = channel_url("not a url", "abc").unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint { .. }));
    }

    #[test]
    fn derives_from_api_url() {
        assert_eq!(
            endpoint_from_api_url("http://localhost:8000/api").unwrap(),
            "ws://localhost:8000/ws/connect"
        );
        assert_eq!(
            endpoint_from_api_url("https://courses.example.com/api/").unwrap(),
            "wss://courses.example.com/ws/connect"
        );
        assert_eq!(
            endpoint_from_api_url("http://127.0.0.1:9000").unwrap(),
            "ws://127.0.0.1:9000/ws/connect"
        );
    }

    #[test]
    fn derive_rejects_other_schemes() {
        assert!(endpoint_from_api_url("ftp://example.com/api").is_err());
    }
}
