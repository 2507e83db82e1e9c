use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use eyre::{eyre, Result, WrapErr};

/// Parse a comma-separated RPC URL string into individual trimmed URLs.
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Create alloy HTTP providers for each RPC URL.
pub fn create_providers(urls: &[String]) -> Result<Vec<RootProvider<Http<Client>>>> {
    if urls.is_empty() {
        return Err(eyre!("At least one RPC URL is required"));
    }
    urls.iter()
        .map(|url| {
            let parsed = url
                .parse()
                .wrap_err_with(|| format!("Invalid RPC URL: {}", url))?;
            Ok(ProviderBuilder::new().on_http(parsed))
        })
        .collect()
}

/// Validates that a URL uses one of `schemes` and has a host component.
pub fn validate_url(url_str: &str, name: &str, schemes: &[&str]) -> Result<()> {
    let parsed =
        url::Url::parse(url_str).map_err(|e| eyre!("{} must be a valid URL: {}", name, e))?;

    let scheme = parsed.scheme();
    if !schemes.contains(&scheme) {
        return Err(eyre!(
            "{} must use one of {:?} schemes, got {}",
            name,
            schemes,
            scheme
        ));
    }

    if parsed.host_str().is_none() {
        return Err(eyre!("{} must have a host component", name));
    }

    if scheme == "http" || scheme == "ws" {
        tracing::warn!("{} uses an unencrypted transport, use TLS in production", name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multiple_urls() {
        let urls = parse_rpc_urls("https://a.com, https://b.com ,https://c.com");
        assert_eq!(urls, vec!["https://a.com", "https://b.com", "https://c.com"]);
    }

    #[test]
    fn test_parse_ignores_empty() {
        let urls = parse_rpc_urls("https://a.com,,https://b.com,");
        assert_eq!(urls, vec!["https://a.com", "https://b.com"]);
        assert!(parse_rpc_urls("").is_empty());
    }

    #[test]
    fn test_create_providers() {
        let providers = create_providers(&[
            "http://localhost:8545".to_string(),
            "http://localhost:8546".to_string(),
        ])
        .unwrap();
        assert_eq!(providers.len(), 2);
        assert!(create_providers(&[]).is_err());
    }

    #[test]
    fn test_validate_url_schemes() {
        assert!(validate_url("https://rpc.example.com", "RPC", &["http", "https"]).is_ok());
        assert!(validate_url("wss://rpc.example.com", "WS", &["ws", "wss"]).is_ok());
        assert!(validate_url("ftp://rpc.example.com", "RPC", &["http", "https"]).is_err());
        assert!(validate_url("not a url", "RPC", &["http", "https"]).is_err());
    }
}
