//! Base URL resolution for the target Ollama instance.

/// Local loopback on Ollama's conventional port.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Environment variable carrying the full target URL.
pub const OLLAMA_HOST_VAR: &str = "OLLAMA_HOST";

/// Ensure the value carries a scheme and no trailing slash.
fn normalize(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Resolve the base URL from explicit flags, the environment, or the default.
///
/// Explicit `--host`/`--port` flags win over `OLLAMA_HOST`; either flag alone
/// fills the other side in with the local default.
pub fn resolve_base_url(
    host: Option<&str>,
    port: Option<u16>,
    env_host: Option<&str>,
) -> String {
    if host.is_some() || port.is_some() {
        let host = host.unwrap_or("localhost");
        let port = port.unwrap_or(11434);
        return normalize(&format!("{host}:{port}"));
    }
    match env_host {
        Some(value) if !value.trim().is_empty() => normalize(value),
        _ => DEFAULT_BASE_URL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_local_loopback() {
        assert_eq!(resolve_base_url(None, None, None), "http://localhost:11434");
        assert_eq!(resolve_base_url(None, None, Some("")), "http://localhost:11434");
    }

    #[test]
    fn test_env_host_is_normalized() {
        assert_eq!(
            resolve_base_url(None, None, Some("server:11434")),
            "http://server:11434"
        );
        assert_eq!(
            resolve_base_url(None, None, Some("https://secure:443/")),
            "https://secure:443"
        );
    }

    #[test]
    fn test_flags_override_env() {
        assert_eq!(
            resolve_base_url(Some("other"), Some(11435), Some("http://env:11434")),
            "http://other:11435"
        );
    }

    #[test]
    fn test_partial_flags_fill_in_defaults() {
        assert_eq!(
            resolve_base_url(Some("server"), None, None),
            "http://server:11434"
        );
        assert_eq!(
            resolve_base_url(None, Some(11435), Some("http://env:11434")),
            "http://localhost:11435"
        );
    }
}
