use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number, Value};
use url::{Host, Url};

use crate::config::{ScanProfile, SecurityConfig};
use crate::error::ValidationError;

/// sqlmap flags that must never be reachable through user options: remote
/// shells, OS command execution, privilege escalation, code evaluation, raw
/// WAF bypass, method override, filesystem path overrides, and the flags the
/// service itself controls (target and output location).
pub const FORBIDDEN_OPTIONS: &[&str] = &[
    "os-shell",
    "os-cmd",
    "os-pwn",
    "os-smbrelay",
    "os-bof",
    "priv-esc",
    "msf-path",
    "tmp-path",
    "tmp-dir",
    "waf-bypass",
    "method",
    "python-shell",
    "eval",
    "url",
    "direct",
    "output-dir",
];

static OPTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("option name pattern"));

/// A scalar option value accepted from clients or profile presets.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Flag(bool),
    Number(Number),
    Text(String),
}

impl OptionValue {
    /// Returns `None` for null, arrays and objects.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(OptionValue::Flag(*b)),
            Value::Number(n) => Some(OptionValue::Number(n.clone())),
            Value::String(s) => Some(OptionValue::Text(s.clone())),
            _ => None,
        }
    }
}

/// A scan request that passed every check, with the profile resolved and
/// options kept in the order the client sent them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub target: String,
    pub profile: ScanProfile,
    pub options: Vec<(String, OptionValue)>,
}

/// Validates a raw JSON scan request. Checks run in a fixed order and the
/// first failure is returned.
pub fn validate_scan_request(
    raw: &Value,
    policy: &SecurityConfig,
) -> Result<ScanRequest, ValidationError> {
    let body = raw.as_object().ok_or(ValidationError::InvalidRequest)?;

    let target = validate_target(body.get("target"), policy)?;
    let profile = validate_profile(body.get("scan_type"))?;
    let options = validate_options(body.get("options"))?;

    Ok(ScanRequest { target, profile, options })
}

/// Checks presence, URL form, scheme and the allow-lists. Returns the
/// trimmed target as the client sent it; the parsed form is only used for
/// the checks.
pub fn validate_target(
    target: Option<&Value>,
    policy: &SecurityConfig,
) -> Result<String, ValidationError> {
    let raw = match target {
        None | Some(Value::Null) => return Err(ValidationError::MissingTarget),
        Some(Value::String(s)) if s.trim().is_empty() => return Err(ValidationError::MissingTarget),
        Some(Value::String(s)) => s.trim(),
        Some(other) => return Err(ValidationError::InvalidUrl(other.to_string())),
    };

    let url = Url::parse(raw).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ValidationError::UnsupportedProtocol(url.scheme().to_string()));
    }

    match url.host() {
        Some(Host::Domain(domain)) => check_domain(domain, policy)?,
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip), policy)?,
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip), policy)?,
        None => return Err(ValidationError::InvalidUrl("missing host".to_string())),
    }

    Ok(raw.to_string())
}

fn domain_allowed(host: &str, allowed: &[String]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    allowed.iter().any(|d| {
        let d = d.trim().trim_start_matches('.').to_ascii_lowercase();
        !d.is_empty() && (host == d || host.ends_with(&format!(".{}", d)))
    })
}

fn check_domain(host: &str, policy: &SecurityConfig) -> Result<(), ValidationError> {
    if policy.allowed_domains.is_empty() || domain_allowed(host, &policy.allowed_domains) {
        Ok(())
    } else {
        Err(ValidationError::DomainNotAllowed(host.to_string()))
    }
}

fn check_ip(ip: IpAddr, policy: &SecurityConfig) -> Result<(), ValidationError> {
    if policy.allowed_ips.is_empty() {
        return check_domain(&ip.to_string(), policy);
    }
    if policy.allowed_ips.contains(&ip) {
        Ok(())
    } else {
        Err(ValidationError::IpNotAllowed(ip.to_string()))
    }
}

/// Resolves `scan_type`, defaulting to `full` when absent.
pub fn validate_profile(scan_type: Option<&Value>) -> Result<ScanProfile, ValidationError> {
    let invalid = |given: String| ValidationError::InvalidProfile {
        given,
        valid: ScanProfile::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    };

    match scan_type {
        None | Some(Value::Null) => Ok(ScanProfile::default()),
        Some(Value::String(s)) if s.is_empty() => Ok(ScanProfile::default()),
        Some(Value::String(s)) => s.parse().map_err(|_| invalid(s.clone())),
        Some(other) => Err(invalid(other.to_string())),
    }
}

/// Validates the option dictionary. Forbidden keys are reported before any
/// other problem so the offending key is always named.
pub fn validate_options(
    options: Option<&Value>,
) -> Result<Vec<(String, OptionValue)>, ValidationError> {
    let map: &Map<String, Value> = match options {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ValidationError::InvalidOptions),
    };

    if let Some(key) = map.keys().find(|k| is_forbidden(k)) {
        return Err(ValidationError::ForbiddenOption(key.clone()));
    }

    let mut validated = Vec::with_capacity(map.len());
    for (key, value) in map {
        if !OPTION_NAME.is_match(key) {
            return Err(ValidationError::InvalidOptionName(key.clone()));
        }
        let value = OptionValue::from_json(value)
            .ok_or_else(|| ValidationError::InvalidOptionType(key.clone()))?;
        validated.push((key.clone(), value));
    }

    Ok(validated)
}

/// sqlmap long options that are themselves a prefix of a forbidden flag.
/// An exact match wins over abbreviation, so these reach only themselves.
const EXACT_SAFE_OPTIONS: &[&str] = &["os"];

/// Compares case-insensitively and ignores leading dashes, so `--OS-Shell`
/// is caught as well as `os-shell`.
///
/// sqlmap accepts any unambiguous prefix of a long option, so a key that
/// abbreviates a forbidden flag (`os-cm`, `output-d`, `ur`) is rejected too.
pub fn is_forbidden(key: &str) -> bool {
    let normalized = key.trim().trim_start_matches('-').to_ascii_lowercase();
    if normalized.is_empty() || EXACT_SAFE_OPTIONS.contains(&normalized.as_str()) {
        return false;
    }
    FORBIDDEN_OPTIONS
        .iter()
        .any(|flag| flag.starts_with(normalized.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_policy() -> SecurityConfig {
        SecurityConfig::default()
    }

    fn restricted_policy() -> SecurityConfig {
        SecurityConfig {
            allowed_domains: vec!["example.com".to_string()],
            ..SecurityConfig::default()
        }
    }

    #[test]
    fn test_minimal_request_defaults_to_full() {
        let req = validate_scan_request(&json!({ "target": "http://example.com" }), &open_policy()).unwrap();
        assert_eq!(req.target, "http://example.com");
        assert_eq!(req.profile, ScanProfile::Full);
        assert!(req.options.is_empty());
    }

    #[test]
    fn test_missing_or_empty_target() {
        for body in [json!({}), json!({ "target": "" }), json!({ "target": null }), json!({ "target": "   " })] {
            assert_eq!(
                validate_scan_request(&body, &open_policy()),
                Err(ValidationError::MissingTarget)
            );
        }
    }

    #[test]
    fn test_non_object_request() {
        assert_eq!(
            validate_scan_request(&json!("http://example.com"), &open_policy()),
            Err(ValidationError::InvalidRequest)
        );
    }

    #[test]
    fn test_invalid_url() {
        let err = validate_scan_request(&json!({ "target": "not a url" }), &open_policy()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUrl(_)));

        let err = validate_scan_request(&json!({ "target": 42 }), &open_policy()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUrl(_)));
    }

    #[test]
    fn test_unsupported_protocol() {
        let err = validate_scan_request(&json!({ "target": "ftp://x.com" }), &open_policy()).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedProtocol("ftp".to_string()));
        assert!(err.to_string().to_lowercase().contains("unsupported protocol"));
    }

    #[test]
    fn test_domain_allow_list() {
        let policy = restricted_policy();
        assert!(validate_target(Some(&json!("https://example.com/a?id=1")), &policy).is_ok());
        assert!(validate_target(Some(&json!("https://api.EXAMPLE.com")), &policy).is_ok());

        let err = validate_target(Some(&json!("https://badexample.com")), &policy).unwrap_err();
        assert_eq!(err, ValidationError::DomainNotAllowed("badexample.com".to_string()));

        let err = validate_target(Some(&json!("https://example.com.evil.org")), &policy).unwrap_err();
        assert!(matches!(err, ValidationError::DomainNotAllowed(_)));
    }

    #[test]
    fn test_ip_allow_list() {
        let policy = SecurityConfig {
            allowed_ips: vec!["10.0.0.5".parse().unwrap()],
            ..restricted_policy()
        };
        assert!(validate_target(Some(&json!("http://10.0.0.5:8080/")), &policy).is_ok());
        assert_eq!(
            validate_target(Some(&json!("http://10.0.0.6/")), &policy),
            Err(ValidationError::IpNotAllowed("10.0.0.6".to_string()))
        );

        // Without an IP list, IP targets must still satisfy the domain list.
        let err = validate_target(Some(&json!("http://10.0.0.5/")), &restricted_policy()).unwrap_err();
        assert!(matches!(err, ValidationError::DomainNotAllowed(_)));
    }

    #[test]
    fn test_profile_selection() {
        assert_eq!(validate_profile(Some(&json!("quick"))), Ok(ScanProfile::Quick));
        assert_eq!(validate_profile(Some(&json!("advanced"))), Ok(ScanProfile::Advanced));
        assert_eq!(validate_profile(None), Ok(ScanProfile::Full));

        let err = validate_profile(Some(&json!("turbo"))).unwrap_err();
        assert!(err.to_string().contains("quick, full, advanced"));
    }

    #[test]
    fn test_profile_checked_after_target() {
        let err = validate_scan_request(&json!({ "target": "ftp://x.com", "scan_type": "turbo" }), &open_policy())
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedProtocol(_)));
    }

    #[test]
    fn test_forbidden_option_named() {
        let body = json!({ "target": "http://x.com", "options": { "os-shell": true } });
        let err = validate_scan_request(&body, &open_policy()).unwrap_err();
        assert_eq!(err, ValidationError::ForbiddenOption("os-shell".to_string()));
        assert!(err.to_string().contains("os-shell"));
    }

    #[test]
    fn test_forbidden_option_wins_over_other_fields() {
        for key in FORBIDDEN_OPTIONS {
            let mut options = Map::new();
            options.insert("dbs".to_string(), json!(true));
            options.insert("level".to_string(), json!(2));
            options.insert(key.to_string(), json!("x"));
            let body = json!({ "target": "http://x.com", "options": options });
            let err = validate_scan_request(&body, &open_policy()).unwrap_err();
            assert_eq!(err, ValidationError::ForbiddenOption(key.to_string()));
        }
    }

    #[test]
    fn test_forbidden_option_variants() {
        assert!(is_forbidden("--os-cmd"));
        assert!(is_forbidden("OS-Shell"));
        assert!(!is_forbidden("dbs"));
    }

    #[test]
    fn test_abbreviated_forbidden_options() {
        for key in ["os-cm", "os-sh", "output-d", "ur", "ev", "--Os-Pw", "priv", "tmp-"] {
            assert!(is_forbidden(key), "{} should be rejected", key);
        }

        let body = json!({ "target": "http://x.com", "options": { "dbs": true, "os-cm": "id" } });
        assert_eq!(
            validate_scan_request(&body, &open_policy()),
            Err(ValidationError::ForbiddenOption("os-cm".to_string()))
        );
    }

    #[test]
    fn test_ordinary_options_allowed() {
        for key in ["os", "dbs", "dbms", "level", "risk", "threads", "technique", "tamper", "batch"] {
            assert!(!is_forbidden(key), "{} should be allowed", key);
        }
    }

    #[test]
    fn test_target_kept_as_sent() {
        let target = validate_target(Some(&json!("  http://example.com  ")), &open_policy()).unwrap();
        assert_eq!(target, "http://example.com");
    }

    #[test]
    fn test_option_types() {
        let err = validate_options(Some(&json!({ "data": ["a", "b"] }))).unwrap_err();
        assert_eq!(err, ValidationError::InvalidOptionType("data".to_string()));

        let err = validate_options(Some(&json!({ "data": { "a": 1 } }))).unwrap_err();
        assert_eq!(err, ValidationError::InvalidOptionType("data".to_string()));

        let err = validate_options(Some(&json!({ "data": null }))).unwrap_err();
        assert_eq!(err, ValidationError::InvalidOptionType("data".to_string()));

        assert_eq!(validate_options(Some(&json!("level=5"))), Err(ValidationError::InvalidOptions));
    }

    #[test]
    fn test_option_names() {
        let err = validate_options(Some(&json!({ "dbs --os-shell": true }))).unwrap_err();
        assert_eq!(err, ValidationError::InvalidOptionName("dbs --os-shell".to_string()));

        let err = validate_options(Some(&json!({ "a b": true }))).unwrap_err();
        assert_eq!(err, ValidationError::InvalidOptionName("a b".to_string()));
    }

    #[test]
    fn test_options_keep_request_order() {
        let options = validate_options(Some(&json!({ "threads": 2, "dbs": true, "dbms": "mysql", "tables": false })))
            .unwrap();
        let keys: Vec<&str> = options.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["threads", "dbs", "dbms", "tables"]);
        assert_eq!(options[2].1, OptionValue::Text("mysql".to_string()));
        assert_eq!(options[3].1, OptionValue::Flag(false));
    }
}
