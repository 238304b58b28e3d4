// Unit tests for deep-link credential extraction
//
// The fragment wins over the query string, and a URL carrying neither yields
// nothing so no exchange is ever attempted for it.

use mirror_note::extract_session_id;

#[test]
fn test_fragment_credential() {
    let url = "app://open#session_id=abc123";
    assert_eq!(extract_session_id(url).as_deref(), Some("abc123"));
}

#[test]
fn test_fragment_with_path_and_extra_params() {
    let url = "mirrornote://auth/callback#/finish?state=xyz&session_id=cred-42&next=home";
    assert_eq!(extract_session_id(url).as_deref(), Some("cred-42"));
}

#[test]
fn test_query_fallback() {
    let url = "mirrornote://open?session_id=q-credential";
    assert_eq!(extract_session_id(url).as_deref(), Some("q-credential"));
}

#[test]
fn test_fragment_wins_over_query() {
    let url = "app://open?session_id=from-query#session_id=from-fragment";
    assert_eq!(extract_session_id(url).as_deref(), Some("from-fragment"));
}

#[test]
fn test_fragment_without_credential_falls_back_to_query() {
    let url = "app://open?session_id=from-query#state=only";
    assert_eq!(extract_session_id(url).as_deref(), Some("from-query"));
}

#[test]
fn test_no_credential_anywhere() {
    assert_eq!(extract_session_id("app://open"), None);
    assert_eq!(extract_session_id("app://open#state=x"), None);
    assert_eq!(extract_session_id("app://open?foo=bar"), None);
}

#[test]
fn test_empty_value_is_no_credential() {
    assert_eq!(extract_session_id("app://open#session_id="), None);
    assert_eq!(extract_session_id("app://open?session_id="), None);
}

#[test]
fn test_unparseable_url() {
    assert_eq!(extract_session_id("not a url at all"), None);
    assert_eq!(extract_session_id("/relative/path#session_id=x"), None);
}

#[test]
fn test_https_redirect_url() {
    let url = "https://app.example.com/auth/callback#session_id=web-cred&next=/dashboard";
    assert_eq!(extract_session_id(url).as_deref(), Some("web-cred"));
}
