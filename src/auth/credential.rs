use url::Url;

/// Extract the one-time `session_id` credential from a launch or deep-link
/// URL.
///
/// The fragment wins over the query string: redirect providers put the
/// credential after `#` so it never reaches server logs, and only older
/// links fall back to `?session_id=`. Returns `None` when neither part
/// carries a non-empty value, in which case no exchange should be attempted.
pub fn extract_session_id(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;

    if let Some(fragment) = parsed.fragment() {
        if let Some(value) = session_id_in_fragment(fragment) {
            return Some(value);
        }
    }

    parsed
        .query_pairs()
        .find(|(key, _)| key == "session_id")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Fragments arrive in several shapes (`#session_id=x`,
/// `#/auth?session_id=x&state=y`), so scan every `&`/`?`-separated token.
fn session_id_in_fragment(fragment: &str) -> Option<String> {
    fragment.split(['&', '?']).find_map(|part| {
        let value = part.strip_prefix("session_id=")?;
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    })
}
