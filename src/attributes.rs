use crate::dom::Attributes;

/// Set `key`, or join `value` onto the existing value with `separator`.
pub fn add_or_append_attribute(attrs: &mut Attributes, key: &str, value: &str, separator: &str) {
    let joined = match attrs.get(key) {
        Some(existing) => format!("{}{}{}", existing, separator, value),
        None => value.to_string(),
    };
    attrs.set(key, joined.trim());
}

/// True if `token` is one of the whitespace-separated tokens of `key`.
pub fn has_token(attrs: &Attributes, key: &str, token: &str) -> bool {
    attrs
        .get(key)
        .is_some_and(|v| v.split_whitespace().any(|t| t == token))
}

/// Decide what an insecure source turns into.
///
/// Secure (`https:` or protocol-relative) URLs pass through. Otherwise an
/// empty string is returned when `require_https_src` is set, the scheme is
/// upgraded when `force` is set, and the URL is left alone in any other case.
/// Callers treat an empty result as a removal trigger.
pub fn maybe_enforce_https_src(url: &str, force: bool, require_https_src: bool) -> String {
    let trimmed = url.trim();
    if is_secure_url(trimmed) {
        return url.to_string();
    }
    if require_https_src {
        return String::new();
    }
    if force {
        return upgrade_to_https(trimmed);
    }
    url.to_string()
}

pub fn is_secure_url(url: &str) -> bool {
    url.starts_with("//") || scheme_of(url).is_some_and(|s| s.eq_ignore_ascii_case("https"))
}

fn scheme_of(url: &str) -> Option<&str> {
    let (scheme, _) = url.split_once(':')?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.');
    valid.then_some(scheme)
}

/// Only `http:` is upgraded; relative and other-scheme URLs pass through.
fn upgrade_to_https(url: &str) -> String {
    match scheme_of(url) {
        Some(scheme) if scheme.eq_ignore_ascii_case("http") => {
            format!("https:{}", &url[scheme.len() + 1..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_or_append_sets_when_absent() {
        let mut attrs = Attributes::new();
        add_or_append_attribute(&mut attrs, "class", "foo", " ");
        assert_eq!(attrs.get("class"), Some("foo"));
        add_or_append_attribute(&mut attrs, "class", "bar", " ");
        assert_eq!(attrs.get("class"), Some("foo bar"));
    }

    #[test]
    fn test_add_or_append_custom_separator_and_trim() {
        let mut attrs: Attributes = [("style", "color:red")].into_iter().collect();
        add_or_append_attribute(&mut attrs, "style", "width:auto", ";");
        assert_eq!(attrs.get("style"), Some("color:red;width:auto"));

        let mut empty: Attributes = [("class", "")].into_iter().collect();
        add_or_append_attribute(&mut empty, "class", "x", " ");
        assert_eq!(empty.get("class"), Some("x"));
    }

    #[test]
    fn test_has_token() {
        let attrs: Attributes = [("class", "a  b c")].into_iter().collect();
        assert!(has_token(&attrs, "class", "b"));
        assert!(!has_token(&attrs, "class", "d"));
        assert!(!has_token(&attrs, "id", "a"));
    }

    #[test]
    fn test_https_already_secure() {
        assert_eq!(maybe_enforce_https_src("https://x/y.png", false, true), "https://x/y.png");
        assert_eq!(maybe_enforce_https_src("//x/y.png", true, true), "//x/y.png");
    }

    #[test]
    fn test_https_required_clears() {
        assert_eq!(maybe_enforce_https_src("http://x/y.png", false, true), "");
        assert_eq!(maybe_enforce_https_src("http://x/y.png", true, true), "");
    }

    #[test]
    fn test_https_forced_upgrades() {
        assert_eq!(maybe_enforce_https_src("http://x/y.png", true, false), "https://x/y.png");
        assert_eq!(maybe_enforce_https_src("HTTP://x/y.png", true, false), "https://x/y.png");
    }

    #[test]
    fn test_https_untouched_otherwise() {
        assert_eq!(maybe_enforce_https_src("http://x/y.png", false, false), "http://x/y.png");
        assert_eq!(maybe_enforce_https_src("img/y.png", false, false), "img/y.png");
        assert_eq!(maybe_enforce_https_src("img/y.png", true, false), "img/y.png");
    }
}
