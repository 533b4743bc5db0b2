//! Redirect URL contract with the identity provider

use url::Url;

/// Query parameters that mark a location as a sign-in redirect callback
pub const CALLBACK_PARAMS: [&str; 2] = ["code", "state"];

/// Does `url` carry a pending redirect callback?
pub fn is_redirect_callback(url: &Url) -> bool {
    url.query_pairs()
        .any(|(name, _)| CALLBACK_PARAMS.contains(&name.as_ref()))
}

/// The location to show once the callback was processed: the path alone,
/// without query or fragment
pub fn location_without_query(url: &Url) -> String {
    url.path().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn detects_callback_params() {
        for (url, expected) in [
            ("https://app.example/callback?code=abc&state=xyz", true),
            ("https://app.example/?state=only", true),
            ("https://app.example/crm?code=", true),
            ("https://app.example/crm", false),
            ("https://app.example/crm?page=2&codes=1", false),
            ("https://app.example/crm#code=abc", false),
        ] {
            let url = Url::parse(url).unwrap();
            assert_eq!(is_redirect_callback(&url), expected, "{url}");
        }
    }

    #[test_log::test]
    fn strips_query_and_fragment() {
        let url = Url::parse("https://app.example/payouts/list?code=abc&state=x#top").unwrap();
        assert_eq!(location_without_query(&url), "/payouts/list");
    }
}
