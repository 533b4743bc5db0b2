use data_encoding::BASE64URL_NOPAD;
use proptest::prelude::*;

use super::*;

fn token_with_payload(payload: &str) -> String {
    format!(
        "eyJhbGciOiJSUzI1NiJ9.{}.c2lnbmF0dXJl",
        BASE64URL_NOPAD.encode(payload.as_bytes())
    )
}

#[test_log::test]
fn parses_expected_claims() {
    let token = token_with_payload(
        r#"{"sub":"a1b2","nickname_slug":"jane-doe","sponsor_id":"s-77","email":"jane@example.com"}"#,
    );

    let claims = parse(&token);

    assert_eq!(claims.subject, "a1b2");
    assert_eq!(claims.nickname_slug, "jane-doe");
    assert_eq!(claims.sponsor_id, "s-77");
    assert_eq!(
        claims.get("email"),
        Some(&serde_json::Value::String("jane@example.com".into()))
    );
    assert!(claims.is_authorized());
}

#[test_log::test]
fn accepts_camel_case_and_numeric_sponsor() {
    let token = token_with_payload(r#"{"sub":"u","nicknameSlug":"nick","sponsorId":1234}"#);

    let claims = parse(&token);

    assert_eq!(claims.nickname_slug, "nick");
    assert_eq!(claims.sponsor_id, "1234");
    assert!(claims.is_authorized());
}

#[test_log::test]
fn tolerates_padded_payload() {
    let payload = data_encoding::BASE64URL.encode(br#"{"sub":"x"}"#);
    assert!(payload.ends_with('='));

    let claims = parse(&format!("h.{payload}.s"));

    assert_eq!(claims.subject, "x");
}

#[test_log::test]
fn missing_required_claims_are_not_authorized() {
    let no_sponsor = parse(&token_with_payload(r#"{"sub":"u","nickname_slug":"n"}"#));
    let no_nickname = parse(&token_with_payload(r#"{"sub":"u","sponsor_id":"s"}"#));
    let blank_sponsor = parse(&token_with_payload(
        r#"{"sub":"u","nickname_slug":"n","sponsor_id":null}"#,
    ));

    assert!(!no_sponsor.is_authorized());
    assert!(!no_nickname.is_authorized());
    assert!(!blank_sponsor.is_authorized());
    assert!(!no_sponsor.is_empty());
}

#[test_log::test]
fn malformed_tokens_yield_empty_claims() {
    for token in [
        "",
        "no-dots-at-all",
        "header.%%%not-base64%%%.sig",
        token_with_payload("not json").as_str(),
        token_with_payload("[1,2,3]").as_str(),
        token_with_payload(r#""just a string""#).as_str(),
        token_with_payload(r#"{"sub":{"nested":true}}"#).as_str(),
    ] {
        let claims = parse(token);
        assert!(claims.is_empty(), "{token:?} should yield no claims");
        assert!(!claims.is_authorized());
    }
}

#[test_log::test]
fn parsing_is_deterministic() {
    let token = token_with_payload(r#"{"sub":"u","nickname_slug":"n","sponsor_id":"s"}"#);

    assert_eq!(parse(&token), parse(&token));
}

proptest! {
    #[test]
    fn never_panics_on_arbitrary_input(token in ".*") {
        let _ = parse(&token);
    }

    #[test]
    fn invalid_middle_segment_yields_empty(
        header in "[A-Za-z0-9_-]{0,16}",
        middle in "[^A-Za-z0-9_=.-]{1,24}",
        sig in "[A-Za-z0-9_-]{0,16}",
    ) {
        let claims = parse(&format!("{header}.{middle}.{sig}"));
        prop_assert!(claims.is_empty());
    }
}
