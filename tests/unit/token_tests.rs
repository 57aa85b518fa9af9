use graph_conductor::credentials::{CredentialIssuer, SignedTokenIssuer, TokenRole};
use graph_conductor::AppError;

const APP_ID: &str = "0123456789abcdef0123456789abcdef";

#[test]
fn without_certificate_the_app_id_is_returned() {
    let issuer = SignedTokenIssuer::new(APP_ID, "");
    let token = issuer
        .issue_token("room", 0, TokenRole::Subscriber, 60)
        .expect("issue");
    assert_eq!(token, APP_ID);
    assert_eq!(issuer.app_id(), APP_ID);
}

#[test]
fn signed_tokens_are_deterministic_for_fixed_expiry() {
    let issuer = SignedTokenIssuer::new(APP_ID, "secret");

    let a = issuer.sign("room", 7, TokenRole::Publisher, 1_700_000_000).expect("sign");
    let b = issuer.sign("room", 7, TokenRole::Publisher, 1_700_000_000).expect("sign");
    assert_eq!(a, b);
    assert!(a.starts_with(&format!("007{APP_ID}.1.7.")));
}

#[test]
fn token_depends_on_every_input() {
    let issuer = SignedTokenIssuer::new(APP_ID, "secret");
    let base = issuer.sign("room", 7, TokenRole::Publisher, 100).expect("sign");

    let variants = [
        issuer.sign("other", 7, TokenRole::Publisher, 100),
        issuer.sign("room", 8, TokenRole::Publisher, 100),
        issuer.sign("room", 7, TokenRole::Subscriber, 100),
        issuer.sign("room", 7, TokenRole::Publisher, 101),
        SignedTokenIssuer::new(APP_ID, "other-secret").sign("room", 7, TokenRole::Publisher, 100),
    ];
    for variant in variants {
        assert_ne!(variant.expect("sign"), base);
    }
}

#[test]
fn empty_channel_is_rejected() {
    let issuer = SignedTokenIssuer::new(APP_ID, "secret");
    let err = issuer
        .issue_token("", 0, TokenRole::Publisher, 60)
        .expect_err("empty channel");
    assert!(matches!(err, AppError::Credential(_)));
}
