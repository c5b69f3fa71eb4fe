/// Integration tests for Google sign-in resolution

mod common;

use coldreach_shared::auth::error::AuthError;
use coldreach_shared::auth::service::{GoogleLogin, GoogleResolution, RequestMeta};
use coldreach_shared::models::auth_identity::{AuthIdentity, IdentityProvider};
use coldreach_shared::models::login_event::LoginReason;
use common::{gated_config, open_config, setup, signup};

fn google(sub: &str, email: &str, verified: Option<bool>) -> GoogleLogin {
    GoogleLogin {
        sub: sub.to_string(),
        email: Some(email.to_string()),
        display_name: Some("Grace".to_string()),
        avatar_url: Some("https://example.com/grace.png".to_string()),
        email_verified: verified,
        invite_code: None,
    }
}

#[tokio::test]
async fn test_google_signup_then_login() {
    let ctx = setup(open_config()).await;
    let meta = RequestMeta::default();

    let created = ctx
        .service
        .authenticate_google(google("sub-1", "Grace@Example.com", Some(true)), &meta)
        .await
        .expect("first login");
    assert_eq!(created.resolution, GoogleResolution::Created);
    assert_eq!(created.user.primary_email.as_deref(), Some("grace@example.com"));
    assert_eq!(created.user.display_name.as_deref(), Some("Grace"));

    let again = ctx
        .service
        .authenticate_google(
            GoogleLogin {
                display_name: Some("Grace Hopper".to_string()),
                avatar_url: Some("   ".to_string()),
                ..google("sub-1", "grace@example.com", Some(true))
            },
            &meta,
        )
        .await
        .expect("second login");
    assert_eq!(again.resolution, GoogleResolution::Existing);
    assert_eq!(again.user.id, created.user.id);
    assert_eq!(again.user.display_name.as_deref(), Some("Grace Hopper"));
    assert_eq!(
        again.user.avatar_url.as_deref(),
        Some("https://example.com/grace.png")
    );

    let reasons: Vec<LoginReason> = ctx
        .service
        .list_login_events(created.user.id)
        .await
        .expect("events")
        .into_iter()
        .map(|e| e.reason)
        .collect();
    assert_eq!(reasons, vec![LoginReason::SignupAndLogin, LoginReason::Login]);
}

#[tokio::test]
async fn test_existing_google_login_fills_missing_email() {
    let ctx = setup(open_config()).await;
    let meta = RequestMeta::default();

    let created = ctx
        .service
        .authenticate_google(
            GoogleLogin {
                email: None,
                ..google("sub-2", "", None)
            },
            &meta,
        )
        .await
        .expect("signup without email");
    assert_eq!(created.user.primary_email, None);

    let again = ctx
        .service
        .authenticate_google(google("sub-2", "late@example.com", Some(true)), &meta)
        .await
        .expect("login with email");
    assert_eq!(again.user.primary_email.as_deref(), Some("late@example.com"));

    let third = ctx
        .service
        .authenticate_google(google("sub-2", "changed@example.com", Some(true)), &meta)
        .await
        .expect("login with new email");
    assert_eq!(third.user.primary_email.as_deref(), Some("late@example.com"));
}

#[tokio::test]
async fn test_verified_google_email_links_password_account() {
    let ctx = setup(open_config()).await;
    let meta = RequestMeta::default();

    let pending = ctx
        .service
        .create_password_user(signup("link@example.com", None), &meta)
        .await
        .expect("password signup");

    let linked = ctx
        .service
        .authenticate_google(google("sub-link", "LINK@example.com", Some(true)), &meta)
        .await
        .expect("google login");
    assert_eq!(linked.resolution, GoogleResolution::Linked);
    assert_eq!(linked.user.id, pending.user_id);
    assert_eq!(linked.user.display_name.as_deref(), Some("Grace"));

    let identity = AuthIdentity::find_by_provider_sub(&ctx.pool, IdentityProvider::Google, "sub-link")
        .await
        .expect("query")
        .expect("google identity");
    assert_eq!(identity.user_id, pending.user_id);
    assert!(identity.email_verified);

    let events = ctx.service.list_login_events(pending.user_id).await.expect("events");
    assert!(events.iter().any(|e| e.reason == LoginReason::LinkAndLogin));
}

#[tokio::test]
async fn test_unverified_google_email_creates_separate_user() {
    let ctx = setup(open_config()).await;
    let meta = RequestMeta::default();

    let pending = ctx
        .service
        .create_password_user(signup("split@example.com", None), &meta)
        .await
        .expect("password signup");

    for (sub, verified) in [("sub-unverified", Some(false)), ("sub-unknown", None)] {
        let outcome = ctx
            .service
            .authenticate_google(google(sub, "split@example.com", verified), &meta)
            .await
            .expect("google login");
        assert_eq!(outcome.resolution, GoogleResolution::Created);
        assert_ne!(outcome.user.id, pending.user_id);

        let identity = AuthIdentity::find_by_provider_sub(&ctx.pool, IdentityProvider::Google, sub)
            .await
            .expect("query")
            .expect("identity");
        assert!(!identity.email_verified);
    }
}

#[tokio::test]
async fn test_google_signup_is_invite_gated() {
    let ctx = setup(gated_config(&["GOOGLE-OK"])).await;
    let meta = RequestMeta::default();

    let without = ctx
        .service
        .authenticate_google(google("sub-gated", "gated@example.com", Some(true)), &meta)
        .await;
    assert!(matches!(without, Err(AuthError::InviteRequired)));

    let with = ctx
        .service
        .authenticate_google(
            GoogleLogin {
                invite_code: Some("GOOGLE-OK".to_string()),
                ..google("sub-gated", "gated@example.com", Some(true))
            },
            &meta,
        )
        .await
        .expect("gated signup");
    assert_eq!(with.resolution, GoogleResolution::Created);

    // Existing identities log in without a code
    let again = ctx
        .service
        .authenticate_google(google("sub-gated", "gated@example.com", Some(true)), &meta)
        .await
        .expect("returning login");
    assert_eq!(again.resolution, GoogleResolution::Existing);
}

#[tokio::test]
async fn test_google_requires_subject() {
    let ctx = setup(open_config()).await;

    let result = ctx
        .service
        .authenticate_google(google("  ", "x@example.com", Some(true)), &RequestMeta::default())
        .await;
    assert!(matches!(result, Err(AuthError::InvalidInput(_))));
}
