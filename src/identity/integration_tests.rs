//! Resolver and token issuance against SurrealDB's in-memory engine.

#![cfg(test)]

use std::sync::Arc;

use serde_json::json;

use crate::db::{DatabaseConfig, SurrealIdentityStore, create_connection, ensure_schema};
use crate::error::Error;
use crate::identity::{IdentityResolver, ProfileHints, ProviderCredential};
use crate::token::{TOKEN_HEX_LEN, TokenIssuer, TokenSecret};
use crate::types::{Provider, UserId};

async fn setup_resolver() -> IdentityResolver<Arc<SurrealIdentityStore>> {
    let config = DatabaseConfig {
        url: "memory".to_string(),
        ..Default::default()
    };
    let db = create_connection(config).await.unwrap();
    ensure_schema(&db).await.unwrap();
    IdentityResolver::new(Arc::new(SurrealIdentityStore::new(db)))
}

fn youtube(client_id: &str) -> ProviderCredential {
    ProviderCredential::new(Provider::Youtube, client_id, "yt-access")
        .with_refresh_token("yt-refresh", Some(1_900_000_000))
}

fn soundcloud(client_id: &str) -> ProviderCredential {
    ProviderCredential::new(Provider::Soundcloud, client_id, "sc-access")
}

#[tokio::test]
async fn test_login_then_token() {
    let resolver = setup_resolver().await;
    let issuer = TokenIssuer::new(TokenSecret::new("integration-secret").unwrap());

    let user = resolver
        .resolve_or_create(
            youtube("yt1"),
            ProfileHints::new().with_name("Ann").with_avatar("a.png"),
        )
        .await
        .unwrap();
    let token = issuer.issue_for(&user).unwrap();

    assert_eq!(token.as_str().len(), TOKEN_HEX_LEN);
    assert_eq!(token, issuer.issue(user.id, "Ann", "a.png").unwrap());
    assert!(issuer.verify(token.as_str(), user.id.get(), "Ann", "a.png"));
}

#[tokio::test]
async fn test_repeat_login_returns_same_user() {
    let resolver = setup_resolver().await;

    let first = resolver
        .resolve_or_create(youtube("yt1"), ProfileHints::new().with_name("Ann"))
        .await
        .unwrap();
    let second = resolver
        .resolve_or_create(youtube("yt1"), ProfileHints::new().with_name("Renamed"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(second.name.as_deref(), Some("Ann"));
}

#[tokio::test]
async fn test_id_hint_merges_providers() {
    let resolver = setup_resolver().await;
    let existing = resolver
        .resolve_or_create(youtube("yt1"), ProfileHints::new().with_name("A"))
        .await
        .unwrap();

    let hints: ProfileHints = serde_json::from_value(json!({ "id": existing.id.get() })).unwrap();
    let merged = resolver
        .resolve_or_create(soundcloud("sc1"), hints)
        .await
        .unwrap();

    assert_eq!(merged.id, existing.id);
    assert_eq!(
        merged.credential(Provider::Youtube),
        existing.credential(Provider::Youtube)
    );
    assert_eq!(
        merged.credential(Provider::Soundcloud).unwrap().client_id.as_str(),
        "sc1"
    );

    // Either provider now resolves to the same person.
    let via_soundcloud = resolver
        .resolve_or_create(soundcloud("sc1"), ProfileHints::new())
        .await
        .unwrap();
    assert_eq!(via_soundcloud.id, existing.id);
}

#[tokio::test]
async fn test_string_id_hint_creates_new_user() {
    let resolver = setup_resolver().await;
    let first = resolver
        .resolve_or_create(youtube("yt1"), ProfileHints::new())
        .await
        .unwrap();

    let hints: ProfileHints =
        serde_json::from_value(json!({ "id": "not-a-number", "name": "B" })).unwrap();
    let created = resolver
        .resolve_or_create(youtube("yt2"), hints)
        .await
        .unwrap();

    assert_ne!(created.id, first.id);
    assert_eq!(created.name.as_deref(), Some("B"));
}

#[tokio::test]
async fn test_unknown_id_hint_is_not_found() {
    let resolver = setup_resolver().await;

    let err = resolver
        .resolve_or_create(youtube("yt1"), ProfileHints::new().with_id(5))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound { id } if id == UserId::new(5)));
    assert!(resolver.find_user(UserId::new(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_detach_isolation() {
    let resolver = setup_resolver().await;
    let user = resolver
        .resolve_or_create(youtube("yt1"), ProfileHints::new().with_name("A"))
        .await
        .unwrap();
    let user = resolver
        .resolve_or_create(soundcloud("sc1"), ProfileHints::new().with_id(user.id.get()))
        .await
        .unwrap();

    let detached = resolver
        .detach_provider(&user, Provider::Youtube)
        .await
        .unwrap();

    assert!(!detached.is_linked(Provider::Youtube));
    assert_eq!(
        detached.credential(Provider::Soundcloud),
        user.credential(Provider::Soundcloud)
    );

    let stored = resolver.find_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored, detached);

    // Detaching again is a successful no-op.
    let again = resolver
        .detach_provider(&detached, Provider::Youtube)
        .await
        .unwrap();
    assert_eq!(again, detached);
}

#[tokio::test]
async fn test_out_of_range_id_hint_is_not_found() {
    let resolver = setup_resolver().await;

    let err = resolver
        .resolve_or_create(youtube("yt1"), ProfileHints::new().with_id(u64::MAX))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound { id } if id == UserId::new(u64::MAX)));
}

#[tokio::test]
async fn test_float_id_hint_links_existing_user() {
    let resolver = setup_resolver().await;
    let existing = resolver
        .resolve_or_create(youtube("yt1"), ProfileHints::new())
        .await
        .unwrap();

    let hints: ProfileHints = serde_json::from_str(r#"{"id": 1.0}"#).unwrap();
    let linked = resolver
        .resolve_or_create(soundcloud("sc1"), hints)
        .await
        .unwrap();

    assert_eq!(linked.id, existing.id);
    assert!(linked.is_linked(Provider::Youtube));
    assert!(linked.is_linked(Provider::Soundcloud));
}

#[tokio::test]
async fn test_concurrent_first_logins_converge() {
    let resolver = Arc::new(setup_resolver().await);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move {
                resolver
                    .resolve_or_create(youtube("race"), ProfileHints::new().with_name("R"))
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "logins resolved to different users: {ids:?}");

    let stored = resolver
        .resolve_or_create(youtube("race"), ProfileHints::new())
        .await
        .unwrap();
    assert_eq!(stored.id, ids[0]);
}
