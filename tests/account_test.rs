//! Account cache and session tests
//!
//! Drives the account accessors against a local mock server: dataset TTL
//! behavior, paged fetching, count-only reads, and both token refreshers.

use async_trait::async_trait;
use mockito::Matcher;
use serde_json::json;
use std::time::Duration;
use tokio_test::assert_ok;

use castbridge::account::token::{OAuthRefresher, TokenRefresher, WebPlayerAuth};
use castbridge::account::{Account, AccountError, AuthError, Session, SessionToken};
use castbridge::api::SpotifyClient;

/// Refresher handing out a token that never goes stale
struct StubRefresher;

#[async_trait]
impl TokenRefresher for StubRefresher {
    async fn refresh(&self) -> Result<SessionToken, AuthError> {
        Ok(SessionToken::new("stub-token", u64::MAX))
    }
}

fn test_account(server: &mockito::Server) -> Account {
    Account::new(
        "test-entry",
        true,
        SpotifyClient::with_base_url(server.url()),
        Session::new(Box::new(StubRefresher)),
        Session::new(Box::new(StubRefresher)),
    )
}

fn liked_item(id: &str) -> serde_json::Value {
    json!({"track": {"uri": format!("spotify:track:{}", id)}})
}

async fn mock_profile(server: &mut mockito::Server) -> mockito::Mock {
    server
        .mock("GET", "/me")
        .with_status(200)
        .with_body(
            json!({"id": "user1", "display_name": "Tester", "country": "CA"}).to_string(),
        )
        .create_async()
        .await
}

// =============================================================================
// Liked Songs Cache
// =============================================================================

#[tokio::test]
async fn test_liked_songs_pages_once_then_serves_cache() {
    let mut server = mockito::Server::new_async().await;
    mock_profile(&mut server).await;

    let page1 = server
        .mock("GET", "/me/tracks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "50".into()),
            Matcher::UrlEncoded("offset".into(), "0".into()),
        ]))
        .with_body(json!({"total": 3, "items": [liked_item("one"), liked_item("two")]}).to_string())
        .expect(1)
        .create_async()
        .await;
    let page2 = server
        .mock("GET", "/me/tracks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "50".into()),
            Matcher::UrlEncoded("offset".into(), "2".into()),
        ]))
        .with_body(json!({"total": 3, "items": [liked_item("three")]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let account = test_account(&server);

    let first = account.liked_songs(false).await.unwrap();
    assert_eq!(
        first,
        vec![
            "spotify:track:one",
            "spotify:track:two",
            "spotify:track:three"
        ]
    );

    // Within the TTL the second read must not touch the network
    let second = account.liked_songs(false).await.unwrap();
    assert_eq!(second, first);

    page1.assert_async().await;
    page2.assert_async().await;
}

#[tokio::test]
async fn test_liked_songs_force_refetches() {
    let mut server = mockito::Server::new_async().await;
    mock_profile(&mut server).await;

    let page = server
        .mock("GET", "/me/tracks")
        .match_query(Matcher::UrlEncoded("offset".into(), "0".into()))
        .with_body(json!({"total": 1, "items": [liked_item("only")]}).to_string())
        .expect(2)
        .create_async()
        .await;

    let account = test_account(&server);
    account.liked_songs(false).await.unwrap();
    account.liked_songs(true).await.unwrap();

    page.assert_async().await;
}

#[tokio::test]
async fn test_liked_songs_count_served_from_fresh_cache() {
    let mut server = mockito::Server::new_async().await;
    mock_profile(&mut server).await;

    server
        .mock("GET", "/me/tracks")
        .match_query(Matcher::UrlEncoded("offset".into(), "0".into()))
        .with_body(json!({"total": 2, "items": [liked_item("a"), liked_item("b")]}).to_string())
        .expect(1)
        .create_async()
        .await;
    let count_probe = server
        .mock("GET", "/me/tracks")
        .match_query(Matcher::UrlEncoded("limit".into(), "1".into()))
        .expect(0)
        .create_async()
        .await;

    let account = test_account(&server);
    account.liked_songs(false).await.unwrap();

    let count = account.liked_songs_count().await.unwrap();
    assert_eq!(count, 2);

    count_probe.assert_async().await;
}

#[tokio::test]
async fn test_liked_songs_count_expired_cache_single_fetch() {
    let mut server = mockito::Server::new_async().await;
    mock_profile(&mut server).await;

    let count_probe = server
        .mock("GET", "/me/tracks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "1".into()),
            Matcher::UrlEncoded("offset".into(), "0".into()),
        ]))
        .with_body(json!({"total": 1234, "items": [liked_item("first")]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let account = test_account(&server).with_refresh_rate(Duration::ZERO);
    let count = account.liked_songs_count().await.unwrap();

    assert_eq!(count, 1234);
    count_probe.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_cached_reads_share_one_fetch() {
    let mut server = mockito::Server::new_async().await;
    mock_profile(&mut server).await;

    let page = server
        .mock("GET", "/me/tracks")
        .match_query(Matcher::UrlEncoded("offset".into(), "0".into()))
        .with_body(json!({"total": 1, "items": [liked_item("only")]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let account = test_account(&server);
    account.liked_songs(false).await.unwrap();

    // Fresh concurrent readers both come out of the cache
    let (first, second) =
        futures::future::join(account.liked_songs(false), account.liked_songs(false)).await;
    let first = tokio_test::assert_ok!(first);
    let second = tokio_test::assert_ok!(second);

    assert_eq!(first, second);
    page.assert_async().await;
}

// =============================================================================
// Devices and Categories
// =============================================================================

#[tokio::test]
async fn test_devices_force_bypasses_ttl() {
    let mut server = mockito::Server::new_async().await;
    mock_profile(&mut server).await;

    let devices = server
        .mock("GET", "/me/player/devices")
        .with_body(
            json!({"devices": [{"id": "d1", "name": "Kitchen", "type": "Speaker"}]}).to_string(),
        )
        .expect(2)
        .create_async()
        .await;

    let account = test_account(&server);
    account.devices(true).await.unwrap();
    let listed = account.devices(true).await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id.as_deref(), Some("d1"));
    devices.assert_async().await;
}

#[tokio::test]
async fn test_categories_page_through_sub_layer_with_market() {
    let mut server = mockito::Server::new_async().await;
    mock_profile(&mut server).await;

    let categories = server
        .mock("GET", "/browse/categories")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("country".into(), "CA".into()),
            Matcher::UrlEncoded("offset".into(), "0".into()),
        ]))
        .with_body(
            json!({"categories": {
                "total": 2,
                "items": [
                    {"id": "toplists", "name": "Top Lists"},
                    {"id": "mood", "name": "Mood"}
                ]
            }})
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let account = test_account(&server);
    let listed = account.categories(false, None).await.unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, "toplists");
    categories.assert_async().await;
}

#[tokio::test]
async fn test_wait_for_device_times_out() {
    let mut server = mockito::Server::new_async().await;
    mock_profile(&mut server).await;

    let devices = server
        .mock("GET", "/me/player/devices")
        .with_body(json!({"devices": []}).to_string())
        .expect_at_least(2)
        .create_async()
        .await;

    let account = test_account(&server);
    let result = account
        .wait_for_device("ghost", Duration::from_secs(1))
        .await;

    assert!(matches!(
        result,
        Err(AccountError::DeviceNotAvailable { .. })
    ));
    devices.assert_async().await;
}

// =============================================================================
// Token Refreshers
// =============================================================================

#[tokio::test]
async fn test_web_player_auth_exchanges_cookies() {
    let mut server = mockito::Server::new_async().await;
    let token_mock = server
        .mock("GET", "/get_access_token")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("reason".into(), "transport".into()),
            Matcher::UrlEncoded("productType".into(), "web_player".into()),
        ]))
        .match_header("cookie", "sp_dc=dc-cookie; sp_key=key-cookie")
        .with_status(200)
        .with_body(
            json!({
                "accessToken": "powerful-token",
                "accessTokenExpirationTimestampMs": 32503680000000u64
            })
            .to_string(),
        )
        .create_async()
        .await;

    let auth = WebPlayerAuth::with_base_url("dc-cookie", "key-cookie", server.url());
    let token = auth.refresh().await.unwrap();

    assert_eq!(token.access_token, "powerful-token");
    assert_eq!(token.expires_at, 32503680000);
    assert!(!token.is_expired());
    token_mock.assert_async().await;
}

#[tokio::test]
async fn test_web_player_auth_detects_expired_cookies() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/get_access_token")
        .match_query(Matcher::Any)
        .with_status(302)
        .with_header(
            "location",
            "/get_access_token?reason=transport&productType=web_player&_authfailed=1",
        )
        .create_async()
        .await;

    let auth = WebPlayerAuth::with_base_url("stale", "stale", server.url());
    let err = auth.refresh().await.unwrap_err();

    assert!(matches!(err, AuthError::CredentialsExpired(_)));
}

#[tokio::test]
async fn test_oauth_refresher_grant() {
    let mut server = mockito::Server::new_async().await;
    let token_mock = server
        .mock("POST", "/api/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
            Matcher::UrlEncoded("client_id".into(), "client-1".into()),
        ]))
        .with_status(200)
        .with_body(json!({"access_token": "bearer-1", "expires_in": 3600}).to_string())
        .create_async()
        .await;

    let auth = OAuthRefresher::with_base_url("client-1", "refresh-1", server.url());
    let token = auth.refresh().await.unwrap();

    assert_eq!(token.access_token, "bearer-1");
    assert!(!token.is_expired());
    token_mock.assert_async().await;
}

#[tokio::test]
async fn test_oauth_refresher_revoked_token() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_body(json!({"error": "invalid_grant"}).to_string())
        .create_async()
        .await;

    let auth = OAuthRefresher::with_base_url("client-1", "gone", server.url());
    let err = auth.refresh().await.unwrap_err();

    assert!(matches!(err, AuthError::CredentialsExpired(_)));
}

// =============================================================================
// Profile Projections
// =============================================================================

#[tokio::test]
async fn test_profile_projections_after_load() {
    let mut server = mockito::Server::new_async().await;
    mock_profile(&mut server).await;

    let account = test_account(&server);
    let profile = account.profile(false).await.unwrap();

    assert_eq!(profile.id, "user1");
    assert_eq!(profile.name(), "Tester");
    assert_eq!(account.country().as_deref(), Some("CA"));
    assert_eq!(
        account.liked_songs_uri().as_deref(),
        Some("spotify:user:user1:collection")
    );
}
