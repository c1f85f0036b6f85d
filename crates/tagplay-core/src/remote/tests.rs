use super::*;
use crate::tag::ContentId;
use crate::testing::{
    DEVICES, FakeTransport, MOVED_DEVICE, NEXT, PLAY, SHUFFLE, TOKEN, TOKEN_OK, TWO_DEVICES,
    client,
};
use embassy_futures::block_on;
use http::TransportError;

fn playlist() -> ContentId {
    ContentId::parse("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M").unwrap()
}

fn ready_transport() -> FakeTransport {
    FakeTransport::new()
        .on(Method::Post, TOKEN, &[Ok((200, TOKEN_OK))])
        .on(Method::Get, DEVICES, &[Ok((200, TWO_DEVICES))])
        .on(Method::Put, PLAY, &[Ok((204, ""))])
        .on(Method::Put, SHUFFLE, &[Ok((204, ""))])
        .on(Method::Post, NEXT, &[Ok((204, ""))])
}

#[test]
fn begin_refreshes_and_resolves_target_by_exact_name() {
    let mut remote = client(ready_transport());
    block_on(remote.begin()).unwrap();

    assert!(remote.is_authenticated());
    assert_eq!(remote.session().target_id.as_deref(), Some("bb22"));
    assert_eq!(remote.session().target_name.as_deref(), Some("Living Room"));

    let token_call = &remote.transport().calls[0];
    let form = core::str::from_utf8(&token_call.body).unwrap();
    assert!(form.starts_with("grant_type=refresh_token&refresh_token=refresh"));
    assert!(form.contains("client_id=client"));
    assert_eq!(token_call.bearer, None);

    let devices_call = &remote.transport().calls[1];
    assert_eq!(devices_call.bearer.as_deref(), Some("fresh-token"));
}

#[test]
fn target_match_is_case_sensitive() {
    let mut remote = client(ready_transport());
    remote.credentials.target_name = "living room".into();
    assert_eq!(block_on(remote.begin()), Err(RemoteError::TargetNotFound));
    assert!(!remote.has_target());
}

#[test]
fn begin_without_credentials_does_not_touch_the_network() {
    let mut remote = client(ready_transport());
    remote.credentials.refresh_token.clear();
    assert_eq!(block_on(remote.begin()), Err(RemoteError::NotConfigured));
    assert!(remote.transport().calls.is_empty());
}

#[test]
fn rejected_refresh_is_an_auth_error() {
    let transport = FakeTransport::new().on(
        Method::Post,
        TOKEN,
        &[Ok((400, r#"{"error":"invalid_grant"}"#))],
    );
    let mut remote = client(transport);
    assert_eq!(
        block_on(remote.refresh_access_credential()),
        Err(RemoteError::Auth { status: 400 })
    );
    assert!(!remote.is_authenticated());
    // 4xx is final, no backoff
    assert_eq!(remote.transport().count(TOKEN), 1);
    assert!(remote.delay.waits.is_empty());
}

#[test]
fn rotated_refresh_token_replaces_the_stored_one() {
    let transport = FakeTransport::new().on(
        Method::Post,
        TOKEN,
        &[Ok((200, r#"{"access_token":"a1","refresh_token":"r2"}"#))],
    );
    let mut remote = client(transport);
    block_on(remote.refresh_access_credential()).unwrap();
    assert_eq!(remote.credentials().refresh_token, "r2");
    assert_eq!(remote.session().access_token.as_deref(), Some("a1"));
}

#[test]
fn playback_refreshes_once_on_unauthorized() {
    let mut transport = ready_transport();
    transport.set(Method::Put, PLAY, &[Ok((401, "")), Ok((204, ""))]);
    let mut remote = client(transport);
    remote.session.access_token = Some("stale".into());
    remote.session.target_id = Some("bb22".into());

    block_on(remote.start_playback(&playlist())).unwrap();

    let t = remote.transport();
    assert_eq!(t.count(PLAY), 2);
    assert_eq!(t.count(TOKEN), 1);
    assert_eq!(t.calls[0].bearer.as_deref(), Some("stale"));
    assert_eq!(t.calls[2].bearer.as_deref(), Some("fresh-token"));
    // token refresh sits between the two play attempts
    assert!(t.calls[1].url.contains(TOKEN));
}

#[test]
fn playback_gives_up_after_second_unauthorized() {
    let mut transport = ready_transport();
    transport.set(Method::Put, PLAY, &[Ok((401, ""))]);
    let mut remote = client(transport);
    remote.session.access_token = Some("stale".into());
    remote.session.target_id = Some("bb22".into());

    assert_eq!(
        block_on(remote.start_playback(&playlist())),
        Err(RemoteError::Playback { status: 401 })
    );
    assert_eq!(remote.transport().count(PLAY), 2);
    assert_eq!(remote.transport().count(TOKEN), 1);
    assert_eq!(remote.transport().count(SHUFFLE), 0);
}

#[test]
fn twice_rejected_token_is_refreshed_before_the_next_command() {
    let mut transport = ready_transport();
    transport.set(Method::Put, PLAY, &[Ok((401, ""))]);
    let mut remote = client(transport);
    remote.session.access_token = Some("stale".into());
    remote.session.target_id = Some("bb22".into());

    assert!(block_on(remote.start_playback(&playlist())).is_err());
    assert!(!remote.is_authenticated());

    remote
        .transport_mut()
        .set(Method::Put, PLAY, &[Ok((204, ""))]);
    let before = remote.transport().calls.len();
    block_on(remote.start_playback(&playlist())).unwrap();

    let calls = &remote.transport().calls[before..];
    assert!(calls[0].url.contains(TOKEN));
    assert!(calls[1].url.contains(PLAY));
    assert_eq!(calls[1].bearer.as_deref(), Some("fresh-token"));
}

#[test]
fn unauthorized_skip_drops_the_token() {
    let mut transport = ready_transport();
    transport.set(Method::Post, NEXT, &[Ok((401, ""))]);
    let mut remote = client(transport);
    remote.session.access_token = Some("stale".into());
    remote.session.target_id = Some("bb22".into());

    assert_eq!(
        block_on(remote.skip_to_next()),
        Err(RemoteError::Auth { status: 401 })
    );
    assert!(!remote.is_authenticated());
}

#[test]
fn playback_rediscovers_once_on_not_found() {
    let mut transport = ready_transport();
    transport.set(Method::Put, PLAY, &[Ok((404, "")), Ok((204, ""))]);
    transport.set(Method::Get, DEVICES, &[Ok((200, MOVED_DEVICE))]);
    let mut remote = client(transport);
    remote.session.access_token = Some("valid".into());
    remote.session.target_id = Some("bb22".into());

    block_on(remote.start_playback(&playlist())).unwrap();

    let t = remote.transport();
    assert_eq!(t.count(DEVICES), 1);
    assert_eq!(t.count(PLAY), 2);
    let plays = t.urls(PLAY);
    assert!(plays[0].ends_with("device_id=bb22"));
    assert!(plays[1].ends_with("device_id=cc33"));
    assert_eq!(remote.session().target_id.as_deref(), Some("cc33"));
}

#[test]
fn failed_rediscovery_reports_playback_error() {
    let mut transport = ready_transport();
    transport.set(Method::Put, PLAY, &[Ok((404, ""))]);
    transport.set(Method::Get, DEVICES, &[Ok((200, r#"{"devices":[]}"#))]);
    let mut remote = client(transport);
    remote.session.access_token = Some("valid".into());
    remote.session.target_id = Some("bb22".into());

    assert_eq!(
        block_on(remote.start_playback(&playlist())),
        Err(RemoteError::Playback { status: 404 })
    );
    assert_eq!(remote.transport().count(PLAY), 1);
    assert!(!remote.has_target());
}

#[test]
fn playback_enables_shuffle_after_success() {
    let mut remote = client(ready_transport());
    remote.session.access_token = Some("valid".into());
    remote.session.target_id = Some("bb22".into());

    block_on(remote.start_playback(&playlist())).unwrap();

    let t = remote.transport();
    let shuffle = t.urls(SHUFFLE);
    assert_eq!(shuffle.len(), 1);
    assert!(shuffle[0].ends_with("/me/player/shuffle?state=true&device_id=bb22"));

    let body: serde_json::Value = serde_json::from_slice(&t.calls[0].body).unwrap();
    assert_eq!(body["context_uri"], "spotify:playlist:37i9dQZF1DXcBWIGoYBM5M");
    assert_eq!(body["offset"]["position"], 0);
    assert_eq!(body["position_ms"], 0);
}

#[test]
fn shuffle_failure_does_not_fail_playback() {
    let mut transport = ready_transport();
    transport.set(Method::Put, SHUFFLE, &[Ok((403, ""))]);
    let mut remote = client(transport);
    remote.session.access_token = Some("valid".into());
    remote.session.target_id = Some("bb22".into());

    assert_eq!(block_on(remote.start_playback(&playlist())), Ok(()));
}

#[test]
fn tracks_are_sent_as_uris() {
    let mut remote = client(ready_transport());
    remote.session.access_token = Some("valid".into());
    remote.session.target_id = Some("bb22".into());

    let track = ContentId::parse("spotify:track:6rqhFgbbKwnb9MLmUQDhG6").unwrap();
    block_on(remote.start_playback(&track)).unwrap();

    let body: serde_json::Value =
        serde_json::from_slice(&remote.transport().calls[0].body).unwrap();
    assert_eq!(body["uris"][0], "spotify:track:6rqhFgbbKwnb9MLmUQDhG6");
    assert!(body.get("context_uri").is_none());
    assert!(body.get("offset").is_none());
}

#[test]
fn playback_without_target_fails_fast() {
    let mut remote = client(ready_transport());
    assert_eq!(
        block_on(remote.start_playback(&playlist())),
        Err(RemoteError::NoTarget)
    );
    assert!(remote.transport().calls.is_empty());
}

#[test]
fn server_errors_are_retried_with_backoff() {
    let mut transport = ready_transport();
    transport.set(
        Method::Put,
        PLAY,
        &[Ok((503, "")), Err(TransportError::Timeout), Ok((204, ""))],
    );
    let mut remote = client(transport);
    remote.session.access_token = Some("valid".into());
    remote.session.target_id = Some("bb22".into());

    block_on(remote.start_playback(&playlist())).unwrap();

    assert_eq!(remote.transport().count(PLAY), 3);
    let waits = &remote.delay.waits;
    assert_eq!(waits.len(), 2);
    assert!((750..=1_250).contains(&waits[0]));
    assert!((1_500..=2_500).contains(&waits[1]));
}

#[test]
fn retries_stop_at_max_attempts() {
    let mut transport = ready_transport();
    transport.set(Method::Put, PLAY, &[Ok((429, ""))]);
    let mut remote = client(transport);
    remote.session.access_token = Some("valid".into());
    remote.session.target_id = Some("bb22".into());

    assert_eq!(
        block_on(remote.start_playback(&playlist())),
        Err(RemoteError::Playback { status: 429 })
    );
    assert_eq!(remote.transport().count(PLAY), 4);
    assert_eq!(remote.delay.waits.len(), 3);
}

#[test]
fn unreachable_network_is_reported_after_retries() {
    let transport = FakeTransport::new().on(Method::Post, TOKEN, &[Err(TransportError::Dns)]);
    let mut remote = client(transport);
    assert_eq!(
        block_on(remote.refresh_access_credential()),
        Err(RemoteError::Network)
    );
    assert_eq!(remote.transport().count(TOKEN), 4);
}

#[test]
fn select_by_id_adopts_the_device_name() {
    let mut remote = client(ready_transport());
    remote.session.access_token = Some("valid".into());

    let name = block_on(remote.select_target_by_id("aa11")).unwrap();
    assert_eq!(name, "Kitchen");
    assert_eq!(remote.session().target_id.as_deref(), Some("aa11"));
    assert_eq!(remote.credentials().target_name, "Kitchen");

    assert_eq!(
        block_on(remote.select_target_by_id("zz99")),
        Err(RemoteError::TargetNotFound)
    );
    assert_eq!(remote.session().target_id.as_deref(), Some("aa11"));
}

#[test]
fn list_targets_skips_devices_without_id() {
    let mut transport = ready_transport();
    transport.set(
        Method::Get,
        DEVICES,
        &[Ok((
            200,
            r#"{"devices":[{"id":null,"name":"Ghost","type":"TV","is_active":false,"is_restricted":true},{"id":"aa11","name":"Kitchen","type":"Speaker","is_active":false,"is_restricted":false}]}"#,
        ))],
    );
    let mut remote = client(transport);
    let targets = block_on(remote.list_targets()).unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].name, "Kitchen");
    assert_eq!(targets[0].kind, "Speaker");
    // lazy refresh happened first
    assert_eq!(remote.transport().count(TOKEN), 1);
}

#[test]
fn garbage_device_list_is_a_decode_error() {
    let mut transport = ready_transport();
    transport.set(Method::Get, DEVICES, &[Ok((200, "<html>oops</html>"))]);
    let mut remote = client(transport);
    assert_eq!(block_on(remote.list_targets()), Err(RemoteError::Decode));
}

#[test]
fn skip_posts_to_next_endpoint() {
    let mut remote = client(ready_transport());
    remote.session.access_token = Some("valid".into());
    remote.session.target_id = Some("bb22".into());

    block_on(remote.skip_to_next()).unwrap();
    let urls = remote.transport().urls(NEXT);
    assert_eq!(urls, ["https://api.spotify.com/v1/me/player/next?device_id=bb22"]);
}

#[test]
fn skip_rediscovers_a_vanished_device() {
    let mut transport = ready_transport();
    transport.set(Method::Post, NEXT, &[Ok((404, "")), Ok((204, ""))]);
    transport.set(Method::Get, DEVICES, &[Ok((200, MOVED_DEVICE))]);
    let mut remote = client(transport);
    remote.session.access_token = Some("valid".into());
    remote.session.target_id = Some("bb22".into());

    block_on(remote.skip_to_next()).unwrap();

    let t = remote.transport();
    assert_eq!(t.count(DEVICES), 1);
    let urls = t.urls(NEXT);
    assert!(urls[0].ends_with("device_id=bb22"));
    assert!(urls[1].ends_with("device_id=cc33"));
}

#[test]
fn shuffle_not_found_drops_the_device() {
    let mut transport = ready_transport();
    transport.set(Method::Put, SHUFFLE, &[Ok((404, ""))]);
    transport.set(Method::Get, DEVICES, &[Ok((200, r#"{"devices":[]}"#))]);
    let mut remote = client(transport);
    remote.session.access_token = Some("valid".into());
    remote.session.target_id = Some("bb22".into());

    assert_eq!(
        block_on(remote.set_shuffle(true)),
        Err(RemoteError::Rejected { status: 404 })
    );
    assert!(!remote.has_target());
    assert_eq!(remote.transport().count(DEVICES), 1);
    assert_eq!(
        block_on(remote.skip_to_next()),
        Err(RemoteError::NoTarget)
    );
    assert_eq!(remote.transport().count(NEXT), 0);
}
