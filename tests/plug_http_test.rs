use helios::config::PlugEndpoint;
use helios::plug::{HttpRelayPlug, OutletSwitch, PlugState};
use mockito::Matcher;

fn endpoint() -> PlugEndpoint {
    PlugEndpoint {
        host: "unused".to_string(),
        timeout_ms: 1000,
        ..PlugEndpoint::default()
    }
}

#[tokio::test]
async fn switch_on_sends_turn_query() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/relay/0")
        .match_query(Matcher::UrlEncoded("turn".into(), "on".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ison":true,"has_timer":false}"#)
        .create_async()
        .await;

    let plug = HttpRelayPlug::with_base_url("boiler", server.url(), &endpoint()).unwrap();
    plug.set_state(true).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn state_query_on_configured_channel_with_auth() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/relay/1")
        .match_header("authorization", "Basic dXNlcjpwYXNz")
        .with_status(200)
        .with_body(r#"{"ison":false}"#)
        .create_async()
        .await;

    let ep = PlugEndpoint {
        channel: 1,
        username: Some("user".to_string()),
        password: Some("pass".to_string()),
        ..endpoint()
    };
    let plug = HttpRelayPlug::with_base_url("pool", format!("{}/", server.url()), &ep).unwrap();
    assert_eq!(plug.get_state().await.unwrap(), PlugState::Off);
    mock.assert_async().await;
}

#[tokio::test]
async fn relay_disagreeing_with_command_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/relay/0")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"ison":true}"#)
        .create_async()
        .await;

    let plug = HttpRelayPlug::with_base_url("heater", server.url(), &endpoint()).unwrap();
    let err = plug.set_state(false).await.unwrap_err();
    assert!(err.to_string().contains("heater"));
}

#[tokio::test]
async fn http_error_status_is_reported() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/relay/0")
        .with_status(500)
        .with_body("oops")
        .create_async()
        .await;

    let plug = HttpRelayPlug::with_base_url("boiler", server.url(), &endpoint()).unwrap();
    let err = plug.get_state().await.unwrap_err();
    assert!(err.to_string().contains("HTTP 500"));
}

#[tokio::test]
async fn unreachable_plug_fails() {
    let ep = PlugEndpoint {
        host: "127.0.0.1".to_string(),
        port: 9,
        timeout_ms: 500,
        ..PlugEndpoint::default()
    };
    let plug = HttpRelayPlug::new("ghost", &ep).unwrap();
    assert!(plug.get_state().await.is_err());
}
