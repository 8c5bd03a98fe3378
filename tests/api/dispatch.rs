use crate::helpers::mock_email_ok;
use crate::helpers::mock_forecast;
use crate::helpers::mock_unknown_location;
use crate::helpers::spawn_app;

#[tokio::test]
async fn dispatch_requires_admin_token() {
    let app = spawn_app().await;

    let resp = app.post_dispatch(None).await;
    assert_eq!(resp.status().as_u16(), 401);
    assert_eq!(resp.headers()["www-authenticate"], r#"Bearer realm="admin""#);

    let resp = app.post_dispatch(Some("not-the-token")).await;
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn dispatch_with_no_subscribers_is_a_noop() {
    let app = spawn_app().await;

    let resp = app.post_dispatch(Some(&app.admin_token)).await;

    assert_eq!(resp.status().as_u16(), 200);
    let summary: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(summary["recipients"], 0);
    assert_eq!(summary["attempted"], 0);
    assert!(app.sent_emails().await.is_empty());
}

#[tokio::test]
async fn only_confirmed_subscribers_get_the_digest() {
    let app = spawn_app().await;
    mock_email_ok(&app).await;
    mock_forecast(&app, "Hanoi").await;

    app.create_confirmed_subscriber("a@foo.com", "Hanoi").await;
    app.post_subscriptions("email=pending%40foo.com&location=Hanoi".to_string())
        .await
        .error_for_status()
        .unwrap();
    let n_before = app.sent_emails().await.len();

    let resp = app.post_dispatch(Some(&app.admin_token)).await;
    assert_eq!(resp.status().as_u16(), 200);
    let summary: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(summary["recipients"], 1);
    assert_eq!(summary["succeeded"], 1);

    let sent = app.sent_emails().await;
    let digests = &sent[n_before..];
    assert_eq!(digests.len(), 1);
    assert_eq!(digests[0].to, "a@foo.com");
    assert!(digests[0].subject.starts_with("🌤️ Daily Weather for Hanoi"));
    // icons are made absolute; the template escapes `/` as `&#x2F;`
    let html = digests[0].html.replace("&#x2F;", "/");
    assert!(html.contains("https://cdn.weatherapi.com/weather/64x64/day/116.png"));
}

#[tokio::test]
async fn failed_forecast_does_not_stop_others() {
    let app = spawn_app().await;
    mock_email_ok(&app).await;
    mock_forecast(&app, "Hanoi").await;
    mock_unknown_location(&app, "Atlantis").await;

    app.create_confirmed_subscriber("a@foo.com", "Atlantis").await;
    app.create_confirmed_subscriber("b@foo.com", "Hanoi").await;
    let n_before = app.sent_emails().await.len();

    let resp = app.post_dispatch(Some(&app.admin_token)).await;
    assert_eq!(resp.status().as_u16(), 200);
    let summary: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(summary["attempted"], 2);
    assert_eq!(summary["succeeded"], 1);
    assert_eq!(summary["failed"], 1);
    assert_eq!(summary["failures"][0]["email"], "a@foo.com");
    assert_eq!(summary["failures"][0]["stage"], "weather");

    let sent = app.sent_emails().await;
    let digests: Vec<_> = sent[n_before..].iter().map(|e| e.to.as_str()).collect();
    assert_eq!(digests, ["b@foo.com"]);
}

#[tokio::test]
async fn unsubscribed_address_is_never_contacted() {
    let app = spawn_app().await;
    mock_email_ok(&app).await;
    mock_forecast(&app, "Hanoi").await;

    app.create_confirmed_subscriber("a@foo.com", "Hanoi").await;
    app.create_confirmed_subscriber("b@foo.com", "Hanoi").await;
    app.post_unsubscribe("email=a%40foo.com".to_string())
        .await
        .error_for_status()
        .unwrap();
    let n_before = app.sent_emails().await.len();

    let resp = app.post_dispatch(Some(&app.admin_token)).await;
    let summary: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(summary["recipients"], 1);

    let sent = app.sent_emails().await;
    let digests: Vec<_> = sent[n_before..].iter().map(|e| e.to.as_str()).collect();
    assert_eq!(digests, ["b@foo.com"]);
}
