use serde_json::json;
use wiremock::matchers::any;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::ResponseTemplate;

use crate::helpers::mock_email_ok;
use crate::helpers::spawn_app;

#[tokio::test]
async fn subscribe_form_ok() {
    let app = spawn_app().await;
    mock_email_ok(&app).await;

    let resp = app
        .post_subscriptions("email=john%40foo.com&location=Hanoi".to_string())
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["email"], "john@foo.com");
    assert_eq!(body["location"], "Hanoi");
}

#[tokio::test]
async fn subscribe_json_ok() {
    let app = spawn_app().await;
    mock_email_ok(&app).await;

    let resp = app
        .post_subscriptions_json(&json!({ "email": " John@Foo.com ", "location": "Hanoi" }))
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["email"], "john@foo.com");
}

#[tokio::test]
async fn subscribe_without_location_uses_default() {
    let app = spawn_app().await;
    mock_email_ok(&app).await;

    let resp = app
        .post_subscriptions("email=john%40foo.com".to_string())
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["location"], "your location");
}

#[tokio::test]
async fn subscribe_sends_confirmation_email_with_link() {
    let app = spawn_app().await;

    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    app.post_subscriptions("email=john%40foo.com&location=Hanoi".to_string())
        .await;

    let sent = app.sent_emails().await;
    assert_eq!(sent[0].to, "john@foo.com");
    assert!(sent[0].subject.contains("Hanoi"));
    let link = app.get_confirmation_link(&sent[0]);
    assert_eq!(link.path(), "/subscriptions/confirm");
    assert_eq!(link.query(), Some("email=john%40foo.com"));
    assert!(sent[0].html.contains("/subscriptions/confirm?email=john%40foo.com"));
}

#[tokio::test]
async fn subscribe_invalid_returns_400() {
    let app = spawn_app().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let cases = [
        ("location=Hanoi", "missing email"),
        ("email=&location=Hanoi", "empty email"),
        ("email=%20%20", "blank email"),
        ("email=definitely-not-an-email", "invalid email"),
        ("email=john%40foo.com&location=Ha%0Anoi", "control character in location"),
    ];

    for (body, desc) in cases {
        let resp = app.post_subscriptions(body.to_string()).await;
        assert_eq!(resp.status().as_u16(), 400, "{desc}");
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].is_string(), "{desc}");
    }
}

#[tokio::test]
async fn subscribe_fails_if_email_cannot_be_sent() {
    let app = spawn_app().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .mount(&app.email_server)
        .await;

    let resp = app
        .post_subscriptions("email=john%40foo.com".to_string())
        .await;
    assert_eq!(resp.status().as_u16(), 500);
}

#[tokio::test]
async fn resubscribing_resets_confirmation() {
    let app = spawn_app().await;
    mock_email_ok(&app).await;

    app.create_confirmed_subscriber("john@foo.com", "Hanoi").await;
    app.post_subscriptions("email=john%40foo.com&location=Hue".to_string())
        .await
        .error_for_status()
        .unwrap();

    // the record is pending again, so the new link confirms rather than
    // reporting "already confirmed"
    let sent = app.sent_emails().await;
    let link = app.get_confirmation_link(sent.last().unwrap());
    let html = reqwest::get(link).await.unwrap().text().await.unwrap();
    assert!(html.contains("Subscription Confirmed!"));
}
