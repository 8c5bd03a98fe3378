use wiremock::matchers::any;
use wiremock::Mock;
use wiremock::ResponseTemplate;

use crate::helpers::mock_email_ok;
use crate::helpers::spawn_app;

#[tokio::test]
async fn unsubscribe_unknown_email_returns_404_and_sends_nothing() {
    let app = spawn_app().await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;

    let resp = app
        .post_unsubscribe("email=ghost%40foo.com".to_string())
        .await;
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn unsubscribe_invalid_email_returns_400() {
    let app = spawn_app().await;

    for body in ["", "email=", "email=nope"] {
        let resp = app.post_unsubscribe(body.to_string()).await;
        assert_eq!(resp.status().as_u16(), 400, "{body}");
    }
}

#[tokio::test]
async fn unsubscribe_deletes_and_notifies() {
    let app = spawn_app().await;
    mock_email_ok(&app).await;
    app.create_confirmed_subscriber("john@foo.com", "Hanoi").await;

    let resp = app
        .post_unsubscribe("email=John%40foo.com".to_string())
        .await;
    assert_eq!(resp.status().as_u16(), 200);

    let sent = app.sent_emails().await;
    let goodbye = sent.last().unwrap();
    assert_eq!(goodbye.to, "john@foo.com");
    assert!(goodbye.text.contains("Hanoi"));

    // gone for good
    let resp = app.get_confirm("?email=john%40foo.com").await;
    assert_eq!(resp.status().as_u16(), 404);
    let resp = app
        .post_unsubscribe("email=john%40foo.com".to_string())
        .await;
    assert_eq!(resp.status().as_u16(), 404);
}
