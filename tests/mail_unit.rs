use httpmock::prelude::*;
use serde_json::json;

use trueke::config::{MailProvider, MailSettings};
use trueke::mail::{
    create_mail_client, templates, EmailMessage, MailClient, MailError, ResendMailClient,
    SendgridMailClient,
};

fn settings(provider: MailProvider, base_url: Option<String>) -> MailSettings {
    MailSettings {
        provider,
        from_email: "hola@trueke.test".to_string(),
        from_name: "Trueke".to_string(),
        api_key: Some("key_test".to_string()),
        api_base_url: base_url,
        smtp: None,
    }
}

fn message() -> EmailMessage {
    let (subject, html, text) = templates::product_expiry("Bicicleta", 3, "https://trueke.test");
    EmailMessage::new("ana@trueke.test", subject)
        .html(html)
        .text(text)
}

#[actix_web::test]
async fn resend_posts_email_with_bearer_key() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/emails")
                .header("authorization", "Bearer key_test")
                .json_body_partial(r#"{"from":"Trueke <hola@trueke.test>","to":["ana@trueke.test"]}"#);
            then.status(200).json_body(json!({ "id": "email_1" }));
        })
        .await;

    let client = ResendMailClient::new(
        &settings(MailProvider::Resend, Some(server.base_url())),
        "key_test".to_string(),
    );
    client.send(message()).await.expect("send");

    mock.assert_async().await;
}

#[actix_web::test]
async fn sendgrid_error_status_is_reported() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v3/mail/send");
            then.status(401).body("bad key");
        })
        .await;

    let client = SendgridMailClient::new(
        &settings(MailProvider::Sendgrid, Some(server.base_url())),
        "key_test".to_string(),
    );
    let err = client.send(message()).await.unwrap_err();

    mock.assert_async().await;
    match err {
        MailError::Provider {
            provider,
            status,
            body,
        } => {
            assert_eq!(provider, "sendgrid");
            assert_eq!(status, 401);
            assert_eq!(body, "bad key");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[actix_web::test]
async fn message_without_body_is_refused() {
    let client = create_mail_client(&settings(MailProvider::Log, None)).expect("log client");
    let err = client
        .send(EmailMessage::new("ana@trueke.test", "Hola"))
        .await
        .unwrap_err();
    assert!(matches!(err, MailError::EmptyBody));
}

#[test]
fn api_providers_need_a_key() {
    let mut no_key = settings(MailProvider::Resend, None);
    no_key.api_key = None;
    assert!(matches!(
        create_mail_client(&no_key),
        Err(MailError::Config(_))
    ));

    let smtp = settings(MailProvider::Smtp, None);
    assert!(matches!(create_mail_client(&smtp), Err(MailError::Config(_))));

    let client = create_mail_client(&settings(MailProvider::Sendgrid, None)).expect("client");
    assert_eq!(client.provider(), "sendgrid");
    assert_eq!(client.from_email(), "hola@trueke.test");
}

#[test]
fn templates_mention_the_subject_matter() {
    let (subject, html, text) = templates::product_expiry("Bicicleta", 1, "https://trueke.test");
    assert!(subject.contains("Bicicleta"));
    assert!(html.contains("https://trueke.test"));
    assert!(text.contains("Bicicleta"));

    let (_, html, _) = templates::test_email("resend");
    assert!(html.contains("resend"));
}
