mod common;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{
        Request, StatusCode,
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    },
};
use common::TestDb;
use fluent_flow::{
    api::{
        self,
        handlers::auth::{AuthConfig, AuthState},
    },
    email::{DeliveryReceipt, EmailDispatcher, EmailMessage, EmailTransport, Sender},
    identity::adapter,
};
use secrecy::SecretString;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use url::Url;

#[derive(Debug, Default)]
struct Outbox {
    messages: Mutex<Vec<EmailMessage>>,
}

impl Outbox {
    fn last(&self) -> Option<EmailMessage> {
        self.messages.lock().ok()?.last().cloned()
    }

    fn all(&self) -> Vec<EmailMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EmailTransport for Outbox {
    async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt> {
        self.messages
            .lock()
            .map_err(|_| anyhow!("outbox poisoned"))?
            .push(message.clone());
        Ok(DeliveryReceipt {
            message_id: "outbox".to_string(),
        })
    }
}

fn app(db: &TestDb, outbox: Arc<Outbox>) -> Result<axum::Router> {
    let config = AuthConfig::new(
        Url::parse("http://localhost:8080")?,
        SecretString::from("integration-secret".to_string()),
    );
    let dispatcher = EmailDispatcher::new(
        Sender::new("fluent-flow", "noreply@fluent-flow.dev"),
        outbox,
    );
    let state = Arc::new(AuthState::new(config, dispatcher));
    Ok(api::app(db.pool.clone(), state))
}

fn link_from(message: &EmailMessage) -> Result<Url> {
    let line = message
        .text
        .lines()
        .find(|line| line.starts_with("http"))
        .context("no link in sign-in email")?;
    Ok(Url::parse(line)?)
}

async fn request_link(app: &axum::Router, email: &str) -> Result<StatusCode> {
    let body = serde_json::json!({ "email": email, "callbackUrl": "/dashboard" });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/signin/email")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
        )
        .await?;
    Ok(response.status())
}

async fn follow_link(app: &axum::Router, link: &Url) -> Result<axum::response::Response> {
    let uri = match link.query() {
        Some(query) => format!("{}?{query}", link.path()),
        None => link.path().to_string(),
    };
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty())?)
        .await?;
    Ok(response)
}

#[tokio::test]
async fn email_sign_in_round_trip() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let outbox = Arc::new(Outbox::default());
    let app = app(&db, outbox.clone())?;

    assert_eq!(
        request_link(&app, "  Ivan@Example.com ").await?,
        StatusCode::NO_CONTENT
    );
    let message = outbox.last().context("no email sent")?;
    assert_eq!(message.to, "ivan@example.com");
    assert_eq!(message.subject, "Sign in to localhost");

    let link = link_from(&message)?;
    let response = follow_link(&app, &link).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("http://localhost:8080/dashboard")
    );
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .context("no session cookie")?
        .to_string();
    assert!(cookie.starts_with("authjs.session-token="));

    let user = adapter::get_user_by_email(&db.pool, "ivan@example.com")
        .await?
        .context("user not created")?;
    assert!(user.email_verified.is_some());
    let owner = adapter::get_user_by_account(&db.pool, "email", "ivan@example.com").await?;
    assert_eq!(owner.map(|owner| owner.id), Some(user.id));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .header(COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    let session: Value = serde_json::from_slice(&body)?;
    assert_eq!(session["user"]["email"], "ivan@example.com");
    assert!(session.get("sessionToken").is_none());
    assert!(session.get("session_token").is_none());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/signout")
                .header(COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .header(COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    Ok(())
}

#[tokio::test]
async fn sign_in_link_works_once() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let outbox = Arc::new(Outbox::default());
    let app = app(&db, outbox.clone())?;

    assert_eq!(
        request_link(&app, "judy@example.com").await?,
        StatusCode::NO_CONTENT
    );
    let link = link_from(&outbox.last().context("no email sent")?)?;

    assert_eq!(
        follow_link(&app, &link).await?.status(),
        StatusCode::SEE_OTHER
    );
    assert_eq!(
        follow_link(&app, &link).await?.status(),
        StatusCode::BAD_REQUEST
    );

    Ok(())
}

#[tokio::test]
async fn returning_user_keeps_identity() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let outbox = Arc::new(Outbox::default());
    let app = app(&db, outbox.clone())?;

    let mut seen = Vec::new();
    for _ in 0..2 {
        request_link(&app, "mallory@example.com").await?;
        let link = link_from(&outbox.last().context("no email sent")?)?;
        assert_eq!(
            follow_link(&app, &link).await?.status(),
            StatusCode::SEE_OTHER
        );
        let user = adapter::get_user_by_email(&db.pool, "mallory@example.com")
            .await?
            .context("user not created")?;
        seen.push(user.id);
    }
    assert_eq!(seen[0], seen[1]);

    Ok(())
}

#[tokio::test]
async fn concurrent_first_sign_ins_share_one_user() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let outbox = Arc::new(Outbox::default());
    let app = app(&db, outbox.clone())?;

    for _ in 0..2 {
        assert_eq!(
            request_link(&app, "trent@example.com").await?,
            StatusCode::NO_CONTENT
        );
    }
    let links = outbox
        .all()
        .iter()
        .map(link_from)
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(links.len(), 2);

    let (first, second) = tokio::join!(
        follow_link(&app, &links[0]),
        follow_link(&app, &links[1])
    );
    assert_eq!(first?.status(), StatusCode::SEE_OTHER);
    assert_eq!(second?.status(), StatusCode::SEE_OTHER);

    let users: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user" WHERE email = $1"#)
        .bind("trent@example.com")
        .fetch_one(&db.pool)
        .await?;
    assert_eq!(users, 1);
    let user = adapter::get_user_by_account(&db.pool, "email", "trent@example.com")
        .await?
        .context("email account not linked")?;
    assert_eq!(user.email.as_deref(), Some("trent@example.com"));

    Ok(())
}
