#![allow(clippy::unwrap_used, clippy::expect_used)]

//! The axum adapter: routes per mount, bearer credentials, status mapping.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use record_access::{
    AuthnMode, InMemoryStore, RecordAccessConfig, RecordApiBuilder, SecurityModel,
    StaticAuthnConfig, StaticTokenAuthenticator,
};
use recordkit_schema::{ObjectType, TypeNode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

const INSTITUTION: &str = "0190a5f0-0000-7000-8000-00000000000a";

async fn app() -> Router {
    let store = Arc::new(InMemoryStore::default());
    let authn = Arc::new(StaticTokenAuthenticator::from_config(&StaticAuthnConfig {
        mode: AuthnMode::AcceptAll,
        ..StaticAuthnConfig::default()
    }));
    let note = ObjectType::builder()
        .field("id", TypeNode::identifier())
        .field("user_id", TypeNode::identifier())
        .field("title", TypeNode::string())
        .build_node();
    let client = ObjectType::builder()
        .field("id", TypeNode::identifier())
        .field("institution_id", TypeNode::identifier())
        .field("name", TypeNode::string())
        .build_node();

    let api = RecordApiBuilder::new(store, authn, RecordAccessConfig::default())
        .register("note", &note)
        .unwrap()
        .register("client", &client)
        .unwrap()
        .mount("note", &[], vec![SecurityModel::ownership("note")])
        .unwrap()
        .mount(
            "client",
            &["institution"],
            vec![SecurityModel::open_access("client")],
        )
        .unwrap()
        .build()
        .await
        .unwrap();
    record_access::router(&api)
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn layered_collection_supports_crud() {
    let app = app().await;
    let base = format!("/institution/{INSTITUTION}/client");

    let (status, body) = send(
        &app,
        request(Method::POST, &base, None, Some(json!({"name": "Ada"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["institution_id"], json!(INSTITUTION));
    let id = body["data"]["id"].as_str().unwrap().to_owned();

    let (status, body) = send(&app, request(Method::GET, &format!("{base}?name=Ada"), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let item = format!("{base}/{id}");
    let (status, body) = send(
        &app,
        request(Method::PUT, &item, None, Some(json!({"name": "Ada L."}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], json!("Ada L."));

    let (status, _) = send(&app, request(Method::DELETE, &item, None, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request(Method::GET, &item, None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"data": null}));
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let app = app().await;

    let (status, body) = send(&app, request(Method::GET, "/note?colour=red", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("colour"));

    let (status, body) = send(&app, request(Method::GET, "/note", None, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"error": "Access denied"}));

    let (status, _) = send(
        &app,
        request(Method::GET, "/institution/not-a-uuid/client", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/note")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn bearer_token_identifies_the_owner() {
    let app = app().await;
    // accept_all maps every token to the default (nil) subject.
    let owner = Uuid::nil().to_string();

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/note",
            Some("any-token"),
            Some(json!({"user_id": owner, "title": "hello"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_owned();

    let (status, body) = send(
        &app,
        request(Method::GET, &format!("/note/{id}"), Some("any-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], json!("hello"));

    let (status, _) = send(&app, request(Method::GET, &format!("/note/{id}"), None, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
