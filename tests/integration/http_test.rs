//! REST tests for `HttpBackend` against a local axum server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use fleet_probe::config::{Credentials, ServerConfig};
use fleet_probe::error::{ResolutionError, SubmissionError};
use fleet_probe::fleet::{
    Campaign, FleetBackend, HostRecord, HostResolver, HostStatus, HttpBackend, QuerySubmitter,
    Session,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const LOGIN: &str = "/api/v1/kolide/login";
const HOSTS: &str = "/api/v1/kolide/hosts";
const RUN: &str = "/api/v1/kolide/queries/run";

/// Serves `router` on an ephemeral port and returns a config pointing at it.
async fn serve(router: Router) -> ServerConfig {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    ServerConfig {
        url: Some(format!("http://127.0.0.1:{port}")),
        ..Default::default()
    }
}

fn host(name: &str, id: u64) -> Value {
    json!({"hostname": name, "id": id, "status": "online"})
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Host listing that honours `page` / `per_page` and records the pages asked for.
fn paged_hosts(hosts: Vec<Value>, pages: Arc<Mutex<Vec<u32>>>) -> Router {
    Router::new().route(
        HOSTS,
        get(move |Query(params): Query<HashMap<String, u32>>| async move {
            let page = params.get("page").copied().unwrap_or(0);
            let per_page = params.get("per_page").copied().unwrap_or(u32::MAX) as usize;
            pages.lock().unwrap().push(page);

            let start = (page as usize).saturating_mul(per_page).min(hosts.len());
            let end = start.saturating_add(per_page).min(hosts.len());
            Json(json!({"hosts": hosts[start..end]}))
        }),
    )
}

/// A response whose headers arrive but whose body never does.
fn stalled() -> Response {
    Response::new(Body::from_stream(futures::stream::pending::<
        Result<String, std::io::Error>,
    >()))
}

#[tokio::test]
async fn test_login_returns_token() {
    let router = Router::new().route(
        LOGIN,
        post(|Json(body): Json<Value>| async move {
            if body["username"] == "admin" && body["password"] == "secret" {
                (StatusCode::OK, Json(json!({"token": "tok-1"})))
            } else {
                (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad"})))
            }
        }),
    );
    let backend = HttpBackend::new(&serve(router).await).unwrap();

    let token = backend.login(&Credentials::new("admin", "secret")).await;
    assert_eq!(token, Ok("tok-1".to_string()));

    let err = backend
        .login(&Credentials::new("admin", "wrong"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_login_without_token_fails() {
    let router = Router::new()
        .route(LOGIN, post(|| async { Json(json!({})) }))
        .route("/empty/login", post(|| async { Json(json!({"token": ""})) }));
    let config = serve(router).await;
    let backend = HttpBackend::new(&config).unwrap();

    let err = backend
        .login(&Credentials::new("admin", "secret"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no token"));

    let empty = HttpBackend::new(&ServerConfig {
        api_prefix: "/empty".to_string(),
        ..config
    })
    .unwrap();
    let err = empty
        .login(&Credentials::new("admin", "secret"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no token"));
}

#[tokio::test]
async fn test_rejected_token_reports_status() {
    let router = Router::new().route(
        HOSTS,
        get(|headers: HeaderMap| async move {
            match bearer(&headers) {
                Some("good") => (StatusCode::OK, Json(json!({"hosts": [host("host1", 42)]}))),
                _ => (StatusCode::UNAUTHORIZED, Json(json!({"message": "denied"}))),
            }
        }),
    );
    let backend = HttpBackend::new(&serve(router).await).unwrap();

    let session = Session::with_token("local", "stale");
    let err = HostResolver::new(&backend, &session)
        .resolve("host1")
        .await
        .unwrap_err();
    assert_eq!(err, ResolutionError::Status(401));
    assert_eq!(
        err.to_string(),
        "cannot get data from Fleet with provided token: status: 401"
    );

    let session = Session::with_token("local", "good");
    assert_eq!(
        HostResolver::new(&backend, &session).resolve("HOST1").await,
        Ok(42)
    );
}

#[tokio::test]
async fn test_odd_host_record_does_not_hide_others() {
    let router = Router::new().route(
        HOSTS,
        get(|| async {
            Json(json!({"hosts": [
                {"hostname": null, "id": "1", "status": null},
                host("host1", 42),
            ]}))
        }),
    );
    let backend = HttpBackend::new(&serve(router).await).unwrap();
    let session = Session::with_token("local", "tok");

    assert_eq!(
        HostResolver::new(&backend, &session).resolve("host1").await,
        Ok(42)
    );
}

#[tokio::test]
async fn test_two_page_listing() {
    let pages = Arc::new(Mutex::new(Vec::new()));
    let hosts = vec![host("a", 1), host("b", 2), host("c", 3)];
    let config = serve(paged_hosts(hosts, pages.clone())).await;
    let backend = HttpBackend::new(&ServerConfig {
        hosts_per_page: Some(2),
        ..config
    })
    .unwrap();

    let listed = backend.list_hosts("tok").await.unwrap();

    assert_eq!(
        listed,
        vec![
            HostRecord::new("a", 1, HostStatus::Online),
            HostRecord::new("b", 2, HostStatus::Online),
            HostRecord::new("c", 3, HostStatus::Online),
        ]
    );
    assert_eq!(*pages.lock().unwrap(), vec![0, 1]);
}

#[tokio::test]
async fn test_listing_of_exact_pages_ends_on_empty_page() {
    let pages = Arc::new(Mutex::new(Vec::new()));
    let hosts = vec![host("a", 1), host("b", 2), host("c", 3), host("d", 4)];
    let config = serve(paged_hosts(hosts, pages.clone())).await;
    let backend = HttpBackend::new(&ServerConfig {
        hosts_per_page: Some(2),
        ..config
    })
    .unwrap();

    assert_eq!(backend.list_hosts("tok").await.unwrap().len(), 4);
    assert_eq!(*pages.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_server_ignoring_paging() {
    let requests = Arc::new(Mutex::new(0));
    let counter = requests.clone();
    let router = Router::new().route(
        HOSTS,
        get(move || async move {
            *counter.lock().unwrap() += 1;
            Json(json!({"hosts": [host("a", 1), host("b", 2), host("c", 3)]}))
        }),
    );
    let config = serve(router).await;
    let backend = HttpBackend::new(&ServerConfig {
        hosts_per_page: Some(2),
        ..config
    })
    .unwrap();

    let listed = backend.list_hosts("tok").await.unwrap();

    assert_eq!(listed.len(), 3);
    assert_eq!(*requests.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_run_query_posts_selection() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let seen = received.clone();
    let router = Router::new().route(
        RUN,
        post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
            seen.lock()
                .unwrap()
                .push((bearer(&headers).map(str::to_string), body));
            Json(json!({"campaign": {"id": 7}}))
        }),
    );
    let backend = HttpBackend::new(&serve(router).await).unwrap();
    let session = Session::with_token("local", "tok");

    let campaign = QuerySubmitter::new(&backend, &session)
        .submit(42, "SELECT 1")
        .await;

    assert_eq!(campaign, Campaign::Id(7));
    assert_eq!(
        *received.lock().unwrap(),
        vec![(
            Some("tok".to_string()),
            json!({"query": "SELECT 1", "selected": {"hosts": [42], "labels": []}})
        )]
    );
}

#[tokio::test]
async fn test_error_status_body_is_still_read() {
    let router = Router::new().route(
        RUN,
        post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"message": "no hosts targeted"})),
            )
        }),
    );
    let backend = HttpBackend::new(&serve(router).await).unwrap();

    let body = backend.run_query("tok", 42, "SELECT 1").await.unwrap();
    assert_eq!(body, json!({"message": "no hosts targeted"}));

    let session = Session::with_token("local", "tok");
    let err = QuerySubmitter::new(&backend, &session)
        .try_submit(42, "SELECT 1")
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_stalled_body_is_unreachable() {
    let router = Router::new()
        .route(HOSTS, get(|| async { stalled() }))
        .route(RUN, post(|| async { stalled() }));
    let config = serve(router).await;
    let backend = HttpBackend::new(&ServerConfig {
        request_timeout_secs: 1,
        ..config
    })
    .unwrap();

    assert_eq!(
        backend.list_hosts("tok").await,
        Err(ResolutionError::Unreachable)
    );
    assert_eq!(
        backend.run_query("tok", 42, "SELECT 1").await,
        Err(SubmissionError::Unreachable)
    );
}
