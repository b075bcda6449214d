#![allow(dead_code)]

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use atelier::config::{AppConfig, ObjectStoreConfig, StorageBackendKind};
use atelier::infra::{db::Db, storage::MediaStore};
use atelier::{http, AppState};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "test-admin-password";

// Test-only key material; never used outside the test harness.
pub const TEST_SESSION_KEY: [u8; 32] = [7u8; 32];
pub const TEST_TOKEN_KEY: [u8; 32] = [9u8; 32];

// ---------------------------------------------------------------------------
// TestApp — fresh instance per test, isolated temp dir and database
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub root: PathBuf,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body_bytes: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn body(&self) -> &[u8] {
        &self.body_bytes
    }

    pub fn message(&self) -> String {
        self.json()["message"].as_str().unwrap_or("").to_string()
    }

    /// The `sid=<value>` pair from Set-Cookie, ready for a Cookie header.
    pub fn session_cookie(&self) -> Option<String> {
        let raw = self.headers.get("set-cookie")?.to_str().ok()?;
        let pair = raw.split(';').next()?.trim();
        pair.starts_with("sid=").then(|| pair.to_string())
    }
}

/// Credentials from a successful login; either field authorizes alone.
pub struct AdminCreds {
    pub token: String,
    pub cookie: String,
}

pub struct MultipartField<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let root = std::env::temp_dir().join(format!("atelier-test-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&root)
            .await
            .expect("failed to create test dir");

        let mut config = AppConfig {
            http_addr: "127.0.0.1:0".to_string(),
            database_path: root.join("test.db").to_string_lossy().into_owned(),
            uploads_dir: root.join("uploads"),
            storage_backend: StorageBackendKind::Local,
            object_store: ObjectStoreConfig::default(),
            admin_username: ADMIN_USERNAME.to_string(),
            admin_password: ADMIN_PASSWORD.to_string(),
            session_key: TEST_SESSION_KEY,
            token_key: TEST_TOKEN_KEY,
            session_ttl_hours: 24,
            image_max_bytes: 3 * 1024 * 1024,
            video_max_bytes: 50 * 1024 * 1024,
            rate_limit_window_seconds: 900,
            // High enough that ordinary tests never trip it.
            rate_limit_max_requests: 100_000,
            db_max_connections: 5,
        };
        customize(&mut config);

        let db = Db::connect(&config).await.expect("Db::connect failed");
        db.migrate().await.expect("migrate failed");
        let store = MediaStore::from_config(&config);
        let state = AppState::from_parts(&config, db, store);
        let router = http::router(state.clone());

        TestApp {
            router,
            state,
            root,
        }
    }

    // ------------------------------------------------------------------
    // Low-level request helpers
    // ------------------------------------------------------------------

    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        body: Body,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");
        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let mut request = builder.body(body).expect("failed to build request");

        // Inject ConnectInfo so the IP rate limiter can extract it.
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))));

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            body_bytes,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        match body {
            Some(body) => {
                let mut all = headers.to_vec();
                all.push(("content-type", "application/json"));
                self.request_raw(
                    method,
                    path,
                    Body::from(serde_json::to_string(&body).unwrap()),
                    &all,
                )
                .await
            }
            None => self.request_raw(method, path, Body::empty(), headers).await,
        }
    }

    pub async fn get(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.request(Method::GET, path, None, headers).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request(Method::POST, path, Some(body), headers).await
    }

    pub async fn put_json(
        &self,
        path: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request(Method::PUT, path, Some(body), headers).await
    }

    pub async fn delete(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.request(Method::DELETE, path, None, headers).await
    }

    pub async fn delete_json(
        &self,
        path: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request(Method::DELETE, path, Some(body), headers)
            .await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        fields: &[MultipartField<'_>],
        headers: &[(&str, &str)],
    ) -> TestResponse {
        const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

        let mut body = Vec::new();
        for field in fields {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match field.filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        field.name, filename
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n", field.name)
                        .as_bytes(),
                ),
            }
            if let Some(content_type) = field.content_type {
                body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(field.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let content_type = format!("multipart/form-data; boundary={}", BOUNDARY);
        let mut all = headers.to_vec();
        all.push(("content-type", content_type.as_str()));

        self.request_raw(Method::POST, path, Body::from(body), &all)
            .await
    }

    // ------------------------------------------------------------------
    // Flow helpers
    // ------------------------------------------------------------------

    pub async fn login_admin(&self) -> AdminCreds {
        let resp = self
            .post_json(
                "/auth/login",
                json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }),
                &[],
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK, "admin login failed");

        let token = resp.json()["token"].as_str().unwrap().to_string();
        let cookie = resp.session_cookie().expect("login did not set a cookie");
        AdminCreds { token, cookie }
    }

    /// Upload through the real multipart endpoint, authorized by token.
    pub async fn upload(
        &self,
        token: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
        section: &str,
        media_type: &str,
        title: &str,
        description: &str,
    ) -> TestResponse {
        let auth = format!("Bearer {}", token);
        self.post_multipart(
            "/media/upload",
            &[
                MultipartField {
                    name: "file",
                    filename: Some(filename),
                    content_type: Some(content_type),
                    data,
                },
                MultipartField {
                    name: "section",
                    filename: None,
                    content_type: None,
                    data: section.as_bytes(),
                },
                MultipartField {
                    name: "mediaType",
                    filename: None,
                    content_type: None,
                    data: media_type.as_bytes(),
                },
                MultipartField {
                    name: "title",
                    filename: None,
                    content_type: None,
                    data: title.as_bytes(),
                },
                MultipartField {
                    name: "description",
                    filename: None,
                    content_type: None,
                    data: description.as_bytes(),
                },
            ],
            &[("authorization", auth.as_str())],
        )
        .await
    }

    /// Insert a media row directly, bypassing the upload flow. The
    /// timestamp offset controls listing order in tests.
    pub async fn create_media(
        &self,
        section: &str,
        media_type: &str,
        file_size: i64,
        minutes_ago: i64,
    ) -> i64 {
        let stamp = OffsetDateTime::now_utc() - Duration::minutes(minutes_ago);
        let extension = if media_type == "video" { "mp4" } else { "png" };
        let filename = format!("{}.{}", Uuid::new_v4(), extension);
        let mime_type = if media_type == "video" {
            "video/mp4"
        } else {
            "image/png"
        };

        let result = sqlx::query(
            "INSERT INTO media (filename, original_name, title, description, section, \
             media_type, file_size, mime_type, provider_url, upload_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)",
        )
        .bind(&filename)
        .bind(format!("original-{}", filename))
        .bind("Seeded title")
        .bind("Seeded description")
        .bind(section)
        .bind(media_type)
        .bind(file_size)
        .bind(mime_type)
        .bind(stamp)
        .bind(stamp)
        .bind(stamp)
        .execute(self.state.db.pool())
        .await
        .expect("insert test media failed");

        result.last_insert_rowid()
    }

    /// Number of files currently sitting under the uploads directory.
    pub async fn stored_blob_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.state.uploads_dir.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let file_type = entry.file_type().await.expect("file_type failed");
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else {
                    count += 1;
                }
            }
        }
        count
    }
}
