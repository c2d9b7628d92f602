// tests/common/mod.rs

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{Value, json};
use skillswap::{
    config::{Config, StorageBackend},
    models::user::{NewUser, Role},
    routes,
    state::AppState,
    store::{MemoryStore, Store, UserStore},
    utils::hash::hash_password,
};

pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub address: String,
    pub store: Arc<dyn Store>,
    pub client: reqwest::Client,
}

/// Spawns the app on a random port against a fresh in-memory store.
pub async fn spawn_app() -> TestApp {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    let config = Config {
        storage: StorageBackend::Memory,
        database_url: None,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        cors_origins: vec!["http://localhost:3000".to_string()],
        admin_email: None,
        admin_password: None,
        admin_name: None,
    };

    let app = routes::create_router(AppState::new(store.clone(), config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        client: reqwest::Client::new(),
    }
}

pub fn unique_email(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}@example.com", prefix, &id[..8])
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Registers a public user offering and wanting the given skills.
    /// Returns `(user_id, token)`.
    pub async fn register(&self, name: &str, offered: &[&str], wanted: &[&str]) -> (i64, String) {
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "name": name,
                "email": unique_email(&name.to_lowercase()),
                "password": PASSWORD,
                "skillsOffered": offered,
                "skillsWanted": wanted,
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);

        let body: Value = response.json().await.unwrap();
        (
            body["user"]["id"].as_i64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    /// Creates an admin straight through the store, then logs in over HTTP.
    pub async fn admin(&self) -> (i64, String) {
        let email = unique_email("admin");
        let admin = self
            .store
            .create_user(NewUser {
                name: "Admin".to_string(),
                email: email.clone(),
                password_hash: hash_password(PASSWORD).unwrap(),
                location: None,
                skills_offered: vec![],
                skills_wanted: vec![],
                availability: vec![],
                is_public: false,
                role: Role::Admin,
            })
            .await
            .unwrap();

        let token = self.login(&email, PASSWORD).await;
        (admin.id, token)
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 200);

        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    /// Sends a swap request and returns the raw response.
    pub async fn send_swap(&self, token: &str, to: i64, offered: &str, requested: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/swaps"))
            .bearer_auth(token)
            .json(&json!({
                "toUserId": to,
                "offeredSkill": offered,
                "requestedSkill": requested,
                "message": "Let's trade!",
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Sends a swap request that must succeed; returns its id.
    pub async fn create_swap(&self, token: &str, to: i64, offered: &str, requested: &str) -> i64 {
        let response = self.send_swap(token, to, offered, requested).await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        body["id"].as_i64().unwrap()
    }

    pub async fn put(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, token: Option<&str>, path: &str) -> reqwest::Response {
        let request = self.client.get(self.url(path));
        let request = match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request.send().await.expect("Failed to execute request")
    }
}
