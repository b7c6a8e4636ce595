use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::errors::AppError;

const USERS_ME_ROUTE: &str = "wp-json/wp/v2/users/me";

#[derive(Debug, Clone, serde::Serialize)]
pub struct CachedLogin {
    pub created: i64,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UsersMeResponse {
    name: Option<String>,
    roles: Option<Vec<String>>,
}

/// Credential validator delegating to the external user service.
///
/// Successful logins are cached in-process under sha256(username‖password)
/// for a configured number of minutes, so hot API paths do not hammer the
/// upstream on every request.
pub struct UserService {
    http: reqwest::Client,
    url: Option<String>,
    expire_minutes: i64,
    cache: Mutex<HashMap<String, CachedLogin>>,
}

fn now_epoch() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

fn cache_key(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

impl UserService {
    pub fn new(config: &AppConfig) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.auth_timeout())
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap_or_default();
        Arc::new(Self {
            http,
            url: config.wordpress.url.clone(),
            expire_minutes: config.wordpress.login_expire,
            cache: Mutex::new(HashMap::new()),
        })
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        admin: bool,
    ) -> Result<Vec<String>, AppError> {
        let Some(base) = self.url.as_deref() else {
            return Err(AppError::Unauthorized("User service is not configured".into()));
        };
        if username.is_empty() || password.is_empty() {
            return Err(AppError::Unauthorized("Missing credentials".into()));
        }

        let endpoint = format!("{}/{}", base.trim_end_matches('/'), USERS_ME_ROUTE);
        let response = self
            .http
            .get(&endpoint)
            .query(&[("context", "edit")])
            .basic_auth(username, Some(password))
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!("Failed to authenticate user {} upstream", username);
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        }

        let body: UsersMeResponse = response.json().await?;
        // Fail closed on responses without a roles list, whoever asked.
        let Some(roles) = body.roles else {
            tracing::warn!("Upstream response for {} carried no roles list", username);
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        };
        let valid = if admin {
            roles.iter().any(|r| r == "administrator")
        } else {
            body.name.as_deref() == Some(username)
        };
        if !valid {
            return Err(AppError::Unauthorized("Insufficient privileges".into()));
        }
        Ok(roles)
    }

    async fn check(&self, username: &str, password: &str, admin: bool) -> Result<(), AppError> {
        let key = cache_key(username, password);
        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&key) {
                if entry.created > now_epoch() - 60 * self.expire_minutes {
                    if !admin || entry.roles.iter().any(|r| r == "administrator") {
                        return Ok(());
                    }
                }
            }
        }

        let roles = self.authenticate(username, password, admin).await?;
        self.cache
            .lock()
            .await
            .insert(key, CachedLogin { created: now_epoch(), roles });
        Ok(())
    }

    /// Validate plain user credentials.
    pub async fn check_user(&self, username: &str, password: &str) -> Result<(), AppError> {
        self.check(username, password, false).await
    }

    /// Validate credentials and require the administrator role.
    pub async fn check_admin(&self, username: &str, password: &str) -> Result<(), AppError> {
        self.check(username, password, true).await
    }

    /// Snapshot of the login cache for the admin endpoint. Keys are hashes;
    /// no credential material leaves the process.
    pub async fn online_users(&self) -> HashMap<String, CachedLogin> {
        self.cache.lock().await.clone()
    }

    pub async fn logout_all(&self) {
        self.cache.lock().await.clear();
    }

    #[cfg(test)]
    pub(crate) async fn seed_login(&self, username: &str, password: &str, roles: Vec<String>) {
        self.cache.lock().await.insert(
            cache_key(username, password),
            CachedLogin { created: now_epoch(), roles },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(url: Option<&str>) -> Arc<UserService> {
        let mut cfg = AppConfig::from_env();
        cfg.wordpress.url = url.map(String::from);
        cfg.wordpress.login_expire = 15;
        UserService::new(&cfg)
    }

    #[tokio::test]
    async fn unconfigured_service_rejects() {
        let svc = service(None);
        assert!(svc.check_user("alice", "pw").await.is_err());
    }

    #[tokio::test]
    async fn cached_login_skips_the_upstream() {
        // No reachable upstream, but the cache satisfies the check.
        let svc = service(Some("http://127.0.0.1:1"));
        svc.seed_login("alice", "pw", vec!["subscriber".into()]).await;

        assert!(svc.check_user("alice", "pw").await.is_ok());
        // Admin requires the administrator role even when cached.
        assert!(svc.check_admin("alice", "pw").await.is_err());

        svc.seed_login("root", "pw", vec!["administrator".into()]).await;
        assert!(svc.check_admin("root", "pw").await.is_ok());

        svc.logout_all().await;
        assert!(svc.check_user("alice", "pw").await.is_err());
    }

    #[tokio::test]
    async fn response_without_roles_is_rejected_even_for_plain_users() {
        use axum::{Json, Router, routing::get};

        // Upstream that authenticates but never returns a roles list.
        let app = Router::new().route(
            "/wp-json/wp/v2/users/me",
            get(|| async { Json(serde_json::json!({"name": "alice"})) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let svc = service(Some(&format!("http://{addr}")));
        assert!(svc.check_user("alice", "pw").await.is_err());
        assert!(svc.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn cache_keys_do_not_leak_credentials() {
        let svc = service(Some("http://127.0.0.1:1"));
        svc.seed_login("alice", "hunter2", vec![]).await;
        for key in svc.online_users().await.keys() {
            assert!(!key.contains("alice"));
            assert!(!key.contains("hunter2"));
            assert_eq!(key.len(), 64);
        }
    }
}
