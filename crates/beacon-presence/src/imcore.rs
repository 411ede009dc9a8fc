//! HTTP client for the IM core's management API.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use beacon_types::api::OnlineStatusResp;
use beacon_types::directory::{CmdRequest, ImCore};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpImCore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpImCore {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build IM core HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: serde::Serialize + ?Sized>(&self, path: &str, body: &B) -> anyhow::Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} returned {}: {}", path, status, text);
        }
        Ok(resp)
    }
}

#[async_trait]
impl ImCore for HttpImCore {
    async fn online_status(&self, uids: &[String]) -> anyhow::Result<Vec<OnlineStatusResp>> {
        let resp = self.post("/user/onlinestatus", uids).await?;
        let statuses: Vec<OnlineStatusResp> = resp.json().await.context("bad onlinestatus response")?;
        debug!(asked = uids.len(), online = statuses.len(), "IM core online status");
        Ok(statuses)
    }

    async fn send_cmd(&self, req: CmdRequest) -> anyhow::Result<()> {
        self.post("/message/send", &req.into_send_request()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use beacon_types::models::DeviceFlag;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn online_status_posts_uids() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let s = seen.clone();
        let router = Router::new().route(
            "/user/onlinestatus",
            post(move |axum::Json(uids): axum::Json<Vec<String>>| async move {
                s.lock().unwrap().extend(uids);
                axum::Json(serde_json::json!([
                    {"uid": "u1", "device_flag": 1, "last_offline": 0, "online": 1}
                ]))
            }),
        );
        let im = HttpImCore::new(&serve(router).await).unwrap();

        let got = im.online_status(&["u1".into(), "u2".into()]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].device_flag, DeviceFlag::WEB);
        assert_eq!(*seen.lock().unwrap(), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn send_cmd_wraps_and_checks_status() {
        let bodies: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
        let b = bodies.clone();
        let router = Router::new().route(
            "/message/send",
            post(move |axum::Json(v): axum::Json<serde_json::Value>| async move {
                b.lock().unwrap().push(v);
                StatusCode::OK
            }),
        );
        let im = HttpImCore::new(&serve(router).await).unwrap();

        im.send_cmd(CmdRequest {
            no_persist: true,
            from_uid: String::new(),
            channel_id: String::new(),
            channel_type: 0,
            subscribers: vec!["f1".into()],
            cmd: "onlineStatus".into(),
            param: serde_json::json!({"uid": "u1"}),
        })
        .await
        .unwrap();

        let sent = bodies.lock().unwrap();
        assert_eq!(sent[0]["subscribers"][0], "f1");
        assert_eq!(sent[0]["header"]["sync_once"], 1);
    }

    #[tokio::test]
    async fn non_success_is_an_error() {
        let router = Router::new().route("/user/onlinestatus", post(|| async { StatusCode::BAD_GATEWAY }));
        let im = HttpImCore::new(&serve(router).await).unwrap();
        assert!(im.online_status(&["u1".into()]).await.is_err());
    }
}
