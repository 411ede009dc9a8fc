pub mod devices;
pub mod error;
pub mod ingress;
pub mod login;
pub mod middleware;
pub mod online;
pub mod qrlogin;
pub mod rpc;
pub mod state;
pub mod webhook;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use crate::middleware::require_auth;
use crate::rpc::WebhookGrpcHandler;
use crate::rpc::webhook_service_server::WebhookServiceServer;
use crate::state::AppState;

/// All routes, without the outer CORS and trace layers.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/v1/webhook", post(webhook::webhook))
        .route("/v2/webhook", post(webhook::webhook))
        .route("/v1/webhook/message/notify", post(webhook::message_notify))
        .route("/v1/user/loginuuid", get(login::login_uuid))
        .route("/v1/user/loginstatus", get(login::login_status))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/v1/user/device_token",
            post(devices::register_device_token).delete(devices::unregister_device_token),
        )
        .route("/v1/user/device_badge", put(devices::set_device_badge))
        .route("/v1/user/grant_login", post(login::grant_login))
        .route("/v1/users/online", post(online::users_online))
        .route("/v1/users/online/count", get(online::online_count))
        .route("/v1/users/{uid}/devices/{flag}/online", get(online::device_online))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

/// The gRPC webhook service, served on its own listener.
pub fn grpc_service(state: AppState) -> WebhookServiceServer<WebhookGrpcHandler> {
    WebhookServiceServer::new(WebhookGrpcHandler::new(state))
}
