//! gRPC flavour of the webhook (`wkhook.WebhookService`), for IM cores
//! configured to call us over RPC instead of JSON.

use tonic::{Request, Response, Status};
use tracing::{debug, error};

use crate::ingress::IngressError;
use crate::state::AppState;

#[derive(Clone, PartialEq, prost::Message)]
pub struct EventReq {
    #[prost(string, tag = "1")]
    pub event: String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EventStatus {
    Success = 0,
    Fail = 1,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EventResp {
    #[prost(enumeration = "EventStatus", tag = "1")]
    pub status: i32,
}

#[derive(Clone)]
pub struct WebhookGrpcHandler {
    state: AppState,
}

impl WebhookGrpcHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl webhook_service_server::WebhookService for WebhookGrpcHandler {
    async fn send_webhook(&self, request: Request<EventReq>) -> Result<Response<EventResp>, Status> {
        let req = request.into_inner();
        debug!(event = %req.event, data = %String::from_utf8_lossy(&req.data), "Webhook event over gRPC");

        self.state.ingress.handle(&req.event, &req.data).await.map_err(|e| {
            error!(event = %req.event, "Failed to handle gRPC webhook event: {}", e);
            to_status(&e)
        })?;

        Ok(Response::new(EventResp {
            status: EventStatus::Success as i32,
        }))
    }
}

fn to_status(err: &IngressError) -> Status {
    match err {
        IngressError::Decode { .. } | IngressError::Dispatch(_) => Status::invalid_argument(err.to_string()),
        IngressError::Storage(_) => Status::internal(err.to_string()),
    }
}

/// Server side of `wkhook.WebhookService`, laid out the way tonic's
/// codegen emits it.
pub mod webhook_service_server {
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use tonic::codegen::{Body, BoxFuture, Service, StdError, http};

    use super::{EventReq, EventResp};

    pub const SERVICE_NAME: &str = "wkhook.WebhookService";
    pub const SEND_WEBHOOK_PATH: &str = "/wkhook.WebhookService/SendWebhook";

    #[tonic::async_trait]
    pub trait WebhookService: Send + Sync + 'static {
        async fn send_webhook(
            &self,
            request: tonic::Request<EventReq>,
        ) -> Result<tonic::Response<EventResp>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct WebhookServiceServer<T> {
        inner: Arc<T>,
    }

    impl<T> WebhookServiceServer<T> {
        pub fn new(inner: T) -> Self {
            Self { inner: Arc::new(inner) }
        }
    }

    impl<T> Clone for WebhookServiceServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }

    struct SendWebhookSvc<T>(Arc<T>);

    impl<T: WebhookService> tonic::server::UnaryService<EventReq> for SendWebhookSvc<T> {
        type Response = EventResp;
        type Future = BoxFuture<tonic::Response<EventResp>, tonic::Status>;

        fn call(&mut self, request: tonic::Request<EventReq>) -> Self::Future {
            let inner = Arc::clone(&self.0);
            Box::pin(async move { inner.send_webhook(request).await })
        }
    }

    impl<T, B> Service<http::Request<B>> for WebhookServiceServer<T>
    where
        T: WebhookService,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::Body>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            if req.uri().path() != SEND_WEBHOOK_PATH {
                return Box::pin(async move {
                    let mut response = http::Response::new(tonic::body::Body::default());
                    let headers = response.headers_mut();
                    headers.insert(tonic::Status::GRPC_STATUS, (tonic::Code::Unimplemented as i32).into());
                    headers.insert(http::header::CONTENT_TYPE, tonic::metadata::GRPC_CONTENT_TYPE);
                    Ok(response)
                });
            }

            let inner = self.inner.clone();
            Box::pin(async move {
                let mut grpc = tonic::server::Grpc::new(tonic_prost::ProstCodec::default());
                Ok(grpc.unary(SendWebhookSvc(inner), req).await)
            })
        }
    }

    impl<T> tonic::server::NamedService for WebhookServiceServer<T> {
        const NAME: &'static str = SERVICE_NAME;
    }
}
