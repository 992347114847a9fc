use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use futures::future::BoxFuture;
use http::HeaderName;
use http::Request;
use http::Response;
use tower::Service;

use crate::error::Rejection;
use crate::gateway::AdmissionGateway;

#[derive(Debug, Clone)]
pub struct AdmissionService<S> {
    inner: S,
    gateway: Arc<AdmissionGateway>,
    credential_header: HeaderName,
}

impl<S> AdmissionService<S> {
    pub fn new(inner: S, gateway: Arc<AdmissionGateway>, credential_header: HeaderName) -> Self {
        Self {
            inner,
            gateway,
            credential_header,
        }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AdmissionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // Keep the instance that was driven to readiness for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gateway = self.gateway.clone();

        // Credentials that are not valid text are treated as absent.
        let credential = req
            .headers()
            .get(&self.credential_header)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        Box::pin(async move {
            let endpoint = req.uri().path().to_owned();
            let decision = gateway.decide(credential.as_deref(), &endpoint).await;

            if let Some(rejection) = Rejection::from_decision(&decision) {
                return Ok(rejection.to_response());
            }

            req.extensions_mut().insert(decision.clone());
            let mut response = inner.call(req).await?;
            decision.annotate(response.headers_mut());
            Ok(response)
        })
    }
}
