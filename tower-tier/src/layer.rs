use std::sync::Arc;

use http::HeaderName;
use tower::Layer;

use crate::gateway::AdmissionGateway;
use crate::service::AdmissionService;

/// Header carrying the caller's credential unless configured otherwise.
pub const DEFAULT_CREDENTIAL_HEADER: HeaderName = HeaderName::from_static("x-api-key");

/// Applies tiered admission control to HTTP requests.
#[derive(Debug, Clone)]
pub struct AdmissionLayer {
    gateway: Arc<AdmissionGateway>,
    credential_header: HeaderName,
}

impl AdmissionLayer {
    /// Create an AdmissionLayer
    pub fn new(gateway: AdmissionGateway) -> Self {
        Self::from_shared(Arc::new(gateway))
    }

    /// Create an AdmissionLayer around a gateway that is shared elsewhere.
    pub fn from_shared(gateway: Arc<AdmissionGateway>) -> Self {
        Self {
            gateway,
            credential_header: DEFAULT_CREDENTIAL_HEADER,
        }
    }

    /// Read the credential from `header` instead of `x-api-key`.
    pub fn with_credential_header(mut self, header: HeaderName) -> Self {
        self.credential_header = header;
        self
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService::new(inner, self.gateway.clone(), self.credential_header.clone())
    }
}
