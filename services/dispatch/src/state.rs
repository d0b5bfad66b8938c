//! Application state shared across handlers

use std::sync::Arc;

use url::Url;

use crate::{service::DispatchService, throttle::ScanThrottle};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: DispatchService,
    pub throttle: ScanThrottle,
    /// Base for scan links; taken from the request when unset
    pub public_base_url: Option<Url>,
    pub conceal_reuse: bool,
    /// Throttle on the first `X-Forwarded-For` hop instead of the peer address
    pub trust_forwarded: bool,
    /// Enables the direct enqueue route when set
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(service: DispatchService, throttle: ScanThrottle) -> Self {
        Self {
            service,
            throttle,
            public_base_url: None,
            conceal_reuse: false,
            trust_forwarded: false,
            admin_token: None,
        }
    }

    pub fn with_public_base_url(mut self, url: Option<Url>) -> Self {
        self.public_base_url = url;
        self
    }

    pub fn with_conceal_reuse(mut self, conceal_reuse: bool) -> Self {
        self.conceal_reuse = conceal_reuse;
        self
    }

    pub fn with_trust_forwarded(mut self, trust_forwarded: bool) -> Self {
        self.trust_forwarded = trust_forwarded;
        self
    }

    pub fn with_admin_token(mut self, token: Option<&str>) -> Self {
        self.admin_token = token.map(Arc::from);
        self
    }
}
