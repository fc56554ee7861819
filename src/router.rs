//! Route selection across the registered settlement adapters.

use std::sync::Arc;

use crate::protocols::{PaymentContext, ProtocolAdapter};
use crate::types::Route;

pub struct PaymentRouter {
    adapters: Vec<Arc<dyn ProtocolAdapter>>,
}

impl PaymentRouter {
    pub fn new(adapters: Vec<Arc<dyn ProtocolAdapter>>) -> Self {
        PaymentRouter { adapters }
    }

    pub fn adapter_for(&self, route: Route) -> Option<&Arc<dyn ProtocolAdapter>> {
        self.adapters.iter().find(|adapter| adapter.route() == route)
    }

    /// Picks the adapter for a request. An explicit method hint wins when
    /// its adapter accepts the request; a hint the adapter cannot serve
    /// falls back to the scan rather than failing the payment.
    pub fn detect(&self, ctx: &PaymentContext<'_>) -> Option<&Arc<dyn ProtocolAdapter>> {
        if let Some(hint) = ctx.request.method {
            if let Some(adapter) = self.adapter_for(hint) {
                if adapter.can_handle(ctx) {
                    return Some(adapter);
                }
            }
        }
        self.adapters.iter().find(|adapter| adapter.can_handle(ctx))
    }

    pub fn detect_route(&self, ctx: &PaymentContext<'_>) -> Option<Route> {
        self.detect(ctx).map(|adapter| adapter.route())
    }
}
