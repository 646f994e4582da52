//! Routes a payment method to its configured gateway.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::payment::{PaymentError, PaymentMethod};
use crate::ports::PaymentGateway;

#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a gateway under the method it reports.
    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.method(), gateway);
        self
    }

    /// # Errors
    ///
    /// `Validation` when no gateway is configured for `method`.
    pub fn get(&self, method: PaymentMethod) -> Result<Arc<dyn PaymentGateway>, PaymentError> {
        self.gateways.get(&method).cloned().ok_or_else(|| {
            PaymentError::validation("method", format!("{} is not enabled", method))
        })
    }

    pub fn methods(&self) -> Vec<PaymentMethod> {
        let mut methods: Vec<_> = self.gateways.keys().copied().collect();
        methods.sort_by_key(|m| m.as_str());
        methods
    }
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockPaymentGateway;

    #[test]
    fn resolves_registered_gateway() {
        let registry = GatewayRegistry::new()
            .with_gateway(Arc::new(MockPaymentGateway::new(PaymentMethod::PayPal)));

        let gateway = registry.get(PaymentMethod::PayPal).unwrap();
        assert_eq!(gateway.method(), PaymentMethod::PayPal);
        assert_eq!(registry.methods(), vec![PaymentMethod::PayPal]);
    }

    #[test]
    fn unconfigured_method_is_a_validation_error() {
        let registry = GatewayRegistry::new();
        match registry.get(PaymentMethod::Stripe) {
            Err(PaymentError::Validation { field, .. }) => assert_eq!(field, "method"),
            other => panic!("Expected validation error, got {:?}", other.map(|_| ())),
        }
    }
}
