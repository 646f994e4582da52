//! Test doubles for outbound ports.

mod mock_gateway;

pub use mock_gateway::{MethodCall, MockPaymentGateway};
