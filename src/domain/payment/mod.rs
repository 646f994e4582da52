//! Payment domain module.
//!
//! Payment lifecycle, transition table, and webhook event model.
//!
//! # Module Structure
//!
//! - `aggregate` - Payment aggregate entity
//! - `status` - PaymentStatus state machine and PaymentMethod
//! - `transition` - Transition table and guarded-transition shapes
//! - `order_status` - Projection of payment status onto the order
//! - `gateway_event` - Provider-neutral verified webhook event
//! - `money` - Minor-unit amounts and currencies

mod aggregate;
mod errors;
mod gateway_event;
mod money;
mod order_status;
mod status;
mod transition;
mod webhook_errors;

pub use aggregate::Payment;
pub use errors::PaymentError;
pub use gateway_event::{EventTransition, GatewayEvent, WebhookAction};
pub use money::{Currency, Money};
pub use order_status::OrderPaymentStatus;
pub use status::{PaymentMethod, PaymentStatus};
pub use transition::{
    effective_sources, GatewayResponseEntry, PaymentLookup, TransitionFields, TransitionOutcome,
    TransitionTrigger,
};
pub use webhook_errors::WebhookError;
