pub mod app;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod orders;
pub mod payment_handlers;
pub mod pricing;
pub mod refund_handlers;
pub mod refunds;
pub mod settlement;
pub mod stock;
pub mod stock_handlers;
pub mod webhook_handlers;

pub use app::{build_router, AppState};
pub use error::{CheckoutError, CoreResult};
pub use gateway::{HttpGateway, PaymentGateway, StubGateway};
