//! Order model, status graph and business rules.

mod model;
mod payment;
mod pricing;
mod status;
mod validation;
mod value_objects;

pub use model::{Order, OrderBuilder};
pub use payment::{DEFAULT_PAYMENT_METHOD, PaymentInfo, PaymentStatus};
pub use pricing::{PriceOverrides, PricingPolicy, Totals};
pub use status::{OrderPriority, OrderStatus};
pub use validation::{ValidationFailure, ValidationRule, validate};
pub use value_objects::{Address, CustomerId, Money, OrderItem, ProductId};
