use crate::domain::account::UserId;
use crate::domain::payment::PaymentState;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorefrontError>;

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },
    #[error("Product {0} not found")]
    ProductNotFound(u32),
    #[error("Product {0} is out of stock")]
    OutOfStock(u32),
    #[error("Only {available} of product {product_id} available")]
    QuantityExceeded { product_id: u32, available: u32 },
    #[error("Product {0} is not in the cart")]
    NotInCart(u32),
    #[error("Cart is empty")]
    EmptyCart,
    #[error("User {user_id} already has an active payment {payment_id}")]
    DuplicateActivePayment { user_id: UserId, payment_id: String },
    #[error("Payment {payment_id} is {state}")]
    InvalidState {
        payment_id: String,
        state: PaymentState,
    },
    #[error("Payment {0} not found")]
    NotFound(String),
    #[error("User {0} has no active payment")]
    NoActivePayment(UserId),
    #[error("User {0} is not an admin")]
    Unauthorized(UserId),
    #[error("Amount must be between {min} and {max}")]
    AmountOutOfRange { min: Decimal, max: Decimal },
    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),
}

impl StorefrontError {
    pub fn persistence<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::PersistenceFailure(err.into())
    }

    /// True for the outcomes a losing racer sees once another caller has
    /// already moved the payment out of the state it expected.
    pub fn is_already_handled(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::InvalidState { .. })
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for StorefrontError {
    fn from(err: rocksdb::Error) -> Self {
        Self::persistence(err)
    }
}

/// Failure reported by a notification backend. Never affects payment state.
#[derive(Error, Debug)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);
