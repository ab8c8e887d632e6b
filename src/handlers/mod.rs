pub mod checkout;
pub mod health;

pub use checkout::*;
pub use health::*;
