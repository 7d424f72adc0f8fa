pub mod amount;
pub mod currency;

pub use amount::{parse_amount, round2};
pub use currency::Currency;
