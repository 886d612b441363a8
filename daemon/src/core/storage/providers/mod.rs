mod balance;
mod payment_request;
mod redemption;
mod transaction;
mod unit_of_work;

pub use balance::*;
pub use payment_request::*;
pub use redemption::*;
pub use transaction::*;
pub use unit_of_work::*;
