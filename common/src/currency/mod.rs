mod balance;
mod entry;
mod kind;
mod metadata;
mod payment;
mod redemption;

pub use balance::*;
pub use entry::*;
pub use kind::*;
pub use metadata::*;
pub use payment::*;
pub use redemption::*;

use serde::{Deserialize, Serialize};

/// One per-kind slice of a priority consume or payment settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionDetail {
    pub kind: Kind,
    pub amount: u64,
    pub balance_before: u64,
    pub balance_after: u64,
}
