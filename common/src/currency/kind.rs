use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Currency discriminator. Exactly two kinds exist; the synthetic "auto"
/// label accepted by the consume API is resolved at the request edge and
/// never reaches this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Paid,
    Free,
}

#[derive(Debug, Error)]
#[error("Unknown currency kind '{0}'")]
pub struct UnknownKind(pub String);

impl Kind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Kind::Paid => "paid",
            Kind::Free => "free",
        }
    }
}

impl FromStr for Kind {
    type Err = UnknownKind;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "paid" => Ok(Kind::Paid),
            "free" => Ok(Kind::Free),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
