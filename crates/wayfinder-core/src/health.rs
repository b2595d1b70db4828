use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outcome of probing an instance's root path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Liveness {
    Alive,
    Unreachable,
}

impl Liveness {
    /// Only a plain 200 counts as alive.
    pub fn from_status(status: u16) -> Self {
        if status == 200 {
            Liveness::Alive
        } else {
            Liveness::Unreachable
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(self, Liveness::Alive)
    }
}
