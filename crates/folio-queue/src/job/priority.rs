//! Job priority levels.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Priority of a job within its type's queue.
///
/// Higher levels dequeue first; jobs of equal priority dequeue in
/// submission order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobPriority {
    Low = 1,
    #[default]
    Normal = 5,
    High = 10,
    Critical = 15,
}

impl JobPriority {
    /// Returns the numeric level of this priority.
    #[inline]
    pub const fn level(self) -> u8 {
        self as u8
    }
}
