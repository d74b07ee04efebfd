use std::fmt;

/// Resolved byte offset for one `(module, attribute)` pair, or a sentinel
/// explaining why no offset could be assigned (spec §3, "Attribute offset
/// table"; §6, "Sentinels").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    /// A valid, non-negative byte offset into the metadata scratch region.
    Assigned(u16),
    /// Reader with no live writer upstream.
    NoRead,
    /// Writer whose value is never read downstream.
    NoWrite,
    /// Assigning this attribute would require more than `METADATA_TOTAL` bytes.
    NoSpace,
}

impl Offset {
    /// Returns the assigned byte offset, if any.
    #[must_use]
    pub fn assigned(self) -> Option<u16> {
        match self {
            Offset::Assigned(o) => Some(o),
            _ => None,
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::Assigned(o) => write!(f, "{o}"),
            Offset::NoRead => write!(f, "NO_READ"),
            Offset::NoWrite => write!(f, "NO_WRITE"),
            Offset::NoSpace => write!(f, "NO_SPACE"),
        }
    }
}
