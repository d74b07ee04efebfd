//! Attribute descriptors, spec §3 ("Attribute descriptor").

use std::borrow::Cow;
use std::fmt;

/// Interned attribute name, mirroring the teacher's `PortName` wrapper over
/// `Cow<'static, str>` (see `bess_core::ModuleName` for the module-side
/// counterpart; that one lives in `bess-core` since this crate can't
/// depend back on it).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrName(Cow<'static, str>);

impl AttrName {
    /// Borrows the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for AttrName {
    fn from(s: &'static str) -> Self {
        Self(Cow::Borrowed(s))
    }
}

impl From<String> for AttrName {
    fn from(s: String) -> Self {
        Self(Cow::Owned(s))
    }
}

impl fmt::Display for AttrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access mode a module declares for one of its attributes.
///
/// `Update` counts as both a read and a write for scope-analysis purposes
/// (spec §3): it behaves like `Read` when looked up by a downstream reader
/// and like `Write` when looked up by an upstream writer search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrMode {
    /// The module only reads this attribute.
    Read,
    /// The module only writes this attribute.
    Write,
    /// The module both reads and writes this attribute.
    Update,
}

impl AttrMode {
    /// True if a downstream scan should treat this declaration as a reader.
    #[must_use]
    pub fn reads(self) -> bool {
        matches!(self, AttrMode::Read | AttrMode::Update)
    }

    /// True if an upstream scan should treat this declaration as a writer.
    #[must_use]
    pub fn writes(self) -> bool {
        matches!(self, AttrMode::Write | AttrMode::Update)
    }
}

/// A single attribute a module declares it reads and/or writes.
///
/// At most [`crate::descriptor::MAX_ATTRS_PER_MODULE`]-worth of these may be
/// declared per module (enforced by the caller, e.g. `bess-core`'s module
/// registration path, not by this type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrDesc {
    /// Interned attribute name; scope components are keyed by this plus size.
    pub name: AttrName,
    /// Size in bytes, `1..=32` (spec §3).
    pub size: u8,
    /// Access mode.
    pub mode: AttrMode,
}

/// Per-module attribute budget (spec §3, `MAX_ATTRS_PER_MODULE`).
pub const MAX_ATTRS_PER_MODULE: usize = 16;

impl AttrDesc {
    /// Creates a new attribute descriptor.
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0 or greater than 32; these are static,
    /// programmer-supplied module declarations, not runtime input, so a
    /// panic (rather than a `Result`) matches how the teacher's `const`
    /// descriptor tables are built.
    #[must_use]
    pub fn new(name: impl Into<AttrName>, size: u8, mode: AttrMode) -> Self {
        assert!((1..=32).contains(&size), "attribute size must be 1..=32 bytes");
        Self {
            name: name.into(),
            size,
            mode,
        }
    }
}
