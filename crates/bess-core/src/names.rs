//! Interned module name, mirroring the teacher's `NodeName` wrapper over
//! `Cow<'static, str>` rather than raw `String`. The attribute-side
//! counterpart, `AttrName`, lives in `bess-metadata` next to `AttrDesc`
//! (the type that actually carries one) rather than here, since this
//! crate depends on `bess-metadata`, not the other way around.

use std::borrow::Cow;
use std::fmt;

macro_rules! interned_name {
    ($name:ident) => {
        /// Interned name, cheap to clone.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Cow<'static, str>);

        impl $name {
            /// Borrows the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&'static str> for $name {
            fn from(s: &'static str) -> Self {
                Self(Cow::Borrowed(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(Cow::Owned(s))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

interned_name!(ModuleName);
