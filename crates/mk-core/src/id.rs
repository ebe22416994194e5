use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Global string interner for marker and kind ids — fast comparisons, low memory.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// Interned id newtype over a `Spur` index: 4 bytes, Copy, Eq, Hash in O(1).
/// Serializes as the resolved string.
macro_rules! interned_id {
    ($(#[$meta:meta])* $name:ident, display: $fmt:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Spur);

        impl $name {
            /// Intern a string, or return the existing id if already interned.
            pub fn intern(s: &str) -> Self {
                Self(INTERNER.get_or_intern(s))
            }

            /// Resolve back to a string slice.
            pub fn as_str(&self) -> &str {
                INTERNER.resolve(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, $fmt, self.as_str())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, $fmt, self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::intern(&s))
            }
        }
    };
}

interned_id! {
    /// A lightweight, interned identifier for a marker instance.
    MarkerId, display: "#{}"
}

interned_id! {
    /// Interned identifier for a marker *kind* (registry key).
    /// Kind ids are fixed at process start; instances reference them by id.
    KindId, display: "{}"
}

impl MarkerId {
    /// Generate a unique id with a kind prefix (e.g. `rect_1`, `arrow_2`).
    pub fn with_prefix(prefix: &str) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::intern(&format!("{prefix}_{n}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_roundtrip() {
        let a = KindId::intern("rectangle");
        let b = KindId::intern("rectangle");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "rectangle");
    }

    #[test]
    fn prefixed_ids_are_unique() {
        let a = MarkerId::with_prefix("rect");
        let b = MarkerId::with_prefix("rect");
        assert_ne!(a, b);
    }
}
