//! Named storage keys.
//!
//! Facades accept any `AsRef<str>` as a key. [`storage_keys!`] declares an enum
//! of well-known keys so call sites don't pass raw string literals around.

/// Declare an enum of storage keys, each variant bound to its stored name.
///
/// # Example
/// ```rust
/// use keystash_core::storage_keys;
///
/// storage_keys! {
///     pub enum AppKey {
///         Environment = "environment",
///         LaunchCount = "launch_count",
///     }
/// }
///
/// assert_eq!(AppKey::Environment.as_str(), "environment");
/// assert_eq!(AppKey::LaunchCount.as_ref(), "launch_count");
/// ```
#[macro_export]
macro_rules! storage_keys {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident = $key:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),+
        }

        impl $name {
            /// Name this key is stored under.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $key),+
                }
            }
        }

        impl ::core::convert::AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
