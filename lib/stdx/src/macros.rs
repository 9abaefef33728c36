//! Boilerplate for the index newtypes of the flow graph.

/// The `From` conversions between an index newtype, its raw integer and `usize` that `TiVec`
/// and `BitSet` need:
///
/// ```rust
/// struct Block(u32);
/// impl_idx_from!(Block(u32));
/// ```
#[macro_export]
macro_rules! impl_idx_from {
    ($ty:ident($raw:ident)) => {
        impl From<$raw> for $ty {
            #[inline(always)]
            fn from(raw: $raw) -> $ty {
                $ty(raw)
            }
        }

        impl From<$ty> for $raw {
            #[inline(always)]
            fn from(idx: $ty) -> $raw {
                idx.0
            }
        }

        impl From<usize> for $ty {
            #[inline(always)]
            fn from(idx: usize) -> $ty {
                ::std::debug_assert!(idx < $raw::MAX as usize, "index space exhausted");
                $ty(idx as $raw)
            }
        }

        impl From<$ty> for usize {
            #[inline(always)]
            fn from(idx: $ty) -> usize {
                idx.0 as usize
            }
        }
    };
}

/// `$raw::MAX` is the reserved value of the newtype, so it fits into a
/// [`PackedOption`](crate::packed_option::PackedOption).
#[macro_export]
macro_rules! impl_reserved_value {
    ($ty:ident($raw:ident)) => {
        impl $crate::packed_option::ReservedValue for $ty {
            #[inline]
            fn reserved_value() -> $ty {
                $ty($raw::MAX)
            }

            #[inline]
            fn is_reserved_value(&self) -> bool {
                self.0 == $raw::MAX
            }
        }
    };
}

/// A `Display` implementation from a list of match arms and format strings:
///
/// ```rust
/// impl_display! {
///     match JumpKind{
///         JumpKind::Always(target) => "jmp {}", target;
///         JumpKind::Return => "return";
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_display {
    ($($args:tt)*) => {
        $crate::impl_fmt!(Display $($args)*);
    };
}

/// [`impl_display`] for both `Debug` and `Display`.
#[macro_export]
macro_rules! impl_debug_display {
    ($($args:tt)*) => {
        $crate::impl_fmt!(Debug $($args)*);
        $crate::impl_fmt!(Display $($args)*);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! impl_fmt {
    ($trait:ident match $ty:ident { $($variant:pat => $fmt:literal $(, $arg:expr)*;)* }) => {
        impl ::std::fmt::$trait for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $($variant => write!(f, $fmt $(, $arg)*),)*
                }
            }
        }
    };
}
