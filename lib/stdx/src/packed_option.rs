//! `Option<T>` without the extra discriminant.
//!
//! Entity references are `u32` indices. Storing them as `Option<Block>` in every block of the
//! graph would double the size of those fields, so one value of the index space (`u32::MAX`) is
//! reserved to mean "no entity" instead.

use core::fmt;
use core::mem;

/// A type with one value that is never produced by regular construction.
pub trait ReservedValue {
    fn reserved_value() -> Self;
    fn is_reserved_value(&self) -> bool;
}

/// Same layout as `T`, but can hold "nothing" in the form of the reserved value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PackedOption<T: ReservedValue>(T);

impl<T: ReservedValue> PackedOption<T> {
    #[inline]
    pub fn is_none(&self) -> bool {
        self.0.is_reserved_value()
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    #[inline]
    pub fn expand(self) -> Option<T> {
        (!self.is_none()).then_some(self.0)
    }

    #[inline]
    pub fn unwrap_or(self, default: T) -> T {
        self.expand().unwrap_or(default)
    }

    /// Holds a value equal to `val`.
    #[inline]
    pub fn is(self, val: T) -> bool
    where
        T: PartialEq,
    {
        self.expand().map_or(false, |it| it == val)
    }

    #[inline]
    pub fn take(&mut self) -> Option<T> {
        mem::take(self).expand()
    }
}

impl<T: ReservedValue> Default for PackedOption<T> {
    fn default() -> Self {
        PackedOption(T::reserved_value())
    }
}

impl<T: ReservedValue> From<T> for PackedOption<T> {
    fn from(val: T) -> Self {
        debug_assert!(!val.is_reserved_value(), "the reserved value can not be packed");
        PackedOption(val)
    }
}

impl<T: ReservedValue> From<Option<T>> for PackedOption<T> {
    fn from(val: Option<T>) -> Self {
        val.map_or_else(Self::default, Self::from)
    }
}

impl<T: ReservedValue> From<PackedOption<T>> for Option<T> {
    fn from(val: PackedOption<T>) -> Self {
        val.expand()
    }
}

impl<T: ReservedValue + fmt::Debug> fmt::Debug for PackedOption<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "None")
        } else {
            f.debug_tuple("Some").field(&self.0).finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Name(String);

    impl ReservedValue for Name {
        fn reserved_value() -> Self {
            Name(String::new())
        }

        fn is_reserved_value(&self) -> bool {
            self.0.is_empty()
        }
    }

    #[test]
    fn debug_does_not_need_copy() {
        let some = PackedOption::from(Name("bb0".to_owned()));
        assert_eq!(format!("{some:?}"), r#"Some(Name("bb0"))"#);
        let none: PackedOption<Name> = None.into();
        assert_eq!(format!("{none:?}"), "None");
    }

    #[test]
    fn take_leaves_none() {
        let mut val = PackedOption::from(Name("l1".to_owned()));
        assert_eq!(val.take(), Some(Name("l1".to_owned())));
        assert!(val.is_none());
        assert_eq!(val.take(), None);
    }
}
