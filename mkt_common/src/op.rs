/// Implements a `std::ops` trait for a single-field tuple newtype, such as [`crate::Cents`], by forwarding to the
/// inner value.
///
/// For `Cents` the inner value is an `i64` count of cents, so the generated operators carry `i64` semantics: they
/// panic on overflow in debug builds and wrap in release builds. They are only used on amounts that are already
/// bounded by checkout validation. Sums of untrusted amounts use `Cents::checked_add` and friends.
///
/// ```ignore
/// op!(binary Cents, Add, add);         // Cents + Cents
/// op!(inplace Cents, AddAssign, add_assign);
/// op!(unary Cents, Neg, neg);          // -Cents
/// ```
#[macro_export]
macro_rules! op {
    (binary $newtype:ident, $trait:ident, $method:ident) => {
        impl $trait for $newtype {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(self.0.$method(rhs.0))
            }
        }
    };

    (inplace $newtype:ident, $trait:ident, $method:ident) => {
        impl $trait for $newtype {
            fn $method(&mut self, rhs: Self) {
                self.0.$method(rhs.0)
            }
        }
    };

    (unary $newtype:ident, $trait:ident, $method:ident) => {
        impl $trait for $newtype {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(self.0.$method())
            }
        }
    };
}
