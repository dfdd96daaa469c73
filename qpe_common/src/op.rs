//! Operator boilerplate for transparent numeric newtypes.
//!
//! `op!(binary Cents, Add, add)` expands to the obvious `impl Add for Cents` that delegates to the inner value.
//! The `inplace` and `unary` forms cover the `*Assign` traits and `Neg` respectively. The relevant `std::ops` trait
//! must be in scope at the call site.

#[macro_export]
macro_rules! op {
    (binary $t:ty, $trait:ident, $method:ident) => {
        impl $trait for $t {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(self.0.$method(rhs.0))
            }
        }
    };
    (inplace $t:ty, $trait:ident, $method:ident) => {
        impl $trait for $t {
            fn $method(&mut self, rhs: Self) {
                self.0.$method(rhs.0);
            }
        }
    };
    (unary $t:ty, $trait:ident, $method:ident) => {
        impl $trait for $t {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(self.0.$method())
            }
        }
    };
}
