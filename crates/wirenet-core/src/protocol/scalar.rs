//! Fixed-layout values that can be pushed onto and popped off a message body.
//!
//! A [`Scalar`] always occupies exactly [`Scalar::SIZE`] bytes and is written
//! little-endian. Only plain values implement it: integers, floats, `bool`,
//! `char`, and fixed-size arrays of other scalars. References, raw pointers,
//! `Vec`, `String` and any other owning type have no implementation, so trying
//! to push one through the fixed-layout path is rejected by the compiler.
//!
//! Applications add support for their own plain structs by implementing the
//! trait field by field:
//!
//! ```rust
//! use bytes::{Buf, BufMut};
//! use wirenet_core::Scalar;
//!
//! #[derive(Debug, Clone, Copy, PartialEq)]
//! struct Position {
//!     x: f32,
//!     y: f32,
//! }
//!
//! impl Scalar for Position {
//!     const SIZE: usize = 8;
//!
//!     fn put<B: BufMut>(&self, buf: &mut B) {
//!         self.x.put(buf);
//!         self.y.put(buf);
//!     }
//!
//!     fn get<B: Buf>(buf: &mut B) -> Self {
//!         let x = f32::get(buf);
//!         let y = f32::get(buf);
//!         Self { x, y }
//!     }
//! }
//! ```

use bytes::{Buf, BufMut};

/// A trivially copyable value with a fixed wire width.
pub trait Scalar: Copy + Sized {
    /// Number of bytes the value occupies in a message body.
    const SIZE: usize;

    /// Writes exactly [`Self::SIZE`] bytes to `buf`.
    fn put<B: BufMut>(&self, buf: &mut B);

    /// Reads exactly [`Self::SIZE`] bytes from `buf`.
    ///
    /// Callers guarantee that at least `SIZE` bytes are available.
    fn get<B: Buf>(buf: &mut B) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn put<B: BufMut>(&self, buf: &mut B) {
                    buf.$put(*self);
                }

                fn get<B: Buf>(buf: &mut B) -> Self {
                    buf.$get()
                }
            }
        )*
    };
}

impl_scalar! {
    u8 => put_u8, get_u8;
    i8 => put_i8, get_i8;
    u16 => put_u16_le, get_u16_le;
    i16 => put_i16_le, get_i16_le;
    u32 => put_u32_le, get_u32_le;
    i32 => put_i32_le, get_i32_le;
    u64 => put_u64_le, get_u64_le;
    i64 => put_i64_le, get_i64_le;
    u128 => put_u128_le, get_u128_le;
    i128 => put_i128_le, get_i128_le;
    f32 => put_f32_le, get_f32_le;
    f64 => put_f64_le, get_f64_le;
}

impl Scalar for bool {
    const SIZE: usize = 1;

    fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(u8::from(*self));
    }

    fn get<B: Buf>(buf: &mut B) -> Self {
        buf.get_u8() != 0
    }
}

impl Scalar for char {
    const SIZE: usize = 4;

    fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(u32::from(*self));
    }

    fn get<B: Buf>(buf: &mut B) -> Self {
        char::from_u32(buf.get_u32_le()).unwrap_or(char::REPLACEMENT_CHARACTER)
    }
}

// usize/isize are pinned to 8 bytes so 32- and 64-bit peers agree on the layout.
impl Scalar for usize {
    const SIZE: usize = 8;

    fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64_le(*self as u64);
    }

    fn get<B: Buf>(buf: &mut B) -> Self {
        buf.get_u64_le() as usize
    }
}

impl Scalar for isize {
    const SIZE: usize = 8;

    fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_i64_le(*self as i64);
    }

    fn get<B: Buf>(buf: &mut B) -> Self {
        buf.get_i64_le() as isize
    }
}

impl<S: Scalar, const N: usize> Scalar for [S; N] {
    const SIZE: usize = S::SIZE * N;

    fn put<B: BufMut>(&self, buf: &mut B) {
        for item in self {
            item.put(buf);
        }
    }

    fn get<B: Buf>(buf: &mut B) -> Self {
        std::array::from_fn(|_| S::get(buf))
    }
}
