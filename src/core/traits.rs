//! Core element traits for gtmat.

use std::fmt::Debug;
use std::ops::AddAssign;

use num_traits::Zero;

/// Datatype tag carried by a matrix handle, one per supported element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F32,
    F64,
    I32,
    I64,
    U32,
    U64,
}

impl ElementType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            ElementType::F32 | ElementType::I32 | ElementType::U32 => 4,
            ElementType::F64 | ElementType::I64 | ElementType::U64 => 8,
        }
    }
}

/// Element of a distributed matrix.
///
/// `Accumulate` needs element-wise addition, `Replace` only a copy.
pub trait Scalar: Copy + Send + Sync + Debug + PartialEq + Zero + AddAssign + 'static {
    /// Datatype tag describing `Self` to a transport.
    const ELEMENT_TYPE: ElementType;
}

macro_rules! scalar_impl {
    ($($t:ty => $tag:ident),* $(,)?) => {
        $(
            impl Scalar for $t {
                const ELEMENT_TYPE: ElementType = ElementType::$tag;
            }
        )*
    };
}

scalar_impl! {
    f32 => F32,
    f64 => F64,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
}

/// Remote update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOp {
    /// Element-wise sum into the destination, atomic per element.
    Accumulate,
    /// Overwrite of the destination; concurrent writers must be serialized by the caller.
    Replace,
}

impl UpdateOp {
    /// Combine a source element into a destination element.
    #[inline]
    pub fn apply<T: Scalar>(self, dst: &mut T, src: T) {
        match self {
            UpdateOp::Accumulate => *dst += src,
            UpdateOp::Replace => *dst = src,
        }
    }
}

/// Whether a block update is issued immediately or queued for a batch drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Blocking,
    Batch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_sizes_match_rust_types() {
        assert_eq!(<f64 as Scalar>::ELEMENT_TYPE.size(), std::mem::size_of::<f64>());
        assert_eq!(<f32 as Scalar>::ELEMENT_TYPE.size(), std::mem::size_of::<f32>());
        assert_eq!(<i32 as Scalar>::ELEMENT_TYPE.size(), std::mem::size_of::<i32>());
        assert_eq!(<u64 as Scalar>::ELEMENT_TYPE.size(), std::mem::size_of::<u64>());
    }

    #[test]
    fn update_op_apply() {
        let mut x = 2.0f64;
        UpdateOp::Accumulate.apply(&mut x, 3.0);
        assert_eq!(x, 5.0);
        UpdateOp::Replace.apply(&mut x, 7.0);
        assert_eq!(x, 7.0);
    }
}
