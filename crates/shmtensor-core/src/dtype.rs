//! Element type definitions
//!
//! The discriminator stored in shared memory is the element byte size, so
//! `Int` and `Float` publish the same code. Clients can only check what the
//! server published; a 4-byte/4-byte confusion is undetectable by design.

/// Supported element types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Bool,
    Int,
    Float,
    Double,
}

impl DType {
    /// Size in bytes; doubles as the on-memory discriminator
    pub const fn size(&self) -> usize {
        match self {
            DType::Bool => 1,
            DType::Int | DType::Float => 4,
            DType::Double => 8,
        }
    }
}

mod private {
    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Scalar types that can live in a shared tensor segment.
///
/// Sealed: the set is fixed by the wire discriminator, adding a type here
/// without widening the discriminator would break cross-process checks.
pub trait Element: private::Sealed + Copy + Default + PartialEq + Send + 'static {
    const DTYPE: DType;
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;
}

impl Element for i32 {
    const DTYPE: DType = DType::Int;
}

impl Element for f32 {
    const DTYPE: DType = DType::Float;
}

impl Element for f64 {
    const DTYPE: DType = DType::Double;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminator_is_element_size() {
        assert_eq!(DType::Bool.size(), std::mem::size_of::<bool>());
        assert_eq!(DType::Int.size(), std::mem::size_of::<i32>());
        assert_eq!(DType::Float.size(), std::mem::size_of::<f32>());
        assert_eq!(DType::Double.size(), std::mem::size_of::<f64>());
    }

    #[test]
    fn int_and_float_share_a_code() {
        assert_eq!(DType::Int.size(), DType::Float.size());
    }
}
