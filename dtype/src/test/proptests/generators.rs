use crate::*;
use proptest::prelude::*;

pub fn memory_kind() -> impl Strategy<Value = MemoryKind> {
    prop_oneof![Just(MemoryKind::Host), Just(MemoryKind::Device), Just(MemoryKind::Managed)]
}

pub fn scalar_dtype() -> impl Strategy<Value = ScalarDType> {
    prop_oneof![
        Just(ScalarDType::Int8),
        Just(ScalarDType::UInt8),
        Just(ScalarDType::Int16),
        Just(ScalarDType::UInt16),
        Just(ScalarDType::Int32),
        Just(ScalarDType::UInt32),
        Just(ScalarDType::Int64),
        Just(ScalarDType::UInt64),
        Just(ScalarDType::Float32),
        Just(ScalarDType::Float64)
    ]
}

/// Shapes of rank 0 through 4. Extents may be zero.
pub fn shape() -> impl Strategy<Value = Shape> {
    prop::collection::vec(0usize..16, 0..=4).prop_map(Shape::from)
}

/// Shapes of rank 1 through 4 with no zero extents.
pub fn non_empty_shape() -> impl Strategy<Value = Shape> {
    prop::collection::vec(1usize..16, 1..=4).prop_map(Shape::from)
}
