use crate::{Extents, Shape};

#[test]
fn test_scalar_shape() {
    let shape = Shape::scalar();
    assert_eq!(shape.rank(), 0);
    assert_eq!(shape.element_count(), 1);
    assert_eq!(shape.offset_of(&[]), Some(0));
}

#[test]
fn test_empty_shape() {
    let shape = Shape::empty();
    assert_eq!(shape.rank(), 1);
    assert_eq!(shape.element_count(), 0);
    assert_eq!(shape.offset_of(&[0]), None);
}

#[test]
fn test_zero_extent_anywhere_empties_shape() {
    assert_eq!(Shape::from([4, 0, 3]).element_count(), 0);
    assert_eq!(Shape::from(vec![7, 2, 1, 0]).element_count(), 0);
}

#[test]
fn test_row_major_strides() {
    let shape = Shape::from([2, 3, 4]);
    assert_eq!(shape.strides().as_slice(), &[12, 4, 1]);
    assert_eq!(shape.offset_of(&[1, 2, 3]), Some(23));
    assert_eq!(shape.offset_of(&[1, 2]), None);
}

#[test]
fn test_extents_impls_agree() {
    let dims = [3usize, 5];
    let shape = Shape::from(dims);
    assert_eq!(dims.element_count(), shape.element_count());
    assert_eq!(vec![3usize, 5].element_count(), 15);
    assert_eq!(dims[..].rank(), 2);
    assert_eq!(Shape::from(&dims[..]), shape);
}
