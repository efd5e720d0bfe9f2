//! Type-erased component columns.
//!
//! Each archetype keeps one [`Column`] per component type. The concrete storage is a
//! [`TypedColumn<T>`] wrapping a `Vec<T>`; the trait object lets the archetype move rows between
//! columns without knowing `T`.

use std::any::{Any, type_name};

use crate::ecs::component::Component;

/// Operations an archetype needs on a column without knowing its element type.
///
/// Row indices passed to these methods must be in bounds; violating that is an invariant bug
/// and panics.
pub trait Column: Any + Send + Sync {
    /// Number of rows.
    fn len(&self) -> usize;

    /// Whether the column has no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated row capacity.
    fn capacity(&self) -> usize;

    /// Reserve space for exactly `additional` more rows.
    fn reserve_exact(&mut self, additional: usize);

    /// Remove `row`, moving the last row into its place, and drop the removed value.
    fn swap_remove_drop(&mut self, row: usize);

    /// Remove `row`, moving the last row into its place, and push the removed value onto `dst`.
    ///
    /// # Panics
    /// Panics if `dst` holds a different element type.
    fn swap_remove_into(&mut self, row: usize, dst: &mut dyn Column);

    /// Move every row of `other` onto the end of this column, leaving `other` empty.
    ///
    /// # Panics
    /// Panics if `other` holds a different element type.
    fn append(&mut self, other: &mut dyn Column);

    /// A new empty column of the same element type.
    fn empty_like(&self, capacity: usize) -> Box<dyn Column>;

    /// A type-erased reference to the value at `row`.
    fn get_any(&self, row: usize) -> Option<&dyn Any>;

    /// Whether `value` holds this column's element type.
    fn accepts(&self, value: &dyn Any) -> bool;

    /// Push a type-erased value, handing it back if the type does not match.
    fn push_any(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>>;

    /// The element type name.
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<'a> dyn Column + 'a {
    /// Downcast to the concrete column type.
    #[inline]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&TypedColumn<T>> {
        self.as_any().downcast_ref()
    }

    /// Downcast to the concrete column type.
    #[inline]
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut TypedColumn<T>> {
        self.as_any_mut().downcast_mut()
    }
}

/// Build an empty column for `T`. Stored as a factory in the type registry.
pub fn new_column<T: Component>(capacity: usize) -> Box<dyn Column> {
    Box::new(TypedColumn::<T>::with_capacity(capacity))
}

/// A column of `T` values.
#[derive(Debug)]
pub struct TypedColumn<T> {
    values: Vec<T>,
}

impl<T> Default for TypedColumn<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<T> TypedColumn<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        self.values.push(value);
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Remove `row`, moving the last value into its place.
    #[inline]
    pub fn swap_remove(&mut self, row: usize) -> T {
        self.values.swap_remove(row)
    }
}

impl<T: Send + Sync + 'static> Column for TypedColumn<T> {
    #[inline]
    fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.values.capacity()
    }

    fn reserve_exact(&mut self, additional: usize) {
        self.values.reserve_exact(additional);
    }

    fn swap_remove_drop(&mut self, row: usize) {
        self.values.swap_remove(row);
    }

    fn swap_remove_into(&mut self, row: usize, dst: &mut dyn Column) {
        let dst = dst
            .downcast_mut::<T>()
            .expect("migration between columns of different types");
        dst.values.push(self.values.swap_remove(row));
    }

    fn append(&mut self, other: &mut dyn Column) {
        let other = other
            .downcast_mut::<T>()
            .expect("append between columns of different types");
        self.values.append(&mut other.values);
    }

    fn empty_like(&self, capacity: usize) -> Box<dyn Column> {
        Box::new(TypedColumn::<T>::with_capacity(capacity))
    }

    fn get_any(&self, row: usize) -> Option<&dyn Any> {
        self.values.get(row).map(|value| value as &dyn Any)
    }

    fn accepts(&self, value: &dyn Any) -> bool {
        value.is::<T>()
    }

    fn push_any(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>> {
        let value = value.downcast::<T>()?;
        self.values.push(*value);
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Dropper(Arc<AtomicUsize>);

    impl Drop for Dropper {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn column_of(values: &[u32]) -> Box<dyn Column> {
        let mut column = TypedColumn::<u32>::with_capacity(values.len());
        for value in values {
            column.push(*value);
        }
        Box::new(column)
    }

    #[test]
    fn swap_remove_into_moves_last_row() {
        // Given
        let mut src = column_of(&[1, 2, 3, 4]);
        let mut dst = src.empty_like(0);

        // When
        src.swap_remove_into(1, dst.as_mut());

        // Then
        assert_eq!(src.downcast_ref::<u32>().unwrap().as_slice(), &[1, 4, 3]);
        assert_eq!(dst.downcast_ref::<u32>().unwrap().as_slice(), &[2]);
    }

    #[test]
    fn swap_remove_drop_drops_value() {
        // Given
        let drops = Arc::new(AtomicUsize::new(0));
        let mut column = TypedColumn::<Dropper>::default();
        column.push(Dropper(Arc::clone(&drops)));
        column.push(Dropper(Arc::clone(&drops)));

        // When
        Column::swap_remove_drop(&mut column, 0);

        // Then
        assert_eq!(drops.load(Ordering::Relaxed), 1);
        assert_eq!(Column::len(&column), 1);
    }

    #[test]
    fn append_drains_other() {
        // Given
        let mut main = column_of(&[1, 2]);
        let mut staged = column_of(&[3, 4, 5]);

        // When
        main.append(staged.as_mut());

        // Then
        assert_eq!(main.downcast_ref::<u32>().unwrap().as_slice(), &[1, 2, 3, 4, 5]);
        assert!(staged.is_empty());
    }

    #[test]
    fn push_any_checks_type() {
        // Given
        let mut column = column_of(&[]);

        // When
        let good = column.push_any(Box::new(7u32));
        let bad = column.push_any(Box::new("seven"));

        // Then
        assert!(good.is_ok());
        assert!(bad.is_err());
        assert_eq!(column.len(), 1);
        assert_eq!(column.get_any(0).unwrap().downcast_ref::<u32>(), Some(&7));
        assert!(column.accepts(&3u32));
        assert!(!column.accepts(&3u64));
    }

    #[test]
    #[should_panic(expected = "different types")]
    fn mismatched_migration_panics() {
        let mut src = column_of(&[1]);
        let mut dst: Box<dyn Column> = Box::new(TypedColumn::<u64>::default());
        src.swap_remove_into(0, dst.as_mut());
    }
}
