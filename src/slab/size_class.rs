//! Chunk size classes for the buffer manager

/// Calculate power-of-two chunk sizes between `min_size` and `max_size`
///
/// `min_size` is rounded up to the next power of two. Returns an empty
/// vector when nothing fits, e.g. `min_size > max_size`.
pub fn calculate_size_classes(min_size: usize, max_size: usize) -> Vec<usize> {
    let mut classes = Vec::new();
    let mut current = min_size.max(1).next_power_of_two();

    while current <= max_size {
        classes.push(current);
        current = match current.checked_mul(2) {
            Some(next) => next,
            None => break,
        };
    }

    classes
}

/// Pick the chunk size for a buffer expected to hold `expected` bytes
///
/// Chooses the largest class that is not larger than `expected`, so at most
/// one chunk of the buffer is left partially filled. Unknown (zero) or tiny
/// sizes map to the smallest class. `classes` must be sorted ascending and
/// non-empty.
pub fn select_class(classes: &[usize], expected: usize) -> usize {
    debug_assert!(!classes.is_empty());
    classes
        .iter()
        .rev()
        .copied()
        .find(|&size| size <= expected)
        .unwrap_or(classes[0])
}
