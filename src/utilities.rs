pub mod linalg;
pub mod tensor_index;
pub mod value_table;

use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_OBJECT_ID: AtomicUsize = AtomicUsize::new(0);

/// Process-wide unique id for grids, spaces, bases, quadratures and domains.
pub fn next_object_id() -> usize
{
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}
