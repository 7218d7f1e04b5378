//! The most basic objects of the optimizer: bit sequences, selections,
//! atomic operations, memory orderings, and assignments.

pub mod bitseq;
pub mod ordering;
pub mod selection;

pub use bitseq::{Bitseq, BitseqError};
pub use ordering::{AtomicOp, Ordering, OrderingTable};
pub use selection::Selection;

/// An assignment pairs a bit sequence with the selection of operations it
/// encodes. For ordering selections the sequence carries two bits per
/// operation, for binary selections one bit per operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub bs: Bitseq,
    pub sel: Selection,
}

impl Assignment {
    pub fn new(bs: Bitseq, sel: Selection) -> Self {
        Self { bs, sel }
    }
}
