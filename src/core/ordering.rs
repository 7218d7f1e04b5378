use lazy_static::lazy_static;
use std::collections::HashMap;
use strum::{Display, EnumString};

//
// Public Interface
//

/// Memory ordering of an atomic operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Ordering {
    Invalid,
    Relaxed,
    Acquire,
    Release,
    SeqCst,
}

/// Kinds of memory-access and synchronization operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum AtomicOp {
    Fence,
    RMW,
    Cmpxchg,
    Load,
    Store,
}

impl AtomicOp {
    /// Returns the ordering selected by a two-bit code under the default
    /// table, or `Invalid` when the code is not listed for this operation.
    pub fn ordering_of(self, code: u64) -> Ordering {
        DEFAULT_TABLE.ordering_of(self, code)
    }

    /// Inverse of [`AtomicOp::ordering_of`] under the default table.
    pub fn code_of(self, ordering: Ordering) -> Option<u64> {
        DEFAULT_TABLE.code_of(self, ordering)
    }
}

/// The (operation, two-bit code) → ordering map. The table is plain data so
/// that historical variants can be constructed and swapped in; the default
/// instance shares the four-row map between fences, RMWs and cmpxchgs and
/// drops the codes that loads and stores cannot express.
#[derive(Clone, Debug)]
pub struct OrderingTable {
    rows: HashMap<(AtomicOp, u64), Ordering>,
}

impl OrderingTable {
    pub fn new(rows: &[(AtomicOp, u64, Ordering)]) -> Self {
        Self {
            rows: rows.iter().map(|&(op, code, o)| ((op, code), o)).collect(),
        }
    }

    pub fn ordering_of(&self, op: AtomicOp, code: u64) -> Ordering {
        self.rows
            .get(&(op, code))
            .copied()
            .unwrap_or(Ordering::Invalid)
    }

    pub fn code_of(&self, op: AtomicOp, ordering: Ordering) -> Option<u64> {
        self.rows
            .iter()
            .find(|&(&(o, _), &ord)| o == op && ord == ordering)
            .map(|(&(_, code), _)| code)
    }
}

impl Default for OrderingTable {
    fn default() -> Self {
        use AtomicOp::*;
        use Ordering::*;
        let mut rows = Vec::new();
        for op in [Fence, RMW, Cmpxchg] {
            rows.extend([
                (op, 0b00, Relaxed),
                (op, 0b01, Release),
                (op, 0b10, Acquire),
                (op, 0b11, SeqCst),
            ]);
        }
        rows.extend([
            (Load, 0b00, Relaxed),
            (Load, 0b10, Acquire),
            (Load, 0b11, SeqCst),
        ]);
        rows.extend([
            (Store, 0b00, Relaxed),
            (Store, 0b01, Release),
            (Store, 0b11, SeqCst),
        ]);
        Self::new(&rows)
    }
}

//
// Private Implementation
//

lazy_static! {
    static ref DEFAULT_TABLE: OrderingTable = OrderingTable::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_per_op() {
        use AtomicOp::*;
        use Ordering::*;
        for op in [Fence, RMW, Cmpxchg] {
            assert_eq!(op.ordering_of(0b00), Relaxed);
            assert_eq!(op.ordering_of(0b01), Release);
            assert_eq!(op.ordering_of(0b10), Acquire);
            assert_eq!(op.ordering_of(0b11), SeqCst);
        }
        assert_eq!(Load.ordering_of(0b01), Invalid);
        assert_eq!(Load.ordering_of(0b10), Acquire);
        assert_eq!(Store.ordering_of(0b10), Invalid);
        assert_eq!(Store.ordering_of(0b01), Release);
    }

    #[test]
    fn code_is_inverse() {
        use AtomicOp::*;
        use Ordering::*;
        for (op, codes) in [
            (Fence, vec![0b00, 0b01, 0b10, 0b11]),
            (Load, vec![0b00, 0b10, 0b11]),
            (Store, vec![0b00, 0b01, 0b11]),
        ] {
            for code in codes {
                let o = op.ordering_of(code);
                assert_eq!(op.code_of(o), Some(code));
            }
        }
        assert_eq!(Load.code_of(Release), None);
        assert_eq!(Store.code_of(Acquire), None);
        assert_eq!(RMW.code_of(Invalid), None);
    }
}
