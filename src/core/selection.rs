use strum::{Display, EnumString};

//
// Public Interface
//

/// A named class of operations of the target program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Selection {
    /// RMWs + fences + atomic loads + atomic stores.
    Atomic,
    /// Plain loads + plain stores.
    Plain,
    AtomicLoads,
    AtomicStores,
    RMWs,
    Fences,
    PlainLoads,
    PlainStores,
    /// Atomic + plain loads.
    Loads,
    /// Atomic + plain stores.
    Stores,
}

impl Selection {
    /// Expands composite selections to their primitive members; primitives
    /// return themselves.
    pub fn group(self) -> Vec<Selection> {
        match self {
            Selection::Atomic => vec![
                Selection::AtomicLoads,
                Selection::AtomicStores,
                Selection::Fences,
                Selection::RMWs,
            ],
            Selection::Loads => vec![Selection::AtomicLoads, Selection::PlainLoads],
            Selection::Stores => vec![Selection::AtomicStores, Selection::PlainStores],
            Selection::Plain => vec![Selection::PlainStores, Selection::PlainLoads],
            s => vec![s],
        }
    }

    /// Whether the selection toggles atomicity (one bit per operation)
    /// rather than encoding memory orderings (two bits per operation).
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Selection::Loads | Selection::Stores | Selection::Plain
        )
    }

    /// Encoding width of a single operation under this selection.
    pub fn bits_per_op(self) -> usize {
        if self.is_binary() {
            1
        } else {
            2
        }
    }
}
