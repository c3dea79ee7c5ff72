//! Shared types for traversal and index visiting.

/// How far below a root a visit extends.
///
/// Used identically by the unified tree walk and the bucket tree's `accept`:
/// `Zero` covers only the root itself, `One` adds immediate children,
/// `Infinite` covers the full subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinite,
}

impl Depth {
    /// Returns true if a node `levels` below the root is inside this window.
    pub fn admits(self, levels: usize) -> bool {
        match self {
            Self::Zero => levels == 0,
            Self::One => levels <= 1,
            Self::Infinite => true,
        }
    }
}

/// Flow control returned by bucket entry visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Keep visiting entries.
    Continue,
    /// Stop the whole visit, including any shards not yet loaded.
    Stop,
}

/// How a traversal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOutcome {
    /// Every node in the requested window was visited.
    Complete,
    /// The walk stopped early at a cancellation check; visitation is partial
    /// but everything already reported remains valid.
    Cancelled,
}

impl TraversalOutcome {
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}
