use std::fmt;

/// A non-owning reference to a node of a [`TreeStore`](crate::TreeStore).
///
/// A handle is an `(id, version)` pair. The store bumps the version of an
/// identity when it retires the node, so a handle captured before the removal
/// no longer compares equal to anything live. The all-zero value is the null
/// handle and never names a live node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle {
    id: u32,
    version: u32,
}

impl NodeHandle {
    pub const NULL: NodeHandle = NodeHandle { id: 0, version: 0 };

    pub const fn new(id: u32, version: u32) -> Self {
        Self { id, version }
    }

    #[inline(always)]
    pub const fn id(&self) -> u32 {
        self.id
    }

    #[inline(always)]
    pub const fn version(&self) -> u32 {
        self.version
    }

    #[inline(always)]
    pub const fn is_null(&self) -> bool {
        self.id == 0 && self.version == 0
    }

    /// Returns `None` for the null handle.
    #[inline(always)]
    pub fn non_null(self) -> Option<Self> {
        if self.is_null() { None } else { Some(self) }
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NodeHandle(Null)")
        } else {
            write!(f, "NodeHandle({}:{})", self.id, self.version)
        }
    }
}
