//! Query flags for the info-request family (§4.6). Crate choice (`bitflags`)
//! aligned with `golemcloud-golem`'s manifest, the pack repo the same kind
//! of combinable-flags field is grounded on.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct QueryFlags: u32 {
        /// Include otherwise-hidden objects.
        const SHOW_ALL = 1 << 0;
        /// Include heavyweight per-object fields.
        const SHOW_DETAIL = 1 << 1;
        /// Include sibling-cluster data.
        const SHOW_FEDERATION = 1 << 2;
        /// Confine to the receiving cluster.
        const SHOW_LOCAL = 1 << 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let f = QueryFlags::SHOW_ALL | QueryFlags::SHOW_DETAIL;
        assert!(f.contains(QueryFlags::SHOW_ALL));
        assert!(f.contains(QueryFlags::SHOW_DETAIL));
        assert!(!f.contains(QueryFlags::SHOW_FEDERATION));
    }
}
