use std::fmt;

use serde::{Deserialize, Serialize};

/// Load state of a sector. The total order `Discarded < Simple < Detailed`
/// is used by consistency checks: a sector's level is only ever raised while
/// a scheduling pass builds its wanted set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LevelOfDetail {
    /// Not loaded.
    #[default]
    Discarded,
    /// Coarse proxy geometry only.
    Simple,
    /// Full-resolution geometry.
    Detailed,
}

impl LevelOfDetail {
    /// Both loadable levels, coarse first.
    pub const LOADABLE: [LevelOfDetail; 2] = [LevelOfDetail::Simple, LevelOfDetail::Detailed];

    pub fn is_loaded(self) -> bool {
        self != LevelOfDetail::Discarded
    }
}

impl fmt::Display for LevelOfDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LevelOfDetail::Discarded => "discarded",
            LevelOfDetail::Simple => "simple",
            LevelOfDetail::Detailed => "detailed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        assert!(LevelOfDetail::Discarded < LevelOfDetail::Simple);
        assert!(LevelOfDetail::Simple < LevelOfDetail::Detailed);
        assert_eq!(
            LevelOfDetail::Simple.max(LevelOfDetail::Detailed),
            LevelOfDetail::Detailed
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(LevelOfDetail::Simple.to_string(), "simple");
        assert!(!LevelOfDetail::Discarded.is_loaded());
    }
}
