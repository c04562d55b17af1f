use std::fmt;

/// Progress of the streaming pipeline across all models.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadingState {
    /// Loads in flight or results not yet consumed.
    pub is_loading: bool,
    /// Sectors wanted and either in flight or loaded.
    pub items_requested: usize,
    /// Sectors handed to the consumer and still active.
    pub items_loaded: usize,
}

impl LoadingState {
    /// Merge the state of one stream into this one.
    pub fn accumulate(&mut self, other: LoadingState) {
        self.is_loading |= other.is_loading;
        self.items_requested += other.items_requested;
        self.items_loaded += other.items_loaded;
    }
}

impl fmt::Display for LoadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} sectors", self.items_loaded, self.items_requested)?;
        if self.is_loading {
            write!(f, " (loading)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accumulation sums counts and ors the loading flag.
    #[test]
    fn test_accumulate() {
        let mut total = LoadingState::default();
        total.accumulate(LoadingState {
            is_loading: false,
            items_requested: 3,
            items_loaded: 3,
        });
        total.accumulate(LoadingState {
            is_loading: true,
            items_requested: 2,
            items_loaded: 1,
        });
        assert_eq!(
            total,
            LoadingState {
                is_loading: true,
                items_requested: 5,
                items_loaded: 4,
            }
        );
        assert_eq!(total.to_string(), "4/5 sectors (loading)");
    }
}
