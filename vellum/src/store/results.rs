/// Outcome of a replace or update command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
}

impl UpdateResult {
    pub fn acknowledged(matched_count: u64, modified_count: u64) -> Self {
        UpdateResult {
            acknowledged: true,
            matched_count,
            modified_count,
        }
    }

    /// Acknowledged and at least one document matched the filter.
    pub fn is_applied(&self) -> bool {
        self.acknowledged && self.matched_count > 0
    }
}

/// Outcome of a delete command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub acknowledged: bool,
    pub deleted_count: u64,
}

impl DeleteResult {
    pub fn acknowledged(deleted_count: u64) -> Self {
        DeleteResult {
            acknowledged: true,
            deleted_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applied_requires_a_match() {
        assert!(UpdateResult::acknowledged(1, 1).is_applied());
        assert!(UpdateResult::acknowledged(1, 0).is_applied());
        assert!(!UpdateResult::acknowledged(0, 0).is_applied());
        assert!(!UpdateResult::default().is_applied());
    }
}
