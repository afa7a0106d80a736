//! Percentage progress lines for transfers.

/// Tracks the last reported percentage and formats a status line whenever
/// the rounded value changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReporter {
    label: &'static str,
    current: Option<u8>,
}

impl ProgressReporter {
    /// Reporter for downloads (`[download N% complete]`).
    #[must_use]
    pub const fn download() -> Self {
        Self {
            label: "download",
            current: None,
        }
    }

    /// Reporter for uploads (`[upload N% complete]`).
    #[must_use]
    pub const fn upload() -> Self {
        Self {
            label: "upload",
            current: None,
        }
    }

    /// Record `now` of `total` bytes. Returns a status line when the
    /// rounded percentage differs from the last one reported. An unknown
    /// or zero total leaves the percentage unchanged.
    pub fn update(&mut self, now: u64, total: u64) -> Option<String> {
        if total == 0 {
            return None;
        }
        let percent = (u128::from(now) * 100 + u128::from(total) / 2) / u128::from(total);
        let percent = u8::try_from(percent.min(100)).unwrap_or(100);
        if self.current == Some(percent) {
            return None;
        }
        self.current = Some(percent);
        Some(format!("[{} {percent}% complete]", self.label))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reports_only_on_change() {
        let mut p = ProgressReporter::download();
        assert_eq!(p.update(0, 1000).as_deref(), Some("[download 0% complete]"));
        assert_eq!(p.update(1, 1000), None, "0.1% rounds to 0");
        assert_eq!(p.update(5, 1000).as_deref(), Some("[download 1% complete]"));
        assert_eq!(p.update(1000, 1000).as_deref(), Some("[download 100% complete]"));
    }

    #[test]
    fn clamps_beyond_total() {
        let mut p = ProgressReporter::upload();
        assert_eq!(p.update(10, 5).as_deref(), Some("[upload 100% complete]"));
        assert_eq!(p.update(20, 5), None);
    }

    #[test]
    fn unknown_total_is_silent() {
        let mut p = ProgressReporter::download();
        assert_eq!(p.update(100, 0), None);
    }

    #[test]
    fn rounds_half_up() {
        let mut p = ProgressReporter::download();
        assert_eq!(p.update(1, 200).as_deref(), Some("[download 1% complete]"));
    }
}
