//! Rendering for the startup cleanup report.

use appkeep_store::CleanupReport;

use crate::output::Render;

impl Render for CleanupReport {
    fn render(&self) -> String {
        let mut lines = vec![format!(
            "evicted {} expired apps, removed {} orphaned and {} malformed records",
            self.evicted.len(),
            self.reconcile.orphans_removed.len(),
            self.reconcile.malformed_removed.len()
        )];
        lines.extend(self.evicted.iter().map(|key| format!("  evicted {key}")));
        lines.extend(
            self.reconcile
                .orphans_removed
                .iter()
                .map(|key| format!("  orphan {key}")),
        );
        lines.extend(self.warnings.iter().map(|w| {
            format!("  warning: {} was not removed: {}", w.path.display(), w.error)
        }));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appkeep_store::{AppKey, AppKind};

    #[test]
    fn clean_report_is_one_line() {
        let text = CleanupReport::default().render();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("evicted 0 expired apps"));
    }

    #[test]
    fn evictions_are_listed() {
        let report = CleanupReport {
            evicted: vec![AppKey::new(AppKind::Imported, "a")],
            ..CleanupReport::default()
        };
        assert!(report.render().contains("evicted imported/a"));
    }
}
