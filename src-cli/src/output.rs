//! Printing command results as text or JSON.

use serde::Serialize;

/// Human-readable rendering of a command result.
pub trait Render {
    fn render(&self) -> String;
}

impl<T: Render> Render for Vec<T> {
    fn render(&self) -> String {
        if self.is_empty() {
            return "(none)".to_string();
        }
        self.iter().map(Render::render).collect::<Vec<_>>().join("\n")
    }
}

/// Print `value` to stdout in the selected format.
///
/// # Errors
///
/// Fails only if JSON serialization fails.
pub fn emit<T: Serialize + Render>(json: bool, value: &T) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value.render());
    }
    Ok(())
}

/// `value` or a dash.
pub(crate) fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}
