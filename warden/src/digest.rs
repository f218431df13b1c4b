//! Daily digest rendering.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::domain::{ComponentState, OverallStatus, StatusSnapshot};

/// Summary of every component, sent once per day.
#[derive(Debug, Clone, Serialize)]
pub struct DigestReport {
    pub generated_at: DateTime<Utc>,
    pub overall: OverallStatus,
    pub components: Vec<ComponentState>,
}

impl DigestReport {
    pub fn from_snapshot(snapshot: StatusSnapshot) -> Self {
        Self {
            generated_at: snapshot.generated_at,
            overall: snapshot.overall,
            components: snapshot.components,
        }
    }

    /// Components that are not currently healthy.
    pub fn attention(&self) -> impl Iterator<Item = &ComponentState> {
        self.components.iter().filter(|c| !c.lifecycle.is_healthy())
    }

    pub fn subject(&self) -> String {
        let attention = self.attention().count();
        if attention == 0 {
            format!(
                "Daily digest: {} ({} components)",
                self.overall,
                self.components.len()
            )
        } else {
            format!(
                "Daily digest: {} ({} of {} components need attention)",
                self.overall,
                attention,
                self.components.len()
            )
        }
    }

    pub fn body(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Overall status: {}\n", self.overall));
        out.push_str(&format!("Generated: {}\n\n", format_local(Some(self.generated_at))));

        if self.components.is_empty() {
            out.push_str("No components registered.\n");
            return out;
        }

        let width = self
            .components
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0)
            .max("Component".len());

        out.push_str(&format!(
            "{:<width$}  {:<10}  {:>8}  {:<22}  {:<22}  {:>8}  {:>8}\n",
            "Component",
            "State",
            "Failures",
            "Last success",
            "Last restart",
            "Restarts",
            "Total",
            width = width
        ));
        for c in &self.components {
            out.push_str(&format!(
                "{:<width$}  {:<10}  {:>8}  {:<22}  {:<22}  {:>8}  {:>8}\n",
                c.name,
                c.lifecycle.to_string(),
                c.consecutive_failures,
                format_local(c.last_success_at),
                format_local(c.last_restart_at),
                c.total_restarts,
                c.total_failures,
                width = width
            ));
        }

        let details: Vec<_> = self
            .attention()
            .filter_map(|c| c.last_detail.as_deref().map(|d| (c.name.as_str(), d)))
            .collect();
        if !details.is_empty() {
            out.push_str("\nLast failures:\n");
            for (name, detail) in details {
                out.push_str(&format!("  {}: {}\n", name, detail));
            }
        }
        out
    }
}

fn format_local(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M %:z")
            .to_string(),
        None => "never".to_string(),
    }
}
