//! Navigation layout updates (`nav.layout.update`).

use super::{ApplyContext, ApplySummary, ChangeApplier};
use crate::core::error::PostEditError;
use crate::site::changeset::{ChangeOperation, Scope, op};
use crate::site::model::SiteState;
use crate::site::render;
use serde_json::json;

pub struct NavApplier;

impl ChangeApplier for NavApplier {
    fn scope(&self) -> Scope {
        Scope::Nav
    }

    fn apply(
        &self,
        state: &mut SiteState,
        operations: &[ChangeOperation],
        _ctx: &ApplyContext<'_>,
    ) -> Result<ApplySummary, PostEditError> {
        let layout = &mut state.nav.layout;
        for update in operations.iter().filter(|o| o.kind() == op::NAV_LAYOUT_UPDATE) {
            if let Some(location) = update.payload_str("location") {
                layout.location = Some(location.to_string());
            }
            if let Some(dropdown) = update.payload_str("dropdown") {
                layout.dropdown = Some(dropdown.to_string());
            }
            if let Some(default) = update.payload_str("default") {
                layout.default = Some(default.to_string());
            }
        }

        state.nav.html = render::render_nav(&state.nav);

        let mut summary = ApplySummary::new();
        summary.insert("layout".to_string(), serde_json::to_value(&state.nav.layout)?);
        summary.insert("items".to_string(), json!(state.nav.items.len()));
        Ok(summary)
    }
}
