//! Layout probe for statements whose rows drift between years.
//!
//! Some activity statements carry an extra line (e.g. a goods-sales income row)
//! that pushes every following income row down by one. Rather than sprinkling
//! row-offset conditionals through extraction, the probe inspects the sheet
//! once and returns a [`LayoutDecision`] the extractor applies to flagged items.

use crate::config::ProbeSpec;
use crate::sheet::Sheet;
use crate::utils::parse_amount;
use log::debug;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutDecision {
    pub offset: u32,
    pub reason: String,
}

impl LayoutDecision {
    pub fn unshifted(reason: impl Into<String>) -> Self {
        Self {
            offset: 0,
            reason: reason.into(),
        }
    }
}

/// Returns the configured offset when the probe's label cell contains the
/// marker and, if a value cell is configured, that cell holds a non-zero amount.
pub fn probe_layout(sheet: &Sheet, probe: &ProbeSpec) -> LayoutDecision {
    let label = sheet.text_at(probe.label_cell).unwrap_or_default();
    if !label.contains(&probe.marker) {
        return LayoutDecision::unshifted(format!(
            "{} does not contain '{}'",
            probe.label_cell, probe.marker
        ));
    }

    if let Some(value_cell) = probe.value_cell {
        let amount = parse_amount(sheet.get(value_cell)).unwrap_or_default();
        if amount.is_zero() {
            return LayoutDecision::unshifted(format!(
                "'{}' found at {} but {} is zero",
                probe.marker, probe.label_cell, value_cell
            ));
        }
    }

    debug!(
        "Sheet '{}': layout probe matched '{}' at {}, shifting by {} row(s)",
        sheet.name, probe.marker, probe.label_cell, probe.offset
    );

    LayoutDecision {
        offset: probe.offset,
        reason: format!("'{}' found at {}", probe.marker, probe.label_cell),
    }
}
