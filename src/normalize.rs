//! Pattern normalisation: one [`RawRecord`] in, one [`CanonicalPattern`]
//! (or nothing) out.
//!
//! Policy, applied in order and short-circuiting:
//!
//! 1. drop records whose grid is not 16 steps wide
//! 2. drop records whose label contains an exclusion term (any case)
//! 3. drop records whose label slugifies to an empty id
//! 4. read each required instrument's row; a missing, short, long or
//!    non-binary row becomes sixteen zeros and is logged
//! 5. fill any required instrument still absent with sixteen zeros
//!
//! A dropped record is filtered, not failed: the page still succeeds.

use crate::config::{ExtractionConfig, InstrumentMap};
use crate::model::{is_step_string, silent_row, CanonicalPattern, Instrument, RawRecord, STEP_COUNT};
use crate::slug::{display_name, slugify};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Inclusion policy and instrument vocabulary used by [`normalize`].
#[derive(Debug, Clone)]
pub struct NormalizePolicy {
    pub instrument_map: InstrumentMap,
    pub required: BTreeSet<Instrument>,
    /// Stored lower-cased.
    pub exclusion_terms: Vec<String>,
}

impl Default for NormalizePolicy {
    fn default() -> Self {
        Self {
            instrument_map: InstrumentMap::default(),
            required: Instrument::ALL.into_iter().collect(),
            exclusion_terms: vec!["break".to_string()],
        }
    }
}

impl NormalizePolicy {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            instrument_map: config.instrument_map.clone(),
            required: config.required_instruments.clone(),
            exclusion_terms: config
                .exclusion_terms
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    fn is_excluded(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.exclusion_terms.iter().any(|t| label.contains(t.as_str()))
    }
}

/// Normalise one recognised record into the catalog schema.
///
/// Returns `None` when the record is filtered out by the policy.
pub fn normalize(raw: &RawRecord, policy: &NormalizePolicy) -> Option<CanonicalPattern> {
    if raw.grid_width as usize != STEP_COUNT {
        debug!("Skipping '{}': {}-step grid", raw.name, raw.grid_width);
        return None;
    }

    if policy.is_excluded(&raw.name) {
        debug!("Skipping '{}': excluded label", raw.name);
        return None;
    }

    let id = slugify(&raw.name);
    if id.is_empty() {
        debug!("Skipping '{}': empty id", raw.name);
        return None;
    }

    let mut steps: BTreeMap<Instrument, String> = BTreeMap::new();
    for &instrument in &policy.required {
        let Some(label) = policy.instrument_map.label_for(instrument) else {
            continue;
        };
        let row = match raw.steps.get(label) {
            Some(row) if is_step_string(row) => row.clone(),
            Some(row) => {
                warn!(
                    "Invalid step string for {} in '{}': '{}', using zeros",
                    label, raw.name, row
                );
                silent_row()
            }
            None => {
                warn!("Missing {} row in '{}', using zeros", label, raw.name);
                silent_row()
            }
        };
        steps.insert(instrument, row);
    }

    for &instrument in &policy.required {
        steps.entry(instrument).or_insert_with(silent_row);
    }

    Some(CanonicalPattern {
        id,
        name: display_name(&raw.name),
        steps,
    })
}

/// Normalise every record of a page, keeping page order.
pub fn normalize_all(raw: &[RawRecord], policy: &NormalizePolicy) -> Vec<CanonicalPattern> {
    raw.iter().filter_map(|r| normalize(r, policy)).collect()
}
