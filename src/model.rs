//! Data model shared by every stage: raw recognizer records, canonical
//! catalog patterns, per-page results and the catalog itself.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Number of steps in every catalog pattern.
pub const STEP_COUNT: usize = 16;

/// One row of the drum machine.
///
/// Declaration order is the catalog order, so a `BTreeMap<Instrument, _>`
/// always serialises its rows as `ac, bd, sd, ch, …`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    /// Accent
    Ac,
    /// Bass drum
    Bd,
    /// Snare drum
    Sd,
    /// Closed hi-hat
    Ch,
    /// Open hi-hat
    Oh,
    /// Cymbal
    Cy,
    /// High tom
    Ht,
    /// Mid tom
    Mt,
    /// Low tom
    Lt,
    /// Rim shot
    Rs,
    /// Hand clap
    Cp,
    /// Cowbell
    Cb,
}

impl Instrument {
    /// Every instrument, in catalog order.
    pub const ALL: [Instrument; 12] = [
        Instrument::Ac,
        Instrument::Bd,
        Instrument::Sd,
        Instrument::Ch,
        Instrument::Oh,
        Instrument::Cy,
        Instrument::Ht,
        Instrument::Mt,
        Instrument::Lt,
        Instrument::Rs,
        Instrument::Cp,
        Instrument::Cb,
    ];

    /// Catalog code, e.g. `"cp"`.
    pub fn code(self) -> &'static str {
        match self {
            Instrument::Ac => "ac",
            Instrument::Bd => "bd",
            Instrument::Sd => "sd",
            Instrument::Ch => "ch",
            Instrument::Oh => "oh",
            Instrument::Cy => "cy",
            Instrument::Ht => "ht",
            Instrument::Mt => "mt",
            Instrument::Lt => "lt",
            Instrument::Rs => "rs",
            Instrument::Cp => "cp",
            Instrument::Cb => "cb",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A pattern exactly as the recognizer reported it.
///
/// Every field defaults so that a partially filled record still reaches the
/// normalizer, which decides what to keep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub grid_width: u32,
    /// Printed row label (`"CPS"`, `"BD"`, …) → bit string.
    #[serde(default)]
    pub steps: BTreeMap<String, String>,
}

/// The catalog's unit of storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPattern {
    /// Lowercase slug derived from the printed name; primary key.
    pub id: String,
    /// Display form of the printed name.
    pub name: String,
    pub steps: BTreeMap<Instrument, String>,
}

impl CanonicalPattern {
    /// `true` when every instrument has a 16-character `0`/`1` row and `id`
    /// is non-empty.
    pub fn is_well_formed(&self) -> bool {
        !self.id.is_empty()
            && self.steps.len() == Instrument::ALL.len()
            && Instrument::ALL.iter().all(|inst| {
                self.steps
                    .get(inst)
                    .is_some_and(|row| is_step_string(row))
            })
    }
}

/// `true` for a string of exactly [`STEP_COUNT`] `0`/`1` characters.
pub fn is_step_string(s: &str) -> bool {
    s.len() == STEP_COUNT && s.bytes().all(|b| b == b'0' || b == b'1')
}

/// A row with no hits.
pub fn silent_row() -> String {
    "0".repeat(STEP_COUNT)
}

/// The patterns recognised on one page, in page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed PDF page number.
    pub page: usize,
    pub patterns: Vec<CanonicalPattern>,
}

/// How a page was resolved by the extraction driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageState {
    /// A completed cache file already existed; no external calls were made.
    Cached,
    /// Rendered and recognised during this run, then cached.
    Fetched,
    /// An error marker exists (from this run or an earlier one).
    Errored,
}

/// Per-page outcome returned by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReport {
    pub page: usize,
    pub state: PageState,
    pub patterns: Vec<CanonicalPattern>,
    /// Records the recognizer returned before filtering. Zero for cached pages.
    pub raw_count: usize,
    /// Resolved from an existing cache file or marker, with no external calls.
    pub from_cache: bool,
    /// Error marker text for `Errored` pages.
    pub error: Option<String>,
}

impl PageReport {
    /// Records dropped by the normalizer.
    pub fn skipped(&self) -> usize {
        self.raw_count.saturating_sub(self.patterns.len())
    }

    /// Display names of the kept patterns.
    pub fn names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name.as_str()).collect()
    }
}

/// One catalog entry as stored on disk.
///
/// Entries stay as JSON objects so fields this crate does not model
/// (`bpm`, `category`, extra step rows, ...) survive a rewrite untouched.
pub type CatalogEntry = Map<String, Value>;

/// The full accepted dataset, keyed (and therefore sorted) by `id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

/// On-disk shape of the catalog: `{"patterns": [ … sorted by id … ]}`.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogDocument {
    patterns: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Ids in catalog order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The stored entry, including fields outside [`CanonicalPattern`].
    pub fn entry(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    /// Typed view of an entry. `None` when the id is absent or the entry
    /// does not fit [`CanonicalPattern`] (e.g. an unknown step key).
    pub fn get(&self, id: &str) -> Option<CanonicalPattern> {
        let entry = self.entries.get(id)?;
        serde_json::from_value(Value::Object(entry.clone())).ok()
    }

    /// Insert or replace `pattern`, overlaying `id`, `name` and `steps` onto
    /// any existing entry so its other fields are kept in place.
    pub fn upsert(&mut self, pattern: &CanonicalPattern) {
        let entry = overlay_entry(self.entries.get(&pattern.id), pattern);
        self.entries.insert(pattern.id.clone(), entry);
    }

    /// Parse a catalog document. Each entry must be an object with a string
    /// `id`; everything else is carried as-is. Duplicate ids keep the last
    /// entry.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let doc: CatalogDocument = serde_json::from_str(text)?;
        let mut entries = BTreeMap::new();
        for entry in doc.patterns {
            let id = match entry.get("id") {
                Some(Value::String(id)) => id.clone(),
                _ => {
                    return Err(serde::de::Error::custom(
                        "catalog entry without a string \"id\"",
                    ))
                }
            };
            entries.insert(id, entry);
        }
        Ok(Self { entries })
    }

    /// Pretty JSON with entries sorted by id and a trailing newline.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let doc = CatalogDocument {
            patterns: self.entries.values().cloned().collect(),
        };
        let mut out = serde_json::to_string_pretty(&doc)?;
        out.push('\n');
        Ok(out)
    }
}

/// `base` with `pattern`'s fields written over it. Keys already present keep
/// their position; a fresh entry gets `id`, `name`, `steps` in that order.
pub(crate) fn overlay_entry(
    base: Option<&CatalogEntry>,
    pattern: &CanonicalPattern,
) -> CatalogEntry {
    let mut entry = base.cloned().unwrap_or_default();
    let steps: CatalogEntry = pattern
        .steps
        .iter()
        .map(|(inst, row)| (inst.code().to_string(), Value::String(row.clone())))
        .collect();
    entry.insert("id".into(), Value::String(pattern.id.clone()));
    entry.insert("name".into(), Value::String(pattern.name.clone()));
    entry.insert("steps".into(), Value::Object(steps));
    entry
}

impl FromIterator<CanonicalPattern> for Catalog {
    fn from_iter<I: IntoIterator<Item = CanonicalPattern>>(iter: I) -> Self {
        let mut catalog = Self::default();
        for pattern in iter {
            catalog.upsert(&pattern);
        }
        catalog
    }
}
