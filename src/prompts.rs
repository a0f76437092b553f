//! Recognition prompts for reading drum-machine grids off a page image.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for extracting pattern grids from one page image.
///
/// The row order listed here must match the printed grids; the labels are
/// the keys [`crate::config::InstrumentMap::default`] expects.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are reading a scanned page of a drum machine pattern book. Convert each pattern grid on the page into an accurate JSON representation. The page can contain zero or more pattern grids and musical notation. Ignore the musical notation; only the grids matter.

For each grid:
1. Read the pattern name exactly as printed (e.g. "Afro-cub: 1", "Rock: 3", "Break: 2").
2. Count the grid columns. There are either 16 or 12 columns. The numbers above (1, 3, 5, ...) mark the odd-numbered columns.
3. For each row, produce a string of "0" and "1" marking which cells are filled (black = 1) or empty (white = 0). Evaluate every cell individually. Adjacent cells can both be filled.

The instrument rows, top to bottom, are:
AC, CY, CH, OH, HT, MT, SD, RS, LT, CPS, CB, BD

Rows without marks are all zeros. "F" cells (flam) count as "1".

Do NOT assume any repetition. Cells 1, 3 and 5 being filled tells you nothing about cells 7, 9 and 11. Count the 1s in every row against the black boxes you see before answering.

Return ONLY a JSON array, one object per grid, for example:
[
  {
    "name": "Afro-cub: 1",
    "grid_width": 16,
    "steps": {
      "AC": "0000000000000000",
      "CY": "0000000000000000",
      "CH": "1011101010101010",
      "OH": "0000000000000000",
      "HT": "0000000000000000",
      "MT": "0000000000000000",
      "SD": "0000000000000000",
      "RS": "0001001000001000",
      "LT": "0000000000000000",
      "CPS": "0000000000000000",
      "CB": "0000000000000000",
      "BD": "1000000010100010"
    }
  }
]

Rules:
- Each step string has exactly grid_width characters, only "0" and "1".
- If the page has no pattern grids, return: []
- Never extrapolate a pattern."#;

/// User turn sent alongside the page image.
pub const PAGE_INSTRUCTION: &str = "Extract every pattern grid on this page.";
