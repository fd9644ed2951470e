//! Classification-code sources and the fixed default code tables.

/// Which classification dimension a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeType {
    /// Primary dimension: 6-digit NAICS industry codes.
    Naics,
    /// Secondary dimension: PSC product/service codes.
    Psc,
}

/// One row from the classification-code store. The store itself lives in
/// the surrounding application; the resolver only reads enabled rows.
#[derive(Debug, Clone)]
pub struct CodeRecord {
    pub code: String,
    pub code_type: CodeType,
    pub enabled: bool,
}

/// Ordered, filterable source of classification codes.
pub trait CodeSource: Send + Sync {
    /// Enabled codes of the given type, in insertion order.
    fn enabled_codes(&self, code_type: CodeType) -> Vec<String>;
}

/// In-memory `CodeSource` over a fixed record list. The production
/// application backs this trait with its database; tests and the CLI use
/// this implementation.
#[derive(Debug, Default)]
pub struct StaticCodeSource {
    records: Vec<CodeRecord>,
}

impl StaticCodeSource {
    pub fn new(records: Vec<CodeRecord>) -> Self {
        Self { records }
    }

    /// A source with no rows at all, so resolution falls through to the
    /// built-in default tables.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl CodeSource for StaticCodeSource {
    fn enabled_codes(&self, code_type: CodeType) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.enabled && r.code_type == code_type)
            .map(|r| r.code.clone())
            .collect()
    }
}

/// Default NAICS codes queried when the store has none configured.
pub const DEFAULT_NAICS_CODES: &[&str] = &[
    "332510", // Hardware manufacturing
    "332722", // Bolt, nut, screw, rivet, and washer manufacturing
    "332991", // Ball and roller bearing manufacturing
    "336413", // Other aircraft parts and auxiliary equipment
    "336612", // Boat building
    "334511", // Search, detection, navigation and guidance instruments
    "541330", // Engineering services
    "336992", // Military armored vehicle manufacturing
];

/// Default PSC codes used when the store has none configured.
pub const DEFAULT_PSC_CODES: &[&str] = &[
    "1560", // Airframe structural components
    "2840", // Gas turbines and jet engines
    "3110", // Bearings, antifriction
    "4730", // Hose, pipe, tube and fittings
    "5306", // Bolts
    "5310", // Nuts and washers
    "5330", // Packing and gasket materials
    "5340", // Hardware, commercial
];

/// Default notice-type labels when the caller supplies none.
pub const DEFAULT_NOTICE_TYPE_LABELS: &[&str] = &[
    "Presolicitation",
    "Solicitation",
    "Combined Synopsis/Solicitation",
];

/// Wire codes used when no supplied label maps to anything.
pub const FALLBACK_NOTICE_TYPE_CODES: &[&str] = &["o", "p", "k"];

/// Notice-type label to single-letter wire code. Labels with no entry here
/// are dropped during resolution.
pub const NOTICE_TYPE_CODE_MAP: &[(&str, &str)] = &[
    ("Presolicitation", "p"),
    ("Solicitation", "o"),
    ("Combined Synopsis/Solicitation", "k"),
    ("Sources Sought", "r"),
    ("Special Notice", "s"),
    ("Sale of Surplus Property", "g"),
    ("Award Notice", "a"),
    ("Justification", "u"),
    ("Intent to Bundle Requirements (DoD-Funded)", "i"),
];

/// Looks up the wire code for a notice-type label.
pub fn notice_type_code(label: &str) -> Option<&'static str> {
    NOTICE_TYPE_CODE_MAP
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, code)| *code)
}
