//! Normalization rule sets.
//!
//! A [`RuleSet`] maps column names to one rule from a small fixed catalog.
//! Rule sets are named and versioned and can be read from TOML, so the same
//! pipeline runs every variant of the source layout without code changes.

use std::collections::BTreeMap;
use std::path::Path;

use polars::prelude::DataType;
use serde::{Deserialize, Serialize};

use crate::derived::DerivedField;
use crate::error::{NormalizeError, Result};

/// Side on which a code is zero-padded to its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pad {
    #[default]
    None,
    Left,
    Right,
}

/// Rewrites every code starting with `prefix` to `canonical`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generalization {
    pub prefix: String,
    pub canonical: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRule {
    #[serde(default)]
    pub width: usize,
    #[serde(default)]
    pub pad: Pad,
    #[serde(default = "default_true")]
    pub uppercase: bool,
    #[serde(default)]
    pub generalize: Vec<Generalization>,
}

fn default_true() -> bool {
    true
}

impl CodeRule {
    pub fn unpadded() -> Self {
        Self {
            width: 0,
            pad: Pad::None,
            uppercase: true,
            generalize: Vec::new(),
        }
    }

    pub fn left(width: usize) -> Self {
        Self {
            width,
            pad: Pad::Left,
            ..Self::unpadded()
        }
    }

    pub fn right(width: usize) -> Self {
        Self {
            width,
            pad: Pad::Right,
            ..Self::unpadded()
        }
    }

    #[must_use]
    pub fn generalizing(mut self, prefix: &str, canonical: &str) -> Self {
        self.generalize.push(Generalization {
            prefix: prefix.to_string(),
            canonical: canonical.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRule {
    /// Business key: all digits, parsed to a 64-bit integer; otherwise null.
    Key,
    /// Integer count with a default for unparseable values and a clip range.
    Count {
        #[serde(default)]
        min: i64,
        #[serde(default)]
        max: Option<i64>,
        #[serde(default)]
        default: i64,
    },
    /// Decimal amount after locale normalization; default 0.0, clipped to >= 0.
    Money,
    /// Fixed-width code; empty or all-zero collapses to the `"0"` sentinel.
    Code(CodeRule),
    /// `YYYYMMDD` date; unparseable or missing is null.
    Date,
    /// Source age expressed in the unit given by `unit_column`
    /// (1 hours, 2 days, 3 months, otherwise years), converted to years.
    Age { unit_column: String, max: i64 },
    /// Trimmed text; empty is null.
    Text,
}

impl FieldRule {
    pub fn count(min: i64, max: Option<i64>, default: i64) -> Self {
        Self::Count { min, max, default }
    }

    /// Output dtype of the normalized column.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Key | Self::Count { .. } | Self::Age { .. } => DataType::Int64,
            Self::Money => DataType::Float64,
            Self::Date => DataType::Date,
            Self::Code(_) | Self::Text => DataType::String,
        }
    }
}

/// Named, versioned mapping from column name to rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    pub version: u32,
    /// Business key column; rows where it normalizes to null are dropped.
    pub key: String,
    pub rules: BTreeMap<String, FieldRule>,
    #[serde(default)]
    pub derived: Vec<DerivedField>,
}

static TEXT_RULE: FieldRule = FieldRule::Text;

const COUNTS: &[&str] = &[
    "QT_DIARIAS", "DIAS_PERM", "UTI_MES_TO", "UTI_INT_TO", "DIAR_ACOM", "NUM_FILHOS", "ETNIA",
    "ESPEC", "IDENT", "NACIONAL", "MORTE", "IND_VDRL", "INFEHOSP", "COBRANCA", "GESTRICO",
];
const MONEY: &[&str] = &["VAL_SH", "VAL_SP", "VAL_UTI", "VAL_TOT"];
const DIAGNOSES: &[&str] = &[
    "DIAG_PRINC", "DIAG_SECUN", "CID_NOTIF", "CID_ASSO", "CID_MORTE", "DIAGSEC1", "DIAGSEC2",
    "DIAGSEC3", "DIAGSEC4", "DIAGSEC5", "DIAGSEC6", "DIAGSEC7", "DIAGSEC8", "DIAGSEC9",
];
const PLAIN_CODES: &[&str] = &[
    "VINCPREV", "CBOR", "INSC_PN", "CNAER", "MARCA_UTI", "COMPLEX", "NATUREZA", "GESTAO",
    "NAT_JUR", "CGC_HOSP",
];
const DATES: &[&str] = &["DT_INTER", "DT_SAIDA", "NASC"];

impl RuleSet {
    /// Built-in rules for the AIH reduced-record layout.
    pub fn standard() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert("N_AIH".to_string(), FieldRule::Key);
        for &name in COUNTS {
            rules.insert(name.to_string(), FieldRule::count(0, None, 0));
        }
        rules.insert("SEXO".to_string(), FieldRule::count(0, Some(3), 0));
        rules.insert("RACA_COR".to_string(), FieldRule::count(0, Some(99), 0));
        rules.insert("COD_IDADE".to_string(), FieldRule::count(0, None, 4));
        for &name in MONEY {
            rules.insert(name.to_string(), FieldRule::Money);
        }
        let municipality = CodeRule::left(6).generalizing("53", "530010");
        for name in ["MUNIC_RES", "MUNIC_MOV"] {
            rules.insert(name.to_string(), FieldRule::Code(municipality.clone()));
        }
        for &name in DIAGNOSES {
            rules.insert(name.to_string(), FieldRule::Code(CodeRule::right(4)));
        }
        rules.insert("PROC_REA".to_string(), FieldRule::Code(CodeRule::left(10)));
        rules.insert("CNES".to_string(), FieldRule::Code(CodeRule::left(7)));
        rules.insert("CEP".to_string(), FieldRule::Code(CodeRule::left(8)));
        for name in ["INSTRU", "CONTRACEP1", "CONTRACEP2"] {
            rules.insert(name.to_string(), FieldRule::Code(CodeRule::left(2)));
        }
        for &name in PLAIN_CODES {
            rules.insert(name.to_string(), FieldRule::Code(CodeRule::unpadded()));
        }
        for &name in DATES {
            rules.insert(name.to_string(), FieldRule::Date);
        }
        rules.insert(
            "IDADE".to_string(),
            FieldRule::Age {
                unit_column: "COD_IDADE".to_string(),
                max: 150,
            },
        );
        Self {
            name: "sih-default".to_string(),
            version: 1,
            key: "N_AIH".to_string(),
            rules,
            derived: DerivedField::standard(),
        }
    }

    /// Rule for `column`; unlisted columns are treated as text.
    pub fn rule_for(&self, column: &str) -> &FieldRule {
        self.rules.get(column).unwrap_or(&TEXT_RULE)
    }

    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| NormalizeError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| NormalizeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

}
