//! UK postcode normalisation and decomposition.
//!
//! A [`Postcode`] can only be built through [`Postcode::parse`], so holding
//! one means the value is in canonical form (`OUTWARD INWARD`, upper case,
//! single space) and matched the postcode grammar.

use crate::utils::error::{EtlError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Longest accepted postcode once spaces and punctuation are removed.
pub const MAX_CLEANED_LEN: usize = 7;

const INWARD_LEN: usize = 3;

static STANDARD_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{1,2}[0-9][0-9A-Z]?[0-9][A-Z]{2}$").expect("static postcode regex")
});

static BFPO_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^BFPO([0-9]{1,3})$").expect("static BFPO regex"));

/// Non-geographic and overseas codes that do not follow the standard grammar.
const SPECIAL_POSTCODES: &[&str] = &[
    "GIR0AA", // Girobank
    "SANTA1", // Royal Mail's Santa address
    "ASCN1ZZ", "STHL1ZZ", "TDCU1ZZ", "BBND1ZZ", "BIQQ1ZZ", "FIQQ1ZZ", "PCRN1ZZ", "SIQQ1ZZ",
    "TKCA1ZZ",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Postcode {
    canonical: String,
    split: usize,
}

impl Postcode {
    pub fn parse(raw: &str) -> Result<Self> {
        let upper = raw.trim().to_uppercase();
        if upper.is_empty() {
            return Err(EtlError::invalid_postcode(raw));
        }

        let cleaned: String = upper
            .chars()
            .filter(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
            .collect();
        if cleaned.is_empty() || cleaned.len() > MAX_CLEANED_LEN {
            return Err(EtlError::invalid_postcode(raw));
        }

        if let Some(caps) = BFPO_FORMAT.captures(&cleaned) {
            return Ok(Self::from_parts("BFPO", &caps[1]));
        }

        if cleaned.len() <= INWARD_LEN {
            return Err(EtlError::invalid_postcode(raw));
        }

        let (outward, inward) = cleaned.split_at(cleaned.len() - INWARD_LEN);
        // a leading O in the inward code is always a misread zero
        let inward = match inward.strip_prefix('O') {
            Some(rest) => format!("0{}", rest),
            None => inward.to_string(),
        };

        let compact = format!("{}{}", outward, inward);
        if !STANDARD_FORMAT.is_match(&compact) && !SPECIAL_POSTCODES.contains(&compact.as_str())
        {
            return Err(EtlError::invalid_postcode(raw));
        }

        Ok(Self::from_parts(outward, &inward))
    }

    /// `None` and blank input are both invalid.
    pub fn parse_opt(raw: Option<&str>) -> Result<Self> {
        match raw {
            Some(raw) => Self::parse(raw),
            None => Err(EtlError::invalid_postcode("")),
        }
    }

    fn from_parts(outward: &str, inward: &str) -> Self {
        Self {
            canonical: format!("{} {}", outward, inward),
            split: outward.len(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn outward(&self) -> &str {
        &self.canonical[..self.split]
    }

    pub fn inward(&self) -> &str {
        &self.canonical[self.split + 1..]
    }

    /// Leading letters of the outward code, e.g. `SW` for `SW1A 1AA`.
    pub fn area(&self) -> &str {
        let outward = self.outward();
        let end = outward
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(outward.len());
        &outward[..end]
    }

    pub fn district(&self) -> &str {
        self.outward()
    }

    /// Outward code plus the first character of the inward code.
    pub fn sector(&self) -> &str {
        &self.canonical[..self.split + 2]
    }

    /// Lower case with spaces removed: the form the postcode hash is taken over.
    pub fn hash_key(&self) -> String {
        self.canonical.replace(' ', "").to_lowercase()
    }
}

impl fmt::Display for Postcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl std::str::FromStr for Postcode {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Postcode {
    type Error = EtlError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Postcode> for String {
    fn from(value: Postcode) -> Self {
        value.canonical
    }
}

/// Canonical form of `raw`, or `InvalidPostcode`.
pub fn normalize(raw: &str) -> Result<String> {
    Postcode::parse(raw).map(String::from)
}
