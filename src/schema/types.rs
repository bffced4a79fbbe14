// src/schema/types.rs

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DashboardError, Result};

/// Earliest year CMS publishes the monthly MA files for.
pub const FIRST_YEAR: u16 = 2007;

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Which upstream dataset a table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Enrollment,
    Penetration,
    Ratebook,
    Geography,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Enrollment => "enrollment",
            DatasetKind::Penetration => "penetration",
            DatasetKind::Ratebook => "ratebook",
            DatasetKind::Geography => "geography",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reporting month. Field order gives chronological `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: u16,
    pub month: u8,
}

impl Period {
    /// Validated constructor for user-supplied selections.
    pub fn new(year: u16, month: u8) -> Result<Self> {
        let current = Utc::now().year() as u16;
        if !(FIRST_YEAR..=current).contains(&year) {
            return Err(DashboardError::InvalidRequest(format!(
                "year {} outside {}..={}",
                year, FIRST_YEAR, current
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(DashboardError::InvalidRequest(format!(
                "month {} outside 1..=12",
                month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month.clamp(1, 12) - 1) as usize]
    }

    /// The month before this one, or `None` before the first published year.
    pub fn previous(&self) -> Option<Period> {
        let (year, month) = if self.month == 1 {
            (self.year.checked_sub(1)?, 12)
        } else {
            (self.year, self.month - 1)
        };
        (year >= FIRST_YEAR).then_some(Period { year, month })
    }

    /// `count` months ending at (and including) `self`, oldest first.
    pub fn trailing(&self, count: usize) -> Vec<Period> {
        let mut out = vec![*self];
        while out.len() < count.max(1) {
            match out.last().and_then(Period::previous) {
                Some(p) => out.push(p),
                None => break,
            }
        }
        out.reverse();
        out
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Logical type of a canonical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Count,
    Amount,
    Year,
    Month,
}

/// A canonical column and the header spellings that map onto it.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    /// Header spellings seen in the published files. Empty for derived columns.
    pub aliases: &'static [&'static str],
    /// Whether the header must be present for the file to be accepted.
    pub required: bool,
}

impl ColumnSpec {
    pub const fn sourced(
        name: &'static str,
        ty: ColumnType,
        aliases: &'static [&'static str],
        required: bool,
    ) -> Self {
        Self {
            name,
            ty,
            nullable: !required,
            aliases,
            required,
        }
    }

    /// Columns stamped from the fetch period rather than read from the file.
    pub const fn derived(name: &'static str, ty: ColumnType, nullable: bool) -> Self {
        Self {
            name,
            ty,
            nullable,
            aliases: &[],
            required: false,
        }
    }

    pub fn is_sourced(&self) -> bool {
        !self.aliases.is_empty()
    }
}
