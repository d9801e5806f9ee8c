// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.


use crate::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// Whether a table spreads one measure across year-like columns.
///
/// `Long` is the default and only means the wide signal was absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableShape {
    Wide,
    #[default]
    Long,
}
impl TableShape {
    pub fn detect(dataset: &Dataset) -> Self {
        Self::from_column_names(dataset.column_names())
    }
    pub fn from_column_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if names.into_iter().any(|n| is_wide_column(n.as_ref())) {
            TableShape::Wide
        } else {
            TableShape::Long
        }
    }
    pub fn is_wide(&self) -> bool {
        *self == TableShape::Wide
    }
}
/// A column name that looks like a year: all digits, or starting with `19` or `20`.
pub fn is_wide_column(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    let lowered = trimmed.to_lowercase();
    lowered.starts_with("19") || lowered.starts_with("20")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_columns_are_wide() {
        assert!(is_wide_column("1999"));
        assert!(is_wide_column(" 2020_sales "));
        assert!(is_wide_column("42"));
        assert!(!is_wide_column("sales_2020"));
        assert!(!is_wide_column("   "));
        assert!(!is_wide_column("region"));
    }

    #[test]
    fn test_shape_from_names() {
        assert_eq!(
            TableShape::from_column_names(["country", "2019", "2020"]),
            TableShape::Wide
        );
        assert_eq!(
            TableShape::from_column_names(["category", "sales"]),
            TableShape::Long
        );
        assert_eq!(
            TableShape::from_column_names(Vec::<String>::new()),
            TableShape::Long
        );
    }
}
