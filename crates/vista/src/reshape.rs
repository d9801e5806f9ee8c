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
use crate::error::{DatasetError, DatasetResult};
use crate::shape::is_wide_column;
use polars::prelude::*;
use tracing::debug;

pub const VARIABLE_COLUMN: &str = "variable";
pub const VALUE_COLUMN: &str = "value";

/// Stacks every year-like column under `variable`/`value`.
///
/// Identifier columns keep their order and come first; rows are emitted
/// column-major, so all rows for the first stacked column precede the second.
pub fn unpivot_wide(dataset: &Dataset) -> DatasetResult<Dataset> {
    let names = dataset.column_names();
    let (stacked, ids): (Vec<String>, Vec<String>) =
        names.into_iter().partition(|n| is_wide_column(n));
    if let Some(clash) = ids
        .iter()
        .find(|n| n.as_str() == VARIABLE_COLUMN || n.as_str() == VALUE_COLUMN)
    {
        return Err(DatasetError::ReservedColumnName {
            column: clash.clone(),
        });
    }
    let rows = dataset.height();
    let repeats = stacked.len();
    debug!(rows, stacked = repeats, ids = ids.len(), "Unpivoting wide dataset");

    let take: Vec<IdxSize> = (0..repeats)
        .flat_map(|_| 0..rows as IdxSize)
        .collect();
    let idx = IdxCa::from_vec("idx".into(), take);
    let mut columns = Vec::with_capacity(ids.len() + 2);
    for name in &ids {
        columns.push(Column::from(dataset.series(name)?.take(&idx)?));
    }

    let variable: Vec<&str> = stacked
        .iter()
        .flat_map(|name| std::iter::repeat(name.as_str()).take(rows))
        .collect();
    columns.push(Column::from(Series::new(VARIABLE_COLUMN.into(), variable)));

    let all_numeric = stacked
        .iter()
        .all(|n| dataset.kind(n).is_some_and(|k| k.is_numeric()));
    let value = if all_numeric {
        let mut values: Vec<Option<f64>> = Vec::with_capacity(rows * repeats);
        for name in &stacked {
            values.extend(dataset.numeric_values(name)?);
        }
        Series::new(VALUE_COLUMN.into(), values)
    } else {
        let mut values: Vec<Option<String>> = Vec::with_capacity(rows * repeats);
        for name in &stacked {
            values.extend(dataset.text_values(name)?);
        }
        Series::new(VALUE_COLUMN.into(), values)
    };
    columns.push(Column::from(value));

    let frame = DataFrame::new(columns)?;
    Ok(Dataset::from_frame(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VistaConfig;
    use crate::dataset::ColumnKind;

    fn wide() -> Dataset {
        let csv = "country,2019,2020\nNO,1,2\nSE,3,4\nDK,5,\n";
        Dataset::from_csv_bytes(csv.as_bytes(), &VistaConfig::default()).unwrap()
    }

    #[test]
    fn test_unpivot_is_column_major() {
        let long = unpivot_wide(&wide()).unwrap();
        assert_eq!(long.column_names(), vec!["country", "variable", "value"]);
        assert_eq!(long.height(), 6);
        let countries: Vec<_> = long.text_values("country").unwrap().into_iter().flatten().collect();
        assert_eq!(countries, vec!["NO", "SE", "DK", "NO", "SE", "DK"]);
        let variables: Vec<_> = long.text_values("variable").unwrap().into_iter().flatten().collect();
        assert_eq!(variables, vec!["2019", "2019", "2019", "2020", "2020", "2020"]);
        assert_eq!(
            long.numeric_values("value").unwrap(),
            vec![Some(1.0), Some(3.0), Some(5.0), Some(2.0), Some(4.0), None]
        );
        assert_eq!(long.kind("value"), Some(ColumnKind::Numeric));
    }

    #[test]
    fn test_mixed_stacked_columns_become_text() {
        let csv = "id,2019,2020_note\n1,5,ok\n";
        let ds = Dataset::from_csv_bytes(csv.as_bytes(), &VistaConfig::default()).unwrap();
        let long = unpivot_wide(&ds).unwrap();
        let values: Vec<_> = long.text_values("value").unwrap().into_iter().flatten().collect();
        assert_eq!(values, vec!["5", "ok"]);
        assert_eq!(long.kind("value"), Some(ColumnKind::Categorical));
    }

    #[test]
    fn test_reserved_name_clash() {
        let csv = "value,2019\n1,2\n";
        let ds = Dataset::from_csv_bytes(csv.as_bytes(), &VistaConfig::default()).unwrap();
        assert!(matches!(
            unpivot_wide(&ds),
            Err(DatasetError::ReservedColumnName { .. })
        ));
    }

    #[test]
    fn test_input_untouched() {
        let ds = wide();
        let _ = unpivot_wide(&ds).unwrap();
        assert_eq!(ds.column_names(), vec!["country", "2019", "2020"]);
        assert_eq!(ds.height(), 3);
    }
}
