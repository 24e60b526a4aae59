//! CSV uploads → [`RawRow`]s.
//!
//! The first line is the header row. Sheets exported from Brazilian Excel
//! installs usually use `;`, so the delimiter is picked from the header line.

use crate::errors::AppError;
use crate::models::{RawRow, RawValue};
use std::collections::HashMap;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

/// Parses a CSV body with a header row.
///
/// Blank lines are skipped. Short rows simply lack the trailing keys; cells
/// beyond the header width are kept under `__extra_1`, `__extra_2`, ...
pub fn read_csv(bytes: &[u8]) -> Result<Vec<RawRow>, AppError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let delimiter = detect_delimiter(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = unique_headers(reader.headers().map_err(csv_error)?.iter());
    tracing::debug!(
        "CSV header: {} column(s), delimiter {:?}",
        headers.len(),
        delimiter as char
    );

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let row: RawRow = record
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let key = headers
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("__extra_{}", i + 1 - headers.len()));
                (key, RawValue::from(cell))
            })
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

/// Most frequent candidate delimiter on the first line; `,` when none appear.
fn detect_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes
        .split(|b| *b == b'\n')
        .next()
        .unwrap_or_default();

    CANDIDATE_DELIMITERS
        .iter()
        .map(|d| (*d, first_line.iter().filter(|b| *b == d).count()))
        .fold((b',', 0), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        })
        .0
}

/// Renames repeated headers to `Name_1`, `Name_2`, ... so no column is lost.
fn unique_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .map(|header| {
            let count = seen.entry(header.to_string()).or_insert(0);
            let name = if *count == 0 {
                header.to_string()
            } else {
                format!("{}_{}", header, count)
            };
            *count += 1;
            name
        })
        .collect()
}

fn csv_error(err: csv::Error) -> AppError {
    AppError::BadRequest(format!("Error parsing CSV: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(row: &RawRow, key: &str) -> Option<String> {
        row.get(key).and_then(RawValue::as_text)
    }

    #[test]
    fn test_reads_comma_separated() {
        let rows = read_csv(b"Data,Cliente,Valor\n01/03/2024,Acme,\"1.500,00\"\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(text(&rows[0], "Cliente"), Some("Acme".to_string()));
        assert_eq!(text(&rows[0], "Valor"), Some("1.500,00".to_string()));
    }

    #[test]
    fn test_detects_semicolon_and_strips_bom() {
        let rows = read_csv(b"\xEF\xBB\xBFData;Cliente\n01/03/2024;Acme\n").unwrap();
        assert_eq!(text(&rows[0], "Data"), Some("01/03/2024".to_string()));
        assert_eq!(text(&rows[0], "Cliente"), Some("Acme".to_string()));
    }

    #[test]
    fn test_detects_tab() {
        let rows = read_csv(b"Data\tCliente\n01/03/2024\tAcme\n").unwrap();
        assert_eq!(text(&rows[0], "Cliente"), Some("Acme".to_string()));
    }

    #[test]
    fn test_skips_blank_lines() {
        let rows = read_csv(b"Cliente,Valor\nAcme,10\n\n,\nBeta,20\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(text(&rows[1], "Cliente"), Some("Beta".to_string()));
    }

    #[test]
    fn test_duplicate_headers_are_kept() {
        let rows = read_csv(b"Obs,Obs,Cliente\nprimeira,segunda,Acme\n").unwrap();
        assert_eq!(text(&rows[0], "Obs"), Some("primeira".to_string()));
        assert_eq!(text(&rows[0], "Obs_1"), Some("segunda".to_string()));
    }

    #[test]
    fn test_ragged_rows() {
        let rows = read_csv(b"Cliente,Valor\nAcme\nBeta,20,sobra\n").unwrap();
        assert!(rows[0].get("Valor").is_none());
        assert_eq!(text(&rows[1], "__extra_1"), Some("sobra".to_string()));
    }

    #[test]
    fn test_invalid_utf8_is_bad_request() {
        let err = read_csv(b"Cliente\n\xFF\xFE\n").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.starts_with("Error parsing CSV")));
    }

    #[test]
    fn test_empty_body_has_no_rows() {
        assert!(read_csv(b"").unwrap().is_empty());
    }
}
