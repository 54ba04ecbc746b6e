//! Dataset loading: CSV files into engine `Dataset`s.

use std::io::Read;
use std::path::Path;

use recmerge_recon::Dataset;

/// Read a file as UTF-8, falling back to Windows-1252 (common for
/// Excel-exported CSVs).
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Parse CSV text with a header row. Header names are trimmed and a leading
/// BOM is dropped; cell text is kept verbatim for the engine to normalize.
/// Rows must be rectangular.
pub fn parse_csv_dataset(content: &str) -> Result<Dataset, String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| format!("CSV header error: {e}"))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| format!("CSV parse error at row {}: {e}", row_idx + 1))?;
        rows.push(record.iter().map(String::from).collect());
    }

    Ok(Dataset::new(columns, rows))
}

pub fn load_csv_dataset(path: &Path) -> Result<Dataset, String> {
    let content = read_file_as_utf8(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    parse_csv_dataset(&content).map_err(|e| format!("{}: {e}", path.display()))
}
