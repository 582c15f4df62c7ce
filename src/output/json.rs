//! JSON hand-off of the result set

use crate::output::{OutputError, OutputResult, ResultSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Writes the result set as pretty-printed JSON
///
/// # Arguments
///
/// * `results` - The finished result set
/// * `output_path` - Destination file; parent directories are created
pub fn write_results_json(results: &ResultSet, output_path: &Path) -> OutputResult<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(output_path).map_err(|source| OutputError::Write {
        path: output_path.display().to_string(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, results)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    Ok(())
}

/// Reads a result set previously written by [`write_results_json`]
pub fn read_results_json(path: &Path) -> OutputResult<ResultSet> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
