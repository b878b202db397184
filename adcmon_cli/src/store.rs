//! Plain-text calibration persistence and OGP bank files.
//!
//! The record file carries one value per line in a fixed order: offsets
//! (zdok0 cores A..D, then zdok1), gains, overload counts, avz, avamp.
//! 28 lines total. A missing file reads as the default record so the first
//! measurement on a fresh install can seed it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use adcmon_traits::{CalRecord, CalStore, DynError, NUM_CORES};

const RECORD_LINES: usize = 28;

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

fn format_error(msg: String) -> DynError {
    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
}

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalStore for FileStore {
    fn load(&mut self) -> Result<CalRecord, DynError> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "no calibration file yet, starting fresh");
            return Ok(CalRecord::default());
        }
        let text = fs::read_to_string(&self.path)?;
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if lines.len() != RECORD_LINES {
            return Err(format_error(format!(
                "{}: expected {RECORD_LINES} values, found {}",
                self.path.display(),
                lines.len()
            )));
        }

        let mut rec = CalRecord::default();
        let mut it = lines.into_iter();
        let mut next_f32 = |field: &str| -> Result<f32, DynError> {
            let s = it.next().ok_or_else(|| format_error(field.to_string()))?;
            s.parse::<f32>()
                .map_err(|e| format_error(format!("{field}: {e}")))
        };
        for z in 0..2 {
            for core in 0..NUM_CORES {
                rec.offs[z][core] = next_f32("offset")?;
            }
        }
        for z in 0..2 {
            for core in 0..NUM_CORES {
                rec.gains[z][core] = next_f32("gain")?;
            }
        }
        for z in 0..2 {
            for core in 0..NUM_CORES {
                rec.overload[z][core] = next_f32("overload")? as i32;
            }
        }
        for z in 0..2 {
            rec.avz[z] = next_f32("avz")?;
        }
        for z in 0..2 {
            rec.avamp[z] = next_f32("avamp")?;
        }
        Ok(rec)
    }

    fn store(&mut self, record: &CalRecord) -> Result<(), DynError> {
        let mut out = String::with_capacity(RECORD_LINES * 12);
        for z in 0..2 {
            for core in 0..NUM_CORES {
                out.push_str(&format!("{}\n", record.offs[z][core]));
            }
        }
        for z in 0..2 {
            for core in 0..NUM_CORES {
                out.push_str(&format!("{}\n", record.gains[z][core]));
            }
        }
        for z in 0..2 {
            for core in 0..NUM_CORES {
                out.push_str(&format!("{}\n", record.overload[z][core]));
            }
        }
        for z in 0..2 {
            out.push_str(&format!("{}\n", record.avz[z]));
        }
        for z in 0..2 {
            out.push_str(&format!("{}\n", record.avamp[z]));
        }
        write_atomic(&self.path, out.as_bytes())?;
        Ok(())
    }
}

/// Read a 12-line OGP bank: per core A..D one offset, gain and phase.
pub fn read_ogp_file(path: &Path) -> eyre::Result<[[f32; 3]; 4]> {
    let text = fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("reading {}: {e}", path.display()))?;
    let values: Vec<f32> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.parse::<f32>().map_err(|e| eyre::eyre!("{l:?}: {e}")))
        .collect::<eyre::Result<_>>()?;
    if values.len() != 12 {
        eyre::bail!("{}: expected 12 values, found {}", path.display(), values.len());
    }
    let mut bank = [[0.0f32; 3]; 4];
    for core in 0..4 {
        for field in 0..3 {
            bank[core][field] = values[core * 3 + field];
        }
    }
    Ok(bank)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.txt");
        let mut store = FileStore::new(&path);

        let mut rec = CalRecord::default();
        rec.offs[0] = [1.5, -2.5, 3.5, -4.5];
        rec.gains[1] = [0.1, 0.2, 0.3, 0.4];
        rec.overload[1] = [9, 8, 7, 6];
        rec.avz = [0.25, -0.25];
        rec.avamp = [30.0, 31.0];
        store.store(&rec).unwrap();

        let read = store.load().unwrap();
        assert_eq!(read, rec);
    }

    #[test]
    fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("absent.txt"));
        assert_eq!(store.load().unwrap(), CalRecord::default());
    }

    #[test]
    fn truncated_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.txt");
        fs::write(&path, "1.0\n2.0\n").unwrap();
        let mut store = FileStore::new(&path);
        assert!(store.load().is_err());
    }

    #[test]
    fn ogp_file_parses_core_major() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ogp.txt");
        let body: String = (1..=12).map(|i| format!("{i}.0\n")).collect();
        fs::write(&path, body).unwrap();

        let bank = read_ogp_file(&path).unwrap();
        assert_eq!(bank[0], [1.0, 2.0, 3.0]);
        assert_eq!(bank[3], [10.0, 11.0, 12.0]);
    }
}
