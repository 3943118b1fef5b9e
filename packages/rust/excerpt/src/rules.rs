//! Pin rules and importance overrides, loaded from TOML once per run.
//!
//! ```toml
//! # pins.toml
//! [[pin]]
//! number = 42
//! section = "miscellany"   # optional; omitted pins apply to every section
//! substring = "Hitchhiker's Guide"
//!
//! # thresholds.toml
//! [[threshold]]
//! number = 57
//! section = "properties"
//! minimum_score = 20.0
//! ```

use std::path::Path;

use numsheet_shared::{MAX_NUMBER, NumsheetError, Result, SectionKind};
use serde::Deserialize;
use tracing::debug;

use crate::scoring::normalize;

/// Forces candidates containing `substring` to the top of a section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PinRule {
    pub number: u16,
    #[serde(default)]
    pub section: Option<SectionKind>,
    pub substring: String,
}

/// Replaces the default threshold for a number (optionally one section).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportanceOverride {
    pub number: u16,
    #[serde(default)]
    pub section: Option<SectionKind>,
    pub minimum_score: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PinFile {
    #[serde(default)]
    pin: Vec<PinRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThresholdFile {
    #[serde(default)]
    threshold: Vec<ImportanceOverride>,
}

/// Read-only lookup tables for the selector.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    pins: Vec<PinRule>,
    overrides: Vec<ImportanceOverride>,
}

impl RuleBook {
    /// Load both tables. A missing file is an empty table; a malformed one is
    /// a configuration error.
    pub fn load(pins_path: &Path, thresholds_path: &Path) -> Result<Self> {
        let pins = match read_optional(pins_path)? {
            Some(raw) => parse_pins(&raw, pins_path)?,
            None => Vec::new(),
        };
        let overrides = match read_optional(thresholds_path)? {
            Some(raw) => parse_thresholds(&raw, thresholds_path)?,
            None => Vec::new(),
        };

        debug!(pins = pins.len(), overrides = overrides.len(), "rule book loaded");
        Ok(Self { pins, overrides })
    }

    pub fn new(pins: Vec<PinRule>, overrides: Vec<ImportanceOverride>) -> Self {
        let pins = pins
            .into_iter()
            .map(|mut p| {
                p.substring = normalize(&p.substring);
                p
            })
            .filter(|p| !p.substring.is_empty())
            .collect();
        Self { pins, overrides }
    }

    /// Normalized pin substrings that apply to `(number, section)`.
    pub fn pins_for(&self, number: u16, section: SectionKind) -> Vec<&str> {
        self.pins
            .iter()
            .filter(|p| p.number == number && p.section.is_none_or(|s| s == section))
            .map(|p| p.substring.as_str())
            .collect()
    }

    /// The override for `(number, section)`, else for `number`, if any.
    pub fn threshold_for(&self, number: u16, section: SectionKind) -> Option<f64> {
        let exact = self
            .overrides
            .iter()
            .find(|o| o.number == number && o.section == Some(section));
        let general = || {
            self.overrides
                .iter()
                .find(|o| o.number == number && o.section.is_none())
        };
        exact.or_else(general).map(|o| o.minimum_score)
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty() && self.overrides.is_empty()
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(?path, "rule file not found, using empty table");
            Ok(None)
        }
        Err(e) => Err(NumsheetError::io(path, e)),
    }
}

fn parse_pins(raw: &str, path: &Path) -> Result<Vec<PinRule>> {
    let file: PinFile = toml::from_str(raw)
        .map_err(|e| NumsheetError::config(format!("failed to parse {}: {e}", path.display())))?;

    for pin in &file.pin {
        check_number(pin.number, path)?;
        if pin.substring.trim().is_empty() {
            return Err(NumsheetError::config(format!(
                "{}: empty pin substring for {}",
                path.display(),
                pin.number
            )));
        }
    }
    Ok(RuleBook::new(file.pin, Vec::new()).pins)
}

fn parse_thresholds(raw: &str, path: &Path) -> Result<Vec<ImportanceOverride>> {
    let file: ThresholdFile = toml::from_str(raw)
        .map_err(|e| NumsheetError::config(format!("failed to parse {}: {e}", path.display())))?;

    for o in &file.threshold {
        check_number(o.number, path)?;
        if !o.minimum_score.is_finite() || o.minimum_score < 0.0 {
            return Err(NumsheetError::config(format!(
                "{}: minimum_score for {} must be a non-negative number",
                path.display(),
                o.number
            )));
        }
    }
    Ok(file.threshold)
}

fn check_number(n: u16, path: &Path) -> Result<()> {
    if n > MAX_NUMBER {
        return Err(NumsheetError::config(format!(
            "{}: number {n} out of range 0-{MAX_NUMBER}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_file(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("ns_rules_{}.toml", Uuid::now_v7()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_files_are_empty_tables() {
        let nowhere = std::env::temp_dir().join(format!("ns_absent_{}.toml", Uuid::now_v7()));
        let book = RuleBook::load(&nowhere, &nowhere).expect("load");
        assert!(book.is_empty());
    }

    #[test]
    fn pins_and_thresholds_load() {
        let pins = temp_file(
            r#"
[[pin]]
number = 42
section = "miscellany"
substring = "  Hitchhiker's   Guide "

[[pin]]
number = 42
substring = "pronic"
"#,
        );
        let thresholds = temp_file(
            r#"
[[threshold]]
number = 57
minimum_score = 20.0

[[threshold]]
number = 57
section = "properties"
minimum_score = 45.5
"#,
        );

        let book = RuleBook::load(&pins, &thresholds).expect("load");
        assert_eq!(book.pins_for(42, SectionKind::Miscellany), vec!["hitchhiker s guide", "pronic"]);
        assert_eq!(book.pins_for(42, SectionKind::Properties), vec!["pronic"]);
        assert!(book.pins_for(43, SectionKind::Properties).is_empty());

        assert_eq!(book.threshold_for(57, SectionKind::Properties), Some(45.5));
        assert_eq!(book.threshold_for(57, SectionKind::Miscellany), Some(20.0));
        assert_eq!(book.threshold_for(58, SectionKind::Miscellany), None);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let pins = temp_file("[[pin]]\nnumber = \"forty-two\"\n");
        let err = RuleBook::load(&pins, Path::new("/nonexistent/thresholds.toml")).unwrap_err();
        assert!(matches!(err, NumsheetError::Config { .. }));

        let out_of_range = temp_file("[[threshold]]\nnumber = 1000\nminimum_score = 1.0\n");
        let err = RuleBook::load(Path::new("/nonexistent/pins.toml"), &out_of_range).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let bad_section = temp_file("[[pin]]\nnumber = 1\nsection = \"history\"\nsubstring = \"x\"\n");
        assert!(RuleBook::load(&bad_section, Path::new("/nonexistent/t.toml")).is_err());
    }
}
