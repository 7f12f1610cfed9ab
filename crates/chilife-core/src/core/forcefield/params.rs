use crate::core::utils::identifiers::element_symbol;
use phf::{Map, phf_map};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

// UFF van der Waals parameters as (r_min / 2 in Angstrom, well depth in kcal/mol).
static UFF_PARAMS: Map<&'static str, (f64, f64)> = phf_map! {
    "H" => (1.443, 0.044), "D" => (1.443, 0.044),
    "C" => (1.9255, 0.105), "N" => (1.83, 0.069), "O" => (1.75, 0.060),
    "F" => (1.682, 0.050), "P" => (2.0735, 0.305), "S" => (2.0175, 0.274),
    "CL" => (1.9735, 0.227), "BR" => (2.0945, 0.251), "I" => (2.25, 0.339),
    "SE" => (2.1025, 0.291), "CU" => (1.7475, 0.005), "ZN" => (1.3815, 0.124),
    "FE" => (1.456, 0.013), "GD" => (1.684, 0.009),
};

/// Lennard-Jones parameters of one atom type.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct LjParam {
    /// Half of the distance at the potential minimum, in Angstrom.
    pub rmin_half: f64,
    /// Well depth in kcal/mol.
    pub epsilon: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StericGlobals {
    /// Scale applied to r_min; values below 1 tolerate closer contacts.
    pub forgive: f64,
    /// Upper bound of any single pair energy in kcal/mol.
    pub cap: f64,
}

impl Default for StericGlobals {
    fn default() -> Self {
        Self {
            forgive: 1.0,
            cap: 10.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct StericFile {
    #[serde(default)]
    globals: StericGlobals,
    #[serde(default)]
    atom_types: HashMap<String, LjParam>,
}

#[derive(Debug, Deserialize)]
struct LjRecord {
    atom_type: String,
    rmin_half: f64,
    epsilon: f64,
}

/// Per-atom-type steric parameters used by the repulsive clash potential.
#[derive(Debug, Clone, PartialEq)]
pub struct StericParams {
    pub globals: StericGlobals,
    overrides: HashMap<String, LjParam>,
}

impl Default for StericParams {
    fn default() -> Self {
        Self::uff()
    }
}

#[derive(Debug, Error)]
pub enum ParamLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Atom type '{0}' has no steric parameters")]
    UnknownAtomType(String),
}

impl StericParams {
    /// Built-in UFF parameters keyed by element.
    pub fn uff() -> Self {
        Self {
            globals: StericGlobals::default(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_globals(mut self, globals: StericGlobals) -> Self {
        self.globals = globals;
        self
    }

    pub fn with_forgive(mut self, forgive: f64) -> Self {
        self.globals.forgive = forgive;
        self
    }

    pub fn insert(&mut self, atom_type: &str, param: LjParam) {
        self.overrides.insert(atom_type.trim().to_ascii_uppercase(), param);
    }

    /// Looks up an atom type, first as given and then by its element symbol.
    pub fn get(&self, atom_type: &str) -> Option<LjParam> {
        let key = atom_type.trim().to_ascii_uppercase();
        if let Some(param) = self.overrides.get(&key) {
            return Some(*param);
        }
        let element = element_symbol(atom_type);
        self.overrides.get(&element).copied().or_else(|| {
            UFF_PARAMS.get(element.as_str()).map(|&(rmin_half, epsilon)| LjParam {
                rmin_half,
                epsilon,
            })
        })
    }

    /// Resolves parameters for every atom type, failing on the first unknown one.
    pub fn resolve(&self, atom_types: &[String]) -> Result<Vec<LjParam>, ParamLoadError> {
        atom_types
            .iter()
            .map(|t| {
                self.get(t)
                    .ok_or_else(|| ParamLoadError::UnknownAtomType(t.clone()))
            })
            .collect()
    }

    /// Loads globals and per-type overrides from a TOML file on top of the UFF defaults.
    pub fn load_toml(path: &Path) -> Result<Self, ParamLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let file: StericFile = toml::from_str(&content).map_err(|e| ParamLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

        let mut params = Self::uff().with_globals(file.globals);
        for (atom_type, param) in file.atom_types {
            params.insert(&atom_type, param);
        }
        Ok(params)
    }

    /// Adds per-type overrides from a CSV table with `atom_type,rmin_half,epsilon` columns.
    pub fn load_csv(mut self, path: &Path) -> Result<Self, ParamLoadError> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| ParamLoadError::Csv {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

        for result in reader.deserialize::<LjRecord>() {
            let record = result.map_err(|e| ParamLoadError::Csv {
                path: path.to_string_lossy().to_string(),
                source: e,
            })?;
            self.insert(
                &record.atom_type,
                LjParam {
                    rmin_half: record.rmin_half,
                    epsilon: record.epsilon,
                },
            );
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn uff_defaults_are_found_by_element() {
        let params = StericParams::uff();
        let carbon = params.get("C").unwrap();
        assert_eq!(carbon.rmin_half, 1.9255);
        assert_eq!(carbon.epsilon, 0.105);
        assert_eq!(params.get("cl").unwrap().epsilon, 0.227);
        assert!(params.get("Xx").is_none());
    }

    #[test]
    fn resolve_reports_unknown_atom_types() {
        let params = StericParams::uff();
        let types = vec!["C".to_string(), "Q".to_string()];
        let result = params.resolve(&types);
        assert!(matches!(result, Err(ParamLoadError::UnknownAtomType(t)) if t == "Q"));
    }

    #[test]
    fn load_toml_overrides_globals_and_atom_types() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("steric.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            r#"
            [globals]
            forgive = 0.8
            cap = 5.0

            [atom-types.NX]
            rmin_half = 1.9
            epsilon = 0.2
            "#
        )
        .unwrap();

        let params = StericParams::load_toml(&file_path).unwrap();
        assert_eq!(params.globals.forgive, 0.8);
        assert_eq!(params.globals.cap, 5.0);
        assert_eq!(
            params.get("NX"),
            Some(LjParam {
                rmin_half: 1.9,
                epsilon: 0.2
            })
        );
        assert_eq!(params.get("O").unwrap().epsilon, 0.060);
    }

    #[test]
    fn load_toml_fails_for_missing_file() {
        let dir = tempdir().unwrap();
        let result = StericParams::load_toml(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ParamLoadError::Io { .. })));
    }

    #[test]
    fn load_toml_fails_for_unknown_fields() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        fs::write(&file_path, "[globals]\nforgive = 1.0\ncap = 1.0\ncolour = 3\n").unwrap();
        let result = StericParams::load_toml(&file_path);
        assert!(matches!(result, Err(ParamLoadError::Toml { .. })));
    }

    #[test]
    fn load_csv_adds_overrides() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("lj.csv");
        fs::write(&file_path, "atom_type,rmin_half,epsilon\nC,2.0,0.11\nON,1.7,0.12\n").unwrap();

        let params = StericParams::uff().load_csv(&file_path).unwrap();
        assert_eq!(params.get("C").unwrap().rmin_half, 2.0);
        assert_eq!(params.get("ON").unwrap().epsilon, 0.12);
    }

    #[test]
    fn load_csv_fails_for_malformed_rows() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.csv");
        fs::write(&file_path, "atom_type,rmin_half,epsilon\nC,not-a-number,0.1\n").unwrap();
        let result = StericParams::uff().load_csv(&file_path);
        assert!(matches!(result, Err(ParamLoadError::Csv { .. })));
    }
}
