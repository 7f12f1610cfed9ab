use phf::{Map, Set, phf_map, phf_set};

static BACKBONE_ATOM_NAMES: Set<&'static str> = phf_set! {
    "N", "H", "HN", "CA", "HA", "C", "O", "OXT", "H1", "H2", "H3",
    "HA2", "HA3", "1HA", "2HA",
};

static WATER_RESIDUE_NAMES: Set<&'static str> = phf_set! {
    "HOH", "WAT", "SOL", "H2O", "TIP", "TIP3", "TIP4", "DOD",
};

static WATER_ATOM_NAMES: Set<&'static str> = phf_set! { "OH2", "OW" };

// Single-bond covalent radii in Angstrom.
static COVALENT_RADII: Map<&'static str, f64> = phf_map! {
    "H" => 0.31, "D" => 0.31,
    "C" => 0.76, "N" => 0.71, "O" => 0.66, "F" => 0.57,
    "P" => 1.07, "S" => 1.05, "CL" => 1.02, "BR" => 1.20, "I" => 1.39,
    "SE" => 1.20, "CU" => 1.32, "ZN" => 1.22, "FE" => 1.32, "GD" => 1.96,
};

pub fn is_backbone_atom(atom_name: &str) -> bool {
    BACKBONE_ATOM_NAMES.contains(atom_name.trim())
}

pub fn is_heavy_atom(atom_name: &str) -> bool {
    let first_char = atom_name
        .trim()
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase());
    !matches!(first_char, Some('H') | Some('D'))
}

pub fn is_water(residue_name: &str, atom_name: &str) -> bool {
    WATER_RESIDUE_NAMES.contains(residue_name.trim()) || WATER_ATOM_NAMES.contains(atom_name.trim())
}

/// Normalizes an element/atom-type string to the upper-case element symbol.
pub fn element_symbol(atom_type: &str) -> String {
    let letters: String = atom_type
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let upper = letters.to_ascii_uppercase();
    if upper.len() > 1 && COVALENT_RADII.contains_key(&upper[..2]) {
        upper[..2].to_string()
    } else {
        upper.chars().take(1).collect()
    }
}

pub fn covalent_radius(atom_type: &str) -> Option<f64> {
    COVALENT_RADII.get(element_symbol(atom_type).as_str()).copied()
}
