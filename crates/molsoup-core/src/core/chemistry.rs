use phf::{Map, phf_map};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

/// Pairwise affinities of the built-in table, keyed by `"A-B"` with symbols in
/// lexicographic order. Pairs not listed fall back to [`DEFAULT_AFFINITY`].
static BUILTIN_AFFINITIES: Map<&'static str, f32> = phf_map! {
    "H-O" => 1.0,
    "C-H" => 0.9,
    "H-N" => 0.8,
    "C-O" => 0.7,
    "C-C" => 0.6,
    "C-N" => 0.6,
    "H-S" => 0.5,
    "H-P" => 0.4,
    "O-P" => 0.6,
    "O-S" => 0.5,
    "H-H" => 0.3,
    "O-O" => 0.2,
    "N-N" => 0.3,
    "O-Si" => 0.8,
    "H-Si" => 0.4,
    "C-Si" => 0.3,
    "N-Si" => 0.3,
};

const DEFAULT_AFFINITY: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ElementId(pub u8);

impl ElementId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Element {
    pub symbol: String,
    pub max_valence: u32,
    pub valence_electrons: u32,
    pub electronegativity: f32,
    pub mass: f32,
    pub radius: f32,
    /// Relative weight used when spawning atoms of random type.
    #[serde(default = "default_abundance")]
    pub abundance: f32,
}

fn default_abundance() -> f32 {
    1.0
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ElementTableFile {
    #[serde(default = "default_fallback_affinity")]
    default_affinity: f32,
    #[serde(rename = "element")]
    elements: Vec<Element>,
    #[serde(default)]
    affinity: BTreeMap<String, BTreeMap<String, f32>>,
}

fn default_fallback_affinity() -> f32 {
    DEFAULT_AFFINITY
}

#[derive(Debug, Error)]
pub enum ParamLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Unknown element symbol '{symbol}' in '{path}'")]
    UnknownSymbol { path: String, symbol: String },
    #[error("Invalid element table in '{path}': {reason}")]
    Invalid { path: String, reason: String },
}

/// Per-element chemistry data plus the symmetric `type × type` affinity matrix.
///
/// The table is immutable once built; the simulation only ever reads from it.
#[derive(Debug, Clone)]
pub struct ElementTable {
    elements: Vec<Element>,
    affinity: Vec<f32>,
    by_symbol: HashMap<String, ElementId>,
    default_affinity: f32,
}

impl ElementTable {
    /// The six biogenic elements plus silicon as a mineral surface, with textbook
    /// electronegativities and valences.
    pub fn builtin() -> Self {
        let elements = vec![
            builtin_element("C", 4, 4, 2.55, 12.0, 9.0, 0.15),
            builtin_element("H", 1, 1, 2.20, 1.0, 6.0, 0.50),
            builtin_element("N", 3, 5, 3.04, 14.0, 8.5, 0.05),
            builtin_element("O", 2, 6, 3.44, 16.0, 8.0, 0.25),
            builtin_element("P", 5, 5, 2.19, 31.0, 10.5, 0.025),
            builtin_element("S", 2, 6, 2.58, 32.0, 10.5, 0.025),
            builtin_element("Si", 4, 4, 1.90, 28.0, 11.0, 0.02),
        ];

        let mut table = Self::with_elements(elements, DEFAULT_AFFINITY);
        let n = table.len();
        for a in 0..n {
            for b in a..n {
                let key = pair_key(&table.elements[a].symbol, &table.elements[b].symbol);
                if let Some(&value) = BUILTIN_AFFINITIES.get(key.as_str()) {
                    table.set_affinity(ElementId(a as u8), ElementId(b as u8), value);
                }
            }
        }
        table
    }

    pub fn load(path: &Path) -> Result<Self, ParamLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.to_string_lossy())
    }

    fn from_toml_str(content: &str, origin: &str) -> Result<Self, ParamLoadError> {
        let file: ElementTableFile = toml::from_str(content).map_err(|e| ParamLoadError::Toml {
            path: origin.to_string(),
            source: e,
        })?;

        let invalid = |reason: String| ParamLoadError::Invalid {
            path: origin.to_string(),
            reason,
        };

        if file.elements.is_empty() {
            return Err(invalid("at least one [[element]] entry is required".into()));
        }
        if file.elements.len() > u8::MAX as usize {
            return Err(invalid(format!(
                "{} elements exceed the supported maximum of {}",
                file.elements.len(),
                u8::MAX
            )));
        }
        for element in &file.elements {
            if element.mass <= 0.0 || element.radius <= 0.0 {
                return Err(invalid(format!(
                    "element '{}' must have positive mass and radius",
                    element.symbol
                )));
            }
            if element.max_valence as usize > crate::core::models::bonds::MAX_VALENCE {
                return Err(invalid(format!(
                    "element '{}' has max_valence {} above the slot capacity",
                    element.symbol, element.max_valence
                )));
            }
        }

        let mut table = Self::with_elements(file.elements, file.default_affinity.clamp(0.0, 1.0));
        if table.by_symbol.len() != table.len() {
            return Err(invalid("element symbols must be unique".into()));
        }

        for (row, entries) in &file.affinity {
            let a = table.lookup(row, origin)?;
            for (col, &value) in entries {
                let b = table.lookup(col, origin)?;
                table.set_affinity(a, b, value.clamp(0.0, 1.0));
            }
        }

        Ok(table)
    }

    /// A table over `elements` where every pair has `default_affinity`.
    pub fn with_elements(elements: Vec<Element>, default_affinity: f32) -> Self {
        let n = elements.len();
        let by_symbol = elements
            .iter()
            .enumerate()
            .map(|(i, e)| (e.symbol.clone(), ElementId(i as u8)))
            .collect();
        Self {
            elements,
            affinity: vec![default_affinity; n * n],
            by_symbol,
            default_affinity,
        }
    }

    fn lookup(&self, symbol: &str, origin: &str) -> Result<ElementId, ParamLoadError> {
        self.id_of(symbol)
            .ok_or_else(|| ParamLoadError::UnknownSymbol {
                path: origin.to_string(),
                symbol: symbol.to_string(),
            })
    }

    /// Serializes the table back into the on-disk TOML layout.
    pub fn to_toml_string(&self) -> Result<String, ParamLoadError> {
        let mut affinity: BTreeMap<String, BTreeMap<String, f32>> = BTreeMap::new();
        for (a, ea) in self.elements.iter().enumerate() {
            for (b, eb) in self.elements.iter().enumerate().skip(a) {
                let value = self.affinity[a * self.len() + b];
                if (value - self.default_affinity).abs() > f32::EPSILON {
                    affinity
                        .entry(ea.symbol.clone())
                        .or_default()
                        .insert(eb.symbol.clone(), value);
                }
            }
        }
        let file = ElementTableFile {
            default_affinity: self.default_affinity,
            elements: self.elements.clone(),
            affinity,
        };
        Ok(toml::to_string(&file)?)
    }

    pub fn set_affinity(&mut self, a: ElementId, b: ElementId, value: f32) {
        let n = self.len();
        self.affinity[a.index() * n + b.index()] = value;
        self.affinity[b.index() * n + a.index()] = value;
    }

    #[inline]
    pub fn affinity(&self, a: ElementId, b: ElementId) -> f32 {
        self.affinity[a.index() * self.len() + b.index()]
    }

    #[inline]
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.index()]
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.index())
    }

    pub fn id_of(&self, symbol: &str) -> Option<ElementId> {
        self.by_symbol.get(symbol).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| (ElementId(i as u8), e))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

fn builtin_element(
    symbol: &str,
    max_valence: u32,
    valence_electrons: u32,
    electronegativity: f32,
    mass: f32,
    radius: f32,
    abundance: f32,
) -> Element {
    Element {
        symbol: symbol.to_string(),
        max_valence,
        valence_electrons,
        electronegativity,
        mass,
        radius,
        abundance,
    }
}

fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}-{b}")
    } else {
        format!("{b}-{a}")
    }
}
