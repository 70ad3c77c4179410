use shared::ModelKind;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaxonomyError {
    #[error("class index {index} is out of range for the {kind} taxonomy ({size} entries)")]
    OutOfRange {
        kind: ModelKind,
        index: usize,
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PestEntry {
    pub name: String,
    pub pesticides: Vec<String>,
}

impl PestEntry {
    /// Pesticides as a single comma separated recommendation.
    pub fn recommendation(&self) -> String {
        self.pesticides.join(", ")
    }
}

/// Ordered pest table for one model. Index order matches the model's class
/// order and must never change independently of the artifact.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    kind: ModelKind,
    entries: Vec<PestEntry>,
}

const DETECTOR_PESTS: &[(&str, &[&str])] = &[
    ("aphids", &["Imidacloprid", "Acetamiprid", "Thiamethoxam"]),
    ("armyworm", &["Chlorpyrifos", "Lambda-cyhalothrin", "Bifenthrin"]),
    ("beetle", &["Imidacloprid", "Carbaryl", "Malathion", "Cypermethrin"]),
    ("bollworm", &["Chlorantraniliprole", "Emamectin benzoate", "Spinosad", "Indoxacarb"]),
    ("grasshopper", &["Carbaryl", "Malathion", "Pyrethroids"]),
    ("mites", &["Abamectin", "Bifenazate", "Chlorfenapyr"]),
    ("mosquito", &["Adulticides", "Larvicides"]),
    ("sawfly", &["Malathion", "Carbaryl", "Cypermethrin"]),
    ("stem_borer", &["Neonicotinoids", "Pyrethroids", "Chlorantraniliprole"]),
];

const TABULAR_PESTS: &[(&str, &[&str])] = &[
    ("Brownplanthopper", &["Neonicotinoids", "Pyrethroids", "Carbamates"]),
    ("Gallmidge", &["Neonicotinoids", "Organophosphates"]),
    ("Greenleafhopper", &["Neonicotinoids", "Pyrethroids", "Carbamates"]),
    ("LeafFolder", &["Bacillus thuringiensis (Bt)", "Neonicotinoids"]),
    ("Yellowstemborer", &["Neonicotinoids", "Pyrethroids"]),
    ("Caseworm", &["Bacillus thuringiensis (Bt)", "Spinosad"]),
    ("Miridbug", &["Neonicotinoids", "Pyrethroids"]),
    ("Whitebackedplanthopper", &["Neonicotinoids", "Pyrethroids"]),
    ("ZigZagleafhopper", &["Neonicotinoids", "Pyrethroids"]),
    ("LeafBlast", &["Triazoles", "Strobilurins"]),
    ("NeckBlast", &["Triazoles", "Strobilurins"]),
];

const WEEKLY_PESTS: &[(&str, &[&str])] = &[
    ("AmericanBollworm", &["Pyrethroids", "Organophosphates", "Neonicotinoids"]),
    (
        "AmericanBollworm-Larva",
        &["Bacillus thuringiensis (Bt)", "Insect growth regulators (e.g., methoxyfenozide)"],
    ),
    ("Aphid", &["Neonicotinoids", "Pyrethroids", "Insecticidal soaps"]),
    ("Jassid", &["Neonicotinoids", "Pyrethroids", "Carbamates"]),
    ("Mealybug", &["Neonicotinoids", "Insecticidal soaps", "Systemic insecticides"]),
    (
        "PinkBollworm-Larva",
        &["Bacillus thuringiensis (Bt)", "Insect growth regulators (e.g., diflubenzuron)"],
    ),
    ("Spodoptera", &["Bacillus thuringiensis (Bt)", "Pyrethroids", "Organophosphates"]),
    (
        "SpottedBollworm-Larva",
        &["Bacillus thuringiensis (Bt)", "Insect growth regulators (e.g., methoxyfenozide)"],
    ),
    ("Thrips", &["Neonicotinoids", "Spinosad", "Pyrethroids"]),
    (
        "Whitefly",
        &["Neonicotinoids", "Insect growth regulators (e.g., pyriproxyfen)", "Pyrethroids"],
    ),
];

impl Taxonomy {
    fn from_table(kind: ModelKind, table: &[(&str, &[&str])]) -> Self {
        let entries = table
            .iter()
            .map(|(name, pesticides)| PestEntry {
                name: name.to_string(),
                pesticides: pesticides.iter().map(|p| p.to_string()).collect(),
            })
            .collect();
        Self { kind, entries }
    }

    pub fn detector() -> Self {
        Self::from_table(ModelKind::Detector, DETECTOR_PESTS)
    }

    pub fn tabular() -> Self {
        Self::from_table(ModelKind::Tabular, TABULAR_PESTS)
    }

    pub fn weekly() -> Self {
        Self::from_table(ModelKind::Weekly, WEEKLY_PESTS)
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PestEntry> {
        self.entries.get(index)
    }

    pub fn entry(&self, index: usize) -> Result<&PestEntry, TaxonomyError> {
        self.entries.get(index).ok_or(TaxonomyError::OutOfRange {
            kind: self.kind,
            index,
            size: self.entries.len(),
        })
    }

    pub fn label_for(&self, index: usize) -> Result<&str, TaxonomyError> {
        self.entry(index).map(|e| e.name.as_str())
    }

    pub fn pesticides_for(&self, index: usize) -> Result<&[String], TaxonomyError> {
        self.entry(index).map(|e| e.pesticides.as_slice())
    }

    pub fn recommendation_for(&self, index: usize) -> Result<String, TaxonomyError> {
        self.entry(index).map(PestEntry::recommendation)
    }

    /// Looks up a classifier label that counts from 1. Zero and labels past the
    /// end of the table resolve to `None`.
    pub fn get_one_based(&self, label: i64) -> Option<&PestEntry> {
        if label < 1 {
            return None;
        }
        usize::try_from(label - 1).ok().and_then(|i| self.get(i))
    }
}

/// The three pest tables, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub detector: Taxonomy,
    pub tabular: Taxonomy,
    pub weekly: Taxonomy,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            detector: Taxonomy::detector(),
            tabular: Taxonomy::tabular(),
            weekly: Taxonomy::weekly(),
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
