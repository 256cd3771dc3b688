use serde::{Deserialize, Serialize};

/// Crop names recognised in questions and metadata.
pub const CROPS: &[&str] = &[
    "wheat", "rice", "cotton", "sugarcane", "soyabean", "maize", "bajra", "jowar", "barley",
    "gram", "tur", "groundnut", "sunflower", "rapeseed", "mustard", "coconut", "arecanut",
    "cashew", "tea", "coffee", "rubber",
];

/// Indian states covered by the datasets.
pub const STATES: &[&str] = &[
    "andhra pradesh",
    "arunachal pradesh",
    "assam",
    "bihar",
    "chhattisgarh",
    "goa",
    "gujarat",
    "haryana",
    "himachal pradesh",
    "jharkhand",
    "karnataka",
    "kerala",
    "madhya pradesh",
    "maharashtra",
    "manipur",
    "meghalaya",
    "mizoram",
    "nagaland",
    "odisha",
    "punjab",
    "rajasthan",
    "sikkim",
    "tamil nadu",
    "telangana",
    "tripura",
    "uttar pradesh",
    "uttarakhand",
    "west bengal",
];

/// Measurement vocabulary shared by agricultural and climate datasets.
pub const METRICS: &[&str] = &[
    "production",
    "yield",
    "area",
    "rainfall",
    "temperature",
    "irrigation",
    "fertilizer",
    "price",
    "export",
    "import",
    "consumption",
    "harvest",
];

pub const CLIMATE_TERMS: &[&str] = &[
    "monsoon",
    "precipitation",
    "humidity",
    "drought",
    "flood",
    "cyclone",
    "rainfall pattern",
    "climate change",
    "seasonal variation",
    "weather",
];

/// Synonyms substituted into the question during query expansion.
pub const SYNONYMS: &[(&str, &[&str])] = &[
    ("production", &["yield", "output", "harvest", "cultivation"]),
    ("rainfall", &["precipitation", "monsoon", "rain"]),
    ("temperature", &["temp", "heat", "thermal"]),
    ("crop", &["produce", "agricultural product", "farming output"]),
    ("area", &["acreage", "land", "cultivation area"]),
    ("farmer", &["cultivator", "agriculturist", "grower"]),
    ("price", &["cost", "rate", "value", "market price"]),
];

/// Vocabulary terms matched in a question, grouped by entity class. Terms are
/// stored lowercase and deduplicated; the set only drives filtering and score
/// boosts, never document mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySet {
    pub crops: Vec<String>,
    pub states: Vec<String>,
    pub metrics: Vec<String>,
    pub climate_terms: Vec<String>,
}

impl EntitySet {
    /// Case-insensitive substring match of the question against the four
    /// fixed vocabularies. Every match is retained.
    pub fn extract(question: &str) -> Self {
        let question_lower = question.to_ascii_lowercase();
        Self {
            crops: matched_terms(&question_lower, CROPS),
            states: matched_terms(&question_lower, STATES),
            metrics: matched_terms(&question_lower, METRICS),
            climate_terms: matched_terms(&question_lower, CLIMATE_TERMS),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
            && self.states.is_empty()
            && self.metrics.is_empty()
            && self.climate_terms.is_empty()
    }

    pub fn total(&self) -> usize {
        self.crops.len() + self.states.len() + self.metrics.len() + self.climate_terms.len()
    }

    /// Whether the question names a specific crop or state. When it does, the
    /// metadata filter is expected to narrow results.
    pub fn has_scoping_terms(&self) -> bool {
        !self.crops.is_empty() || !self.states.is_empty()
    }
}

fn matched_terms(question_lower: &str, vocabulary: &[&str]) -> Vec<String> {
    let mut matches = Vec::new();
    for term in vocabulary {
        if question_lower.contains(term) && !matches.iter().any(|existing| existing == term) {
            matches.push((*term).to_owned());
        }
    }
    matches
}
