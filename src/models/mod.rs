use serde::{Deserialize, Serialize};

/// Structured metadata extracted from a single product photo.
///
/// `image_url` is always set server-side from the storage upload; whatever the
/// model emits for it is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    /// ISO-8601 date or date-time, exactly as the model emitted it.
    pub expiration_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_type: Option<ExpirationType>,
    #[serde(default)]
    pub image_url: String,
    pub amount: f64,
    pub unit: Unit,
    pub category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationType {
    BestBefore,
    UseBy,
}

impl std::fmt::Display for ExpirationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExpirationType::BestBefore => "賞味期限",
            ExpirationType::UseBy => "消費期限",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "ml")]
    Milliliter,
    #[serde(rename = "L")]
    Liter,
    #[serde(rename = "個")]
    Piece,
    #[serde(rename = "枚")]
    Sheet,
    #[serde(rename = "本")]
    Bottle,
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Milliliter => "ml",
            Unit::Liter => "L",
            Unit::Piece => "個",
            Unit::Sheet => "枚",
            Unit::Bottle => "本",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "肉")]
    Meat,
    #[serde(rename = "野菜")]
    Vegetable,
    #[serde(rename = "魚")]
    Fish,
    #[serde(rename = "調味料")]
    Seasoning,
    #[serde(rename = "お菓子")]
    Snack,
    #[serde(rename = "飲料")]
    Beverage,
    #[serde(rename = "その他")]
    Other,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Meat => "肉",
            Category::Vegetable => "野菜",
            Category::Fish => "魚",
            Category::Seasoning => "調味料",
            Category::Snack => "お菓子",
            Category::Beverage => "飲料",
            Category::Other => "その他",
        };
        write!(f, "{}", s)
    }
}

/// Per-user accumulated product list, persisted as `{userId}.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub products: Vec<ProductRecord>,
}

impl SessionDocument {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A dish suggestion built from soon-to-expire ingredients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuSuggestion {
    pub title: String,
    pub ingredients: Vec<String>,
    pub indication: String,
}
