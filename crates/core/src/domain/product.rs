use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WineType {
    Red,
    White,
    Rose,
    Sparkling,
}

impl WineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::White => "white",
            Self::Rose => "rose",
            Self::Sparkling => "sparkling",
        }
    }
}

/// Catalog item as seen by the recommendation core. Catalog CRUD lives
/// elsewhere; proposals snapshot `price` and `margin` from this view at the
/// moment of proposal and never re-read them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub wine_type: WineType,
    pub price: Decimal,
    pub margin: Option<Decimal>,
    pub is_available: bool,
}
