//! Declared-context capture for the setup flow.
//!
//! The guest declares dishes, party size, and preferences once, before any
//! generation call. The builder validates that declaration and freezes it into
//! a [`RecommendationContext`], which is snapshotted onto the session and
//! rendered into the hidden briefing turn the orchestrator consumes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bottles::bottles_needed;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dish {
    pub name: String,
    pub category: Option<String>,
    pub main_ingredient: Option<String>,
    pub cooking_method: Option<String>,
}

impl Dish {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), category: None, main_ingredient: None, cooking_method: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WineTypePreference {
    Red,
    White,
    Rose,
    Sparkling,
    Any,
}

impl WineTypePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::White => "white",
            Self::Rose => "rose",
            Self::Sparkling => "sparkling",
            Self::Any => "any",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyPreference {
    Single,
    Journey,
}

/// Frozen customer declaration. The server copy on the session is the source
/// of truth; clients only cache it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationContext {
    pub dishes: Vec<Dish>,
    pub guest_count: u32,
    pub wine_type: WineTypePreference,
    pub journey_preference: JourneyPreference,
    pub budget: Option<Decimal>,
    pub bottles_target: Option<u32>,
}

impl RecommendationContext {
    /// Natural-language briefing rendered into the hidden first turn. The
    /// orchestrator reuses it verbatim on every subsequent generation call.
    pub fn briefing_message(&self) -> String {
        let dishes = self
            .dishes
            .iter()
            .map(|dish| {
                let mut parts = vec![dish.name.clone()];
                if let Some(ingredient) = &dish.main_ingredient {
                    parts.push(format!("main ingredient {ingredient}"));
                }
                if let Some(method) = &dish.cooking_method {
                    parts.push(format!("{method}"));
                }
                parts.join(", ")
            })
            .collect::<Vec<_>>()
            .join("; ");

        let mut briefing = format!(
            "We are a table of {} guests. Tonight we are having: {dishes}. \
             Preferred wine type: {}.",
            self.guest_count,
            self.wine_type.as_str()
        );

        match self.journey_preference {
            JourneyPreference::Single => {
                briefing.push_str(" We would like a single wine for the whole table.");
            }
            JourneyPreference::Journey => {
                let target = self.bottles_target.unwrap_or_else(|| bottles_needed(self.guest_count));
                briefing.push_str(&format!(
                    " We would like a tasting journey of {target} bottles across the meal."
                ));
            }
        }

        if let Some(budget) = self.budget {
            briefing.push_str(&format!(" Our budget is around {budget} per bottle."));
        }

        briefing
    }
}

#[derive(Debug, Default)]
pub struct ContextBuilder {
    dishes: Vec<Dish>,
    guest_count: Option<u32>,
    wine_type: Option<WineTypePreference>,
    journey_preference: Option<JourneyPreference>,
    budget: Option<Decimal>,
    bottles_target: Option<u32>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dish(mut self, dish: Dish) -> Self {
        self.dishes.push(dish);
        self
    }

    pub fn dishes(mut self, dishes: impl IntoIterator<Item = Dish>) -> Self {
        self.dishes.extend(dishes);
        self
    }

    pub fn guest_count(mut self, guest_count: u32) -> Self {
        self.guest_count = Some(guest_count);
        self
    }

    pub fn wine_type(mut self, wine_type: WineTypePreference) -> Self {
        self.wine_type = Some(wine_type);
        self
    }

    pub fn journey_preference(mut self, preference: JourneyPreference) -> Self {
        self.journey_preference = Some(preference);
        self
    }

    pub fn budget(mut self, budget: Option<Decimal>) -> Self {
        self.budget = budget;
        self
    }

    pub fn bottles_target(mut self, target: Option<u32>) -> Self {
        self.bottles_target = target;
        self
    }

    /// Validate and freeze. In journey mode a missing bottle target defaults
    /// to the calculator's suggestion for the party size.
    pub fn build(self) -> Result<RecommendationContext, DomainError> {
        let guest_count = self
            .guest_count
            .ok_or_else(|| DomainError::ContextValidation("guest_count is required".to_owned()))?;
        if guest_count < 1 {
            return Err(DomainError::ContextValidation(
                "guest_count must be at least 1".to_owned(),
            ));
        }
        if self.dishes.is_empty() {
            return Err(DomainError::ContextValidation(
                "at least one dish must be selected".to_owned(),
            ));
        }
        let wine_type = self.wine_type.ok_or_else(|| {
            DomainError::ContextValidation("wine_type preference is required".to_owned())
        })?;
        let journey_preference = self.journey_preference.ok_or_else(|| {
            DomainError::ContextValidation("journey preference is required".to_owned())
        })?;
        if let Some(budget) = self.budget {
            if budget <= Decimal::ZERO {
                return Err(DomainError::ContextValidation(
                    "budget must be positive when set".to_owned(),
                ));
            }
        }

        let bottles_target = match journey_preference {
            JourneyPreference::Journey => {
                Some(self.bottles_target.unwrap_or_else(|| bottles_needed(guest_count).max(1)))
            }
            JourneyPreference::Single => None,
        };

        Ok(RecommendationContext {
            dishes: self.dishes,
            guest_count,
            wine_type,
            journey_preference,
            budget: self.budget,
            bottles_target,
        })
    }
}
