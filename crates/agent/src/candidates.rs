use rust_decimal::Decimal;

use cantina_core::context::{RecommendationContext, WineTypePreference};
use cantina_core::domain::product::{Product, WineType};

/// Multiplier applied to the declared per-bottle budget when narrowing
/// candidates. A little headroom keeps wines just above the ceiling in play;
/// the guest still sees the real price before confirming.
pub const BUDGET_HEADROOM: Decimal = Decimal::from_parts(115, 0, 0, false, 2);

/// Narrow the available catalog to what the declared context allows.
pub fn select_candidates(products: &[Product], context: &RecommendationContext) -> Vec<Product> {
    let ceiling = context.budget.map(|budget| budget * BUDGET_HEADROOM);

    products
        .iter()
        .filter(|product| product.is_available)
        .filter(|product| matches_preference(product.wine_type, context.wine_type))
        .filter(|product| ceiling.map_or(true, |ceiling| product.price <= ceiling))
        .cloned()
        .collect()
}

fn matches_preference(wine_type: WineType, preference: WineTypePreference) -> bool {
    match preference {
        WineTypePreference::Any => true,
        WineTypePreference::Red => wine_type == WineType::Red,
        WineTypePreference::White => wine_type == WineType::White,
        WineTypePreference::Rose => wine_type == WineType::Rose,
        WineTypePreference::Sparkling => wine_type == WineType::Sparkling,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use cantina_core::context::{ContextBuilder, Dish, JourneyPreference, WineTypePreference};
    use cantina_core::domain::product::{Product, ProductId, WineType};

    use super::select_candidates;

    fn product(id: &str, wine_type: WineType, price_cents: i64, available: bool) -> Product {
        Product {
            id: ProductId(id.to_owned()),
            name: id.to_owned(),
            wine_type,
            price: Decimal::new(price_cents, 2),
            margin: None,
            is_available: available,
        }
    }

    fn context(
        wine_type: WineTypePreference,
        budget_cents: Option<i64>,
    ) -> cantina_core::RecommendationContext {
        ContextBuilder::new()
            .dish(Dish::named("Brasato"))
            .guest_count(2)
            .wine_type(wine_type)
            .journey_preference(JourneyPreference::Single)
            .budget(budget_cents.map(|cents| Decimal::new(cents, 2)))
            .build()
            .expect("valid context")
    }

    #[test]
    fn budget_ceiling_allows_fifteen_percent_headroom() {
        let products = vec![
            product("p-within", WineType::Red, 2_000, true),
            product("p-headroom", WineType::Red, 2_250, true),
            product("p-above", WineType::Red, 2_400, true),
        ];

        // 20.00 budget: headroom ceiling is 23.00
        let selected = select_candidates(&products, &context(WineTypePreference::Red, Some(2_000)));

        let ids: Vec<&str> = selected.iter().map(|p| p.id.0.as_str()).collect();
        assert_eq!(ids, vec!["p-within", "p-headroom"]);
    }

    #[test]
    fn wine_type_filter_is_skipped_for_any() {
        let products = vec![
            product("p-red", WineType::Red, 1_500, true),
            product("p-white", WineType::White, 1_500, true),
        ];

        let any = select_candidates(&products, &context(WineTypePreference::Any, None));
        assert_eq!(any.len(), 2);

        let whites = select_candidates(&products, &context(WineTypePreference::White, None));
        assert_eq!(whites.len(), 1);
        assert_eq!(whites[0].id.0, "p-white");
    }

    #[test]
    fn unavailable_products_never_become_candidates() {
        let products = vec![product("p-gone", WineType::Red, 1_500, false)];
        let selected = select_candidates(&products, &context(WineTypePreference::Any, None));
        assert!(selected.is_empty());
    }
}
