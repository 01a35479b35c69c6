use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::domain::{Category, ClassifiedEvent, NormalizedEvent};
use crate::observability::metrics;
use crate::registry::SourceConfig;

/// City name (lowercase) to ISO-3166 alpha-2 country. Maintained by hand;
/// a miss falls back to the source's configured default country, never to
/// "unknown".
static CITY_COUNTRY: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("rome", "IT"),
        ("milan", "IT"),
        ("turin", "IT"),
        ("naples", "IT"),
        ("bologna", "IT"),
        ("florence", "IT"),
        ("palermo", "IT"),
        ("berlin", "DE"),
        ("hamburg", "DE"),
        ("munich", "DE"),
        ("cologne", "DE"),
        ("frankfurt", "DE"),
        ("paris", "FR"),
        ("lyon", "FR"),
        ("marseille", "FR"),
        ("madrid", "ES"),
        ("barcelona", "ES"),
        ("valencia", "ES"),
        ("london", "GB"),
        ("manchester", "GB"),
        ("glasgow", "GB"),
        ("amsterdam", "NL"),
        ("the hague", "NL"),
        ("brussels", "BE"),
        ("vienna", "AT"),
        ("zurich", "CH"),
        ("geneva", "CH"),
        ("lisbon", "PT"),
        ("athens", "GR"),
        ("warsaw", "PL"),
        ("prague", "CZ"),
        ("dublin", "IE"),
        ("stockholm", "SE"),
        ("copenhagen", "DK"),
        ("oslo", "NO"),
        ("helsinki", "FI"),
        ("new york", "US"),
        ("washington", "US"),
        ("los angeles", "US"),
        ("chicago", "US"),
        ("toronto", "CA"),
        ("vancouver", "CA"),
    ])
});

/// Ordered keyword rules for category assignment. First match over the
/// title, then the description, wins; order is part of the contract, so
/// "hunger strike vigil" classifies by whichever keyword appears first
/// in this table, deterministically.
const KEYWORD_RULES: &[(&str, Category)] = &[
    ("strike", Category::Strike),
    ("walkout", Category::Strike),
    ("vigil", Category::Vigil),
    ("candlelight", Category::Vigil),
    ("march", Category::March),
    ("parade", Category::March),
    ("rally", Category::Rally),
    ("demonstration", Category::Demonstration),
    ("demo ", Category::Demonstration),
    ("protest", Category::Protest),
    ("occupation", Category::Protest),
    ("sit-in", Category::Protest),
    ("blockade", Category::Protest),
];

/// Assign country and category. Both are always concrete values: country
/// falls back to the source default, category to `Other`.
pub fn classify(event: NormalizedEvent, source: &SourceConfig) -> ClassifiedEvent {
    let country_code = match country_for_city(&event.city) {
        Some(code) => {
            metrics::classify::city_matched();
            code.to_string()
        }
        None => {
            metrics::classify::country_fallback();
            source.default_country.to_ascii_uppercase()
        }
    };
    let category = categorize(&event.title, event.description.as_deref());
    if category == Category::Other {
        metrics::classify::category_other();
    }

    ClassifiedEvent {
        event,
        country_code,
        category,
        event_type: category.as_str().to_string(),
    }
}

fn country_for_city(city: &str) -> Option<&'static str> {
    CITY_COUNTRY.get(city.to_lowercase().as_str()).copied()
}

/// First keyword rule that matches the title wins; the description is
/// consulted only when the title matches nothing.
pub fn categorize(title: &str, description: Option<&str>) -> Category {
    let title_lower = title.to_lowercase();
    for (keyword, category) in KEYWORD_RULES {
        if title_lower.contains(keyword) {
            return *category;
        }
    }
    if let Some(description) = description {
        let description_lower = description.to_lowercase();
        for (keyword, category) in KEYWORD_RULES {
            if description_lower.contains(keyword) {
                return *category;
            }
        }
    }
    Category::Other
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConnectorSpec, HtmlSelectors};
    use chrono::NaiveDate;

    fn source_with_default(country: &str) -> SourceConfig {
        SourceConfig {
            source_id: "test-source".to_string(),
            enabled: true,
            default_country: country.to_string(),
            timeout_secs: 30,
            headers: Default::default(),
            connector: ConnectorSpec::Html {
                endpoint: "https://example.org".to_string(),
                selectors: HtmlSelectors {
                    listing: ".e".to_string(),
                    title: ".t".to_string(),
                    date: None,
                    time: None,
                    location: None,
                    description: None,
                    link: None,
                },
            },
        }
    }

    fn event(title: &str, city: &str, description: Option<&str>) -> NormalizedEvent {
        NormalizedEvent {
            title: title.to_string(),
            city: city.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            time: None,
            url: None,
            source_id: "test-source".to_string(),
            description: description.map(str::to_string),
        }
    }

    #[test]
    fn known_city_wins_over_source_default() {
        let classified = classify(event("Climate March", "Berlin", None), &source_with_default("IT"));
        assert_eq!(classified.country_code, "DE");
    }

    #[test]
    fn unknown_city_falls_back_to_source_default() {
        let classified = classify(event("Climate March", "Smalltown", None), &source_with_default("it"));
        assert_eq!(classified.country_code, "IT");
    }

    #[test]
    fn keyword_order_is_stable() {
        // "strike" precedes "vigil" in the rule table, so a title with
        // both classifies as Strike.
        assert_eq!(categorize("Hunger Strike Vigil", None), Category::Strike);
        assert_eq!(categorize("Vigil for Peace", None), Category::Vigil);
    }

    #[test]
    fn title_is_consulted_before_description() {
        assert_eq!(
            categorize("Silent Vigil", Some("a protest march downtown")),
            Category::Vigil
        );
        assert_eq!(
            categorize("Community Gathering", Some("city-wide general strike")),
            Category::Strike
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(categorize("CLIMATE MARCH", None), Category::March);
        assert_eq!(categorize("Protest at Parliament", None), Category::Protest);
    }

    #[test]
    fn unmatched_titles_fall_back_to_other_never_null() {
        let classified = classify(event("Book Fair", "Rome", None), &source_with_default("IT"));
        assert_eq!(classified.category, Category::Other);
        assert_eq!(classified.event_type, "other");
        assert!(!classified.country_code.is_empty());
    }
}
