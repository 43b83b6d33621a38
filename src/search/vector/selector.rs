

use tracing::debug;

use super::{HOTEL_INDEX, REVIEW_INDEX, VISA_INDEX};
use crate::core::entities::{EntityBag, EntityKey};
use crate::core::intent::Intent;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Include,
    /// Replaces everything selected so far and stops evaluation.
    Only,
}

struct Rule {
    name: &'static str,
    applies: fn(Intent, &EntityBag, &[&'static str]) -> bool,
    index: &'static str,
    effect: Effect,
}

fn has_demographic_signal(_: Intent, entities: &EntityBag, _: &[&'static str]) -> bool {
    entities.contains(EntityKey::TravellerType) || entities.contains(EntityKey::FromCountry)
}

fn is_review_lookup(intent: Intent, _: &EntityBag, _: &[&'static str]) -> bool {
    intent == Intent::ReviewLookup
}

fn is_visa(intent: Intent, _: &EntityBag, _: &[&'static str]) -> bool {
    intent == Intent::VisaQuestion
}

fn is_hotel_oriented(intent: Intent, _: &EntityBag, _: &[&'static str]) -> bool {
    intent.is_hotel_oriented()
}

fn nothing_selected(_: Intent, _: &EntityBag, selected: &[&'static str]) -> bool {
    selected.is_empty()
}

const RULES: &[Rule] = &[
    Rule {
        name: "demographic entities",
        applies: has_demographic_signal,
        index: REVIEW_INDEX,
        effect: Effect::Include,
    },
    Rule {
        name: "review lookup",
        applies: is_review_lookup,
        index: REVIEW_INDEX,
        effect: Effect::Include,
    },
    Rule {
        name: "visa question",
        applies: is_visa,
        index: VISA_INDEX,
        effect: Effect::Only,
    },
    Rule {
        name: "hotel oriented intent",
        applies: is_hotel_oriented,
        index: HOTEL_INDEX,
        effect: Effect::Include,
    },
    Rule {
        name: "fallback",
        applies: nothing_selected,
        index: HOTEL_INDEX,
        effect: Effect::Include,
    },
];


/// Decides which vector indexes a turn searches.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexSelector;

impl IndexSelector {
    pub fn new() -> Self {
        Self
    }

    /// Indexes in rule order, without duplicates. Empty only for conversational intents.
    pub fn select(&self, intent: Intent, entities: &EntityBag, raw_text: &str) -> Vec<&'static str> {
        if intent.is_conversational() {
            return Vec::new();
        }

        let mut selected: Vec<&'static str> = Vec::new();
        for rule in RULES {
            if !(rule.applies)(intent, entities, &selected) {
                continue;
            }
            match rule.effect {
                Effect::Include => {
                    if !selected.contains(&rule.index) {
                        selected.push(rule.index);
                    }
                }
                Effect::Only => {
                    selected.clear();
                    selected.push(rule.index);
                    debug!("Rule '{}' fixed indexes to [{}]", rule.name, rule.index);
                    return selected;
                }
            }
            debug!("Rule '{}' added {}", rule.name, rule.index);
        }

        debug!(
            "Selected indexes {:?} for {} ({})",
            selected,
            intent,
            crate::safe_truncate(raw_text, 60)
        );
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn select(intent: Intent, entities: EntityBag) -> Vec<&'static str> {
        IndexSelector::new().select(intent, &entities, "query")
    }

    #[test]
    fn test_city_search_uses_hotel_only() {
        let entities = EntityBag::builder().with(EntityKey::City, "Paris").build();
        assert_eq!(select(Intent::HotelSearch, entities), vec![HOTEL_INDEX]);
    }

    #[test]
    fn test_traveller_type_adds_review_first() {
        let entities = EntityBag::builder().with(EntityKey::TravellerType, "Solo").build();
        assert_eq!(
            select(Intent::HotelRecommendation, entities),
            vec![REVIEW_INDEX, HOTEL_INDEX]
        );
    }

    #[test]
    fn test_traveller_type_always_includes_review() {
        for intent in Intent::iter().filter(|i| !i.is_conversational() && *i != Intent::VisaQuestion) {
            let entities = EntityBag::builder().with(EntityKey::TravellerType, "Family").build();
            assert!(select(intent, entities).contains(&REVIEW_INDEX), "{}", intent);
        }
    }

    #[test]
    fn test_visa_is_exclusive() {
        let entities = EntityBag::builder()
            .with(EntityKey::FromCountry, "Egypt")
            .with(EntityKey::ToCountry, "France")
            .with(EntityKey::TravellerType, "Business")
            .build();
        assert_eq!(select(Intent::VisaQuestion, entities), vec![VISA_INDEX]);
        assert_eq!(select(Intent::VisaQuestion, EntityBag::new()), vec![VISA_INDEX]);
    }

    #[test]
    fn test_review_lookup_deduplicates() {
        let entities = EntityBag::builder().with(EntityKey::FromCountry, "USA").build();
        assert_eq!(select(Intent::ReviewLookup, entities), vec![REVIEW_INDEX]);
        assert_eq!(select(Intent::ReviewLookup, EntityBag::new()), vec![REVIEW_INDEX]);
    }

    #[test]
    fn test_conversational_selects_nothing() {
        let entities = EntityBag::builder().with(EntityKey::TravellerType, "Solo").build();
        assert!(select(Intent::CasualConversation, entities).is_empty());
    }

    #[test]
    fn test_never_empty_for_retrieval_intents() {
        for intent in Intent::iter().filter(|i| !i.is_conversational()) {
            assert!(!select(intent, EntityBag::new()).is_empty(), "{}", intent);
        }
    }
}
