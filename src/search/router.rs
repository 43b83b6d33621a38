

use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::templates::{QueryTemplate, QueryTemplateLibrary, names};
use crate::core::entities::{EntityBag, EntityKey, EntityValue};
use crate::core::intent::Intent;


#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouterError {
    #[error("No applicable template for {intent} with entities [{present}]")]
    NoApplicableTemplate { intent: Intent, present: String },

    #[error("Template {0} is not in the library")]
    UnknownTemplate(String),
}


/// Template chosen for a turn plus the parameters it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub template: &'static str,
    pub statement: &'static str,
    pub params: Map<String, Value>,
    /// Chosen through the intent's default route rather than a candidate.
    pub used_default: bool,
}


struct DefaultRoute {
    template: &'static str,
    seed: &'static [(EntityKey, f64)],
}

struct RoutePlan {
    candidates: &'static [&'static str],
    default: Option<DefaultRoute>,
}

const CLEANLINESS_SEED: &[(EntityKey, f64)] = &[(EntityKey::MinCleanliness, 8.0)];

fn route_plan(intent: Intent) -> RoutePlan {
    use names::*;

    match intent {
        Intent::HotelSearch => RoutePlan {
            candidates: &[HOTELS_BY_CITY, HOTELS_BY_COUNTRY, HOTELS_BY_RATING_THRESHOLD],
            default: None,
        },
        Intent::HotelRecommendation => RoutePlan {
            candidates: &[
                TOP_HOTELS_FOR_TRAVELLER_TYPE,
                HOTELS_BY_CLEANLINESS,
                HOTELS_BY_COMFORT,
                HOTELS_BY_VALUE,
                HOTELS_BY_STAFF,
            ],
            default: Some(DefaultRoute {
                template: HOTELS_BY_CLEANLINESS,
                seed: CLEANLINESS_SEED,
            }),
        },
        Intent::ReviewLookup => RoutePlan {
            candidates: &[REVIEWS_BY_HOTEL_NAME, REVIEWS_BY_HOTEL_ID],
            default: None,
        },
        Intent::LocationQuery => RoutePlan {
            candidates: &[BEST_LOCATION_IN_CITY, BEST_LOCATION_OVERALL],
            default: None,
        },
        Intent::VisaQuestion => RoutePlan {
            candidates: &[TRAVELLERS_WITHOUT_VISA, VISA_REQUIREMENTS],
            default: None,
        },
        Intent::AmenityFilter => RoutePlan {
            candidates: &[
                HOTELS_BY_CLEANLINESS,
                HOTELS_BY_COMFORT,
                HOTELS_BY_VALUE,
                HOTELS_BY_STAFF,
                HOTELS_BY_LOCATION_SCORE,
                HOTELS_BY_FACILITIES,
            ],
            default: Some(DefaultRoute {
                template: HOTELS_BY_CLEANLINESS,
                seed: CLEANLINESS_SEED,
            }),
        },
        Intent::GeneralQuestionAnswering => RoutePlan {
            candidates: &[HOTEL_FULL_DETAILS, HOTELS_BY_CITY, HOTELS_BY_COUNTRY],
            default: Some(DefaultRoute {
                template: TOP_RATED_HOTELS,
                seed: &[],
            }),
        },
        Intent::CasualConversation => RoutePlan {
            candidates: &[],
            default: None,
        },
    }
}


/// Maps (intent, entities) to one structured template with bound parameters.
pub struct QueryRouter {
    library: Arc<QueryTemplateLibrary>,
}

impl QueryRouter {
    /// Fails when a route names a template the library does not carry.
    pub fn new(library: Arc<QueryTemplateLibrary>) -> Result<Self, RouterError> {
        use strum::IntoEnumIterator;

        for intent in Intent::iter() {
            let plan = route_plan(intent);
            let referenced = plan
                .candidates
                .iter()
                .copied()
                .chain(plan.default.as_ref().map(|d| d.template));
            for name in referenced {
                if !library.contains(name) {
                    return Err(RouterError::UnknownTemplate(name.to_string()));
                }
            }
        }

        Ok(Self { library })
    }

    /// First candidate whose required slots are all populated wins, then the default route.
    pub fn select(&self, intent: Intent, entities: &EntityBag) -> Result<BoundQuery, RouterError> {
        let plan = route_plan(intent);

        for name in plan.candidates {
            let template = self.template(name)?;
            if let Some(params) = bind(template, entities, &[]) {
                debug!("Routed {} to {}", intent, name);
                return Ok(BoundQuery {
                    template: template.name,
                    statement: template.statement,
                    params,
                    used_default: false,
                });
            }
        }

        if let Some(default) = plan.default {
            let template = self.template(default.template)?;
            if let Some(params) = bind(template, entities, default.seed) {
                debug!("Routed {} to default {}", intent, default.template);
                return Ok(BoundQuery {
                    template: template.name,
                    statement: template.statement,
                    params,
                    used_default: true,
                });
            }
        }

        Err(RouterError::NoApplicableTemplate {
            intent,
            present: entities
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    fn template(&self, name: &str) -> Result<&QueryTemplate, RouterError> {
        self.library
            .get(name)
            .ok_or_else(|| RouterError::UnknownTemplate(name.to_string()))
    }
}

/// Copies only declared slots. Entity values win over seeds, seeds over slot defaults.
/// `None` when a required slot cannot be filled.
fn bind(template: &QueryTemplate, entities: &EntityBag, seed: &[(EntityKey, f64)]) -> Option<Map<String, Value>> {
    let mut params = Map::new();

    for slot in &template.slots {
        let from_entities = entities.get(slot.key).and_then(|v| v.coerce(slot.kind));
        let from_seed = || {
            seed.iter()
                .find(|(key, _)| *key == slot.key)
                .and_then(|(_, value)| EntityValue::Number(*value).coerce(slot.kind))
        };

        match from_entities.or_else(from_seed).or_else(|| slot.default.clone()) {
            Some(value) => {
                params.insert(slot.param_name().to_string(), value.to_json());
            }
            None if slot.required => return None,
            None => {}
        }
    }

    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strum::IntoEnumIterator;

    fn router() -> QueryRouter {
        QueryRouter::new(Arc::new(QueryTemplateLibrary::standard())).unwrap()
    }

    #[test]
    fn test_city_search() {
        let entities = EntityBag::builder().with(EntityKey::City, "Paris").build();
        let bound = router().select(Intent::HotelSearch, &entities).unwrap();
        assert_eq!(bound.template, names::HOTELS_BY_CITY);
        assert_eq!(bound.params, json!({"city": "Paris"}).as_object().cloned().unwrap());
        assert!(!bound.used_default);
    }

    #[test]
    fn test_first_candidate_wins_and_extras_ignored() {
        let entities = EntityBag::builder()
            .with(EntityKey::Country, "Japan")
            .with(EntityKey::MinRating, 8.0)
            .with(EntityKey::TravellerType, "Solo")
            .build();
        let bound = router().select(Intent::HotelSearch, &entities).unwrap();
        assert_eq!(bound.template, names::HOTELS_BY_COUNTRY);
        assert_eq!(bound.params.len(), 1);
        assert_eq!(bound.params["country"], json!("Japan"));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let r = router();
        for intent in Intent::iter().filter(|i| !i.is_conversational()) {
            let entities = EntityBag::builder()
                .with(EntityKey::City, "Rome")
                .with(EntityKey::HotelName, "Hotel Roma")
                .with(EntityKey::MinComfort, 7.5)
                .with(EntityKey::FromCountry, "Egypt")
                .with(EntityKey::ToCountry, "Italy")
                .build();
            let first = r.select(intent, &entities);
            for _ in 0..5 {
                assert_eq!(r.select(intent, &entities), first);
            }
        }
    }

    #[test]
    fn test_every_template_selected_when_its_required_slots_present() {
        let r = router();
        let library = QueryTemplateLibrary::standard();
        for intent in Intent::iter() {
            let plan = route_plan(intent);
            for (position, name) in plan.candidates.iter().enumerate() {
                let template = library.get(name).unwrap();
                let mut builder = EntityBag::builder();
                for key in template.required_keys() {
                    let value: EntityValue = match key.kind() {
                        crate::core::entities::SlotKind::Text => "x".into(),
                        _ => 9.0.into(),
                    };
                    builder.insert(key, value);
                }
                let entities = builder.build();
                let earlier_match = plan.candidates[..position].iter().any(|earlier| {
                    library
                        .get(earlier)
                        .unwrap()
                        .required_keys()
                        .all(|k| entities.contains(k))
                });
                if !earlier_match {
                    assert_eq!(r.select(intent, &entities).unwrap().template, *name);
                }
            }
        }
    }

    #[test]
    fn test_recommendation_default_seeds_threshold() {
        let entities = EntityBag::builder().with(EntityKey::City, "Cairo").build();
        let bound = router().select(Intent::HotelRecommendation, &entities).unwrap();
        assert_eq!(bound.template, names::HOTELS_BY_CLEANLINESS);
        assert!(bound.used_default);
        assert_eq!(bound.params["min_cleanliness"], json!(8.0));
        assert_eq!(bound.params["limit"], json!(10));
    }

    #[test]
    fn test_limit_entity_overrides_default() {
        let entities = EntityBag::builder()
            .with(EntityKey::TravellerType, "Family")
            .with(EntityKey::Limit, 3i64)
            .build();
        let bound = router().select(Intent::HotelRecommendation, &entities).unwrap();
        assert_eq!(bound.template, names::TOP_HOTELS_FOR_TRAVELLER_TYPE);
        assert_eq!(bound.params["limit"], json!(3));
        assert_eq!(bound.params["traveller_type"], json!("Family"));
    }

    #[test]
    fn test_location_falls_back_to_unscoped() {
        let bound = router().select(Intent::LocationQuery, &EntityBag::new()).unwrap();
        assert_eq!(bound.template, names::BEST_LOCATION_OVERALL);
        assert_eq!(bound.params["limit"], json!(5));
    }

    #[test]
    fn test_general_default_is_top_rated() {
        let bound = router()
            .select(Intent::GeneralQuestionAnswering, &EntityBag::new())
            .unwrap();
        assert_eq!(bound.template, names::TOP_RATED_HOTELS);
        assert!(bound.used_default);
    }

    #[test]
    fn test_no_applicable_template() {
        let entities = EntityBag::builder().with(EntityKey::FromCountry, "Egypt").build();
        let err = router().select(Intent::VisaQuestion, &entities).unwrap_err();
        assert_eq!(
            err,
            RouterError::NoApplicableTemplate {
                intent: Intent::VisaQuestion,
                present: "from_country".to_string()
            }
        );

        assert!(router().select(Intent::ReviewLookup, &EntityBag::new()).is_err());
        assert!(router().select(Intent::CasualConversation, &EntityBag::new()).is_err());
    }

    #[test]
    fn test_visa_question_with_traveller_type_counts_travellers() {
        let countries = || {
            EntityBag::builder()
                .with(EntityKey::FromCountry, "Egypt")
                .with(EntityKey::ToCountry, "France")
        };

        let bound = router().select(Intent::VisaQuestion, &countries().build()).unwrap();
        assert_eq!(bound.template, "visa_requirements");

        let bound = router()
            .select(Intent::VisaQuestion, &countries().with(EntityKey::TravellerType, "Family").build())
            .unwrap();
        assert_eq!(bound.template, "travellers_without_visa");
        assert_eq!(bound.params["from_country"], "Egypt");
        assert_eq!(bound.params["to_country"], "France");
        assert_eq!(bound.params["traveller_type"], "Family");
        assert!(!bound.used_default);
    }

    #[test]
    fn test_missing_template_rejected_at_construction() {
        let library = QueryTemplateLibrary::empty();
        assert!(matches!(
            QueryRouter::new(Arc::new(library)),
            Err(RouterError::UnknownTemplate(_))
        ));
    }
}
