

use std::collections::BTreeMap;

use crate::core::entities::{EntityKey, EntityValue, SlotKind};


#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSlot {
    pub key: EntityKey,
    pub kind: SlotKind,
    pub required: bool,
    pub default: Option<EntityValue>,
}

impl TemplateSlot {
    pub fn required(key: EntityKey) -> Self {
        Self {
            key,
            kind: key.kind(),
            required: true,
            default: None,
        }
    }

    pub fn optional(key: EntityKey, default: impl Into<EntityValue>) -> Self {
        Self {
            key,
            kind: key.kind(),
            required: false,
            default: Some(default.into()),
        }
    }

    /// Query parameter name; slots are named after their entity key.
    pub fn param_name(&self) -> &'static str {
        self.key.as_str()
    }
}


/// A named Cypher statement with declared parameter slots.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub statement: &'static str,
    pub slots: Vec<TemplateSlot>,
}

impl QueryTemplate {
    pub fn new(
        name: &'static str,
        description: &'static str,
        statement: &'static str,
        slots: Vec<TemplateSlot>,
    ) -> Self {
        Self {
            name,
            description,
            statement,
            slots,
        }
    }

    pub fn required_keys(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.slots.iter().filter(|s| s.required).map(|s| s.key)
    }

    pub fn slot(&self, key: EntityKey) -> Option<&TemplateSlot> {
        self.slots.iter().find(|s| s.key == key)
    }
}


pub mod names {
    pub const HOTELS_BY_CITY: &str = "hotels_by_city";
    pub const HOTELS_BY_COUNTRY: &str = "hotels_by_country";
    pub const HOTELS_BY_RATING_THRESHOLD: &str = "hotels_by_rating_threshold";
    pub const TOP_HOTELS_FOR_TRAVELLER_TYPE: &str = "top_hotels_for_traveller_type";
    pub const HOTELS_BY_CLEANLINESS: &str = "hotels_by_cleanliness";
    pub const HOTELS_BY_COMFORT: &str = "hotels_by_comfort";
    pub const HOTELS_BY_VALUE: &str = "hotels_by_value";
    pub const HOTELS_BY_STAFF: &str = "hotels_by_staff";
    pub const HOTELS_BY_LOCATION_SCORE: &str = "hotels_by_location_score";
    pub const HOTELS_BY_FACILITIES: &str = "hotels_by_facilities";
    pub const REVIEWS_BY_HOTEL_NAME: &str = "reviews_by_hotel_name";
    pub const REVIEWS_BY_HOTEL_ID: &str = "reviews_by_hotel_id";
    pub const BEST_LOCATION_IN_CITY: &str = "best_location_in_city";
    pub const BEST_LOCATION_OVERALL: &str = "best_location_overall";
    pub const VISA_REQUIREMENTS: &str = "visa_requirements";
    pub const TRAVELLERS_WITHOUT_VISA: &str = "travellers_without_visa";
    pub const HOTEL_FULL_DETAILS: &str = "hotel_full_details";
    pub const HOTEL_DETAILS_BY_ID: &str = "hotel_details_by_id";
    pub const TOP_RATED_HOTELS: &str = "top_rated_hotels";
}

macro_rules! hotel_columns {
    () => {
        "h.hotel_id AS hotel_id, h.name AS hotel_name, h.star_rating AS star_rating, \
         h.average_reviews_score AS avg_score, c.name AS city, country.name AS country"
    };
}

macro_rules! review_score_template {
    ($name:expr, $description:expr, $key:expr, $param:literal, $field:literal, $alias:literal) => {
        QueryTemplate::new(
            $name,
            $description,
            concat!(
                "MATCH (r:Review)-[:REVIEWED]->(h:Hotel) ",
                "OPTIONAL MATCH (h)-[:LOCATED_IN]->(c:City)-[:LOCATED_IN]->(country:Country) ",
                "WITH h, c, country, AVG(r.", $field, ") AS ", $alias, " ",
                "WHERE ", $alias, " >= $", $param, " ",
                "RETURN ", hotel_columns!(), ", ", $alias, " ",
                "ORDER BY ", $alias, " DESC LIMIT $limit"
            ),
            vec![
                TemplateSlot::required($key),
                TemplateSlot::optional(EntityKey::Limit, 10i64),
            ],
        )
    };
}


/// Static catalogue of structured queries keyed by operation name.
#[derive(Debug, Clone, Default)]
pub struct QueryTemplateLibrary {
    templates: BTreeMap<&'static str, QueryTemplate>,
}

impl QueryTemplateLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template: QueryTemplate) -> Self {
        self.templates.insert(template.name, template);
        self
    }

    pub fn get(&self, name: &str) -> Option<&QueryTemplate> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.templates.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The hotel knowledge graph catalogue.
    pub fn standard() -> Self {
        use names::*;

        Self::empty()
            .with_template(QueryTemplate::new(
                HOTELS_BY_CITY,
                "Hotels in a city ordered by average review score",
                concat!(
                    "MATCH (h:Hotel)-[:LOCATED_IN]->(c:City {name: $city}) ",
                    "OPTIONAL MATCH (c)-[:LOCATED_IN]->(country:Country) ",
                    "RETURN ", hotel_columns!(), " ",
                    "ORDER BY h.average_reviews_score DESC"
                ),
                vec![TemplateSlot::required(EntityKey::City)],
            ))
            .with_template(QueryTemplate::new(
                HOTELS_BY_COUNTRY,
                "Hotels in a country ordered by average review score",
                concat!(
                    "MATCH (h:Hotel)-[:LOCATED_IN]->(c:City)-[:LOCATED_IN]->(country:Country {name: $country}) ",
                    "RETURN ", hotel_columns!(), " ",
                    "ORDER BY h.average_reviews_score DESC"
                ),
                vec![TemplateSlot::required(EntityKey::Country)],
            ))
            .with_template(QueryTemplate::new(
                HOTELS_BY_RATING_THRESHOLD,
                "Hotels whose average overall review score meets a threshold",
                concat!(
                    "MATCH (r:Review)-[:REVIEWED]->(h:Hotel) ",
                    "OPTIONAL MATCH (h)-[:LOCATED_IN]->(c:City)-[:LOCATED_IN]->(country:Country) ",
                    "WITH h, c, country, AVG(r.score_overall) AS avg_rating ",
                    "WHERE avg_rating >= $min_rating ",
                    "RETURN ", hotel_columns!(), ", avg_rating ",
                    "ORDER BY avg_rating DESC LIMIT 10"
                ),
                vec![TemplateSlot::required(EntityKey::MinRating)],
            ))
            .with_template(QueryTemplate::new(
                TOP_HOTELS_FOR_TRAVELLER_TYPE,
                "Best rated hotels among reviews written by one traveller type",
                concat!(
                    "MATCH (t:Traveller {type: $traveller_type})-[:WROTE]->(r:Review)-[:REVIEWED]->(h:Hotel) ",
                    "OPTIONAL MATCH (h)-[:LOCATED_IN]->(c:City)-[:LOCATED_IN]->(country:Country) ",
                    "WITH h, c, country, AVG(r.score_overall) AS avg_rating, COUNT(r) AS review_count ",
                    "RETURN ", hotel_columns!(), ", avg_rating, review_count, $traveller_type AS traveller_type ",
                    "ORDER BY avg_rating DESC, review_count DESC LIMIT $limit"
                ),
                vec![
                    TemplateSlot::required(EntityKey::TravellerType),
                    TemplateSlot::optional(EntityKey::Limit, 5i64),
                ],
            ))
            .with_template(review_score_template!(
                HOTELS_BY_CLEANLINESS,
                "Hotels by average cleanliness score",
                EntityKey::MinCleanliness,
                "min_cleanliness",
                "score_cleanliness",
                "avg_cleanliness"
            ))
            .with_template(review_score_template!(
                HOTELS_BY_COMFORT,
                "Hotels by average comfort score",
                EntityKey::MinComfort,
                "min_comfort",
                "score_comfort",
                "avg_comfort"
            ))
            .with_template(review_score_template!(
                HOTELS_BY_VALUE,
                "Hotels by average value for money score",
                EntityKey::MinValue,
                "min_value",
                "score_value_for_money",
                "avg_value"
            ))
            .with_template(review_score_template!(
                HOTELS_BY_STAFF,
                "Hotels by average staff score",
                EntityKey::MinStaff,
                "min_staff",
                "score_staff",
                "avg_staff_score"
            ))
            .with_template(review_score_template!(
                HOTELS_BY_LOCATION_SCORE,
                "Hotels by average location score",
                EntityKey::MinLocation,
                "min_location",
                "score_location",
                "avg_location_score"
            ))
            .with_template(review_score_template!(
                HOTELS_BY_FACILITIES,
                "Hotels by average facilities score",
                EntityKey::MinFacilities,
                "min_facilities",
                "score_facilities",
                "avg_facilities"
            ))
            .with_template(QueryTemplate::new(
                REVIEWS_BY_HOTEL_NAME,
                "Most recent reviews of a hotel by name",
                concat!(
                    "MATCH (h:Hotel {name: $hotel_name})<-[:REVIEWED]-(r:Review)<-[:WROTE]-(t:Traveller) ",
                    "RETURN r.review_id AS review_id, h.hotel_id AS hotel_id, h.name AS hotel_name, ",
                    "r.text AS review_text, r.date AS review_date, r.score_overall AS score_overall, ",
                    "r.score_cleanliness AS score_cleanliness, r.score_comfort AS score_comfort, ",
                    "r.score_location AS score_location, r.score_staff AS score_staff, ",
                    "t.type AS traveller_type ",
                    "ORDER BY r.date DESC LIMIT $limit"
                ),
                vec![
                    TemplateSlot::required(EntityKey::HotelName),
                    TemplateSlot::optional(EntityKey::Limit, 10i64),
                ],
            ))
            .with_template(QueryTemplate::new(
                REVIEWS_BY_HOTEL_ID,
                "Most recent reviews of a hotel by id",
                concat!(
                    "MATCH (h:Hotel {hotel_id: $hotel_id})<-[:REVIEWED]-(r:Review)<-[:WROTE]-(t:Traveller) ",
                    "RETURN r.review_id AS review_id, h.hotel_id AS hotel_id, h.name AS hotel_name, ",
                    "r.text AS review_text, r.date AS review_date, r.score_overall AS score_overall, ",
                    "r.score_cleanliness AS score_cleanliness, r.score_comfort AS score_comfort, ",
                    "r.score_location AS score_location, r.score_staff AS score_staff, ",
                    "t.type AS traveller_type ",
                    "ORDER BY r.date DESC LIMIT $limit"
                ),
                vec![
                    TemplateSlot::required(EntityKey::HotelId),
                    TemplateSlot::optional(EntityKey::Limit, 10i64),
                ],
            ))
            .with_template(QueryTemplate::new(
                BEST_LOCATION_IN_CITY,
                "Hotels in a city with the best average location score",
                concat!(
                    "MATCH (h:Hotel)-[:LOCATED_IN]->(c:City {name: $city}) ",
                    "MATCH (r:Review)-[:REVIEWED]->(h) ",
                    "OPTIONAL MATCH (c)-[:LOCATED_IN]->(country:Country) ",
                    "WITH h, c, country, AVG(r.score_location) AS avg_location_score ",
                    "RETURN ", hotel_columns!(), ", avg_location_score ",
                    "ORDER BY avg_location_score DESC LIMIT $limit"
                ),
                vec![
                    TemplateSlot::required(EntityKey::City),
                    TemplateSlot::optional(EntityKey::Limit, 5i64),
                ],
            ))
            .with_template(QueryTemplate::new(
                BEST_LOCATION_OVERALL,
                "Hotels with the best average location score anywhere",
                concat!(
                    "MATCH (r:Review)-[:REVIEWED]->(h:Hotel) ",
                    "OPTIONAL MATCH (h)-[:LOCATED_IN]->(c:City)-[:LOCATED_IN]->(country:Country) ",
                    "WITH h, c, country, AVG(r.score_location) AS avg_location_score ",
                    "RETURN ", hotel_columns!(), ", avg_location_score ",
                    "ORDER BY avg_location_score DESC LIMIT $limit"
                ),
                vec![TemplateSlot::optional(EntityKey::Limit, 5i64)],
            ))
            .with_template(QueryTemplate::new(
                VISA_REQUIREMENTS,
                "Whether travelling between two countries needs a visa",
                concat!(
                    "MATCH (from:Country {name: $from_country}) ",
                    "MATCH (to:Country {name: $to_country}) ",
                    "OPTIONAL MATCH (from)-[v:NEEDS_VISA]->(to) ",
                    "RETURN from.name AS from_country, to.name AS to_country, ",
                    "v IS NOT NULL AS visa_required, v.visa_type AS visa_type"
                ),
                vec![
                    TemplateSlot::required(EntityKey::FromCountry),
                    TemplateSlot::required(EntityKey::ToCountry),
                ],
            ))
            .with_template(QueryTemplate::new(
                TRAVELLERS_WITHOUT_VISA,
                "Travellers of one type from one country who stayed in another without a visa requirement",
                concat!(
                    "MATCH (t:Traveller {type: $traveller_type})-[:FROM_COUNTRY]->(from:Country {name: $from_country}) ",
                    "MATCH (t)-[:STAYED_AT]->(h:Hotel)-[:LOCATED_IN]->(c:City)-[:LOCATED_IN]->(to:Country {name: $to_country}) ",
                    "WHERE NOT (from)-[:NEEDS_VISA]->(to) ",
                    "RETURN COUNT(DISTINCT t) AS traveller_count, t.type AS traveller_type, ",
                    "from.name AS from_country, to.name AS to_country, false AS visa_required"
                ),
                vec![
                    TemplateSlot::required(EntityKey::FromCountry),
                    TemplateSlot::required(EntityKey::ToCountry),
                    TemplateSlot::required(EntityKey::TravellerType),
                ],
            ))
            .with_template(QueryTemplate::new(
                HOTEL_FULL_DETAILS,
                "All attributes and review averages of one hotel by name",
                concat!(
                    "MATCH (h:Hotel {name: $hotel_name}) ",
                    "OPTIONAL MATCH (h)-[:LOCATED_IN]->(c:City)-[:LOCATED_IN]->(country:Country) ",
                    "OPTIONAL MATCH (r:Review)-[:REVIEWED]->(h) ",
                    "WITH h, c, country, AVG(r.score_overall) AS avg_overall, ",
                    "AVG(r.score_cleanliness) AS avg_cleanliness, AVG(r.score_comfort) AS avg_comfort, ",
                    "AVG(r.score_facilities) AS avg_facilities, AVG(r.score_location) AS avg_location_score, ",
                    "AVG(r.score_staff) AS avg_staff_score, AVG(r.score_value_for_money) AS avg_value, ",
                    "COUNT(r) AS total_reviews ",
                    "RETURN ", hotel_columns!(), ", avg_overall, avg_cleanliness, avg_comfort, ",
                    "avg_facilities, avg_location_score, avg_staff_score, avg_value, total_reviews"
                ),
                vec![TemplateSlot::required(EntityKey::HotelName)],
            ))
            .with_template(QueryTemplate::new(
                HOTEL_DETAILS_BY_ID,
                "All attributes and review averages of one hotel by id",
                concat!(
                    "MATCH (h:Hotel {hotel_id: $hotel_id}) ",
                    "OPTIONAL MATCH (h)-[:LOCATED_IN]->(c:City)-[:LOCATED_IN]->(country:Country) ",
                    "OPTIONAL MATCH (r:Review)-[:REVIEWED]->(h) ",
                    "WITH h, c, country, AVG(r.score_overall) AS avg_overall, ",
                    "AVG(r.score_cleanliness) AS avg_cleanliness, AVG(r.score_comfort) AS avg_comfort, ",
                    "AVG(r.score_location) AS avg_location_score, AVG(r.score_staff) AS avg_staff_score, ",
                    "COUNT(r) AS total_reviews ",
                    "RETURN ", hotel_columns!(), ", avg_overall, avg_cleanliness, avg_comfort, ",
                    "avg_location_score, avg_staff_score, total_reviews"
                ),
                vec![TemplateSlot::required(EntityKey::HotelId)],
            ))
            .with_template(QueryTemplate::new(
                TOP_RATED_HOTELS,
                "Highest rated hotels overall",
                concat!(
                    "MATCH (h:Hotel) ",
                    "OPTIONAL MATCH (h)-[:LOCATED_IN]->(c:City)-[:LOCATED_IN]->(country:Country) ",
                    "RETURN ", hotel_columns!(), " ",
                    "ORDER BY h.average_reviews_score DESC LIMIT $limit"
                ),
                vec![TemplateSlot::optional(EntityKey::Limit, 10i64)],
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalogue_complete() {
        let library = QueryTemplateLibrary::standard();
        assert_eq!(library.len(), 19);
        assert!(library.contains(names::HOTELS_BY_CITY));
        assert!(library.contains(names::TOP_RATED_HOTELS));
    }

    #[test]
    fn test_statements_reference_declared_slots() {
        let library = QueryTemplateLibrary::standard();
        for name in library.names() {
            let template = library.get(name).unwrap();
            for slot in &template.slots {
                let placeholder = format!("${}", slot.param_name());
                assert!(
                    template.statement.contains(&placeholder),
                    "{} does not use {}",
                    name,
                    placeholder
                );
            }
        }
    }

    #[test]
    fn test_score_template_shape() {
        let library = QueryTemplateLibrary::standard();
        let template = library.get(names::HOTELS_BY_STAFF).unwrap();
        assert!(template.statement.contains("AVG(r.score_staff) AS avg_staff_score"));
        assert!(template.statement.contains("WHERE avg_staff_score >= $min_staff"));
        let required: Vec<_> = template.required_keys().collect();
        assert_eq!(required, vec![EntityKey::MinStaff]);
        assert_eq!(
            template.slot(EntityKey::Limit).and_then(|s| s.default.clone()),
            Some(EntityValue::Integer(10))
        );
    }
}
