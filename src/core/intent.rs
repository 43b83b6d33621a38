

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};


#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
pub enum Intent {
    HotelSearch,
    HotelRecommendation,
    ReviewLookup,
    LocationQuery,
    VisaQuestion,
    AmenityFilter,
    GeneralQuestionAnswering,
    CasualConversation,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Turns that never touch a retrieval backend.
    pub fn is_conversational(self) -> bool {
        matches!(self, Intent::CasualConversation)
    }

    pub fn is_hotel_oriented(self) -> bool {
        matches!(
            self,
            Intent::HotelSearch
                | Intent::HotelRecommendation
                | Intent::AmenityFilter
                | Intent::LocationQuery
                | Intent::GeneralQuestionAnswering
        )
    }

    
    pub fn description(self) -> &'static str {
        match self {
            Intent::HotelSearch => "Finding hotels by city, country or minimum rating",
            Intent::HotelRecommendation => {
                "Hotel recommendations for a traveller type or by quality scores"
            }
            Intent::ReviewLookup => "Reading reviews for a specific hotel",
            Intent::LocationQuery => "Hotels with the best location scores",
            Intent::VisaQuestion => "Visa requirements between two countries",
            Intent::AmenityFilter => {
                "Filtering hotels by cleanliness, comfort, value, staff, location or facilities"
            }
            Intent::GeneralQuestionAnswering => "General questions about a hotel or destination",
            Intent::CasualConversation => "Greetings, thanks and small talk",
        }
    }

    /// Lenient parse used for classifier output: exact name first, then containment.
    pub fn parse_loose(raw: &str) -> Option<Intent> {
        use std::str::FromStr;
        use strum::IntoEnumIterator;

        let trimmed = raw.trim().trim_matches(|c: char| c == '"' || c == '\'' || c == '.');
        if let Ok(intent) = Intent::from_str(trimmed) {
            return Some(intent);
        }

        let lowered = trimmed.to_lowercase();
        Intent::iter().find(|intent| lowered.contains(&intent.as_str().to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversational_split() {
        assert!(Intent::CasualConversation.is_conversational());
        assert!(!Intent::CasualConversation.is_hotel_oriented());
        assert!(!Intent::VisaQuestion.is_hotel_oriented());
        assert!(!Intent::ReviewLookup.is_hotel_oriented());
        assert!(Intent::LocationQuery.is_hotel_oriented());
    }

    #[test]
    fn test_parse_loose() {
        assert_eq!(Intent::parse_loose("VisaQuestion"), Some(Intent::VisaQuestion));
        assert_eq!(
            Intent::parse_loose("The intent is: ReviewLookup."),
            Some(Intent::ReviewLookup)
        );
        assert_eq!(Intent::parse_loose("something else"), None);
    }

    #[test]
    fn test_round_trip_name() {
        assert_eq!(Intent::AmenityFilter.to_string(), "AmenityFilter");
        assert_eq!(Intent::AmenityFilter.as_str(), "AmenityFilter");
    }
}
