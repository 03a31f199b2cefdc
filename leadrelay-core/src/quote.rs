//! Quick quote payloads.
//!
//! Wire format of the gateway's `POST /api/v1/quote/quick-quote` endpoint.
//! The gateway speaks camelCase here, unlike the lead transfer endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::exchange::{Exchange, ExchangeKind};
use crate::record::{PersistedRecord, QuoteRecord};
use crate::validate::{FieldScope, Validate};

const YES_NO: &[&str] = &["Y", "N"];

const CATEGORIES: &[&str] = &[
    "SUV", "HB", "SD", "CP", "SAV", "DC", "SC", "MPV", "CB", "SW", "XO", "HT", "RV", "CC", "PV",
    "BS", "DS",
];

const MARITAL_STATUSES: &[&str] = &[
    "Single",
    "Married",
    "Divorced",
    "Widowed",
    "LivingTogether",
    "Annulment",
];

/// Quote request covering one or more vehicles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuickQuoteRequest {
    pub source: String,
    pub external_reference_id: String,
    pub vehicles: Vec<Vehicle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Vehicle {
    pub year: i32,
    pub make: String,
    pub model: String,
    pub mm_code: String,
    pub modified: String,
    pub category: String,
    pub colour: String,
    pub engine_size: f64,
    pub financed: String,
    pub owner: String,
    pub status: String,
    pub party_is_regular_driver: String,
    pub accessories: String,
    pub accessories_amount: f64,
    pub retail_value: f64,
    pub market_value: f64,
    pub insured_value_type: String,
    pub use_type: String,
    pub overnight_parking_situation: String,
    pub cover_code: String,
    pub address: Address,
    pub regular_driver: Driver,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Address {
    pub address_line: String,
    pub postal_code: i64,
    pub suburb: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Driver {
    pub marital_status: String,
    pub currently_insured: bool,
    pub years_without_claims: u32,
    pub relation_to_policy_holder: String,
    pub email_address: String,
    pub mobile_number: String,
    pub id_number: String,
    pub prv_ins_losses: u32,
    pub license_issue_date: String,
    pub date_of_birth: String,
}

impl Validate for QuickQuoteRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        let root = FieldScope::root();
        root.required("source", &self.source)?;
        root.required("externalReferenceId", &self.external_reference_id)?;
        if self.vehicles.is_empty() {
            return Err(ValidationError::missing("vehicles"));
        }
        for (idx, vehicle) in self.vehicles.iter().enumerate() {
            vehicle.validate_in(&root.index("vehicles", idx))?;
        }
        Ok(())
    }
}

impl Vehicle {
    fn validate_in(&self, scope: &FieldScope) -> Result<(), ValidationError> {
        scope.in_range("year", f64::from(self.year), 1900.0, 2100.0)?;
        scope.required("make", &self.make)?;
        scope.required("model", &self.model)?;
        scope.required("mmCode", &self.mm_code)?;
        scope.one_of("modified", &self.modified, YES_NO)?;
        scope.one_of("category", &self.category, CATEGORIES)?;
        scope.required("colour", &self.colour)?;
        scope.positive("engineSize", self.engine_size)?;
        scope.one_of("financed", &self.financed, YES_NO)?;
        scope.one_of("owner", &self.owner, YES_NO)?;
        scope.one_of("status", &self.status, &["New", "SecondHand"])?;
        scope.one_of("partyIsRegularDriver", &self.party_is_regular_driver, YES_NO)?;
        scope.one_of("accessories", &self.accessories, YES_NO)?;
        scope.non_negative("accessoriesAmount", self.accessories_amount)?;
        scope.positive("retailValue", self.retail_value)?;
        scope.positive("marketValue", self.market_value)?;
        scope.one_of("insuredValueType", &self.insured_value_type, &["Retail", "Market"])?;
        scope.one_of("useType", &self.use_type, &["Private", "Commercial", "BusinessUse"])?;
        scope.one_of(
            "overnightParkingSituation",
            &self.overnight_parking_situation,
            &["Garage", "Carport", "InTheOpen", "Unconfirmed"],
        )?;
        scope.one_of("coverCode", &self.cover_code, &["Comprehensive"])?;
        self.address.validate_in(&scope.nested("address"))?;
        self.regular_driver.validate_in(&scope.nested("regularDriver"))?;
        Ok(())
    }
}

impl Address {
    fn validate_in(&self, scope: &FieldScope) -> Result<(), ValidationError> {
        scope.required("addressLine", &self.address_line)?;
        if self.postal_code <= 0 {
            return Err(ValidationError::invalid(
                scope.path("postalCode"),
                "must be greater than 0",
            ));
        }
        scope.required("suburb", &self.suburb)?;
        scope.in_range("latitude", self.latitude, -90.0, 90.0)?;
        scope.in_range("longitude", self.longitude, -180.0, 180.0)?;
        Ok(())
    }
}

impl Driver {
    fn validate_in(&self, scope: &FieldScope) -> Result<(), ValidationError> {
        scope.one_of("maritalStatus", &self.marital_status, MARITAL_STATUSES)?;
        scope.one_of(
            "relationToPolicyHolder",
            &self.relation_to_policy_holder,
            &["Self", "Spouse", "Child", "Other"],
        )?;
        scope.email("emailAddress", &self.email_address)?;
        scope.required("mobileNumber", &self.mobile_number)?;
        scope.required("idNumber", &self.id_number)?;
        scope.exact_len("idNumber", &self.id_number, 13)?;
        scope.date("licenseIssueDate", &self.license_issue_date)?;
        scope.date("dateOfBirth", &self.date_of_birth)?;
        Ok(())
    }
}

/// Response of the quick quote endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuickQuoteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub data: Vec<QuotePrice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotePrice {
    #[serde(default)]
    pub premium: f64,
    #[serde(default)]
    pub excess: f64,
}

impl QuickQuoteResponse {
    /// First priced entry, which is what gets persisted
    pub fn headline_price(&self) -> Option<&QuotePrice> {
        self.data.first()
    }
}

impl Exchange for QuickQuoteRequest {
    type Response = QuickQuoteResponse;

    const KIND: ExchangeKind = ExchangeKind::QuickQuote;

    fn accept(response: &QuickQuoteResponse) -> Result<(), String> {
        if !response.success || response.id.is_empty() {
            return Err("Invalid response from Quick Quote API: missing success or ID".to_string());
        }
        Ok(())
    }

    fn upstream_id(response: &QuickQuoteResponse) -> &str {
        &response.id
    }

    fn to_record(&self, response: &QuickQuoteResponse, created_at: DateTime<Utc>) -> PersistedRecord {
        let price = response.headline_price();
        PersistedRecord::Quote(QuoteRecord {
            source: self.source.clone(),
            external_reference_id: self.external_reference_id.clone(),
            vehicle_count: u32::try_from(self.vehicles.len()).unwrap_or(u32::MAX),
            response_id: response.id.clone(),
            premium: price.map(|p| p.premium),
            excess: price.map(|p| p.excess),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_quote() -> QuickQuoteRequest {
        serde_json::from_value(json!({
            "source": "comparison-site",
            "externalReferenceId": "ext-001",
            "vehicles": [{
                "year": 2019,
                "make": "Volkswagen",
                "model": "Polo 1.0 TSI",
                "mmCode": "60054300",
                "modified": "N",
                "category": "HB",
                "colour": "White",
                "engineSize": 1.0,
                "financed": "Y",
                "owner": "Y",
                "status": "SecondHand",
                "partyIsRegularDriver": "Y",
                "accessories": "N",
                "accessoriesAmount": 0,
                "retailValue": 210000,
                "marketValue": 195000,
                "insuredValueType": "Retail",
                "useType": "Private",
                "overnightParkingSituation": "Garage",
                "coverCode": "Comprehensive",
                "address": {
                    "addressLine": "12 Main Road",
                    "postalCode": 2196,
                    "suburb": "Sandton",
                    "latitude": -26.1076,
                    "longitude": 28.0567
                },
                "regularDriver": {
                    "maritalStatus": "Single",
                    "currentlyInsured": true,
                    "yearsWithoutClaims": 3,
                    "relationToPolicyHolder": "Self",
                    "emailAddress": "driver@example.co.za",
                    "mobileNumber": "0821234567",
                    "idNumber": "9001015009087",
                    "prvInsLosses": 0,
                    "licenseIssueDate": "2010-06-15",
                    "dateOfBirth": "1990-01-01"
                }
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_quote() {
        assert!(sample_quote().validate().is_ok());
    }

    #[test]
    fn test_empty_vehicle_list() {
        let mut quote = sample_quote();
        quote.vehicles.clear();
        assert_eq!(quote.validate(), Err(ValidationError::missing("vehicles")));
    }

    #[test]
    fn test_malformed_enum_names_nested_path() {
        let mut quote = sample_quote();
        quote.vehicles[0].category = "TRUCK".to_string();
        let err = quote.validate().unwrap_err();
        assert_eq!(err.field(), Some("vehicles[0].category"));
    }

    #[test]
    fn test_driver_dates_checked() {
        let mut quote = sample_quote();
        quote.vehicles[0].regular_driver.date_of_birth = "01/01/1990".to_string();
        let err = quote.validate().unwrap_err();
        assert_eq!(err.field(), Some("vehicles[0].regularDriver.dateOfBirth"));
    }

    #[test]
    fn test_address_bounds() {
        let mut quote = sample_quote();
        quote.vehicles[0].address.postal_code = 0;
        assert_eq!(
            quote.validate().unwrap_err().field(),
            Some("vehicles[0].address.postalCode")
        );

        let mut quote = sample_quote();
        quote.vehicles[0].address.longitude = 200.0;
        assert_eq!(
            quote.validate().unwrap_err().field(),
            Some("vehicles[0].address.longitude")
        );
    }

    #[test]
    fn test_year_out_of_range() {
        let mut quote = sample_quote();
        quote.vehicles[0].year = 1850;
        assert_eq!(quote.validate().unwrap_err().field(), Some("vehicles[0].year"));
    }

    #[test]
    fn test_round_trip_keeps_camel_case() {
        let json = serde_json::to_value(sample_quote()).unwrap();
        assert_eq!(json["externalReferenceId"], "ext-001");
        assert_eq!(json["vehicles"][0]["mmCode"], "60054300");
        assert_eq!(json["vehicles"][0]["regularDriver"]["prvInsLosses"], 0);
    }

    #[test]
    fn test_record_uses_first_price() {
        let response = QuickQuoteResponse {
            success: true,
            id: "quote-9".to_string(),
            data: vec![
                QuotePrice { premium: 1240.46, excess: 6200.0 },
                QuotePrice { premium: 999.0, excess: 5000.0 },
            ],
        };
        assert!(QuickQuoteRequest::accept(&response).is_ok());

        match sample_quote().to_record(&response, Utc::now()) {
            PersistedRecord::Quote(rec) => {
                assert_eq!(rec.vehicle_count, 1);
                assert_eq!(rec.premium, Some(1240.46));
                assert_eq!(rec.excess, Some(6200.0));
            }
            other => panic!("expected quote record, got {:?}", other),
        }
    }

    #[test]
    fn test_record_without_prices() {
        let response = QuickQuoteResponse {
            success: true,
            id: "quote-10".to_string(),
            data: Vec::new(),
        };
        match sample_quote().to_record(&response, Utc::now()) {
            PersistedRecord::Quote(rec) => {
                assert_eq!(rec.premium, None);
                assert_eq!(rec.excess, None);
            }
            other => panic!("expected quote record, got {:?}", other),
        }
    }

    #[test]
    fn test_accept_rejects_missing_id() {
        let response = QuickQuoteResponse {
            success: true,
            id: String::new(),
            data: Vec::new(),
        };
        assert!(QuickQuoteRequest::accept(&response).is_err());
    }
}
