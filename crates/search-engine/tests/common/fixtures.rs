//! Clinical fixtures for search tests.
//!
//! Resources are written in a compact JSON form that [`FixtureExtractor`]
//! understands:
//!
//! ```text
//! { "resourceType": "Observation", "id": "o1",
//!   "search": { "subject": [ { "reference": "Patient/p1" } ],
//!               "code": [ { "system": "http://loinc.org", "code": "8867-4" } ] } }
//! ```

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};

use helios_search_engine::compartment::{CompartmentDefinitions, CompartmentIndexer};
use helios_search_engine::core::IndexExtractor;
use helios_search_engine::error::ExtractionError;
use helios_search_engine::types::{
    IndexedResource, ReferenceKind, ReferenceSearchValue, ResourceLocation, SearchIndexEntry,
    SearchValue,
};

pub const LOINC: &str = "http://loinc.org";
pub const UCUM: &str = "http://unitsofmeasure.org";
pub const GENDER: &str = "http://hl7.org/fhir/administrative-gender";

pub const HEART_RATE: &str = "8867-4";
pub const SYSTOLIC_BP: &str = "8480-6";
pub const BODY_TEMPERATURE: &str = "8310-5";

/// Reads the `search` object of a fixture resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureExtractor;

impl IndexExtractor for FixtureExtractor {
    fn extract(&self, resource: &Value) -> Result<Vec<SearchIndexEntry>, ExtractionError> {
        let Some(search) = resource.get("search") else {
            return Ok(Vec::new());
        };
        let params = search.as_object().ok_or_else(|| ExtractionError::InvalidResource {
            message: "search must be an object".to_string(),
        })?;

        let mut entries = Vec::new();
        for (name, values) in params {
            for value in values.as_array().into_iter().flatten() {
                entries.push(SearchIndexEntry::new(name.clone(), parse_value(name, value)?));
            }
        }
        Ok(entries)
    }
}

fn conversion_failed(param: &str, expected: &str, value: &Value) -> ExtractionError {
    ExtractionError::ConversionFailed {
        param_name: param.to_string(),
        expected_type: expected.to_string(),
        actual_value: value.to_string(),
    }
}

fn parse_decimal(param: &str, value: &Value) -> Result<Decimal, ExtractionError> {
    Decimal::from_str(&value.to_string()).map_err(|_| conversion_failed(param, "decimal", value))
}

fn parse_instant(param: &str, value: &Value) -> Result<DateTime<Utc>, ExtractionError> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .ok_or_else(|| conversion_failed(param, "dateTime", value))
}

fn parse_value(param: &str, value: &Value) -> Result<SearchValue, ExtractionError> {
    let str_of = |key: &str| value.get(key).and_then(Value::as_str);

    if let Some(components) = value.get("components").and_then(Value::as_array) {
        let components = components
            .iter()
            .map(|component| {
                component
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(|v| parse_value(param, v))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(SearchValue::composite(components));
    }
    if let Some(text) = str_of("string") {
        return Ok(SearchValue::string(text));
    }
    if let Some(reference) = str_of("reference") {
        return Ok(match reference.split_once('/') {
            Some((resource_type, id)) => SearchValue::reference(resource_type, id),
            None => SearchValue::Reference(ReferenceSearchValue {
                kind: ReferenceKind::Internal,
                base_uri: None,
                resource_type: None,
                resource_id: reference.to_string(),
            }),
        });
    }
    if str_of("code").is_some() && value.get("value").is_none() {
        return Ok(SearchValue::token(str_of("system"), str_of("code"), str_of("display")));
    }
    if let Some(number) = value.get("value") {
        return Ok(SearchValue::quantity(
            Some(UCUM),
            str_of("unit"),
            parse_decimal(param, number)?,
        ));
    }
    if let Some(number) = value.get("number") {
        return Ok(SearchValue::number(parse_decimal(param, number)?));
    }
    if let Some(start) = value.get("date") {
        let start = parse_instant(param, start)?;
        let end = match value.get("end") {
            Some(end) => parse_instant(param, end)?,
            None => start,
        };
        return Ok(SearchValue::date_time(start, end));
    }
    if let Some(uri) = str_of("uri") {
        return Ok(SearchValue::uri(uri));
    }

    Err(conversion_failed(param, "search value", value))
}

/// Midnight UTC of a calendar day.
pub fn day(year: i32, month: u32, date: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, date, 0, 0, 0).unwrap()
}

pub fn practitioner(id: &str, name: &str) -> Value {
    json!({
        "resourceType": "Practitioner",
        "id": id,
        "search": { "name": [{ "string": name }] }
    })
}

pub fn patient(id: &str, name: &str, gender: &str, birth_date: &str, gp: Option<&str>) -> Value {
    let mut search = json!({
        "name": [{ "string": name }],
        "gender": [{ "system": GENDER, "code": gender }],
        "birthdate": [{ "date": birth_date }],
        "organization": [{ "reference": "Organization/org1" }]
    });
    if let Some(gp) = gp {
        search["general-practitioner"] = json!([{ "reference": format!("Practitioner/{gp}") }]);
    }
    json!({ "resourceType": "Patient", "id": id, "search": search })
}

/// Observation fixture builder.
#[derive(Debug, Clone)]
pub struct ObservationFixture {
    id: String,
    subject: String,
    code: String,
    value: i64,
    unit: String,
    date: String,
    performer: Option<String>,
    encounter: Option<String>,
}

impl ObservationFixture {
    pub fn new(id: &str, subject: &str, code: &str, value: i64, unit: &str) -> Self {
        Self {
            id: id.to_string(),
            subject: subject.to_string(),
            code: code.to_string(),
            value,
            unit: unit.to_string(),
            date: "2024-01-01T00:00:00Z".to_string(),
            performer: None,
            encounter: None,
        }
    }

    pub fn with_date(mut self, date: &str) -> Self {
        self.date = date.to_string();
        self
    }

    pub fn with_performer(mut self, performer: &str) -> Self {
        self.performer = Some(performer.to_string());
        self
    }

    pub fn with_encounter(mut self, encounter: &str) -> Self {
        self.encounter = Some(encounter.to_string());
        self
    }

    pub fn build(&self) -> Value {
        let mut search = json!({
            "subject": [{ "reference": self.subject }],
            "code": [{ "system": LOINC, "code": self.code }],
            "value-quantity": [{ "value": self.value, "unit": self.unit }],
            "date": [{ "date": self.date }],
            "code-value-quantity": [{
                "components": [
                    [{ "system": LOINC, "code": self.code }],
                    [{ "value": self.value, "unit": self.unit }]
                ]
            }]
        });
        if let Some(performer) = &self.performer {
            search["performer"] = json!([{ "reference": performer }]);
        }
        if let Some(encounter) = &self.encounter {
            search["encounter"] = json!([{ "reference": encounter }]);
        }
        json!({ "resourceType": "Observation", "id": self.id, "search": search })
    }
}

/// The raw fixture resources, in insertion order.
///
/// - Practitioners `pr1` Smith, `pr2` Smithers, `pr3` Jones
/// - Patients `p1` Alice (gp pr1), `p2` Bob (gp pr3), `p3` Carol (gp pr2), `p4` Dave (no gp)
/// - Encounter `e1` for p1 with pr3
/// - Observations `o1`..`o6`, `o5` on a device and `o6` with an untyped subject
pub fn clinical_resources() -> Vec<Value> {
    vec![
        practitioner("pr1", "Smith"),
        practitioner("pr2", "Smithers"),
        practitioner("pr3", "Jones"),
        json!({
            "resourceType": "Organization",
            "id": "org1",
            "search": { "name": [{ "string": "Acme Health" }] }
        }),
        patient("p1", "Alice", "female", "1980-03-01T00:00:00Z", Some("pr1")),
        patient("p2", "Bob", "male", "1975-07-12T00:00:00Z", Some("pr3")),
        patient("p3", "Carol", "female", "1990-11-30T00:00:00Z", Some("pr2")),
        patient("p4", "Dave", "male", "2001-01-15T00:00:00Z", None),
        json!({
            "resourceType": "Encounter",
            "id": "e1",
            "search": {
                "subject": [{ "reference": "Patient/p1" }],
                "participant": [{ "reference": "Practitioner/pr3" }]
            }
        }),
        ObservationFixture::new("o1", "Patient/p1", HEART_RATE, 72, "/min")
            .with_date("2024-01-10T08:00:00Z")
            .with_performer("Practitioner/pr1")
            .with_encounter("Encounter/e1")
            .build(),
        ObservationFixture::new("o2", "Patient/p2", HEART_RATE, 95, "/min")
            .with_date("2024-02-01T09:30:00Z")
            .with_performer("Practitioner/pr3")
            .build(),
        ObservationFixture::new("o3", "Patient/p3", SYSTOLIC_BP, 135, "mm[Hg]")
            .with_date("2024-03-05T10:00:00Z")
            .with_performer("Practitioner/pr2")
            .build(),
        ObservationFixture::new("o4", "Patient/p1", SYSTOLIC_BP, 118, "mm[Hg]")
            .with_date("2024-03-06T11:15:00Z")
            .build(),
        ObservationFixture::new("o5", "Device/dev1", BODY_TEMPERATURE, 37, "Cel")
            .with_date("2024-04-01T12:00:00Z")
            .build(),
        ObservationFixture::new("o6", "p2", HEART_RATE, 60, "/min")
            .with_date("2024-04-02T13:00:00Z")
            .build(),
    ]
}

/// Indexes one fixture resource with the standard compartment table.
pub fn index_fixture(
    indexer: &CompartmentIndexer<CompartmentDefinitions>,
    resource: &Value,
) -> Result<IndexedResource, ExtractionError> {
    let field = |key: &str| {
        resource
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ExtractionError::InvalidResource {
                message: format!("missing {key}"),
            })
    };
    let location = ResourceLocation::new(field("resourceType")?, field("id")?).with_version("1");
    indexer.index_resource(&FixtureExtractor, location, resource)
}

/// The clinical corpus, extracted and compartment-indexed.
pub fn clinical_corpus() -> Vec<IndexedResource> {
    let indexer = CompartmentIndexer::new(CompartmentDefinitions::standard());
    clinical_resources()
        .iter()
        .map(|resource| index_fixture(&indexer, resource).expect("fixture should index"))
        .collect()
}
