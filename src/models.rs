//! Wire and domain types for users, dorms and bookings.
//!
//! The backend is not consistent about spelling (snake_case vs camelCase),
//! id types (integers vs UUID strings) or date precision, so deserialization
//! is lenient and normalizes everything into one shape.

use crate::error::ApiError;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of client-generated ids for bookings not yet confirmed by the server
pub const PLACEHOLDER_PREFIX: &str = "local-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Student,
    DormOwner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::DormOwner => "dorm_owner",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    #[serde(deserialize_with = "de::id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, alias = "schoolIdNumber")]
    pub school_id_number: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
}

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

static SCHOOL_ID_CAMPUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^NEUST-\d{4}-\d{5}$").expect("static regex"));
static SCHOOL_ID_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8,10}$").expect("static regex"));

/// Whether a school id is in one of the accepted formats
/// (`NEUST-YYYY-#####` or 8-10 digits)
pub fn is_valid_school_id(value: &str) -> bool {
    SCHOOL_ID_CAMPUS.is_match(value) || SCHOOL_ID_NUMERIC.is_match(value)
}

/// Payload for creating a new account
#[derive(Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub phone: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_id_number: Option<String>,
}

impl Registration {
    pub fn student(username: &str, password: &str, phone: &str, school_id: Option<&str>) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            phone: phone.to_string(),
            role: Role::Student,
            school_id_number: school_id.map(str::to_string),
        }
    }

    /// Checks that can be made without asking the server
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.username.trim().is_empty() {
            return Err(ApiError::Validation("Username is required".to_string()));
        }
        if self.password.chars().count() < 8 {
            return Err(ApiError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        if self.phone.trim().is_empty() {
            return Err(ApiError::Validation("Phone number is required".to_string()));
        }
        if self.role == Role::Student {
            match self.school_id_number.as_deref() {
                None | Some("") => {
                    return Err(ApiError::Validation(
                        "School ID is required for students".to_string(),
                    ))
                }
                Some(id) if !is_valid_school_id(id) => {
                    return Err(ApiError::Validation(format!(
                        "Invalid school ID '{}': expected NEUST-YYYY-##### or 8-10 digits",
                        id
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("role", &self.role)
            .field("school_id_number", &self.school_id_number)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    #[serde(alias = "canceled")]
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Booking {
    #[serde(deserialize_with = "de::id")]
    pub id: String,
    #[serde(alias = "dormId", alias = "dorm_id", deserialize_with = "de::id")]
    pub dorm: String,
    #[serde(
        rename = "start_date",
        alias = "move_in_date",
        alias = "startDate",
        deserialize_with = "de::instant"
    )]
    pub start: DateTime<Utc>,
    #[serde(
        rename = "end_date",
        alias = "move_out_date",
        alias = "endDate",
        deserialize_with = "de::instant"
    )]
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub status: BookingStatus,
}

impl Booking {
    /// Optimistic entry shown while a create request is in flight
    pub fn placeholder(dorm: &str, range: &DateRange) -> Self {
        Self {
            id: format!("{}{}", PLACEHOLDER_PREFIX, uuid::Uuid::new_v4()),
            dorm: dorm.to_string(),
            start: range.start,
            end: range.end,
            status: BookingStatus::Pending,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(PLACEHOLDER_PREFIX)
    }
}

/// Requested stay; `start` must be strictly before `end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }
}

/// Body of `POST /bookings/`
#[derive(Debug, Clone, Serialize)]
pub struct NewBooking {
    pub dorm: String,
    pub start_date: String,
    pub end_date: String,
}

impl NewBooking {
    pub fn new(dorm: &str, range: &DateRange) -> Self {
        Self {
            dorm: dorm.to_string(),
            start_date: range.start.to_rfc3339(),
            end_date: range.end.to_rfc3339(),
        }
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC)
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Minutes of walking time from text like "5-minute walk"; 10 when unparsable
pub fn parse_walk_minutes(s: &str) -> u32 {
    let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(DEFAULT_WALK_MINUTES)
}

const DEFAULT_WALK_MINUTES: u32 = 10;

fn default_walk_minutes() -> u32 {
    DEFAULT_WALK_MINUTES
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Dorm {
    #[serde(deserialize_with = "de::id")]
    pub id: String,
    pub name: String,
    #[serde(alias = "monthlyRate", deserialize_with = "de::decimal")]
    pub monthly_rate: f64,
    #[serde(
        rename = "distance_from_school",
        alias = "distanceFromSchool",
        default = "default_walk_minutes",
        deserialize_with = "de::walk_minutes"
    )]
    pub distance_minutes: u32,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default, deserialize_with = "de::amenities")]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Client-side narrowing of a dorm listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DormFilters {
    pub max_price: Option<f64>,
    pub max_distance: Option<u32>,
    pub amenities: Vec<String>,
}

impl DormFilters {
    pub fn matches(&self, dorm: &Dorm) -> bool {
        if let Some(max) = self.max_price {
            if dorm.monthly_rate > max {
                return false;
            }
        }
        if let Some(max) = self.max_distance {
            if dorm.distance_minutes > max {
                return false;
            }
        }
        self.amenities.iter().all(|wanted| {
            dorm.amenities
                .iter()
                .any(|have| have.eq_ignore_ascii_case(wanted))
        })
    }
}

/// One page of a DRF-style paginated listing
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Listing endpoints answer either with a page or a bare array
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Paged(Page<T>),
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Listing::Paged(page) => page.results,
            Listing::Plain(items) => items,
        }
    }
}

mod de {
    use super::{parse_instant, parse_walk_minutes};
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn id_from_value(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(map) => map.get("id").and_then(id_from_value),
            _ => None,
        }
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        let value = Value::deserialize(d)?;
        id_from_value(&value).ok_or_else(|| D::Error::custom(format!("invalid id: {}", value)))
    }

    pub fn instant<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        parse_instant(&s).ok_or_else(|| D::Error::custom(format!("invalid date: {}", s)))
    }

    pub fn decimal<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Value::deserialize(d)? {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| D::Error::custom("rate out of range")),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid rate: {}", s))),
            other => Err(D::Error::custom(format!("invalid rate: {}", other))),
        }
    }

    pub fn walk_minutes<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().map(|f| f.max(0.0).round() as u64))
                .unwrap_or(0)
                .min(u32::MAX as u64) as u32,
            Value::String(s) => parse_walk_minutes(&s),
            _ => parse_walk_minutes(""),
        })
    }

    pub fn amenities<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let items = Vec::<Value>::deserialize(d)?;
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Object(map) => map
                    .get("name")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn dorm(rate: f64, minutes: u32, amenities: &[&str]) -> Dorm {
        Dorm {
            id: "1".to_string(),
            name: "Acacia Hall".to_string(),
            monthly_rate: rate,
            distance_minutes: minutes,
            thumbnail: None,
            amenities: amenities.iter().map(|s| s.to_string()).collect(),
            address: None,
        }
    }

    #[test]
    fn test_booking_from_backend_shape() {
        let booking: Booking = serde_json::from_value(json!({
            "id": 42,
            "user": "9f0c",
            "dorm": 7,
            "move_in_date": "2025-06-01",
            "move_out_date": "2025-10-31",
            "status": "canceled"
        }))
        .unwrap();
        assert_eq!(booking.id, "42");
        assert_eq!(booking.dorm, "7");
        assert_eq!(booking.start, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert!(!booking.is_placeholder());
    }

    #[test]
    fn test_booking_from_client_shape() {
        let booking: Booking = serde_json::from_value(json!({
            "id": "b-1",
            "dormId": "3",
            "startDate": "2025-06-01T08:00:00Z",
            "endDate": "2025-06-30T08:00:00+08:00"
        }))
        .unwrap();
        assert_eq!(booking.dorm, "3");
        assert_eq!(booking.end, Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap());
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[test]
    fn test_placeholder_ids_are_unique() {
        let range = DateRange::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
        );
        let a = Booking::placeholder("1", &range);
        let b = Booking::placeholder("1", &range);
        assert!(a.is_placeholder());
        assert!(b.is_placeholder());
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, BookingStatus::Pending);
    }

    #[test]
    fn test_new_booking_body() {
        let range = DateRange::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
        );
        let body = serde_json::to_value(NewBooking::new("5", &range)).unwrap();
        assert_eq!(
            body,
            json!({
                "dorm": "5",
                "start_date": "2025-06-01T00:00:00+00:00",
                "end_date": "2025-07-01T00:00:00+00:00"
            })
        );
    }

    #[test]
    fn test_dorm_from_backend_shape() {
        let d: Dorm = serde_json::from_value(json!({
            "id": 3,
            "name": "Narra Residences",
            "address": "Cabanatuan City",
            "monthly_rate": "2500.00",
            "distance_from_school": "5-minute walk",
            "amenities": [{"id": 1, "name": "WiFi"}, {"id": 2, "name": "Aircon"}],
            "owner": "landlord"
        }))
        .unwrap();
        assert_eq!(d.id, "3");
        assert_eq!(d.monthly_rate, 2500.0);
        assert_eq!(d.distance_minutes, 5);
        assert_eq!(d.amenities, vec!["WiFi", "Aircon"]);
        assert!(d.thumbnail.is_none());
    }

    #[test]
    fn test_dorm_from_client_shape() {
        let d: Dorm = serde_json::from_value(json!({
            "id": 9,
            "name": "Molave",
            "monthlyRate": 1800,
            "distanceFromSchool": 12,
            "thumbnail": "/img/molave.jpg",
            "amenities": ["Laundry"]
        }))
        .unwrap();
        assert_eq!(d.monthly_rate, 1800.0);
        assert_eq!(d.distance_minutes, 12);
        assert_eq!(d.thumbnail.as_deref(), Some("/img/molave.jpg"));
    }

    #[test]
    fn test_walk_minutes_fallback() {
        assert_eq!(parse_walk_minutes("5-minute walk"), 5);
        assert_eq!(parse_walk_minutes("near campus"), 10);
        assert_eq!(parse_walk_minutes(""), 10);
    }

    #[test]
    fn test_filters() {
        let d = dorm(2500.0, 5, &["WiFi", "Aircon"]);
        assert!(DormFilters::default().matches(&d));
        assert!(DormFilters {
            max_price: Some(3000.0),
            max_distance: Some(5),
            amenities: vec!["wifi".to_string()],
        }
        .matches(&d));
        assert!(!DormFilters {
            max_price: Some(2000.0),
            ..Default::default()
        }
        .matches(&d));
        assert!(!DormFilters {
            max_distance: Some(4),
            ..Default::default()
        }
        .matches(&d));
        assert!(!DormFilters {
            amenities: vec!["Pool".to_string()],
            ..Default::default()
        }
        .matches(&d));
    }

    #[test]
    fn test_listing_shapes() {
        let paged: Listing<Dorm> = serde_json::from_value(json!({
            "count": 1,
            "next": null,
            "results": [{"id": 1, "name": "A", "monthly_rate": 1500}]
        }))
        .unwrap();
        assert_eq!(paged.into_items().len(), 1);

        let plain: Listing<Dorm> =
            serde_json::from_value(json!([{"id": 1, "name": "A", "monthly_rate": 1500}])).unwrap();
        assert_eq!(plain.into_items()[0].distance_minutes, 10);
    }

    #[test]
    fn test_parse_instant() {
        assert_eq!(
            parse_instant("2025-06-01"),
            Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())
        );
        assert!(parse_instant("2025-06-01T10:00:00Z").is_some());
        assert!(parse_instant("June 1st").is_none());
    }

    #[test]
    fn test_school_id_formats() {
        assert!(is_valid_school_id("NEUST-2023-00111"));
        assert!(is_valid_school_id("20230011"));
        assert!(!is_valid_school_id("NEUST-23-111"));
        assert!(!is_valid_school_id("1234567"));
    }

    #[test]
    fn test_registration_validation() {
        let ok = Registration::student("juan", "s3cretpass", "+639171234567", Some("NEUST-2023-00111"));
        assert!(ok.validate().is_ok());

        let short = Registration::student("juan", "short", "+639171234567", Some("NEUST-2023-00111"));
        assert!(matches!(short.validate(), Err(ApiError::Validation(_))));

        let mut missing = ok.clone();
        missing.school_id_number = None;
        let err = missing.validate().unwrap_err();
        assert!(err.user_message().contains("School ID is required"));

        let bad = Registration::student("juan", "s3cretpass", "+639171234567", Some("ABC"));
        assert!(bad.validate().unwrap_err().user_message().contains("Invalid school ID"));

        let mut admin = missing;
        admin.role = Role::Admin;
        assert!(admin.validate().is_ok());
    }

    #[test]
    fn test_user_and_credentials() {
        let user: User = serde_json::from_value(json!({
            "id": "5b1e4c9a-3f2d-4a7b-9c1e-2d3f4a5b6c7d",
            "username": "juan",
            "role": "admin",
            "is_verified": true
        }))
        .unwrap();
        assert_eq!(user.role, Role::Admin);
        assert!(user.school_id_number.is_none());

        let creds = Credentials::new("juan", "hunter22");
        assert!(!format!("{:?}", creds).contains("hunter22"));
    }
}
