// Data structures shared by the API client, the search pipeline and the pages.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Districts offered by the advanced search form.
pub const DISTRICTS: &[&str] = &[
    "Адмиралтейский район",
    "Василеостровский район",
    "Выборгский район",
    "Калининский район",
    "Кировский район",
    "Колпинский район",
    "Красногвардейский район",
    "Красносельский район",
    "Кронштадтский район",
    "Курортный район",
    "Московский район",
    "Невский район",
    "Петроградский район",
    "Петродворцовый район",
    "Приморский район",
    "Пушкинский район",
    "Фрунзенский район",
    "Центральный район",
];

// Search state as carried by the URL query string
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub district: String,
    pub animal_type: String,
    pub description: String,
}

impl SearchParams {
    pub fn quick(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.district.is_empty() && self.animal_type.is_empty() && self.description.is_empty()
    }

    /// Quick search whenever a description is present, advanced otherwise.
    pub fn mode(&self) -> SearchMode {
        if self.description.is_empty() {
            SearchMode::Advanced
        } else {
            SearchMode::Quick
        }
    }

    pub fn district_is(&self, district: &str) -> bool {
        self.district == district
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Quick,
    Advanced,
}

impl SearchMode {
    pub fn is_quick(&self) -> bool {
        matches!(self, SearchMode::Quick)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ListingStatus {
    Active,
    WasFound,
    OnModeration,
    Archive,
    Other(String),
}

impl From<String> for ListingStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "active" => ListingStatus::Active,
            "wasFound" => ListingStatus::WasFound,
            "onModeration" => ListingStatus::OnModeration,
            "archive" => ListingStatus::Archive,
            _ => ListingStatus::Other(value),
        }
    }
}

impl From<ListingStatus> for String {
    fn from(status: ListingStatus) -> Self {
        match status {
            ListingStatus::Active => "active".to_string(),
            ListingStatus::WasFound => "wasFound".to_string(),
            ListingStatus::OnModeration => "onModeration".to_string(),
            ListingStatus::Archive => "archive".to_string(),
            ListingStatus::Other(s) => s,
        }
    }
}

impl Default for ListingStatus {
    fn default() -> Self {
        ListingStatus::Active
    }
}

impl ListingStatus {
    /// Ads still in circulation can be edited by their author.
    pub fn is_editable(&self) -> bool {
        matches!(self, ListingStatus::Active | ListingStatus::OnModeration)
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            ListingStatus::Active => "badge-status-active",
            ListingStatus::WasFound => "badge-status-wasFound",
            ListingStatus::OnModeration => "badge-status-onModeration",
            ListingStatus::Archive => "badge-status-archive",
            ListingStatus::Other(_) => "badge-status-other",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ListingStatus::Active => "Активное",
            ListingStatus::WasFound => "Хозяин найден",
            ListingStatus::OnModeration => "На модерации",
            ListingStatus::Archive => "В архиве",
            ListingStatus::Other(s) => s,
        };
        f.write_str(label)
    }
}

/// A lost/found pet ad as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub district: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub date: String,
    #[serde(default)]
    pub mark: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    // Either key may be present, each as a string or an array
    #[serde(default, deserialize_with = "one_or_many")]
    pub photo: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub photos: Vec<String>,
    #[serde(default, deserialize_with = "status_or_default")]
    pub status: ListingStatus,
}

impl Listing {
    /// `photo` wins over `photos` when both are sent.
    pub fn images(&self) -> &[String] {
        if self.photo.is_empty() {
            &self.photos
        } else {
            &self.photo
        }
    }

    pub fn first_photo(&self) -> Option<&str> {
        self.images().first().map(String::as_str)
    }

    /// `dd.mm.yyyy` when the API date parses, the raw string otherwise.
    pub fn display_date(&self) -> String {
        format_date(&self.date)
    }

    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }

    pub fn short_description(&self) -> String {
        truncate_chars(&self.description, 100)
    }
}

pub fn format_date(raw: &str) -> String {
    match parse_date(raw) {
        Some(date) => date.format("%d.%m.%Y").to_string(),
        None => raw.to_string(),
    }
}

/// Accepts RFC 3339 timestamps and the plain date layouts the API uses.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    ["%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y"]
        .iter()
        .find_map(|pattern| NaiveDate::parse_from_str(raw, pattern).ok())
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

/// Autocomplete candidate derived from a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: i64,
    pub kind: String,
    pub original_description: String,
    // Lowercased, what the dropdown shows
    pub description: String,
    pub photo: Option<String>,
}

/// The signed-in user's profile. Unknown fields are kept so merges never drop data.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub phone: String,
    #[serde(
        default,
        rename = "registrationDate",
        skip_serializing_if = "Option::is_none"
    )]
    pub registration_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn days_since_registration(&self, today: NaiveDate) -> Option<i64> {
        let registered = parse_date(self.registration_date.as_deref()?)?;
        Some((today - registered).num_days().abs())
    }
}

/// Main page carousel entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliderPet {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
}

// --- Response envelopes ---

#[derive(Debug, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrdersData {
    #[serde(default)]
    pub orders: Vec<Listing>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PetData {
    #[serde(default)]
    pub pet: Vec<Listing>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SliderData {
    #[serde(default)]
    pub pets: Vec<SliderPet>,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Deserialize)]
pub struct CreatedData {
    pub id: i64,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn status_or_default<'de, D>(deserializer: D) -> Result<ListingStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ListingStatus>::deserialize(deserializer)?.unwrap_or_default())
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<Option<String>>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) if s.is_empty() => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(items)) => items
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_accepts_single_photo_or_array() {
        let single: Listing = serde_json::from_value(json!({
            "id": 1, "kind": "кошка", "description": "Рыжая", "photo": "/storage/a.png",
            "status": "wasFound"
        }))
        .unwrap();
        assert_eq!(single.images(), ["/storage/a.png".to_string()]);
        assert_eq!(single.status, ListingStatus::WasFound);

        let many: Listing = serde_json::from_value(json!({
            "id": 2, "description": null, "photos": ["/a.png", null, "/b.png"], "status": null
        }))
        .unwrap();
        assert_eq!(many.first_photo(), Some("/a.png"));
        assert_eq!(many.images().len(), 2);
        assert_eq!(many.description, "");
        assert_eq!(many.status, ListingStatus::Active);
    }

    #[test]
    fn unknown_status_is_shown_verbatim() {
        let status = ListingStatus::from("blocked".to_string());
        assert_eq!(status.to_string(), "blocked");
        assert_eq!(ListingStatus::OnModeration.to_string(), "На модерации");
    }

    #[test]
    fn dates_render_in_day_month_year() {
        assert_eq!(format_date("2024-03-05"), "05.03.2024");
        assert_eq!(format_date("2024-03-05T10:00:00Z"), "05.03.2024");
        assert_eq!(format_date("2024-03-05 18:30:00"), "05.03.2024");
        assert_eq!(format_date("вчера"), "вчера");
    }

    #[test]
    fn profile_keeps_unknown_fields() {
        let profile: UserProfile = serde_json::from_value(json!({
            "id": 7, "name": "Анна", "email": "a@b.ru", "ordersCount": 3
        }))
        .unwrap();
        assert_eq!(profile.extra.get("ordersCount"), Some(&json!(3)));
        let back = serde_json::to_value(&profile).unwrap();
        assert_eq!(back["ordersCount"], json!(3));
    }

    #[test]
    fn days_since_registration_counts_calendar_days() {
        let profile = UserProfile {
            registration_date: Some("2024-01-01".into()),
            ..UserProfile::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 1, 11).unwrap();
        assert_eq!(profile.days_since_registration(today), Some(10));
    }
}
