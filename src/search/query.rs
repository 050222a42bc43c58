//! URL query string <-> [`SearchParams`].
//!
//! The query string is the single source of truth for search state: pages parse
//! it on every render and write it back on submission, so a reload restores
//! exactly what was on screen.

use url::form_urlencoded;

use crate::models::{SearchMode, SearchParams};

/// Reads `animalType` (legacy `kind`), `district` and `description`.
/// Missing keys become empty strings; the first occurrence of a key wins.
pub fn parse_query(query: &str) -> SearchParams {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut animal_type: Option<String> = None;
    let mut kind: Option<String> = None;
    let mut district: Option<String> = None;
    let mut description: Option<String> = None;

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let slot = match key.as_ref() {
            "animalType" => &mut animal_type,
            "kind" => &mut kind,
            "district" => &mut district,
            "description" => &mut description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    SearchParams {
        animal_type: animal_type
            .filter(|v| !v.is_empty())
            .or(kind)
            .unwrap_or_default(),
        district: district.unwrap_or_default(),
        description: description.unwrap_or_default(),
    }
}

/// 1-based page from `page=`, defaulting to 1.
pub fn parse_page(query: &str) -> usize {
    let query = query.strip_prefix('?').unwrap_or(query);
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .filter(|page| *page >= 1)
        .unwrap_or(1)
}

impl SearchParams {
    /// Query string written when a search form is submitted.
    /// Quick search carries only the description; advanced carries kind and district.
    pub fn to_query_string(&self, mode: SearchMode) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        match mode {
            SearchMode::Quick => {
                if !self.description.is_empty() {
                    query.append_pair("description", &self.description);
                }
            }
            SearchMode::Advanced => {
                if !self.animal_type.is_empty() {
                    query.append_pair("kind", &self.animal_type);
                }
                if !self.district.is_empty() {
                    query.append_pair("district", &self.district);
                }
            }
        }
        query.finish()
    }

    /// Link to another page of the current search, keeping every set key.
    pub fn page_href(&self, page: usize) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if !self.description.is_empty() {
            query.append_pair("description", &self.description);
        }
        if !self.animal_type.is_empty() {
            query.append_pair("kind", &self.animal_type);
        }
        if !self.district.is_empty() {
            query.append_pair("district", &self.district);
        }
        query.append_pair("page", &page.to_string());
        format!("/search?{}", query.finish())
    }

    pub fn search_href(&self, mode: SearchMode) -> String {
        let query = self.to_query_string(mode);
        if query.is_empty() {
            "/search".to_string()
        } else {
            format!("/search?{query}")
        }
    }
}
