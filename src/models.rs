use std::hash::{Hash, Hasher};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Venue literal attached to every screening read from the per-date pages.
pub const VENUE: &str = "Cinematheque TLV";

/// Venue literal used by the older listing pages (`div.n_block_r` blocks).
pub const LEGACY_VENUE: &str = "סינמטק תל אביב";

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One showing of a movie.
///
/// Two screenings are the same slot when `date_time` and `venue` match; the
/// optional language fields take no part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screening {
    pub date_time: String,
    pub venue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<String>,
}

impl Screening {
    pub fn new(date_time: impl Into<String>, venue: impl Into<String>) -> Self {
        Self {
            date_time: date_time.into(),
            venue: venue.into(),
            language: None,
            subtitles: None,
        }
    }

    /// Structured start time for `YYYY-MM-DD HH:MM` values.
    ///
    /// Legacy `DD-MM-YYYY HH:MM` strings and time-only values return `None`.
    pub fn starts_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.date_time.trim(), DATE_TIME_FORMAT).ok()
    }
}

impl PartialEq for Screening {
    fn eq(&self, other: &Self) -> bool {
        self.date_time == other.date_time && self.venue == other.venue
    }
}

impl Eq for Screening {}

impl Hash for Screening {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.date_time.hash(state);
        self.venue.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(default)]
    pub screenings: Vec<Screening>,
}

impl Movie {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            original_title: None,
            alt_name: None,
            year: None,
            duration_minutes: None,
            img_url: None,
            site_url: None,
            screenings: Vec::new(),
        }
    }

    /// Appends `screening` unless the same slot is already listed.
    pub fn add_screening(&mut self, screening: Screening) -> bool {
        if self.screenings.contains(&screening) {
            return false;
        }
        self.screenings.push(screening);
        true
    }

    /// Earliest screening with a parseable start time.
    pub fn first_screening(&self) -> Option<NaiveDateTime> {
        self.screenings.iter().filter_map(Screening::starts_at).min()
    }
}
