// Catalog - the track/series records scraped off the remote site
// and the SQLite store that holds them.

pub mod database;

pub use database::Catalog;

/// A series row. `raw` is the site's canonical name (usable in URLs);
/// `jpn`/`eng` are guessed localized titles.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub id: i64,
    pub raw: String,
    pub jpn: Option<String>,
    pub eng: Option<String>,
    pub series_number: Option<i64>,
}

impl Series {
    /// Preferred display name: Japanese, then English, then the raw name.
    pub fn display_name(&self) -> &str {
        self.jpn
            .as_deref()
            .or(self.eng.as_deref())
            .unwrap_or(&self.raw)
    }
}

/// A track row. Immutable input to a playback session; the session never
/// writes back to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub id: i64,
    pub title: Option<String>,
    pub default_title: String,
    pub url: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub scraped: bool,
    pub series_id: Option<i64>,
}

impl TrackRecord {
    /// Curated title when set, the scraped one otherwise.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.default_title)
    }

    /// One-line description, e.g. for the pre-playback banner.
    pub fn describe(&self, series: Option<&Series>) -> String {
        match series {
            Some(series) => format!("{} from {}", self.display_title(), series.display_name()),
            None => self.display_title().to_string(),
        }
    }
}

/// A series about to be inserted (no id yet).
#[derive(Debug, Clone, Default)]
pub struct NewSeries {
    pub raw: String,
    pub jpn: Option<String>,
    pub eng: Option<String>,
    pub series_number: Option<i64>,
}

/// A track about to be inserted (no id yet).
#[derive(Debug, Clone, Default)]
pub struct NewTrack {
    pub title: Option<String>,
    pub default_title: String,
    pub url: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub scraped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_preference() {
        let mut series = Series {
            id: 1,
            raw: "trinity-seven".to_string(),
            jpn: Some("トリニティ・セブン".to_string()),
            eng: Some("Trinity Seven".to_string()),
            series_number: None,
        };
        assert_eq!(series.display_name(), "トリニティ・セブン");

        series.jpn = None;
        assert_eq!(series.display_name(), "Trinity Seven");

        series.eng = None;
        assert_eq!(series.display_name(), "trinity-seven");
    }

    #[test]
    fn test_describe_with_series() {
        let track = TrackRecord {
            id: 1,
            title: Some("Rising Hope".to_string()),
            default_title: "rising hope".to_string(),
            url: "http://example.com/a.mp3".to_string(),
            artist: None,
            album: None,
            scraped: true,
            series_id: Some(1),
        };
        let series = Series {
            id: 1,
            raw: "mahouka".to_string(),
            jpn: None,
            eng: Some("The Irregular at Magic High School".to_string()),
            series_number: None,
        };
        assert_eq!(
            track.describe(Some(&series)),
            "Rising Hope from The Irregular at Magic High School"
        );
        assert_eq!(track.describe(None), "Rising Hope");
    }
}
