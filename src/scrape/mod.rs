// Scraping pipeline - harvests the remote site's series index and
// per-series playlists into the catalog.

use crate::catalog::{Catalog, NewSeries, NewTrack};
use crate::translate::Translator;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const BASE_URL: &str = "http://www.freeanimemusic.org/anime";
const SEARCH_URL: &str = "http://www.freeanimemusic.org/song_search.php";
const SERIES_LIST_URL: &str = "http://www.musicaanime.org/scripts/resources/artists1.php";
/// The per-series playlist XML hides behind this innocuous filename.
const PLAYLIST_FILE: &str = "button.png";
/// Maximum Levenshtein distance when matching a series name to a raw name.
const MAX_NAME_DISTANCE: usize = 3;

const USER_AGENT: &str = concat!("melodeon/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no series close enough to '{0}' on the remote site")]
    SeriesNotFound(String),

    #[error("unexpected payload from {0}")]
    Malformed(String),
}

/// A row from the remote site's song search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub series_number: i64,
    pub default_title: String,
    pub series: String,
}

/// HTTP client for the remote site, with a polite delay between requests.
#[derive(Clone)]
pub struct SiteClient {
    http: reqwest::Client,
    delay: Duration,
}

impl SiteClient {
    pub fn new(delay: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http, delay })
    }

    async fn get_text(&self, url: &str) -> Result<String, ScrapeError> {
        tokio::time::sleep(self.delay).await;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| ScrapeError::Http {
                url: url.to_string(),
                source,
            })?;
        response.text().await.map_err(|source| ScrapeError::Http {
            url: url.to_string(),
            source,
        })
    }

    /// The site's full series listing: raw name (lowercased) and series number.
    pub async fn series_index(&self) -> Result<Vec<(String, i64)>, ScrapeError> {
        let body = self.get_text(SERIES_LIST_URL).await?;
        parse_series_listing(&body)
    }

    /// All tracks of one series: (default title, stream URL) pairs.
    /// `raw_name` must be a name straight out of the series index.
    pub async fn series_tracks(&self, raw_name: &str) -> Result<Vec<(String, String)>, ScrapeError> {
        let url = format!(
            "{}/{}/{}",
            BASE_URL,
            raw_name.replace(' ', "%20"),
            PLAYLIST_FILE
        );
        let body = self.get_text(&url).await?;
        let tracks = parse_playlist(&body);
        if tracks.is_empty() {
            debug!("playlist for '{}' came back empty", raw_name);
        }
        Ok(tracks)
    }

    /// The site's song search form.
    pub async fn search(&self, keywords: &str) -> Result<Vec<SearchHit>, ScrapeError> {
        tokio::time::sleep(self.delay).await;
        let response = self
            .http
            .post(SEARCH_URL)
            .form(&[("busqueda", keywords)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| ScrapeError::Http {
                url: SEARCH_URL.to_string(),
                source,
            })?;
        let body = response.text().await.map_err(|source| ScrapeError::Http {
            url: SEARCH_URL.to_string(),
            source,
        })?;
        Ok(parse_search_results(&body))
    }

    /// Save a stream to a local file.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!("downloading {} -> {}", url, dest.display());
        let response = self.http.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }
}

/// One series' worth of harvested data, ready for the catalog.
struct HarvestedSeries {
    raw: String,
    number: i64,
    jpn: Option<String>,
    eng: Option<String>,
    tracks: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct HarvestSummary {
    pub series: usize,
    pub tracks: usize,
    pub failures: usize,
}

/// Harvest the whole site: fetch the index, then titles and playlists with
/// bounded concurrency, then one sequential insert pass into the catalog.
pub async fn harvest(
    client: &SiteClient,
    translator: &Translator,
    catalog: &mut Catalog,
    threads: usize,
    rescrape: bool,
) -> Result<HarvestSummary> {
    if rescrape {
        let dropped = catalog.delete_scraped()?;
        info!("rescrape: dropped {} previously scraped tracks", dropped);
    }

    let index = client.series_index().await?;
    info!("remote site lists {} series", index.len());

    let results: Vec<Option<HarvestedSeries>> = stream::iter(index)
        .map(|(raw, number)| async move {
            match client.series_tracks(&raw).await {
                Ok(tracks) => {
                    let (jpn, eng) = translator.guess_titles(&raw).await;
                    info!(
                        "harvested '{}': {} tracks",
                        eng.as_deref().unwrap_or(&raw),
                        tracks.len()
                    );
                    Some(HarvestedSeries {
                        raw,
                        number,
                        jpn,
                        eng,
                        tracks,
                    })
                }
                Err(e) => {
                    warn!("skipping '{}': {}", raw, e);
                    None
                }
            }
        })
        .buffer_unordered(threads.max(1))
        .collect()
        .await;

    let mut summary = HarvestSummary {
        failures: results.iter().filter(|r| r.is_none()).count(),
        ..Default::default()
    };
    for harvested in results.into_iter().flatten() {
        store_series(catalog, harvested, &mut summary)?;
    }

    info!(
        "harvest done: {} series, {} tracks, {} failures",
        summary.series, summary.tracks, summary.failures
    );
    Ok(summary)
}

/// Harvest a single series by approximate name.
pub async fn harvest_one(
    client: &SiteClient,
    translator: &Translator,
    catalog: &mut Catalog,
    name: &str,
) -> Result<HarvestSummary> {
    let index = client.series_index().await?;
    let (raw, number) = closest_series(name, &index)
        .ok_or_else(|| ScrapeError::SeriesNotFound(name.to_string()))?;

    let tracks = client.series_tracks(&raw).await?;
    let (jpn, eng) = translator.guess_titles(&raw).await;

    let mut summary = HarvestSummary::default();
    store_series(
        catalog,
        HarvestedSeries {
            raw,
            number,
            jpn,
            eng,
            tracks,
        },
        &mut summary,
    )?;
    Ok(summary)
}

fn store_series(
    catalog: &mut Catalog,
    harvested: HarvestedSeries,
    summary: &mut HarvestSummary,
) -> Result<()> {
    let series = catalog.add_series(&NewSeries {
        raw: harvested.raw,
        jpn: harvested.jpn,
        eng: harvested.eng,
        series_number: Some(harvested.number),
    })?;
    let new_tracks: Vec<NewTrack> = harvested
        .tracks
        .into_iter()
        .map(|(default_title, url)| NewTrack {
            default_title,
            url,
            scraped: true,
            ..Default::default()
        })
        .collect();
    summary.tracks += catalog.add_tracks(&new_tracks, Some(series.id))?;
    summary.series += 1;
    Ok(())
}

/// Find the index entry whose raw name best matches `name`: exact after
/// folding `-` to spaces, otherwise closest within the distance threshold.
pub fn closest_series(name: &str, index: &[(String, i64)]) -> Option<(String, i64)> {
    let folded = name.to_lowercase().replace('-', " ");
    if let Some(entry) = index
        .iter()
        .find(|(raw, _)| raw.replace('-', " ") == folded)
    {
        return Some(entry.clone());
    }

    index
        .iter()
        .filter_map(|entry| {
            let distance = strsim::levenshtein(&entry.0, &name.to_lowercase());
            (distance <= MAX_NAME_DISTANCE).then_some((entry, distance))
        })
        .min_by_key(|&(_, distance)| distance)
        .map(|(entry, _)| entry.clone())
}

fn parse_series_listing(body: &str) -> Result<Vec<(String, i64)>, ScrapeError> {
    let value: serde_json::Value = serde_json::from_str(body.trim())
        .map_err(|_| ScrapeError::Malformed(SERIES_LIST_URL.to_string()))?;
    let data = value
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ScrapeError::Malformed(SERIES_LIST_URL.to_string()))?;

    Ok(data
        .iter()
        .filter_map(|entry| {
            let title = entry.get("title")?.as_str()?.trim().to_lowercase();
            // The site abuses the "artist" field for the series number.
            let number = match entry.get("artist") {
                Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
                Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
                _ => 0,
            };
            (!title.is_empty()).then_some((title, number))
        })
        .collect())
}

/// Pull (title, location) pairs out of a playlist XML document.
fn parse_playlist(xml: &str) -> Vec<(String, String)> {
    static TRACK_RE: OnceLock<Regex> = OnceLock::new();
    let track_re = TRACK_RE.get_or_init(|| {
        Regex::new(r"(?s)<track>.*?<title>(.*?)</title>.*?<location>(.*?)</location>.*?</track>")
            .expect("playlist regex")
    });

    track_re
        .captures_iter(xml)
        .filter_map(|cap| {
            let title = clean_track_title(&cap[1].to_lowercase());
            let location = cap[2].trim().to_string();
            (!location.is_empty()).then_some((title, location))
        })
        .collect()
}

/// Normalize a playlist track title of the shape
/// `Track num. Track name - Series name` or
/// `Track num. Track name. - (open) - Series name`.
fn clean_track_title(title: &str) -> String {
    static ANNOTATION_RE: OnceLock<Regex> = OnceLock::new();
    static TRACK_NO_RE: OnceLock<Regex> = OnceLock::new();
    static TRAILING_RE: OnceLock<Regex> = OnceLock::new();

    let annotation_re = ANNOTATION_RE
        .get_or_init(|| Regex::new(r"\.?\s+-\s*\([^)]*\)").expect("annotation regex"));
    let track_no_re =
        TRACK_NO_RE.get_or_init(|| Regex::new(r"^\s*\d+\.\s*").expect("track number regex"));
    let trailing_re =
        TRAILING_RE.get_or_init(|| Regex::new(r"^(.*)\s*-.*$").expect("trailing series regex"));

    let name = annotation_re.replace_all(title, "");
    let name = track_no_re.replace(&name, "");

    match trailing_re.captures(&name) {
        Some(cap) => cap[1].trim().to_string(),
        None => name.trim().to_string(),
    }
}

/// Pull result rows out of the search page's HTML table. Each row carries
/// the series number, the track title, and the series name in successive
/// cells; the title cell's last span holds the title.
fn parse_search_results(html: &str) -> Vec<SearchHit> {
    static ROW_RE: OnceLock<Regex> = OnceLock::new();
    static ANNOTATION_RE: OnceLock<Regex> = OnceLock::new();

    let row_re = ROW_RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?s)<td[^>]*>\s*<span[^>]*>\s*(\d+)\.?\s*</span>\s*</td>\s*",
            r"<td[^>]*>.*?<span[^>]*>([^<]+)</span>\s*</td>\s*",
            r"<td[^>]*>\s*<a[^>]+>\s*<span[^>]*>([^<]+)</span>",
        ))
        .expect("search row regex")
    });
    let annotation_re = ANNOTATION_RE
        .get_or_init(|| Regex::new(r"\.?\s+-\s*\([^)]*\)").expect("annotation regex"));

    row_re
        .captures_iter(html)
        .filter_map(|cap| {
            let series_number = cap[1].parse().ok()?;
            let default_title = annotation_re
                .replace_all(&cap[2].to_lowercase(), "")
                .trim()
                .to_string();
            let series = cap[3].trim().to_lowercase();
            Some(SearchHit {
                series_number,
                default_title,
                series,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_series_listing() {
        let body = r#"{"data": [
            {"title": "Mahouka-Koukou-no-Rettousei", "artist": "12"},
            {"title": "trinity-seven", "artist": 34},
            {"title": "", "artist": "99"}
        ]}"#;
        let index = parse_series_listing(body).unwrap();
        assert_eq!(
            index,
            vec![
                ("mahouka-koukou-no-rettousei".to_string(), 12),
                ("trinity-seven".to_string(), 34),
            ]
        );

        assert!(parse_series_listing("<html>not json</html>").is_err());
    }

    #[test]
    fn test_parse_playlist() {
        let xml = r#"<playlist><trackList>
            <track>
                <title>1. Rising Hope - Mahouka Koukou no Rettousei</title>
                <location>http://example.com/ost/rising_hope.mp3</location>
            </track>
            <track>
                <title>2. Millenario. - (open) - Mahouka Koukou no Rettousei</title>
                <location>http://example.com/ost/millenario.mp3</location>
            </track>
        </trackList></playlist>"#;

        let tracks = parse_playlist(xml);
        assert_eq!(
            tracks,
            vec![
                (
                    "rising hope".to_string(),
                    "http://example.com/ost/rising_hope.mp3".to_string()
                ),
                (
                    "millenario".to_string(),
                    "http://example.com/ost/millenario.mp3".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_clean_track_title() {
        assert_eq!(
            clean_track_title("1. rising hope - mahouka koukou no rettousei"),
            "rising hope"
        );
        assert_eq!(
            clean_track_title("12. vitalization. - (open) - symphogear g"),
            "vitalization"
        );
        // No trailing series part: just strip the number.
        assert_eq!(clean_track_title("3. standalone title"), "standalone title");
    }

    #[test]
    fn test_closest_series() {
        let index = vec![
            ("mahouka-koukou-no-rettousei".to_string(), 12),
            ("trinity-seven".to_string(), 34),
        ];

        // Exact after folding hyphens to spaces.
        assert_eq!(
            closest_series("mahouka koukou no rettousei", &index),
            Some(("mahouka-koukou-no-rettousei".to_string(), 12))
        );
        // Within the distance threshold.
        assert_eq!(
            closest_series("trinity-sevan", &index),
            Some(("trinity-seven".to_string(), 34))
        );
        // Nothing close enough.
        assert_eq!(closest_series("completely different", &index), None);
    }

    #[test]
    fn test_parse_search_results() {
        let html = r#"<table>
        <tr>
            <td><span class="n">06.</span></td>
            <td><span class="ico">♪</span> <span>Vitalization - (open)</span></td>
            <td><a href="/anime/symphogear-g"><span>Symphogear G</span></a></td>
        </tr>
        <tr>
            <td><span class="n">7</span></td>
            <td><span>Rising Hope</span></td>
            <td><a href="/anime/mahouka"><span>Mahouka Koukou no Rettousei</span></a></td>
        </tr>
        </table>"#;

        let hits = parse_search_results(html);
        assert_eq!(
            hits,
            vec![
                SearchHit {
                    series_number: 6,
                    default_title: "vitalization".to_string(),
                    series: "symphogear g".to_string(),
                },
                SearchHit {
                    series_number: 7,
                    default_title: "rising hope".to_string(),
                    series: "mahouka koukou no rettousei".to_string(),
                },
            ]
        );
    }
}
