use super::{NewSeries, NewTrack, Series, TrackRecord};
use crate::player::{PlayerError, TrackSource};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use tracing::debug;

/// SQLite-backed store for scraped series and tracks.
pub struct Catalog {
    conn: Connection,
}

const TRACK_COLUMNS: &str =
    "id, title, default_title, url, artist, album, scraped, series_id";
const SERIES_COLUMNS: &str = "id, raw, jpn, eng, series_number";

impl Catalog {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let catalog = Self { conn };
        catalog.initialize_tables()?;
        Ok(catalog)
    }

    fn initialize_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS series (
                id INTEGER PRIMARY KEY,
                raw TEXT NOT NULL,
                jpn TEXT,
                eng TEXT,
                series_number INTEGER
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tracks (
                id INTEGER PRIMARY KEY,
                title TEXT,
                default_title TEXT NOT NULL,
                url TEXT NOT NULL,
                artist TEXT,
                album TEXT,
                scraped INTEGER NOT NULL DEFAULT 0,
                series_id INTEGER REFERENCES series(id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tracks_series_id ON tracks(series_id)",
            [],
        )?;

        Ok(())
    }

    pub fn add_series(&self, series: &NewSeries) -> Result<Series> {
        self.conn.execute(
            "INSERT INTO series (raw, jpn, eng, series_number) VALUES (?1, ?2, ?3, ?4)",
            params![series.raw, series.jpn, series.eng, series.series_number],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Series {
            id,
            raw: series.raw.clone(),
            jpn: series.jpn.clone(),
            eng: series.eng.clone(),
            series_number: series.series_number,
        })
    }

    /// Insert a batch of tracks, optionally linked to a series, in one
    /// transaction.
    pub fn add_tracks(&mut self, tracks: &[NewTrack], series_id: Option<i64>) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO tracks (title, default_title, url, artist, album, scraped, series_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for track in tracks {
                stmt.execute(params![
                    track.title,
                    track.default_title,
                    track.url,
                    track.artist,
                    track.album,
                    track.scraped,
                    series_id,
                ])?;
            }
        }
        tx.commit()?;
        debug!("inserted {} tracks (series {:?})", tracks.len(), series_id);
        Ok(tracks.len())
    }

    /// Remove everything a previous harvest put in, keeping hand-added rows.
    pub fn delete_scraped(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM tracks WHERE scraped = 1", [])?;
        Ok(deleted)
    }

    /// Search tracks by free-form terms. Every term must match somewhere in
    /// the track's own columns or its series' names; terms narrow the result.
    pub fn search(&self, terms: &[String]) -> Result<Vec<TrackRecord>> {
        if terms.is_empty() {
            return self.all_tracks();
        }

        let mut sql = format!(
            "SELECT t.{} FROM tracks t LEFT JOIN series s ON t.series_id = s.id WHERE ",
            TRACK_COLUMNS.replace(", ", ", t.")
        );
        let clauses: Vec<String> = (1..=terms.len())
            .map(|i| {
                format!(
                    "(t.title LIKE ?{i} ESCAPE '\\' OR t.default_title LIKE ?{i} ESCAPE '\\' \
                     OR t.artist LIKE ?{i} ESCAPE '\\' OR t.album LIKE ?{i} ESCAPE '\\' \
                     OR s.jpn LIKE ?{i} ESCAPE '\\' OR s.eng LIKE ?{i} ESCAPE '\\' \
                     OR s.raw LIKE ?{i} ESCAPE '\\')"
                )
            })
            .collect();
        sql.push_str(&clauses.join(" AND "));
        sql.push_str(" ORDER BY t.id");

        let patterns: Vec<String> = terms.iter().map(|t| like_pattern(t)).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let tracks = stmt
            .query_map(rusqlite::params_from_iter(patterns.iter()), row_to_track)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// Search series by free-form terms against the three name columns.
    pub fn search_series(&self, terms: &[String]) -> Result<Vec<Series>> {
        let mut sql = format!("SELECT {} FROM series", SERIES_COLUMNS);
        if !terms.is_empty() {
            let clauses: Vec<String> = (1..=terms.len())
                .map(|i| {
                    format!(
                        "(jpn LIKE ?{i} ESCAPE '\\' OR eng LIKE ?{i} ESCAPE '\\' \
                         OR raw LIKE ?{i} ESCAPE '\\')"
                    )
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let patterns: Vec<String> = terms.iter().map(|t| like_pattern(t)).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let series = stmt
            .query_map(rusqlite::params_from_iter(patterns.iter()), row_to_series)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(series)
    }

    pub fn series_for(&self, track: &TrackRecord) -> Result<Option<Series>> {
        let Some(series_id) = track.series_id else {
            return Ok(None);
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM series WHERE id = ?1",
            SERIES_COLUMNS
        ))?;
        let series = stmt
            .query_row(params![series_id], row_to_series)
            .optional()?;
        Ok(series)
    }

    fn all_tracks(&self) -> Result<Vec<TrackRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tracks ORDER BY id",
            TRACK_COLUMNS
        ))?;
        let tracks = stmt
            .query_map([], row_to_track)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }
}

impl TrackSource for Catalog {
    fn resolve(&self, track: &TrackRecord) -> Result<String, PlayerError> {
        if track.url.is_empty() {
            return Err(PlayerError::TrackResolutionFailure(
                track.display_title().to_string(),
            ));
        }
        Ok(track.url.clone())
    }
}

/// Escape LIKE metacharacters and wrap in wildcards for substring match.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn row_to_track(row: &Row) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        default_title: row.get(2)?,
        url: row.get(3)?,
        artist: row.get(4)?,
        album: row.get(5)?,
        scraped: row.get(6)?,
        series_id: row.get(7)?,
    })
}

fn row_to_series(row: &Row) -> rusqlite::Result<Series> {
    Ok(Series {
        id: row.get(0)?,
        raw: row.get(1)?,
        jpn: row.get(2)?,
        eng: row.get(3)?,
        series_number: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded_catalog(dir: &TempDir) -> Catalog {
        let mut catalog = Catalog::open(dir.path().join("test.db")).unwrap();

        let mahouka = catalog
            .add_series(&NewSeries {
                raw: "mahouka-koukou-no-rettousei".to_string(),
                jpn: Some("魔法科高校の劣等生".to_string()),
                eng: Some("The Irregular at Magic High School".to_string()),
                series_number: Some(12),
            })
            .unwrap();
        let trinity = catalog
            .add_series(&NewSeries {
                raw: "trinity-seven".to_string(),
                jpn: Some("トリニティ・セブン".to_string()),
                eng: Some("Trinity Seven".to_string()),
                series_number: Some(34),
            })
            .unwrap();

        catalog
            .add_tracks(
                &[
                    NewTrack {
                        default_title: "rising hope".to_string(),
                        url: "http://example.com/rising-hope.mp3".to_string(),
                        scraped: true,
                        ..Default::default()
                    },
                    NewTrack {
                        default_title: "millenario".to_string(),
                        url: "http://example.com/millenario.mp3".to_string(),
                        scraped: true,
                        ..Default::default()
                    },
                ],
                Some(mahouka.id),
            )
            .unwrap();
        catalog
            .add_tracks(
                &[NewTrack {
                    default_title: "seven doors".to_string(),
                    url: "http://example.com/seven-doors.mp3".to_string(),
                    scraped: true,
                    ..Default::default()
                }],
                Some(trinity.id),
            )
            .unwrap();
        catalog
            .add_tracks(
                &[NewTrack {
                    title: Some("Hand Added".to_string()),
                    default_title: "hand added".to_string(),
                    url: "http://example.com/hand.mp3".to_string(),
                    scraped: false,
                    ..Default::default()
                }],
                None,
            )
            .unwrap();

        catalog
    }

    #[test]
    fn test_search_by_track_title() {
        let dir = TempDir::new().unwrap();
        let catalog = seeded_catalog(&dir);

        let hits = catalog.search(&["rising".to_string()]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].default_title, "rising hope");
    }

    #[test]
    fn test_search_by_series_name_finds_its_tracks() {
        let dir = TempDir::new().unwrap();
        let catalog = seeded_catalog(&dir);

        // English series name
        let hits = catalog.search(&["Irregular".to_string()]).unwrap();
        assert_eq!(hits.len(), 2);

        // Japanese series name
        let hits = catalog.search(&["トリニティ".to_string()]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].default_title, "seven doors");
    }

    #[test]
    fn test_search_terms_narrow() {
        let dir = TempDir::new().unwrap();
        let catalog = seeded_catalog(&dir);

        let hits = catalog
            .search(&["magic".to_string(), "millenario".to_string()])
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].default_title, "millenario");

        let hits = catalog
            .search(&["magic".to_string(), "seven doors".to_string()])
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_like_metacharacters_match_literally() {
        let dir = TempDir::new().unwrap();
        let mut catalog = Catalog::open(dir.path().join("test.db")).unwrap();
        catalog
            .add_tracks(
                &[
                    NewTrack {
                        default_title: "100% pure".to_string(),
                        url: "http://example.com/pure.mp3".to_string(),
                        ..Default::default()
                    },
                    NewTrack {
                        default_title: "100 proof".to_string(),
                        url: "http://example.com/proof.mp3".to_string(),
                        ..Default::default()
                    },
                ],
                None,
            )
            .unwrap();

        let hits = catalog.search(&["100%".to_string()]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].default_title, "100% pure");
    }

    #[test]
    fn test_delete_scraped_spares_hand_added() {
        let dir = TempDir::new().unwrap();
        let catalog = seeded_catalog(&dir);

        assert_eq!(catalog.delete_scraped().unwrap(), 3);
        let remaining = catalog.search(&[]).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].display_title(), "Hand Added");
    }

    #[test]
    fn test_series_for_track() {
        let dir = TempDir::new().unwrap();
        let catalog = seeded_catalog(&dir);

        let hits = catalog.search(&["seven doors".to_string()]).unwrap();
        let series = catalog.series_for(&hits[0]).unwrap().unwrap();
        assert_eq!(series.raw, "trinity-seven");
        assert_eq!(series.series_number, Some(34));
    }

    #[test]
    fn test_search_series() {
        let dir = TempDir::new().unwrap();
        let catalog = seeded_catalog(&dir);

        let series = catalog.search_series(&["seven".to_string()]).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].eng.as_deref(), Some("Trinity Seven"));
    }

    #[test]
    fn test_resolve_track_source() {
        let dir = TempDir::new().unwrap();
        let catalog = seeded_catalog(&dir);

        let hits = catalog.search(&["rising".to_string()]).unwrap();
        assert_eq!(
            catalog.resolve(&hits[0]).unwrap(),
            "http://example.com/rising-hope.mp3"
        );

        let mut orphan = hits[0].clone();
        orphan.url = String::new();
        assert!(matches!(
            catalog.resolve(&orphan),
            Err(PlayerError::TrackResolutionFailure(_))
        ));
    }
}
