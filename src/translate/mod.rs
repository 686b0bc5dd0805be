// Localized-title guessing - asks Wikipedia (en + ja) what a raw series
// name is actually called, in both languages.

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

const USER_AGENT: &str = concat!("melodeon/", env!("CARGO_PKG_VERSION"));

/// Disambiguation suffixes Wikipedia likes to append; safe to strip.
const ACCEPTED_SUFFIXES: &[&str] = &[
    "(アニメ)",
    "(テレビアニメ)",
    "(漫画)",
    "(anime)",
    "(manga)",
    "(visual novel)",
];
/// Suffixes that mark a hit as the wrong kind of page.
const REJECTED_SUFFIXES: &[&str] = &["系アニメ"];

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: QueryBody,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default)]
    search: Vec<SearchPage>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    title: String,
}

/// Which of the two candidates wins when neither disqualifies itself.
#[derive(Debug, Clone, Copy)]
enum Prefer {
    First,
    Second,
}

#[derive(Clone)]
pub struct Translator {
    http: reqwest::Client,
}

impl Translator {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http })
    }

    /// Guess the Japanese and English titles for a raw series name.
    /// Network trouble degrades to (None, None); harvesting goes on without
    /// localized titles.
    pub async fn guess_titles(&self, raw: &str) -> (Option<String>, Option<String>) {
        let tokenized = raw.replace('-', " ");

        // The search term already says "anime"; it narrows the hits a lot.
        let eng = self
            .search_title("en", &format!("{} anime", tokenized))
            .await;
        let jpn = self
            .search_title("ja", &format!("{} アニメ", tokenized))
            .await;

        let eng_trans = match &jpn {
            Some(title) => self.linked_title("ja", title, "en").await,
            None => None,
        };
        let jpn_trans = match &eng {
            Some(title) => self.linked_title("en", title, "ja").await,
            None => None,
        };

        // "List of ..." pages are indexes, not the series itself.
        let eng = eng.filter(|t| !t.starts_with("List of"));
        let eng_trans = eng_trans.filter(|t| !t.starts_with("List of"));

        // Japanese: prefer the cross-translated title (the English wiki has
        // less noise); English: prefer the direct search hit.
        let guess_jpn = choose(jpn, jpn_trans, Prefer::Second);
        let guess_eng = choose(eng, eng_trans, Prefer::First);
        (guess_jpn, guess_eng)
    }

    /// First search hit on the given wiki, or None.
    async fn search_title(&self, lang: &str, term: &str) -> Option<String> {
        let url = format!("https://{}.wikipedia.org/w/api.php", lang);
        let request = self.http.get(&url).query(&[
            ("action", "query"),
            ("list", "search"),
            ("format", "json"),
            ("srsearch", term),
            ("srnamespace", "0"),
            ("srwhat", "text"),
            ("srprop", ""),
        ]);

        let response: QueryResponse = match request.send().await {
            Ok(r) => match r.json().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("wikipedia {} search for '{}' unparseable: {}", lang, term, e);
                    return None;
                }
            },
            Err(e) => {
                debug!("wikipedia {} search for '{}' failed: {}", lang, term, e);
                return None;
            }
        };

        response.query.search.into_iter().next().map(|p| p.title)
    }

    /// Follow the interlanguage link of a page, if it has one.
    async fn linked_title(&self, from: &str, title: &str, to: &str) -> Option<String> {
        let url = format!("https://{}.wikipedia.org/w/api.php", from);
        let request = self.http.get(&url).query(&[
            ("action", "query"),
            ("prop", "langlinks"),
            ("format", "json"),
            ("titles", title),
            ("lllang", to),
            ("lllimit", "1"),
        ]);

        let value: serde_json::Value = match request.send().await {
            Ok(r) => match r.json().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("langlinks for '{}' unparseable: {}", title, e);
                    return None;
                }
            },
            Err(e) => {
                debug!("langlinks for '{}' failed: {}", title, e);
                return None;
            }
        };

        // pages is keyed by page id; there is exactly one entry for one title.
        let pages = value.get("query")?.get("pages")?.as_object()?;
        let page = pages.values().next()?;
        let link = page.get("langlinks")?.as_array()?.first()?;
        link.get("*")?.as_str().map(|s| s.trim().to_string())
    }
}

/// Pick between two candidate titles, following the site conventions:
/// agreement wins, a strippable disambiguation suffix wins after stripping,
/// a rejected suffix loses, otherwise the preferred side wins.
fn choose(one: Option<String>, two: Option<String>, prefer: Prefer) -> Option<String> {
    let (one, two) = match (one, two) {
        (None, None) => return None,
        (Some(one), None) => return Some(one),
        (None, Some(two)) => return Some(two),
        (Some(one), Some(two)) => (one, two),
    };

    if one == two {
        return Some(one);
    }
    if ACCEPTED_SUFFIXES.iter().any(|s| one.ends_with(s)) {
        return Some(strip_suffixes(&one));
    }
    if ACCEPTED_SUFFIXES.iter().any(|s| two.ends_with(s)) {
        return Some(strip_suffixes(&two));
    }
    if REJECTED_SUFFIXES.iter().any(|s| two.ends_with(s)) {
        return Some(one);
    }
    if REJECTED_SUFFIXES.iter().any(|s| one.ends_with(s)) {
        return Some(two);
    }

    Some(match prefer {
        Prefer::First => one,
        Prefer::Second => two,
    })
}

fn strip_suffixes(title: &str) -> String {
    let mut stripped = title.to_string();
    for suffix in ACCEPTED_SUFFIXES {
        stripped = stripped.replace(suffix, "");
    }
    stripped.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Option<String> {
        Some(text.to_string())
    }

    #[test]
    fn test_choose_basics() {
        assert_eq!(choose(None, None, Prefer::First), None);
        assert_eq!(choose(s("A"), None, Prefer::Second), s("A"));
        assert_eq!(choose(None, s("B"), Prefer::First), s("B"));
        assert_eq!(choose(s("Same"), s("Same"), Prefer::Second), s("Same"));
    }

    #[test]
    fn test_choose_prefers_given_side() {
        assert_eq!(choose(s("A"), s("B"), Prefer::First), s("A"));
        assert_eq!(choose(s("A"), s("B"), Prefer::Second), s("B"));
    }

    #[test]
    fn test_choose_strips_disambiguation() {
        assert_eq!(
            choose(s("Nichijou (manga)"), s("Other"), Prefer::Second),
            s("Nichijou")
        );
        assert_eq!(
            choose(s("Other"), s("日常 (アニメ)"), Prefer::First),
            s("日常")
        );
    }

    #[test]
    fn test_choose_rejects_bad_suffixes() {
        assert_eq!(
            choose(s("Good Title"), s("ロボット系アニメ"), Prefer::Second),
            s("Good Title")
        );
        assert_eq!(
            choose(s("ロボット系アニメ"), s("Good Title"), Prefer::First),
            s("Good Title")
        );
    }

    #[test]
    fn test_strip_suffixes() {
        assert_eq!(strip_suffixes("Trinity Seven (anime)"), "Trinity Seven");
        assert_eq!(strip_suffixes("No Suffix Here"), "No Suffix Here");
    }
}
