use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const API_ROOT: &str = "https://ws.audioscrobbler.com/2.0/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_DELAY: Duration = Duration::from_millis(250);

pub const API_KEY_ENV: &str = "GENREBRIDGE_LASTFM_KEY";

/// Which entity a top-tags lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagSubject {
    Track,
    Album,
    Artist,
}

impl TagSubject {
    fn method(self) -> &'static str {
        match self {
            Self::Track => "track.gettoptags",
            Self::Album => "album.gettoptags",
            Self::Artist => "artist.gettoptags",
        }
    }

    fn secondary_param(self) -> Option<&'static str> {
        match self {
            Self::Track => Some("track"),
            Self::Album => Some("album"),
            Self::Artist => None,
        }
    }
}

/// Ranked candidate genre tags for an artist/track/album.
///
/// Any non-success outcome (HTTP error, timeout, malformed payload) is an
/// `Err` with a reason string; the tiered fallback treats it as the tier
/// producing zero candidates. An empty tag list is `Ok(vec![])`.
#[async_trait]
pub trait TagService: Send + Sync {
    async fn top_tags(
        &self,
        subject: TagSubject,
        artist: &str,
        secondary: Option<&str>,
    ) -> Result<Vec<String>, String>;
}

#[derive(Deserialize)]
struct TopTagsResponse {
    toptags: Option<TopTags>,
}

#[derive(Deserialize)]
struct TopTags {
    #[serde(default)]
    tag: TagList,
}

/// Last.fm serializes a single tag as a bare object instead of a
/// one-element array.
#[derive(Deserialize)]
#[serde(untagged)]
enum TagList {
    Many(Vec<TagEntry>),
    One(TagEntry),
}

impl Default for TagList {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Last.fm client. The API key is resolved once, before any track is
/// processed: a missing key is a fatal precondition, never a per-tier
/// failure.
pub struct LastFm {
    client: Client,
    api_key: String,
}

impl LastFm {
    pub fn from_env() -> Result<Self, String> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            format!(
                "{API_KEY_ENV} not set. Create an API key at \
                 https://www.last.fm/api/account/create"
            )
        })?;
        Ok(Self::new(api_key))
    }

    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, api_key }
    }
}

#[async_trait]
impl TagService for LastFm {
    async fn top_tags(
        &self,
        subject: TagSubject,
        artist: &str,
        secondary: Option<&str>,
    ) -> Result<Vec<String>, String> {
        // Rate limit
        tokio::time::sleep(REQUEST_DELAY).await;

        let mut url = format!(
            "{API_ROOT}?method={method}&artist={artist}&api_key={key}&format=json",
            method = subject.method(),
            artist = urlencoding(artist),
            key = self.api_key,
        );
        if let (Some(param), Some(value)) = (subject.secondary_param(), secondary) {
            url.push_str(&format!("&{param}={}", urlencoding(value)));
        }

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("Last.fm HTTP {}", resp.status()));
        }

        let data: TopTagsResponse = resp
            .json()
            .await
            .map_err(|e| format!("JSON parse error: {e}"))?;

        let tags = match data.toptags {
            Some(toptags) => match toptags.tag {
                TagList::Many(entries) => entries,
                TagList::One(entry) => vec![entry],
            },
            None => Vec::new(),
        };

        Ok(tags.into_iter().map(|t| t.name).collect())
    }
}

/// Percent-encode a string for URL query parameters.
fn urlencoding(s: &str) -> String {
    use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
    const SET: &AsciiSet = &NON_ALPHANUMERIC
        .remove(b'-')
        .remove(b'_')
        .remove(b'.')
        .remove(b'~');
    utf8_percent_encode(s, SET).to_string()
}
