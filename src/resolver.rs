//! Tiered genre resolution: track → album → artist.
//!
//! Each tier queries the tag service exactly once. A service error at a tier
//! counts as that tier producing zero candidates and the fallback advances;
//! resolution itself never fails, it only comes back empty.

use std::fmt;

use crate::lastfm::{TagService, TagSubject};
use crate::rules::{self, BlacklistRules, DefaultTransform, MappingTable};
use crate::types::GenreSet;

/// Raw candidates considered per tier, before blacklist filtering.
const TOP_CANDIDATES: usize = 3;

/// Minimum raw and filtered candidates for the track tier to accept.
const TRACK_TIER_MIN: usize = 2;

/// Which fallback tier produced a resolution. Diagnostic only: reported,
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Track,
    Album,
    Artist,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Artist => "artist",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve genres for one track. Returns the accepted, mapped candidate list
/// and the tier that produced it, or `None` when every tier comes up short.
pub async fn resolve(
    service: &dyn TagService,
    artist: &str,
    title: &str,
    album: &str,
    rules: &BlacklistRules,
    mapping: &MappingTable,
) -> Option<(GenreSet, Tier)> {
    // 1. Track-specific tags. Only trusted when the service knows the track
    // well enough to return at least two raw tags, and at least two survive
    // the blacklist.
    if !title.is_empty() {
        match service.top_tags(TagSubject::Track, artist, Some(title)).await {
            Ok(raw) => {
                if raw.len() >= TRACK_TIER_MIN {
                    let kept = top_filtered(raw, rules);
                    if kept.len() >= TRACK_TIER_MIN {
                        return Some((accept(kept, mapping), Tier::Track));
                    }
                }
            }
            Err(_) => {} // tier failure advances the fallback
        }
    }

    // 2. Album tags.
    if !album.is_empty() {
        match service.top_tags(TagSubject::Album, artist, Some(album)).await {
            Ok(raw) => {
                let kept = top_filtered(raw, rules);
                if !kept.is_empty() {
                    return Some((accept(kept, mapping), Tier::Album));
                }
            }
            Err(_) => {}
        }
    }

    // 3. Artist tags.
    match service.top_tags(TagSubject::Artist, artist, None).await {
        Ok(raw) => {
            let kept = top_filtered(raw, rules);
            if !kept.is_empty() {
                return Some((accept(kept, mapping), Tier::Artist));
            }
            None
        }
        Err(e) => {
            eprintln!("Error for {artist}: {e}");
            None
        }
    }
}

/// Take the top raw candidates and drop blacklisted ones.
fn top_filtered(raw: Vec<String>, rules: &BlacklistRules) -> GenreSet {
    let top = GenreSet::from_names(raw.into_iter().take(TOP_CANDIDATES));
    rules::filter_rejected(&top, rules)
}

/// An accepted candidate list passes through the mapping table with
/// title-case as the default transform.
fn accept(kept: GenreSet, mapping: &MappingTable) -> GenreSet {
    rules::apply_mapping(&kept, mapping, DefaultTransform::TitleCase)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Scripted service: one canned response per subject kind, plus a call
    /// log to assert each tier is queried at most once.
    struct ScriptedService {
        track: Result<Vec<String>, String>,
        album: Result<Vec<String>, String>,
        artist: Result<Vec<String>, String>,
        calls: Mutex<Vec<TagSubject>>,
    }

    impl ScriptedService {
        fn new(
            track: Result<Vec<String>, String>,
            album: Result<Vec<String>, String>,
            artist: Result<Vec<String>, String>,
        ) -> Self {
            Self {
                track,
                album,
                artist,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<TagSubject> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn tags(names: &[&str]) -> Result<Vec<String>, String> {
        Ok(names.iter().map(|s| s.to_string()).collect())
    }

    #[async_trait]
    impl TagService for ScriptedService {
        async fn top_tags(
            &self,
            subject: TagSubject,
            _artist: &str,
            _secondary: Option<&str>,
        ) -> Result<Vec<String>, String> {
            self.calls.lock().unwrap().push(subject);
            match subject {
                TagSubject::Track => self.track.clone(),
                TagSubject::Album => self.album.clone(),
                TagSubject::Artist => self.artist.clone(),
            }
        }
    }

    fn no_rules() -> BlacklistRules {
        BlacklistRules::default()
    }

    fn mapping(entries: &[(&str, &str)]) -> MappingTable {
        MappingTable::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    #[tokio::test]
    async fn track_tier_accepts_with_enough_candidates() {
        let service = ScriptedService::new(
            tags(&["IDM", "Electronic", "Downtempo"]),
            tags(&["unused"]),
            tags(&["unused"]),
        );
        let (genres, tier) = resolve(
            &service,
            "Boards of Canada",
            "Roygbiv",
            "Music Has the Right to Children",
            &no_rules(),
            &mapping(&[("idm", "IDM")]),
        )
        .await
        .expect("resolved");

        assert_eq!(tier, Tier::Track);
        assert_eq!(genres.join(), "IDM, Electronic, Downtempo");
        assert_eq!(service.calls(), vec![TagSubject::Track]);
    }

    #[tokio::test]
    async fn single_track_candidate_falls_through_to_album() {
        let service = ScriptedService::new(
            tags(&["IDM"]),
            tags(&["Ambient", "Electronic"]),
            tags(&["unused"]),
        );
        let (genres, tier) = resolve(
            &service,
            "Boards of Canada",
            "Roygbiv",
            "Music Has the Right to Children",
            &no_rules(),
            &mapping(&[]),
        )
        .await
        .expect("resolved");

        assert_eq!(tier, Tier::Album);
        assert_eq!(genres.join(), "Ambient, Electronic");
        assert_eq!(service.calls(), vec![TagSubject::Track, TagSubject::Album]);
    }

    #[tokio::test]
    async fn exactly_two_filtered_track_candidates_accept() {
        let service = ScriptedService::new(
            tags(&["IDM", "Electronic"]),
            tags(&["unused"]),
            tags(&["unused"]),
        );
        let (_, tier) = resolve(&service, "a", "t", "b", &no_rules(), &mapping(&[]))
            .await
            .expect("resolved");
        assert_eq!(tier, Tier::Track);
    }

    #[tokio::test]
    async fn blacklist_can_push_track_tier_below_threshold() {
        let rules = BlacklistRules {
            exact: Default::default(),
            contains: vec!["electronic".to_string()],
        };
        // Two raw candidates, but only one survives filtering.
        let service = ScriptedService::new(
            tags(&["IDM", "Electronic"]),
            tags(&["Ambient"]),
            tags(&["unused"]),
        );
        let (genres, tier) = resolve(&service, "a", "t", "b", &rules, &mapping(&[]))
            .await
            .expect("resolved");
        assert_eq!(tier, Tier::Album);
        assert_eq!(genres.join(), "Ambient");
    }

    #[tokio::test]
    async fn only_top_three_raw_candidates_are_considered() {
        let service = ScriptedService::new(
            tags(&["90s", "80s", "70s", "Jazz", "Blues"]),
            tags(&["Ambient"]),
            tags(&["unused"]),
        );
        // All of the top 3 are digit-rejected; Jazz and Blues are beyond the
        // cutoff and must not rescue the tier.
        let (_, tier) = resolve(&service, "a", "t", "b", &no_rules(), &mapping(&[]))
            .await
            .expect("resolved");
        assert_eq!(tier, Tier::Album);
    }

    #[tokio::test]
    async fn service_errors_advance_tiers_without_aborting() {
        let service = ScriptedService::new(
            Err("timeout".to_string()),
            Err("Last.fm HTTP 500".to_string()),
            tags(&["Techno"]),
        );
        let (genres, tier) = resolve(&service, "a", "t", "b", &no_rules(), &mapping(&[]))
            .await
            .expect("resolved");
        assert_eq!(tier, Tier::Artist);
        assert_eq!(genres.join(), "Techno");
        assert_eq!(
            service.calls(),
            vec![TagSubject::Track, TagSubject::Album, TagSubject::Artist]
        );
    }

    #[tokio::test]
    async fn all_tiers_exhausted_is_not_found() {
        let service = ScriptedService::new(tags(&[]), tags(&[]), tags(&[]));
        let result = resolve(&service, "a", "t", "b", &no_rules(), &mapping(&[])).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn missing_title_skips_track_tier() {
        let service = ScriptedService::new(
            tags(&["should", "not", "be", "called"]),
            tags(&["Dub"]),
            tags(&["unused"]),
        );
        let (_, tier) = resolve(&service, "a", "", "b", &no_rules(), &mapping(&[]))
            .await
            .expect("resolved");
        assert_eq!(tier, Tier::Album);
        assert_eq!(service.calls(), vec![TagSubject::Album]);
    }

    #[tokio::test]
    async fn missing_album_skips_album_tier() {
        let service = ScriptedService::new(tags(&["IDM"]), tags(&["unused"]), tags(&["Techno"]));
        let (_, tier) = resolve(&service, "a", "t", "", &no_rules(), &mapping(&[]))
            .await
            .expect("resolved");
        assert_eq!(tier, Tier::Artist);
        assert_eq!(service.calls(), vec![TagSubject::Track, TagSubject::Artist]);
    }

    #[tokio::test]
    async fn accepted_candidates_are_mapped_with_title_case_default() {
        let service = ScriptedService::new(
            tags(&["death metal", "idm"]),
            tags(&["unused"]),
            tags(&["unused"]),
        );
        let (genres, _) = resolve(
            &service,
            "a",
            "t",
            "b",
            &no_rules(),
            &mapping(&[("idm", "IDM")]),
        )
        .await
        .expect("resolved");
        assert_eq!(genres.join(), "Death Metal, IDM");
    }
}
