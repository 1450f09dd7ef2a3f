//! Release title composition.

use crate::media::{Link, MediaKind};

use super::{normalize_language, normalize_quality};

/// Catalog default audio language; a lone track in it is left out of titles.
pub const DEFAULT_AUDIO_LANGUAGE: &str = "FRENCH";

const MAX_AUDIO_LANGUAGES: usize = 3;
const MAX_SUBTITLE_LANGUAGES: usize = 2;

/// Both renderings of a release title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTitle {
    /// Title with the distribution host appended, for humans.
    pub display: String,
    /// Title without host tag, for clients that parse release names.
    pub clean: String,
}

/// Builds the release title for a link.
///
/// Tokens, in order: title name; `SxxEyy` / `Sxx` for series or `(year)`
/// otherwise; the edition hint (movies only); audio languages; canonical
/// quality; `[Subs: ..]` when subtitles exist.
#[must_use]
pub fn build_release_title(
    link: &Link,
    edition_hint: Option<&str>,
    media_kind: MediaKind,
) -> ReleaseTitle {
    let mut parts: Vec<String> = vec![link.title_name.trim().to_string()];

    match media_kind {
        MediaKind::Series => match link.episode {
            Some(episode) if episode > 0 => {
                parts.push(format!("S{:02}E{episode:02}", link.season));
            }
            _ => parts.push(format!("S{:02}", link.season)),
        },
        MediaKind::Movie | MediaKind::Music => {
            if let Some(year) = link.year {
                parts.push(format!("({year})"));
            }
        }
    }

    if media_kind == MediaKind::Movie
        && let Some(edition) = edition_hint.map(str::trim).filter(|e| !e.is_empty())
    {
        parts.push(edition.to_string());
    }

    let audio: Vec<String> = link
        .audio_languages
        .iter()
        .take(MAX_AUDIO_LANGUAGES)
        .map(|lang| normalize_language(lang))
        .collect();
    let lone_default = audio.len() == 1 && audio[0] == DEFAULT_AUDIO_LANGUAGE;
    if !audio.is_empty() && !lone_default {
        parts.push(audio.join("+"));
    }

    parts.push(normalize_quality(&link.quality));

    if !link.subtitle_languages.is_empty() {
        let subs: Vec<String> = link
            .subtitle_languages
            .iter()
            .take(MAX_SUBTITLE_LANGUAGES)
            .map(|lang| normalize_language(lang))
            .collect();
        parts.push(format!("[Subs: {}]", subs.join("+")));
    }

    let clean = parts.join(" ");
    let host = if link.host.trim().is_empty() {
        "DDL"
    } else {
        link.host.trim()
    };
    let display = format!("{clean} [{host}]");

    ReleaseTitle { display, clean }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::fixtures;

    fn movie_link() -> Link {
        let mut link = fixtures::link(7, "ULTRA HD (x265)", "1fichier", None);
        link.title_name = "Test Movie".to_string();
        link.year = Some(2024);
        link.season = 0;
        link
    }

    #[test]
    fn test_build_release_title_movie_omits_lone_default_language() {
        let title = build_release_title(&movie_link(), None, MediaKind::Movie);
        assert_eq!(title.clean, "Test Movie (2024) Bluray-2160p");
        assert_eq!(title.display, "Test Movie (2024) Bluray-2160p [1fichier]");
    }

    #[test]
    fn test_build_release_title_shows_non_default_single_track() {
        let mut link = movie_link();
        link.audio_languages = vec!["TrueFrench".to_string()];
        let title = build_release_title(&link, None, MediaKind::Movie);
        assert_eq!(title.clean, "Test Movie (2024) TRUEFRENCH Bluray-2160p");
    }

    #[test]
    fn test_build_release_title_multi_track_capped_at_three() {
        let mut link = movie_link();
        link.audio_languages = ["French", "English", "German", "Spanish"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let title = build_release_title(&link, None, MediaKind::Movie);
        assert_eq!(title.clean, "Test Movie (2024) FRENCH+ENGLISH+GERMAN Bluray-2160p");
    }

    #[test]
    fn test_build_release_title_edition_and_subtitles() {
        let mut link = movie_link();
        link.subtitle_languages = ["French", "English", "German"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let title = build_release_title(&link, Some("EXTENDED"), MediaKind::Movie);
        assert_eq!(
            title.clean,
            "Test Movie (2024) EXTENDED Bluray-2160p [Subs: FRENCH+ENGLISH]"
        );
    }

    #[test]
    fn test_build_release_title_series_episode_and_pack() {
        let mut link = fixtures::link(1, "HDLight 1080p", "send", Some(3));
        link.season = 2;
        let title = build_release_title(&link, Some("EXTENDED"), MediaKind::Series);
        assert_eq!(title.clean, "Test Show S02E03 WEBDL-1080p");

        link.episode = None;
        let title = build_release_title(&link, None, MediaKind::Series);
        assert_eq!(title.clean, "Test Show S02 WEBDL-1080p");
    }

    #[test]
    fn test_build_release_title_is_stable_across_runs() {
        let mut link = movie_link();
        link.audio_languages = vec!["English".to_string(), "French".to_string()];
        let first = build_release_title(&link, Some("IMAX"), MediaKind::Movie);
        let second = build_release_title(&link, Some("IMAX"), MediaKind::Movie);
        assert_eq!(first, second);

        let tokens: Vec<&str> = first.clean.split(' ').collect();
        assert_eq!(
            tokens,
            ["Test", "Movie", "(2024)", "IMAX", "ENGLISH+FRENCH", "Bluray-2160p"]
        );
    }

    #[test]
    fn test_build_release_title_blank_host_falls_back() {
        let mut link = movie_link();
        link.host = String::new();
        let title = build_release_title(&link, None, MediaKind::Movie);
        assert!(title.display.ends_with("[DDL]"));
    }
}
