use std::cmp::Ordering;

use itertools::Itertools;
use log::debug;
use rapidfuzz::distance::indel;

use crate::{
  catalog::Catalog,
  errors::{CoreResult, MusicCatError},
  types::Song,
};

pub const DEFAULT_MIN_AUTOCORRECT: f64 = 0.92;
pub const DEFAULT_MIN_WARN: f64 = 0.75;
pub const DEFAULT_SEARCH_CUTOFF: f64 = 0.3;

/// Keyword sub-scores at or below this are treated as no match at all.
const KEYWORD_FLOOR: f64 = 0.7;
/// Matches against the game title count a little less than matches against the song title.
const GAME_TITLE_WEIGHT: f64 = 0.9;

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
  pub min_autocorrect: f64,
  pub min_warn: f64,
}

impl Default for Thresholds {
  fn default() -> Self {
    Thresholds {
      min_autocorrect: DEFAULT_MIN_AUTOCORRECT,
      min_warn: DEFAULT_MIN_WARN,
    }
  }
}

/// Similarity of two strings in `[0, 1]`, based on the insert/delete edit distance:
/// `(|a| + |b| - distance) / (|a| + |b|)`. Identical strings score 1.0.
pub fn ratio(a: &str, b: &str) -> f64 {
  if a.is_empty() && b.is_empty() {
    return 1.0;
  }
  indel::normalized_similarity(a.chars(), b.chars())
}

/// Strip a leading `gameId-` when the prefix names a game in the catalog.
fn song_part<'a>(id: &'a str, catalog: &Catalog) -> &'a str {
  match id.split_once('-') {
    Some((game_id, song_id)) if !song_id.is_empty() && catalog.has_game(game_id) => song_id,
    _ => id,
  }
}

pub fn resolve_exact<'c>(id: &str, catalog: &'c Catalog) -> Option<&'c Song> {
  catalog.get(id)
}

/// Resolve a user-typed id, tolerating typos.
///
/// Candidates are scored with [`ratio`]; ties go to the lexically smallest id.
/// A best score at or below `min_warn` is no match at all, below `min_autocorrect`
/// the best candidate is only suggested.
pub fn resolve_fuzzy<'c>(
  id: &str,
  catalog: &'c Catalog,
  thresholds: Thresholds,
) -> CoreResult<&'c Song> {
  if let Some(song) = resolve_exact(id, catalog) {
    return Ok(song);
  }
  let wanted = song_part(id, catalog);
  if let Some(song) = resolve_exact(wanted, catalog) {
    return Ok(song);
  }

  let best = catalog
    .all()
    .map(|song| (song, ratio(wanted, &song.id)))
    .max_by(|(a, ra), (b, rb)| {
      ra.partial_cmp(rb)
        .unwrap_or(Ordering::Equal)
        // reversed, so the smaller id wins the tie
        .then_with(|| b.id.cmp(&a.id))
    });

  match best {
    None => Err(MusicCatError::NoMatch(id.to_string())),
    Some((_, r)) if r <= thresholds.min_warn => Err(MusicCatError::NoMatch(id.to_string())),
    Some((song, r)) if r < thresholds.min_autocorrect => {
      debug!("resolve {}: best candidate {} at {:.3}", id, song.id, r);
      Err(MusicCatError::BadMatch {
        song_id: id.to_string(),
        best_candidate: song.id.clone(),
        ratio: r,
      })
    }
    Some((song, r)) => {
      debug!("resolve {}: autocorrected to {} at {:.3}", id, song.id, r);
      Ok(song)
    }
  }
}

fn best_word_ratio(keyword: &str, haystack: &str) -> f64 {
  haystack
    .to_lowercase()
    .split_whitespace()
    .map(|word| ratio(keyword, word))
    .fold(0.0, f64::max)
}

/// Keyword search over song and game titles, best matches first.
///
/// Each keyword scores `max(title, 0.9 * game title)` against the best matching word;
/// weak keyword scores count as zero. The song score is the mean over keywords and only
/// songs scoring above `cutoff` are returned.
pub fn search<'c, S: AsRef<str>>(
  keywords: &[S],
  catalog: &'c Catalog,
  cutoff: f64,
  required_tag: Option<&str>,
) -> Vec<(&'c Song, f64)> {
  if keywords.is_empty() {
    return vec![];
  }
  let keywords = keywords
    .iter()
    .map(|k| k.as_ref().to_lowercase())
    .collect::<Vec<_>>();

  catalog
    .all()
    .filter(|song| required_tag.map(|tag| song.has_tag(tag)).unwrap_or(true))
    .filter_map(|song| {
      let total = keywords
        .iter()
        .map(|keyword| {
          let in_title = best_word_ratio(keyword, &song.title);
          let in_game = best_word_ratio(keyword, &song.game.title) * GAME_TITLE_WEIGHT;
          let sub = in_title.max(in_game);
          if sub > KEYWORD_FLOOR {
            sub
          } else {
            0.0
          }
        })
        .sum::<f64>();
      let score = total / keywords.len() as f64;
      (score > cutoff).then_some((song, score))
    })
    .sorted_by(|(a, ra), (b, rb)| {
      rb.partial_cmp(ra)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
    })
    .collect()
}
