use std::{collections::BTreeSet, fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::errors::MusicCatError;

pub mod clock;

pub type SongId = String;
pub type GameId = String;
pub type UserId = String;
pub type Tokens = u64;

/// A phase of the live event. Declaration order is the rotation order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  Betting,
  Warning,
  Battle,
  Result,
  Break,
}

impl Category {
  pub const ALL: [Category; 5] = [
    Category::Betting,
    Category::Warning,
    Category::Battle,
    Category::Result,
    Category::Break,
  ];

  /// The category the fixed-song selector plays into.
  pub const PRIMARY: Category = Category::Betting;

  pub fn as_str(&self) -> &'static str {
    match self {
      Category::Betting => "betting",
      Category::Warning => "warning",
      Category::Battle => "battle",
      Category::Result => "result",
      Category::Break => "break",
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Category {
  type Err = MusicCatError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Category::ALL
      .into_iter()
      .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| MusicCatError::UnknownCategory(s.to_string()))
  }
}

// - id: pokemon_rby
//   title: Pokemon Red/Blue
//   platform: GB
//   year: 1996
//   series: Pokemon
//   is_fanwork: false
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
  pub id: GameId,
  pub title: String,
  pub platform: String,
  pub year: i32,
  pub series: Option<String>,
  pub is_fanwork: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Song {
  pub id: SongId,
  pub title: String,
  /// Relative to the directory of the metadata file that declared it.
  pub path: String,
  pub fullpath: String,
  pub types: BTreeSet<Category>,
  pub game: Arc<Game>,
  pub last_played: Option<DateTime<Utc>>,
  /// Alternate end points in seconds.
  pub ends: Option<Vec<f64>>,
  pub tags: Option<BTreeSet<String>>,
}

impl Song {
  pub fn has_type(&self, category: Category) -> bool {
    self.types.contains(&category)
  }

  pub fn has_tag(&self, tag: &str) -> bool {
    self
      .tags
      .as_ref()
      .map(|tags| tags.contains(tag))
      .unwrap_or(false)
  }
}

impl fmt::Display for Song {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({}) [{}]", self.title, self.game.title, self.id)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidEntry {
  pub username: UserId,
  pub song_id: SongId,
  pub tokens: Tokens,
}
