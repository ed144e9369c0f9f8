use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use log::{debug, info};
use rand::seq::SliceRandom;

use crate::{
  catalog::Catalog,
  errors::{CoreResult, MusicCatError},
  types::{Category, GameId, Song, SongId},
};

pub const DEFAULT_COOLDOWN_HOURS: f64 = 6.0;
pub const DEFAULT_FIXED_SONG: &str = "katamari_on_the_rocks";

/// Names the selection variants, as used in configuration and chat commands.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SelectorKind {
  CooldownRandom,
  UnconstrainedRandom,
  GameRestricted,
  FixedSong,
}

impl SelectorKind {
  pub const ALL: [SelectorKind; 4] = [
    SelectorKind::CooldownRandom,
    SelectorKind::UnconstrainedRandom,
    SelectorKind::GameRestricted,
    SelectorKind::FixedSong,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      SelectorKind::CooldownRandom => "cooldown",
      SelectorKind::UnconstrainedRandom => "random",
      SelectorKind::GameRestricted => "game",
      SelectorKind::FixedSong => "fixed",
    }
  }
}

impl fmt::Display for SelectorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SelectorKind {
  type Err = MusicCatError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "cooldown" | "default" => Ok(SelectorKind::CooldownRandom),
      "random" => Ok(SelectorKind::UnconstrainedRandom),
      "game" => Ok(SelectorKind::GameRestricted),
      "fixed" => Ok(SelectorKind::FixedSong),
      other => Err(MusicCatError::Configuration(format!(
        "unknown selector {:?}, expected one of {}",
        other,
        SelectorKind::ALL.iter().join(", ")
      ))),
    }
  }
}

/// Parse a cooldown given in (possibly fractional) hours.
pub fn parse_cooldown_hours(text: &str) -> CoreResult<Duration> {
  let hours = text
    .trim()
    .parse::<f64>()
    .ok()
    .filter(|h| h.is_finite() && *h >= 0.0)
    .ok_or_else(|| MusicCatError::Configuration(format!("unable to parse delay {:?}", text)))?;
  Ok(Duration::milliseconds((hours * 3_600_000.0).round() as i64))
}

#[derive(Debug, Clone)]
pub struct CooldownRandom {
  pub cooldown: Duration,
}

impl Default for CooldownRandom {
  fn default() -> Self {
    CooldownRandom {
      cooldown: Duration::milliseconds((DEFAULT_COOLDOWN_HOURS * 3_600_000.0) as i64),
    }
  }
}

impl CooldownRandom {
  pub fn is_cooled_down(&self, song: &Song, now: DateTime<Utc>) -> bool {
    match song.last_played {
      Some(last) => now - last >= self.cooldown,
      None => true,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct GameRestricted {
  pub games: Vec<GameId>,
}

impl GameRestricted {
  pub fn add_game(&mut self, game: &str) {
    if !self.games.iter().any(|g| g == game) {
      self.games.push(game.to_string());
    }
  }

  pub fn remove_game(&mut self, game: &str) {
    self.games.retain(|g| g != game);
  }
}

#[derive(Debug, Clone)]
pub struct FixedSong {
  pub song_id: SongId,
}

impl Default for FixedSong {
  fn default() -> Self {
    FixedSong {
      song_id: DEFAULT_FIXED_SONG.to_string(),
    }
  }
}

/// One song-picking policy. Picking never touches the catalog.
#[derive(Debug, Clone)]
pub enum SelectionStrategy {
  CooldownRandom(CooldownRandom),
  UnconstrainedRandom,
  GameRestricted(GameRestricted),
  FixedSong(FixedSong),
}

fn choose(candidates: Vec<&Song>, category: Category) -> CoreResult<Song> {
  candidates
    .choose(&mut rand::thread_rng())
    .map(|song| (*song).clone())
    .ok_or(MusicCatError::NoMatchingSong(category))
}

impl SelectionStrategy {
  pub fn new(kind: SelectorKind) -> Self {
    match kind {
      SelectorKind::CooldownRandom => SelectionStrategy::CooldownRandom(Default::default()),
      SelectorKind::UnconstrainedRandom => SelectionStrategy::UnconstrainedRandom,
      SelectorKind::GameRestricted => SelectionStrategy::GameRestricted(Default::default()),
      SelectorKind::FixedSong => SelectionStrategy::FixedSong(Default::default()),
    }
  }

  pub fn kind(&self) -> SelectorKind {
    match self {
      SelectionStrategy::CooldownRandom(_) => SelectorKind::CooldownRandom,
      SelectionStrategy::UnconstrainedRandom => SelectorKind::UnconstrainedRandom,
      SelectionStrategy::GameRestricted(_) => SelectorKind::GameRestricted,
      SelectionStrategy::FixedSong(_) => SelectorKind::FixedSong,
    }
  }

  pub fn pick(&self, category: Category, catalog: &Catalog, now: DateTime<Utc>) -> CoreResult<Song> {
    let in_category = catalog.all().filter(|song| song.has_type(category));
    match self {
      SelectionStrategy::CooldownRandom(cfg) => choose(
        in_category
          .filter(|song| cfg.is_cooled_down(song, now))
          .collect(),
        category,
      ),
      SelectionStrategy::UnconstrainedRandom => choose(in_category.collect(), category),
      SelectionStrategy::GameRestricted(cfg) => choose(
        in_category
          .filter(|song| cfg.games.contains(&song.game.id))
          .collect(),
        category,
      ),
      SelectionStrategy::FixedSong(cfg) => match catalog.get(&cfg.song_id) {
        Some(song) if category == Category::PRIMARY => Ok(song.clone()),
        _ => Err(MusicCatError::NoMatchingSong(category)),
      },
    }
  }

  /// Apply an operator command such as `time_before_replay 4` or `add pokemon_rby`.
  pub fn configure<S: AsRef<str>>(&mut self, arguments: &[S]) -> CoreResult<()> {
    let args = arguments.iter().map(|a| a.as_ref()).collect::<Vec<_>>();
    match (self, args.as_slice()) {
      (SelectionStrategy::CooldownRandom(cfg), ["time_before_replay", hours]) => {
        cfg.cooldown = parse_cooldown_hours(hours)?;
        info!("Cooldown set to {} minutes", cfg.cooldown.num_minutes());
        Ok(())
      }
      (SelectionStrategy::GameRestricted(cfg), ["add", games @ ..]) => {
        games.iter().for_each(|g| cfg.add_game(g));
        debug!("Game allow-list now {:?}", cfg.games);
        Ok(())
      }
      (SelectionStrategy::GameRestricted(cfg), ["remove", games @ ..]) => {
        games.iter().for_each(|g| cfg.remove_game(g));
        debug!("Game allow-list now {:?}", cfg.games);
        Ok(())
      }
      (SelectionStrategy::FixedSong(cfg), ["song", song_id]) => {
        cfg.song_id = song_id.to_string();
        Ok(())
      }
      (strategy, args) => Err(MusicCatError::Configuration(format!(
        "selector {} doesn't understand {:?}",
        strategy.kind(),
        args
      ))),
    }
  }
}

/// Keeps one configured instance of every variant, so switching back and forth
/// doesn't lose settings.
#[derive(Debug, Clone)]
pub struct SelectorRegistry {
  active: SelectorKind,
  /// Indexed by `SelectorKind as usize`.
  strategies: [SelectionStrategy; 4],
}

impl SelectorRegistry {
  pub fn new(active: SelectorKind) -> Self {
    SelectorRegistry {
      active,
      strategies: SelectorKind::ALL.map(SelectionStrategy::new),
    }
  }

  pub fn active_kind(&self) -> SelectorKind {
    self.active
  }

  pub fn set_active(&mut self, kind: SelectorKind) {
    info!("Selector switched from {} to {}", self.active, kind);
    self.active = kind;
  }

  pub fn active(&self) -> &SelectionStrategy {
    self.get(self.active)
  }

  pub fn get(&self, kind: SelectorKind) -> &SelectionStrategy {
    &self.strategies[kind as usize]
  }

  pub fn get_mut(&mut self, kind: SelectorKind) -> &mut SelectionStrategy {
    &mut self.strategies[kind as usize]
  }

  pub fn set_cooldown(&mut self, cooldown: Duration) {
    if let SelectionStrategy::CooldownRandom(cfg) = self.get_mut(SelectorKind::CooldownRandom) {
      cfg.cooldown = cooldown;
    }
  }

  pub fn cooldown(&self) -> Duration {
    match self.get(SelectorKind::CooldownRandom) {
      SelectionStrategy::CooldownRandom(cfg) => cfg.cooldown,
      _ => CooldownRandom::default().cooldown,
    }
  }

  pub fn pick(&self, category: Category, catalog: &Catalog, now: DateTime<Utc>) -> CoreResult<Song> {
    self.active().pick(category, catalog, now)
  }
}

impl Default for SelectorRegistry {
  fn default() -> Self {
    SelectorRegistry::new(SelectorKind::CooldownRandom)
  }
}

/// Last resort when the active selector comes up empty: any song at all.
pub fn fallback_pick(catalog: &Catalog) -> CoreResult<Song> {
  catalog
    .all()
    .collect::<Vec<_>>()
    .choose(&mut rand::thread_rng())
    .map(|song| (*song).clone())
    .ok_or_else(|| MusicCatError::Configuration("the catalog is empty, nothing to play".into()))
}
