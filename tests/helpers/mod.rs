#![allow(dead_code)]

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, TimeZone, Utc};
use musiccat::{
  catalog::Catalog,
  playback::{MemoryDevice, PlaybackDevice},
  store::{Ledger, MemoryLedger, MemoryRatingStore, MemoryVolumeStore, RatingStore, VolumeStore},
  types::{clock::FixedClock, Category, Game, Song},
  AppOpts, AppService, AppServiceImpl, Collaborators,
};

pub fn now() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()
}

pub fn game(id: &str, title: &str) -> Arc<Game> {
  Arc::new(Game {
    id: id.to_string(),
    title: title.to_string(),
    platform: "GB".to_string(),
    year: 1996,
    series: None,
    is_fanwork: false,
  })
}

pub fn song(id: &str, title: &str, game: &Arc<Game>, types: &[Category]) -> Song {
  Song {
    id: id.to_string(),
    title: title.to_string(),
    path: format!("{}.brstm", id),
    fullpath: format!("/music/{}/{}.brstm", game.id, id),
    types: types.iter().copied().collect::<BTreeSet<_>>(),
    game: game.clone(),
    last_played: None,
    ends: None,
    tags: None,
  }
}

pub struct Harness {
  pub app: AppService,
  pub volumes: Arc<MemoryVolumeStore>,
  pub ratings: Arc<MemoryRatingStore>,
  pub ledger: Arc<MemoryLedger>,
  pub device: Arc<MemoryDevice>,
}

pub fn harness(songs: Vec<Song>) -> Harness {
  harness_with(AppOpts::default(), songs, None, None)
}

/// Wires an app to in-memory collaborators and a clock frozen at [`now`]. The optional
/// stores replace the default in-memory ones.
pub fn harness_with(
  opts: AppOpts,
  songs: Vec<Song>,
  ratings: Option<Arc<dyn RatingStore>>,
  ledger: Option<Arc<dyn Ledger>>,
) -> Harness {
  let volumes = Arc::new(MemoryVolumeStore::new());
  let memory_ratings = Arc::new(MemoryRatingStore::new());
  let memory_ledger = Arc::new(MemoryLedger::new());
  let device = Arc::new(MemoryDevice::new());
  let collaborators = Collaborators {
    volumes: volumes.clone() as Arc<dyn VolumeStore>,
    ratings: ratings.unwrap_or_else(|| memory_ratings.clone() as Arc<dyn RatingStore>),
    ledger: ledger.unwrap_or_else(|| memory_ledger.clone() as Arc<dyn Ledger>),
    device: device.clone() as Arc<dyn PlaybackDevice>,
    clock: Arc::new(FixedClock(now())),
  };
  let app = AppServiceImpl::from_parts(opts, Catalog::from_songs(songs).unwrap(), collaborators)
    .unwrap();
  Harness {
    app,
    volumes,
    ratings: memory_ratings,
    ledger: memory_ledger,
    device,
  }
}
