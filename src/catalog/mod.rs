use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::{debug, info, warn};
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::{
  errors::{CoreResult, MusicCatError},
  types::{Category, Song, SongId},
  Result,
};

pub mod loader;

pub use loader::LoadOptions;

/// All songs known for the session, keyed by song id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  songs: HashMap<SongId, Song>,
}

impl Catalog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_songs(songs: impl IntoIterator<Item = Song>) -> CoreResult<Self> {
    let mut catalog = Catalog::new();
    for song in songs {
      catalog.insert(song)?;
    }
    Ok(catalog)
  }

  /// Add a song, refusing to overwrite an existing id.
  pub fn insert(&mut self, song: Song) -> CoreResult<()> {
    if let Some(existing) = self.songs.get(&song.id) {
      return Err(MusicCatError::SongIdConflict {
        song_id: song.id.clone(),
        first_game: existing.game.id.clone(),
        second_game: song.game.id.clone(),
      });
    }
    self.songs.insert(song.id.clone(), song);
    Ok(())
  }

  pub fn get(&self, id: &str) -> Option<&Song> {
    self.songs.get(id)
  }

  pub fn contains(&self, id: &str) -> bool {
    self.songs.contains_key(id)
  }

  /// Every song, ordered by id so iteration is reproducible.
  pub fn all(&self) -> impl Iterator<Item = &Song> {
    self.songs.values().sorted_by(|a, b| a.id.cmp(&b.id))
  }

  pub fn len(&self) -> usize {
    self.songs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.songs.is_empty()
  }

  /// Number of songs, optionally restricted to one category.
  pub fn count(&self, category: Option<Category>) -> usize {
    match category {
      Some(category) => self.songs.values().filter(|s| s.has_type(category)).count(),
      None => self.songs.len(),
    }
  }

  pub fn has_game(&self, game_id: &str) -> bool {
    self.songs.values().any(|s| s.game.id == game_id)
  }

  /// Returns `false` when the id is unknown.
  pub fn mark_played(&mut self, id: &str, now: DateTime<Utc>) -> bool {
    match self.songs.get_mut(id) {
      Some(song) => {
        song.last_played = Some(now);
        true
      }
      None => false,
    }
  }

  /// Copy last-played timestamps from a previous catalog for ids present in both.
  pub fn carry_over_last_played(&mut self, previous: &Catalog) {
    for (id, song) in self.songs.iter_mut() {
      if let Some(old) = previous.songs.get(id) {
        song.last_played = old.last_played;
      }
    }
  }
}

#[derive(Debug)]
pub struct CatalogServiceImpl {
  pub options: LoadOptions,
  catalog: RwLock<Catalog>,
}

pub type CatalogService = Arc<CatalogServiceImpl>;

impl CatalogServiceImpl {
  pub fn new(options: LoadOptions, catalog: Catalog) -> CatalogService {
    Arc::new(CatalogServiceImpl {
      options,
      catalog: RwLock::new(catalog),
    })
  }

  pub async fn read(&self) -> RwLockReadGuard<'_, Catalog> {
    self.catalog.read().await
  }

  pub async fn mark_played(&self, id: &str, now: DateTime<Utc>) -> bool {
    let marked = self.catalog.write().await.mark_played(id, now);
    if !marked {
      warn!("mark_played: song {} vanished from the catalog", id);
    }
    marked
  }

  /// Swap in a freshly built catalog. Returns the ids that were not in the old one.
  pub async fn replace(&self, mut fresh: Catalog) -> Vec<SongId> {
    let mut catalog = self.catalog.write().await;
    fresh.carry_over_last_played(&catalog);
    let new_ids = fresh
      .songs
      .keys()
      .filter(|id| !catalog.contains(id))
      .cloned()
      .sorted()
      .collect::<Vec<_>>();
    debug!(
      "Replacing catalog: {} -> {} songs, {} new",
      catalog.len(),
      fresh.len(),
      new_ids.len()
    );
    *catalog = fresh;
    new_ids
  }

  /// Rebuild from disk and replace the current catalog.
  pub async fn reload(&self) -> Result<Vec<SongId>> {
    let fresh = loader::load_catalog(&self.options).await?;
    info!("Reloaded catalog with {} songs", fresh.len());
    Ok(self.replace(fresh).await)
  }
}
