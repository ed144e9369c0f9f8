use std::{collections::HashMap, sync::Arc};

use log::{error, info, warn};
use tokio::sync::{Mutex, RwLock};

use crate::{
  auction::AuctionService,
  catalog::CatalogService,
  errors::{CoreResult, MusicCatError},
  rotation::CategoryRotation,
  selector::{fallback_pick, SelectorRegistry},
  store::{Ledger, VolumeStore},
  types::{clock::SharedClock, BidEntry, Category, Song},
};

pub mod device;

pub use device::{MemoryDevice, PlaybackDevice, ProcessPlayer};

pub const DEFAULT_BASE_VOLUME: f64 = 255.0;
pub const DEFAULT_VOLUME_MULTIPLIER: f64 = 0.5;

/// Device volume for a song: `base * multiplier`, rounded and clamped to 0..=255.
pub fn device_volume(base_volume: f64, multiplier: f64) -> u8 {
  let level = (base_volume * multiplier).round();
  if level.is_nan() {
    return 0;
  }
  level.clamp(0.0, 255.0) as u8
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeSettings {
  /// Device units, 0 to 255.
  pub base_volume: f64,
  /// Used for songs the volume store knows nothing about.
  pub default_multiplier: f64,
}

impl Default for VolumeSettings {
  fn default() -> Self {
    VolumeSettings {
      base_volume: DEFAULT_BASE_VOLUME,
      default_multiplier: DEFAULT_VOLUME_MULTIPLIER,
    }
  }
}

/// Drives one "next song" cycle per call: drain or pick, mark, set volume, play.
#[derive(Debug)]
pub struct PlaybackCoordinatorImpl {
  catalog: CatalogService,
  auction: AuctionService,
  selectors: RwLock<SelectorRegistry>,
  rotation: RwLock<CategoryRotation>,
  /// Serializes "drain or pick, then mark played" per category.
  advance_locks: HashMap<Category, Mutex<()>>,
  volumes: Arc<dyn VolumeStore>,
  ledger: Arc<dyn Ledger>,
  device: Arc<dyn PlaybackDevice>,
  clock: SharedClock,
  settings: RwLock<VolumeSettings>,
  /// Volume multiplier of the song on the device, if any.
  playing: Mutex<Option<f64>>,
  paused: Mutex<bool>,
}

pub type PlaybackCoordinator = Arc<PlaybackCoordinatorImpl>;

impl PlaybackCoordinatorImpl {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    catalog: CatalogService,
    auction: AuctionService,
    selectors: SelectorRegistry,
    rotation: CategoryRotation,
    volumes: Arc<dyn VolumeStore>,
    ledger: Arc<dyn Ledger>,
    device: Arc<dyn PlaybackDevice>,
    clock: SharedClock,
    settings: VolumeSettings,
  ) -> PlaybackCoordinator {
    Arc::new(PlaybackCoordinatorImpl {
      catalog,
      auction,
      selectors: RwLock::new(selectors),
      rotation: RwLock::new(rotation),
      advance_locks: Category::ALL
        .iter()
        .map(|c| (*c, Mutex::new(())))
        .collect(),
      volumes,
      ledger,
      device,
      clock,
      settings: RwLock::new(settings),
      playing: Mutex::new(None),
      paused: Mutex::new(false),
    })
  }

  /// Play the next song for `category`. A live bid wins over the selector unless
  /// `use_bid` is false, in which case the bid stays in its slot.
  pub async fn advance(&self, category: Category, use_bid: bool) -> CoreResult<Song> {
    let _guard = self.advance_locks[&category].lock().await;
    let now = self.clock.now();

    let winner = if use_bid {
      self.take_winning_bid(category).await
    } else {
      None
    };
    let mut song = match winner {
      Some(song) => song,
      None => self.pick(category).await?,
    };

    self.catalog.mark_played(&song.id, now).await;
    song.last_played = Some(now);

    self.rotation.write().await.advance_to(category);
    let level = self.play_now(&song).await?;
    info!("Now playing {} [{}] at volume {}", song, category, level);
    Ok(song)
  }

  /// Put `song` on the device right away at its configured volume, leaving the
  /// rotation and play history alone. Returns the device volume used.
  pub async fn play_now(&self, song: &Song) -> CoreResult<u8> {
    let multiplier = self.multiplier_for(&song.id).await;
    let level = device_volume(self.settings.read().await.base_volume, multiplier);
    self.start(song, level).await?;
    *self.playing.lock().await = Some(multiplier);
    *self.paused.lock().await = false;
    Ok(level)
  }

  async fn take_winning_bid(&self, category: Category) -> Option<Song> {
    let entry = self.auction.drain(category).await?;
    let song = self.catalog.read().await.get(&entry.song_id).cloned();
    match song {
      Some(song) => {
        self.charge(&entry).await;
        Some(song)
      }
      None => {
        warn!(
          "Winning {} bid by {} was for {}, which is no longer in the catalog",
          category, entry.username, entry.song_id
        );
        None
      }
    }
  }

  async fn charge(&self, entry: &BidEntry) {
    if let Err(e) = self.ledger.debit(&entry.username, entry.tokens).await {
      error!(
        "Failed to debit {} tokens from {} for {}: {:?}",
        entry.tokens, entry.username, entry.song_id, e
      );
    }
  }

  async fn pick(&self, category: Category) -> CoreResult<Song> {
    let catalog = self.catalog.read().await;
    let picked = self
      .selectors
      .read()
      .await
      .pick(category, &catalog, self.clock.now());
    match picked {
      Err(MusicCatError::NoMatchingSong(_)) => {
        warn!("No song matched for {}, falling back to any song", category);
        fallback_pick(&catalog)
      }
      picked => picked,
    }
  }

  async fn multiplier_for(&self, song_id: &str) -> f64 {
    let default = self.settings.read().await.default_multiplier;
    match self.volumes.get(song_id).await {
      Ok(Some(multiplier)) => multiplier,
      Ok(None) => default,
      Err(e) => {
        warn!("Volume lookup for {} failed, using default: {:?}", song_id, e);
        default
      }
    }
  }

  async fn start(&self, song: &Song, level: u8) -> CoreResult<()> {
    self.device.stop().await.map_err(MusicCatError::Device)?;
    self.device.clear_queue().await.map_err(MusicCatError::Device)?;
    self
      .device
      .set_volume(level)
      .await
      .map_err(MusicCatError::Device)?;
    self
      .device
      .play(&song.fullpath)
      .await
      .map_err(MusicCatError::Device)
  }

  pub async fn pause(&self) -> CoreResult<()> {
    let mut paused = self.paused.lock().await;
    self.device.pause().await.map_err(MusicCatError::Device)?;
    *paused = true;
    Ok(())
  }

  /// Resumes only if a pause is in effect. Returns whether anything happened.
  pub async fn unpause(&self) -> CoreResult<bool> {
    let mut paused = self.paused.lock().await;
    if !*paused {
      return Ok(false);
    }
    self.device.resume().await.map_err(MusicCatError::Device)?;
    *paused = false;
    Ok(true)
  }

  pub async fn is_paused(&self) -> bool {
    *self.paused.lock().await
  }

  /// `level` in device units. The device is updated right away, scaled by the
  /// multiplier of the song that is playing (1.0 when nothing is).
  pub async fn set_base_volume(&self, level: f64) -> CoreResult<()> {
    if !(0.0..=255.0).contains(&level) {
      return Err(MusicCatError::InvalidVolume(level));
    }
    let playing = self.playing.lock().await;
    self.settings.write().await.base_volume = level;
    let device_level = device_volume(level, playing.unwrap_or(1.0));
    self
      .device
      .set_volume(device_level)
      .await
      .map_err(MusicCatError::Device)?;
    info!("Base volume set to {} (device {})", level, device_level);
    Ok(())
  }

  pub async fn volume_settings(&self) -> VolumeSettings {
    *self.settings.read().await
  }

  pub async fn current_category(&self) -> Category {
    self.rotation.read().await.current()
  }

  pub async fn rotation(&self) -> CategoryRotation {
    self.rotation.read().await.clone()
  }

  pub fn selectors(&self) -> &RwLock<SelectorRegistry> {
    &self.selectors
  }
}
