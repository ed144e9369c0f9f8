use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use log::{info, warn};

use crate::{
  auction::{AuctionService, AuctionServiceImpl},
  catalog::{Catalog, CatalogService, CatalogServiceImpl, LoadOptions},
  errors::{CoreResult, MusicCatError},
  playback::{
    MemoryDevice, PlaybackCoordinator, PlaybackCoordinatorImpl, PlaybackDevice, ProcessPlayer,
    VolumeSettings,
  },
  resolver::Thresholds,
  rotation::CategoryRotation,
  selector::{parse_cooldown_hours, SelectorKind, SelectorRegistry},
  store::{Ledger, MemoryLedger, MemoryRatingStore, MemoryVolumeStore, RatingStore, VolumeStore},
  types::{
    clock::{system_clock, SharedClock},
    BidEntry, Category, Song, SongId, Tokens,
  },
};

pub mod auction;
pub mod catalog;
pub mod errors;
pub mod playback;
pub mod resolver;
pub mod rotation;
pub mod selector;
pub mod store;
pub mod types;

pub type Result<T> = anyhow::Result<T>;

/// Ratings are whole numbers in `0..MAX_RATING`.
pub const MAX_RATING: i64 = 5;

#[derive(Debug, Parser, Clone)]
pub struct AppOpts {
  /// Directory searched for `*.yaml` game metadata.
  #[clap(long, env, default_value = "./library")]
  pub library_path: PathBuf,
  /// Root for audio file paths, defaults to the library path.
  #[clap(long, env)]
  pub songfile_path: Option<PathBuf>,
  #[clap(long, env, default_value = "false")]
  pub strict: bool,
  #[clap(long, env, default_value = "false")]
  pub require_audio_files: bool,

  /// External player, invoked as `<player> [player-args] <file>`. Without one, nothing
  /// is actually played.
  #[clap(long, env)]
  pub player_path: Option<String>,
  /// Player arguments. `{file}`, `{volume}` (0-255) and `{volume_pct}` are filled in
  /// per song; the file goes last when no argument names it.
  #[clap(long, env, value_delimiter = ',')]
  pub player_args: Vec<String>,

  /// Device units, 0 to 255.
  #[clap(long, env, default_value = "255")]
  pub base_volume: f64,
  #[clap(long, env, default_value = "0.5")]
  pub default_volume_multiplier: f64,

  #[clap(long, env, default_value = "cooldown")]
  pub selector: String,
  #[clap(long, env, default_value = "6")]
  pub cooldown_hours: String,
  #[clap(long, env, default_value = selector::DEFAULT_FIXED_SONG)]
  pub fixed_song: String,

  #[clap(long, env, default_value_t = resolver::DEFAULT_MIN_AUTOCORRECT)]
  pub min_autocorrect: f64,
  #[clap(long, env, default_value_t = resolver::DEFAULT_MIN_WARN)]
  pub min_warn: f64,

  #[clap(long, env, default_value = "true", action = clap::ArgAction::Set)]
  pub redirect_warning_bids: bool,
}

impl AppOpts {
  pub fn load_options(&self) -> LoadOptions {
    LoadOptions {
      library_path: self.library_path.clone(),
      songfile_path: self.songfile_path.clone(),
      strict: self.strict,
      require_audio_files: self.require_audio_files,
    }
  }

  pub fn thresholds(&self) -> Thresholds {
    Thresholds {
      min_autocorrect: self.min_autocorrect,
      min_warn: self.min_warn,
    }
  }
}

impl Default for AppOpts {
  fn default() -> Self {
    AppOpts::parse_from(["musiccat"])
  }
}

/// The outside world, as seen by the core.
#[derive(Debug, Clone)]
pub struct Collaborators {
  pub volumes: Arc<dyn VolumeStore>,
  pub ratings: Arc<dyn RatingStore>,
  pub ledger: Arc<dyn Ledger>,
  pub device: Arc<dyn PlaybackDevice>,
  pub clock: SharedClock,
}

impl Collaborators {
  /// In-memory stores, the wall clock, and either the configured player or a silent device.
  pub fn in_memory(opts: &AppOpts) -> Self {
    let device: Arc<dyn PlaybackDevice> = match &opts.player_path {
      Some(player) => Arc::new(ProcessPlayer::new(player.clone(), opts.player_args.clone())),
      None => {
        warn!("No player configured, songs will only be logged");
        Arc::new(MemoryDevice::new())
      }
    };
    Collaborators {
      volumes: Arc::new(MemoryVolumeStore::new()),
      ratings: Arc::new(MemoryRatingStore::new()),
      ledger: Arc::new(MemoryLedger::new()),
      device,
      clock: system_clock(),
    }
  }
}

/// Everything a chat front-end needs, behind one handle.
#[derive(Debug)]
pub struct AppServiceImpl {
  pub opts: AppOpts,
  pub catalog: CatalogService,
  pub auction: AuctionService,
  pub playback: PlaybackCoordinator,
  volumes: Arc<dyn VolumeStore>,
  ratings: Arc<dyn RatingStore>,
  thresholds: Thresholds,
}

pub type AppService = Arc<AppServiceImpl>;

impl AppServiceImpl {
  pub async fn new(opts: AppOpts) -> Result<AppService> {
    let catalog = catalog::loader::load_catalog(&opts.load_options()).await?;
    let collaborators = Collaborators::in_memory(&opts);
    let app = Self::from_parts(opts, catalog, collaborators)?;
    let ids = app
      .catalog
      .read()
      .await
      .all()
      .map(|s| s.id.clone())
      .collect::<Vec<_>>();
    app.seed_volumes(&ids).await;
    info!("Loaded {} songs", ids.len());
    Ok(app)
  }

  pub fn from_parts(
    opts: AppOpts,
    catalog: Catalog,
    collaborators: Collaborators,
  ) -> CoreResult<AppService> {
    let active = opts.selector.parse::<SelectorKind>()?;
    let mut selectors = SelectorRegistry::new(active);
    selectors.set_cooldown(parse_cooldown_hours(&opts.cooldown_hours)?);
    selectors
      .get_mut(SelectorKind::FixedSong)
      .configure(&["song", opts.fixed_song.as_str()])?;

    let settings = VolumeSettings {
      base_volume: opts.base_volume,
      default_multiplier: opts.default_volume_multiplier,
    };
    if !(0.0..=255.0).contains(&settings.base_volume) {
      return Err(MusicCatError::InvalidVolume(settings.base_volume));
    }

    let catalog = CatalogServiceImpl::new(opts.load_options(), catalog);
    let auction = AuctionServiceImpl::new(opts.redirect_warning_bids);
    let playback = PlaybackCoordinatorImpl::new(
      catalog.clone(),
      auction.clone(),
      selectors,
      CategoryRotation::default(),
      collaborators.volumes.clone(),
      collaborators.ledger,
      collaborators.device,
      collaborators.clock,
      settings,
    );
    Ok(Arc::new(AppServiceImpl {
      thresholds: opts.thresholds(),
      opts,
      catalog,
      auction,
      playback,
      volumes: collaborators.volumes,
      ratings: collaborators.ratings,
    }))
  }

  pub async fn resolve(&self, identifier: &str) -> CoreResult<Song> {
    let catalog = self.catalog.read().await;
    resolver::resolve_fuzzy(identifier, &catalog, self.thresholds).cloned()
  }

  pub async fn search<S: AsRef<str>>(
    &self,
    keywords: &[S],
    cutoff: Option<f64>,
    required_tag: Option<&str>,
  ) -> Vec<(Song, f64)> {
    let catalog = self.catalog.read().await;
    resolver::search(
      keywords,
      &catalog,
      cutoff.unwrap_or(resolver::DEFAULT_SEARCH_CUTOFF),
      required_tag,
    )
    .into_iter()
    .map(|(song, score)| (song.clone(), score))
    .collect()
  }

  /// Bid on the category that plays after the current one.
  pub async fn bid(
    &self,
    user: &str,
    identifier: &str,
    tokens: Tokens,
  ) -> CoreResult<(Category, BidEntry)> {
    let song = self.resolve(identifier).await?;
    let category = self
      .auction
      .next_category_for_bidding(&self.playback.rotation().await);
    let entry = self.auction.bid(user, &song, tokens, category).await?;
    Ok((category, entry))
  }

  pub async fn advance(&self, category: Category, use_bid: bool) -> CoreResult<Song> {
    self.playback.advance(category, use_bid).await
  }

  pub async fn rate(&self, user: &str, identifier: &str, rating: i64) -> Result<Song> {
    if !(0..MAX_RATING).contains(&rating) {
      return Err(MusicCatError::InvalidRating(rating).into());
    }
    let song = self.resolve(identifier).await?;
    self.ratings.upsert(user, &song.id, rating as u8).await?;
    info!("{} rated {} {}", user, song.id, rating);
    Ok(song)
  }

  pub async fn set_base_volume(&self, level: f64) -> CoreResult<()> {
    self.playback.set_base_volume(level).await
  }

  pub async fn set_song_volume(&self, identifier: &str, multiplier: f64) -> Result<Song> {
    if !multiplier.is_finite() || multiplier < 0.0 {
      return Err(MusicCatError::InvalidVolume(multiplier).into());
    }
    let song = self.resolve(identifier).await?;
    self.volumes.set(&song.id, multiplier).await?;
    info!("Volume multiplier for {} set to {}", song.id, multiplier);
    Ok(song)
  }

  /// `hours` may be fractional.
  pub async fn set_cooldown(&self, hours: &str) -> CoreResult<()> {
    let cooldown = parse_cooldown_hours(hours)?;
    self.playback.selectors().write().await.set_cooldown(cooldown);
    info!("Cooldown set to {} minutes", cooldown.num_minutes());
    Ok(())
  }

  pub async fn set_selector(&self, name: &str) -> CoreResult<SelectorKind> {
    let kind = name.parse::<SelectorKind>()?;
    self.playback.selectors().write().await.set_active(kind);
    Ok(kind)
  }

  /// Pass operator arguments to the active selector.
  pub async fn configure_selector<S: AsRef<str>>(&self, arguments: &[S]) -> CoreResult<()> {
    let mut selectors = self.playback.selectors().write().await;
    let kind = selectors.active_kind();
    selectors.get_mut(kind).configure(arguments)
  }

  pub async fn selector(&self) -> SelectorKind {
    self.playback.selectors().read().await.active_kind()
  }

  /// Rebuild the catalog from disk. Returns the ids that are new.
  pub async fn reload(&self) -> Result<Vec<SongId>> {
    let new_ids = self.catalog.reload().await?;
    self.seed_volumes(&new_ids).await;
    Ok(new_ids)
  }

  async fn seed_volumes(&self, ids: &[SongId]) {
    let default = self.playback.volume_settings().await.default_multiplier;
    for id in ids {
      match self.volumes.get(id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
          if let Err(e) = self.volumes.set(id, default).await {
            warn!("Failed to seed volume for {}: {:?}", id, e);
          }
        }
        Err(e) => warn!("Failed to read volume for {}: {:?}", id, e),
      }
    }
  }

  pub async fn count(&self, category: Option<Category>) -> usize {
    self.catalog.read().await.count(category)
  }

  pub async fn current_category(&self) -> Category {
    self.playback.current_category().await
  }

  pub async fn pause(&self) -> CoreResult<()> {
    self.playback.pause().await
  }

  pub async fn unpause(&self) -> CoreResult<bool> {
    self.playback.unpause().await
  }
}

pub fn my_git_hash() -> String {
  option_env!("VERGEN_GIT_SHA")
    .map(|x| x.chars().take(8).collect())
    .unwrap_or_else(|| "0".to_string())
}
