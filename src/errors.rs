use thiserror::Error;

use crate::types::{Category, GameId, SongId, Tokens, UserId};

/// Broad classes of failure, so front-ends can pick a message without matching every variant.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
  NotFound,
  LowConfidenceMatch,
  InvalidCategory,
  AuctionRejected,
  NoEligibleSong,
  InvalidArgument,
  Configuration,
  Device,
}

/// Core errors
#[derive(Error, Debug)]
pub enum MusicCatError {
  #[error("Song ID {0} not found.")]
  NoMatch(SongId),

  /// Carries the closest candidate so the caller can ask "did you mean ...?"
  #[error("Song ID {song_id} not found. Did you mean {best_candidate}? ({:.0}% match)", .ratio * 100.0)]
  BadMatch {
    song_id: SongId,
    best_candidate: SongId,
    ratio: f64,
  },

  #[error("Song {song_id} can't be played during {category}.")]
  InvalidCategory { song_id: SongId, category: Category },

  #[error("{user} already holds the highest bid for {category}.")]
  SelfOutbid { user: UserId, category: Category },

  #[error("A bid of {tokens} doesn't beat the current bid of {current}.")]
  InsufficientBid { tokens: Tokens, current: Tokens },

  #[error("No matching song found for {0}.")]
  NoMatchingSong(Category),

  #[error("Unknown category {0:?}.")]
  UnknownCategory(String),

  #[error("Rating {0} out of range, expected 0 to 4.")]
  InvalidRating(i64),

  #[error("Volume {0} out of range.")]
  InvalidVolume(f64),

  #[error("Song ID {song_id} already in use (games {first_game} and {second_game}).")]
  SongIdConflict {
    song_id: SongId,
    first_game: GameId,
    second_game: GameId,
  },

  #[error("Configuration error: {0}")]
  Configuration(String),

  #[error("Playback device error: {0}")]
  Device(#[source] anyhow::Error),
}

impl MusicCatError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      MusicCatError::NoMatch(_) => ErrorKind::NotFound,
      MusicCatError::BadMatch { .. } => ErrorKind::LowConfidenceMatch,
      MusicCatError::InvalidCategory { .. } => ErrorKind::InvalidCategory,
      MusicCatError::SelfOutbid { .. } | MusicCatError::InsufficientBid { .. } => {
        ErrorKind::AuctionRejected
      }
      MusicCatError::NoMatchingSong(_) => ErrorKind::NoEligibleSong,
      MusicCatError::UnknownCategory(_)
      | MusicCatError::InvalidRating(_)
      | MusicCatError::InvalidVolume(_) => ErrorKind::InvalidArgument,
      MusicCatError::SongIdConflict { .. } | MusicCatError::Configuration(_) => {
        ErrorKind::Configuration
      }
      MusicCatError::Device(_) => ErrorKind::Device,
    }
  }

  /// Whether the caller can simply ask the user again.
  pub fn is_recoverable(&self) -> bool {
    !matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Device)
  }
}

pub type CoreResult<T> = std::result::Result<T, MusicCatError>;
