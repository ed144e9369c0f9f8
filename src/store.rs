use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
  types::{SongId, Tokens, UserId},
  Result,
};

/// Per-song volume multipliers.
#[async_trait]
pub trait VolumeStore: Send + Sync + std::fmt::Debug {
  async fn get(&self, song_id: &str) -> Result<Option<f64>>;
  async fn set(&self, song_id: &str, multiplier: f64) -> Result<()>;
}

/// Song ratings, one per (user, song).
#[async_trait]
pub trait RatingStore: Send + Sync + std::fmt::Debug {
  async fn upsert(&self, username: &str, song_id: &str, rating: u8) -> Result<()>;
}

/// Token balances, charged when a winning bid is played.
#[async_trait]
pub trait Ledger: Send + Sync + std::fmt::Debug {
  async fn debit(&self, username: &str, amount: Tokens) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryVolumeStore {
  multipliers: RwLock<HashMap<SongId, f64>>,
}

impl MemoryVolumeStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl VolumeStore for MemoryVolumeStore {
  async fn get(&self, song_id: &str) -> Result<Option<f64>> {
    Ok(self.multipliers.read().await.get(song_id).copied())
  }

  async fn set(&self, song_id: &str, multiplier: f64) -> Result<()> {
    self
      .multipliers
      .write()
      .await
      .insert(song_id.to_string(), multiplier);
    Ok(())
  }
}

#[derive(Debug, Default)]
pub struct MemoryRatingStore {
  ratings: RwLock<HashMap<(UserId, SongId), u8>>,
}

impl MemoryRatingStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn get(&self, username: &str, song_id: &str) -> Option<u8> {
    self
      .ratings
      .read()
      .await
      .get(&(username.to_string(), song_id.to_string()))
      .copied()
  }

  pub async fn len(&self) -> usize {
    self.ratings.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.ratings.read().await.is_empty()
  }
}

#[async_trait]
impl RatingStore for MemoryRatingStore {
  async fn upsert(&self, username: &str, song_id: &str, rating: u8) -> Result<()> {
    self
      .ratings
      .write()
      .await
      .insert((username.to_string(), song_id.to_string()), rating);
    Ok(())
  }
}

/// Balances kept in memory. Unknown users have no tokens.
#[derive(Debug, Default)]
pub struct MemoryLedger {
  balances: RwLock<HashMap<UserId, Tokens>>,
}

impl MemoryLedger {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn deposit(&self, username: &str, amount: Tokens) {
    *self
      .balances
      .write()
      .await
      .entry(username.to_string())
      .or_default() += amount;
  }

  pub async fn balance(&self, username: &str) -> Tokens {
    self
      .balances
      .read()
      .await
      .get(username)
      .copied()
      .unwrap_or_default()
  }
}

#[async_trait]
impl Ledger for MemoryLedger {
  async fn debit(&self, username: &str, amount: Tokens) -> Result<()> {
    let mut balances = self.balances.write().await;
    let balance = balances.entry(username.to_string()).or_default();
    if *balance < amount {
      return Err(anyhow!(
        "{} has {} tokens, can't debit {}",
        username,
        balance,
        amount
      ));
    }
    *balance -= amount;
    Ok(())
  }
}
