use std::{collections::HashMap, sync::Arc};

use log::{debug, info};
use tokio::sync::Mutex;

use crate::{
  errors::{CoreResult, MusicCatError},
  rotation::CategoryRotation,
  types::{BidEntry, Category, Song, Tokens},
};

/// Per-category single-slot bidding.
///
/// Every category owns its own lock, so a bid for `battle` never waits on a drain of
/// `result`. The slot map itself is built once and never resized.
#[derive(Debug)]
pub struct AuctionServiceImpl {
  slots: HashMap<Category, Mutex<Option<BidEntry>>>,
  /// Bids that would land on `warning` go to `battle` instead.
  pub redirect_warning_bids: bool,
}

pub type AuctionService = Arc<AuctionServiceImpl>;

impl AuctionServiceImpl {
  pub fn new(redirect_warning_bids: bool) -> AuctionService {
    Arc::new(AuctionServiceImpl {
      slots: Category::ALL
        .iter()
        .map(|c| (*c, Mutex::new(None)))
        .collect(),
      redirect_warning_bids,
    })
  }

  fn slot(&self, category: Category) -> &Mutex<Option<BidEntry>> {
    // every category gets a slot in `new`
    &self.slots[&category]
  }

  /// Which category a bid placed right now competes for.
  pub fn next_category_for_bidding(&self, rotation: &CategoryRotation) -> Category {
    let next = rotation.next_after_current();
    if self.redirect_warning_bids && next == Category::Warning {
      Category::Battle
    } else {
      next
    }
  }

  /// Place a bid. The first bid in an empty slot wins outright; afterwards only a
  /// strictly higher bid from someone else replaces the live entry.
  pub async fn bid(
    &self,
    user: &str,
    song: &Song,
    tokens: Tokens,
    category: Category,
  ) -> CoreResult<BidEntry> {
    if !song.has_type(category) {
      return Err(MusicCatError::InvalidCategory {
        song_id: song.id.clone(),
        category,
      });
    }

    let mut slot = self.slot(category).lock().await;
    if let Some(live) = slot.as_ref() {
      if live.username == user {
        return Err(MusicCatError::SelfOutbid {
          user: user.to_string(),
          category,
        });
      }
      if tokens <= live.tokens {
        return Err(MusicCatError::InsufficientBid {
          tokens,
          current: live.tokens,
        });
      }
      info!(
        "{} outbid {} for {} with {} tokens on {} (was {})",
        user, live.username, category, tokens, song.id, live.tokens
      );
    } else {
      info!("{} autowins {} with {} on {}", user, category, tokens, song.id);
    }

    let entry = BidEntry {
      username: user.to_string(),
      song_id: song.id.clone(),
      tokens,
    };
    *slot = Some(entry.clone());
    Ok(entry)
  }

  /// Take the live entry out of the slot, if any.
  pub async fn drain(&self, category: Category) -> Option<BidEntry> {
    let entry = self.slot(category).lock().await.take();
    if let Some(entry) = &entry {
      debug!(
        "Drained {}: {} bid {} on {}",
        category, entry.username, entry.tokens, entry.song_id
      );
    }
    entry
  }

  pub async fn peek(&self, category: Category) -> Option<BidEntry> {
    self.slot(category).lock().await.clone()
  }

  /// Live entries, in rotation declaration order.
  pub async fn snapshot(&self) -> Vec<(Category, BidEntry)> {
    let mut out = vec![];
    for category in Category::ALL {
      if let Some(entry) = self.peek(category).await {
        out.push((category, entry));
      }
    }
    out
  }
}
