use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use async_trait::async_trait;
use chrono::Duration;
use clap::Parser;
use musiccat::{
  errors::{ErrorKind, MusicCatError},
  playback::device::DeviceCall,
  selector::SelectorKind,
  store::RatingStore,
  types::Category,
  AppOpts,
};

mod helpers;

use helpers::{game, harness, harness_with, now, song};

#[derive(Debug, Default)]
struct CountingRatings {
  calls: AtomicUsize,
}

#[async_trait]
impl RatingStore for CountingRatings {
  async fn upsert(&self, _username: &str, _song_id: &str, _rating: u8) -> musiccat::Result<()> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

fn core_error(err: &anyhow::Error) -> &MusicCatError {
  err.downcast_ref::<MusicCatError>().unwrap()
}

#[tokio::test]
async fn cooldown_leaves_one_eligible_song() {
  let g = game("pokemon_rby", "Pokemon Red");
  let mut s1 = song("s1", "Trainer Battle", &g, &[Category::Battle]);
  s1.last_played = Some(now() - Duration::hours(10));
  let mut s2 = song("s2", "Gym Leader", &g, &[Category::Battle]);
  s2.last_played = Some(now() - Duration::minutes(1));
  let h = harness(vec![s1, s2]);

  let played = h.app.advance(Category::Battle, false).await.unwrap();
  assert_eq!(played.id, "s1");
  assert_eq!(h.device.last_played().await.as_deref(), Some("/music/pokemon_rby/s1.brstm"));
  assert_eq!(h.app.current_category().await, Category::Battle);
  assert_eq!(
    h.app.catalog.read().await.get("s1").unwrap().last_played,
    Some(now())
  );
}

#[tokio::test]
async fn same_user_cannot_raise_their_own_bid() {
  let g = game("pokemon_rby", "Pokemon Red");
  let h = harness(vec![song("s1", "Trainer Battle", &g, &[Category::Battle])]);

  let (category, _) = h.app.bid("userA", "s1", 5).await.unwrap();
  assert_eq!(category, Category::Battle);
  let err = h.app.bid("userA", "s1", 10).await.unwrap_err();
  assert!(matches!(err, MusicCatError::SelfOutbid { .. }));
  assert_eq!(err.kind(), ErrorKind::AuctionRejected);

  let live = h.app.auction.peek(Category::Battle).await.unwrap();
  assert_eq!(
    (live.username.as_str(), live.song_id.as_str(), live.tokens),
    ("userA", "s1", 5)
  );
}

#[tokio::test]
async fn only_a_higher_bid_takes_over() {
  let g = game("pokemon_rby", "Pokemon Red");
  let h = harness(vec![song("s1", "Trainer Battle", &g, &[Category::Battle])]);

  h.app.bid("userA", "s1", 5).await.unwrap();
  assert!(matches!(
    h.app.bid("userB", "s1", 3).await,
    Err(MusicCatError::InsufficientBid {
      tokens: 3,
      current: 5
    })
  ));
  h.app.bid("userB", "s1", 6).await.unwrap();

  let live = h.app.auction.peek(Category::Battle).await.unwrap();
  assert_eq!((live.username.as_str(), live.tokens), ("userB", 6));
}

#[tokio::test]
async fn typos_are_autocorrected_or_suggested() {
  let g = game("pokemon_rby", "Pokemon Red");
  let h = harness(vec![song("pkmn-battle", "Trainer Battle", &g, &[Category::Battle])]);
  assert_eq!(h.app.resolve("pkmn-battl").await.unwrap().id, "pkmn-battle");

  let h = harness(vec![song("pokemon-battle", "Trainer Battle", &g, &[Category::Battle])]);
  match h.app.resolve("pkmn-battl").await {
    Err(MusicCatError::BadMatch {
      best_candidate,
      ratio,
      ..
    }) => {
      assert_eq!(best_candidate, "pokemon-battle");
      assert!((0.75..0.92).contains(&ratio));
    }
    other => panic!("expected BadMatch, got {:?}", other),
  }
  assert!(matches!(
    h.app.resolve("zzzzzz").await,
    Err(MusicCatError::NoMatch(_))
  ));
}

#[tokio::test]
async fn exact_ids_resolve_to_themselves() {
  let g = game("pokemon_rby", "Pokemon Red");
  let z = game("zelda_lttp", "Zelda");
  let h = harness(vec![
    song("trainer", "Trainer Battle", &g, &[Category::Battle]),
    song("trainer2", "Trainer Battle 2", &g, &[Category::Battle]),
    song("dark_world", "Dark World", &z, &[Category::Break]),
  ]);
  for id in ["trainer", "trainer2", "dark_world"] {
    assert_eq!(h.app.resolve(id).await.unwrap().id, id);
  }
  assert_eq!(h.app.resolve("zelda_lttp-dark_world").await.unwrap().id, "dark_world");
}

#[tokio::test]
async fn winning_bid_is_played_and_charged() {
  let g = game("pokemon_rby", "Pokemon Red");
  let mut s2 = song("s2", "Gym Leader", &g, &[Category::Battle]);
  s2.last_played = Some(now() - Duration::minutes(1));
  let h = harness(vec![song("s1", "Trainer Battle", &g, &[Category::Battle]), s2]);
  h.ledger.deposit("userA", 10).await;

  h.app.bid("userA", "s2", 6).await.unwrap();
  let played = h.app.advance(Category::Battle, true).await.unwrap();
  assert_eq!(played.id, "s2");
  assert_eq!(h.ledger.balance("userA").await, 4);
  assert!(h.app.auction.drain(Category::Battle).await.is_none());
}

#[tokio::test]
async fn ledger_failure_does_not_stop_playback() {
  let g = game("pokemon_rby", "Pokemon Red");
  let h = harness(vec![song("s1", "Trainer Battle", &g, &[Category::Battle])]);

  // userA has no balance, so the debit fails
  h.app.bid("userA", "s1", 6).await.unwrap();
  let played = h.app.advance(Category::Battle, true).await.unwrap();
  assert_eq!(played.id, "s1");
  assert_eq!(h.ledger.balance("userA").await, 0);
  assert!(h.app.auction.peek(Category::Battle).await.is_none());
}

#[tokio::test]
async fn drained_bid_is_gone() {
  let g = game("pokemon_rby", "Pokemon Red");
  let h = harness(vec![song("s1", "Trainer Battle", &g, &[Category::Battle])]);
  h.app.bid("userA", "s1", 1).await.unwrap();
  assert!(h.app.auction.drain(Category::Battle).await.is_some());
  assert!(h.app.auction.drain(Category::Battle).await.is_none());
}

#[tokio::test]
async fn empty_category_falls_back_to_any_song() {
  let z = game("zelda_lttp", "Zelda");
  let h = harness(vec![song("dark_world", "Dark World", &z, &[Category::Break])]);
  let played = h.app.advance(Category::Battle, true).await.unwrap();
  assert_eq!(played.id, "dark_world");
  assert_eq!(h.app.current_category().await, Category::Battle);
}

#[tokio::test]
async fn bids_follow_the_rotation() {
  let g = game("pokemon_rby", "Pokemon Red");
  let h = harness(vec![song("s1", "Trainer Battle", &g, &[Category::Battle])]);
  h.app.advance(Category::Battle, false).await.unwrap();
  match h.app.bid("userA", "s1", 1).await {
    Err(MusicCatError::InvalidCategory { category, .. }) => assert_eq!(category, Category::Result),
    other => panic!("expected InvalidCategory, got {:?}", other),
  }
}

#[tokio::test]
async fn warning_bids_stay_on_warning_when_redirect_is_off() {
  let g = game("pokemon_rby", "Pokemon Red");
  let opts = AppOpts::parse_from(["musiccat", "--redirect-warning-bids", "false"]);
  let h = harness_with(
    opts,
    vec![song("s1", "Wild Encounter", &g, &[Category::Warning])],
    None,
    None,
  );
  let (category, _) = h.app.bid("userA", "s1", 1).await.unwrap();
  assert_eq!(category, Category::Warning);
}

#[tokio::test]
async fn rating_is_range_checked_before_the_store() {
  let g = game("pokemon_rby", "Pokemon Red");
  let ratings = Arc::new(CountingRatings::default());
  let h = harness_with(
    AppOpts::default(),
    vec![song("s1", "Trainer Battle", &g, &[Category::Battle])],
    Some(ratings.clone()),
    None,
  );

  for rating in [-1, 5, 100] {
    let err = h.app.rate("userA", "s1", rating).await.unwrap_err();
    assert!(matches!(core_error(&err), MusicCatError::InvalidRating(_)));
  }
  assert_eq!(ratings.calls.load(Ordering::SeqCst), 0);

  h.app.rate("userA", "s1", 4).await.unwrap();
  h.app.rate("userA", "s1", 0).await.unwrap();
  assert_eq!(ratings.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ratings_land_in_the_store() {
  let g = game("pokemon_rby", "Pokemon Red");
  let h = harness(vec![song("s1", "Trainer Battle", &g, &[Category::Battle])]);
  h.app.rate("userA", "s1", 3).await.unwrap();
  assert_eq!(h.ratings.get("userA", "s1").await, Some(3));
}

#[tokio::test]
async fn volume_is_scaled_and_clamped() {
  let g = game("pokemon_rby", "Pokemon Red");
  let h = harness(vec![song("s1", "Trainer Battle", &g, &[Category::Battle])]);

  h.app.set_base_volume(100.0).await.unwrap();
  h.app.advance(Category::Battle, false).await.unwrap();
  assert_eq!(h.device.last_volume().await, Some(50));

  h.app.set_song_volume("s1", 3.0).await.unwrap();
  h.app.advance(Category::Battle, false).await.unwrap();
  assert_eq!(h.device.last_volume().await, Some(255));

  let err = h.app.set_song_volume("s1", -1.0).await.unwrap_err();
  assert!(matches!(core_error(&err), MusicCatError::InvalidVolume(_)));
  assert!(h.app.set_base_volume(256.0).await.is_err());

  let calls = h.device.calls().await;
  assert_eq!(
    &calls[..5],
    &[
      DeviceCall::SetVolume(100),
      DeviceCall::Stop,
      DeviceCall::ClearQueue,
      DeviceCall::SetVolume(50),
      DeviceCall::Play("/music/pokemon_rby/s1.brstm".to_string()),
    ]
  );
}

#[tokio::test]
async fn selectors_can_be_switched_and_configured() {
  let g = game("pokemon_rby", "Pokemon Red");
  let z = game("zelda_lttp", "Zelda");
  let h = harness(vec![
    song("trainer", "Trainer Battle", &g, &[Category::Battle, Category::Betting]),
    song("ganon", "Ganon", &z, &[Category::Battle, Category::Betting]),
  ]);

  assert_eq!(h.app.set_selector("game").await.unwrap(), SelectorKind::GameRestricted);
  h.app.configure_selector(&["add", "zelda_lttp"]).await.unwrap();
  for _ in 0..5 {
    assert_eq!(h.app.advance(Category::Battle, false).await.unwrap().id, "ganon");
  }

  h.app.set_selector("fixed").await.unwrap();
  h.app.configure_selector(&["song", "trainer"]).await.unwrap();
  assert_eq!(h.app.advance(Category::Betting, false).await.unwrap().id, "trainer");

  assert!(h.app.set_selector("shuffle").await.is_err());
  assert_eq!(h.app.selector().await, SelectorKind::FixedSong);
  assert!(h.app.configure_selector(&["time_before_replay", "2"]).await.is_err());
}

#[tokio::test]
async fn cooldown_can_be_changed_at_runtime() {
  let g = game("pokemon_rby", "Pokemon Red");
  let mut s1 = song("s1", "Trainer Battle", &g, &[Category::Battle]);
  s1.last_played = Some(now() - Duration::hours(3));
  let mut s2 = song("s2", "Gym Leader", &g, &[Category::Battle]);
  s2.last_played = Some(now() - Duration::hours(1));
  let h = harness(vec![s1, s2]);

  h.app.set_cooldown("2").await.unwrap();
  assert_eq!(h.app.advance(Category::Battle, false).await.unwrap().id, "s1");

  let err = h.app.set_cooldown("a while").await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn categories_advance_in_parallel() {
  let g = game("pokemon_rby", "Pokemon Red");
  let h = harness(vec![
    song("s1", "Trainer Battle", &g, &[Category::Battle]),
    song("s2", "Victory", &g, &[Category::Result]),
    song("s3", "Pokecenter", &g, &[Category::Break]),
  ]);
  let handles = [Category::Battle, Category::Result, Category::Break]
    .into_iter()
    .map(|category| {
      let app = h.app.clone();
      tokio::spawn(async move { app.advance(category, true).await.map(|s| (category, s.id)) })
    })
    .collect::<Vec<_>>();
  for handle in handles {
    let (category, id) = handle.await.unwrap().unwrap();
    let expected = match category {
      Category::Battle => "s1",
      Category::Result => "s2",
      _ => "s3",
    };
    assert_eq!(id, expected);
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_advances_charge_a_bid_once() {
  let g = game("pokemon_rby", "Pokemon Red");
  let h = harness(vec![
    song("s1", "Trainer Battle", &g, &[Category::Battle]),
    song("s2", "Gym Leader", &g, &[Category::Battle]),
  ]);
  h.ledger.deposit("userA", 100).await;
  h.app.bid("userA", "s2", 7).await.unwrap();

  let handles = (0..8)
    .map(|_| {
      let app = h.app.clone();
      tokio::spawn(async move { app.advance(Category::Battle, true).await.map(|s| s.id) })
    })
    .collect::<Vec<_>>();
  let mut played = Vec::new();
  for handle in handles {
    played.push(handle.await.unwrap().unwrap());
  }

  assert_eq!(h.ledger.balance("userA").await, 93);
  assert!(played.contains(&"s2".to_string()));
  assert!(h.app.auction.peek(Category::Battle).await.is_none());
}

#[tokio::test]
async fn pause_and_unpause_reach_the_device() {
  let h = harness(vec![]);
  assert!(!h.app.unpause().await.unwrap());
  h.app.pause().await.unwrap();
  assert!(h.app.unpause().await.unwrap());
  assert_eq!(h.device.calls().await, vec![DeviceCall::Pause, DeviceCall::Resume]);
}
