use std::{fs, path::Path, sync::Arc};

use clap::Parser;
use musiccat::{
  catalog::loader::load_catalog,
  playback::MemoryDevice,
  store::{MemoryLedger, MemoryRatingStore, MemoryVolumeStore, VolumeStore},
  types::{clock::system_clock, Category},
  AppOpts, AppServiceImpl, Collaborators,
};

const POKEMON: &str = r#"
id: pokemon_rby
title: Pokemon Red/Blue
platform: GB
year: 1996
series: Pokemon
songs:
  - id: trainer_battle
    title: Trainer Battle
    path: trainer.brstm
    type: battle
  - id: victory_trainer
    title: Victory! (Trainer)
    path: victory.brstm
    types: [result, break]
    ends: "1:05"
    tags: chill
"#;

const ZELDA: &str = r#"
id: zelda_lttp
title: The Legend of Zelda - A Link to the Past
platform: SNES
year: 1991
songs:
  - id: dark_world
    title: Dark World
    path: dark_world.brstm
    types: [break]
"#;

fn write(dir: &Path, relative: &str, text: &str) {
  let path = dir.join(relative);
  fs::create_dir_all(path.parent().unwrap()).unwrap();
  fs::write(path, text).unwrap();
}

fn opts_for(dir: &Path) -> AppOpts {
  AppOpts::parse_from([
    "musiccat",
    "--library-path",
    dir.to_str().unwrap(),
  ])
}

#[tokio::test]
async fn library_is_loaded_from_yaml() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "pokemon/rby.yaml", POKEMON);
  write(dir.path(), "zelda/lttp.yaml", ZELDA);

  let app = AppServiceImpl::new(opts_for(dir.path())).await.unwrap();
  assert_eq!(app.count(None).await, 3);
  assert_eq!(app.count(Some(Category::Break)).await, 2);
  assert_eq!(app.count(Some(Category::Warning)).await, 0);

  let victory = app.resolve("victory_trainer").await.unwrap();
  assert_eq!(victory.ends, Some(vec![65.0]));
  assert!(victory.has_tag("chill"));
  assert!(victory.fullpath.ends_with("pokemon/victory.brstm"));

  let results = app.search(&["dark", "world"], None, None).await;
  assert_eq!(results[0].0.id, "dark_world");
  assert!(app.search(&["dark"], None, Some("chill")).await.is_empty());
}

#[tokio::test]
async fn reload_picks_up_new_songs_and_seeds_their_volume() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "pokemon/rby.yaml", POKEMON);

  let opts = opts_for(dir.path());
  let catalog = load_catalog(&opts.load_options()).await.unwrap();
  let volumes = Arc::new(MemoryVolumeStore::new());
  let collaborators = Collaborators {
    volumes: volumes.clone(),
    ratings: Arc::new(MemoryRatingStore::new()),
    ledger: Arc::new(MemoryLedger::new()),
    device: Arc::new(MemoryDevice::new()),
    clock: system_clock(),
  };
  let app = AppServiceImpl::from_parts(opts, catalog, collaborators).unwrap();
  app.advance(Category::Battle, false).await.unwrap();
  volumes.set("trainer_battle", 0.8).await.unwrap();

  write(dir.path(), "zelda/lttp.yaml", ZELDA);
  let new_ids = app.reload().await.unwrap();
  assert_eq!(new_ids, vec!["dark_world".to_string()]);
  assert_eq!(app.count(None).await, 3);
  assert_eq!(volumes.get("dark_world").await.unwrap(), Some(0.5));
  assert_eq!(volumes.get("trainer_battle").await.unwrap(), Some(0.8));

  let catalog = app.catalog.read().await;
  assert!(catalog.get("trainer_battle").unwrap().last_played.is_some());
}

#[tokio::test]
async fn broken_files_are_skipped_unless_strict() {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "pokemon/rby.yaml", POKEMON);
  write(dir.path(), "broken/broken.yaml", "id: [this is not a game");

  let app = AppServiceImpl::new(opts_for(dir.path())).await.unwrap();
  assert_eq!(app.count(None).await, 2);

  let strict = AppOpts::parse_from([
    "musiccat",
    "--library-path",
    dir.path().to_str().unwrap(),
    "--strict",
  ]);
  assert!(AppServiceImpl::new(strict).await.is_err());
}
