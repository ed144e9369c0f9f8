use std::{
  collections::BTreeSet,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{anyhow, Context};
use log::{debug, error, warn};
use serde_derive::Deserialize;
use walkdir::WalkDir;

use crate::{
  catalog::Catalog,
  errors::MusicCatError,
  types::{Category, Game, Song},
  Result,
};

#[derive(Debug, Clone)]
pub struct LoadOptions {
  /// Directory searched recursively for `*.yaml` metadata files.
  pub library_path: PathBuf,
  /// Root the audio paths are resolved against. Defaults to `library_path`.
  pub songfile_path: Option<PathBuf>,
  /// Abort the whole load on the first integrity error instead of skipping the entry.
  pub strict: bool,
  /// Treat a song without an audio file on disk as an integrity error.
  pub require_audio_files: bool,
}

impl Default for LoadOptions {
  fn default() -> Self {
    LoadOptions {
      library_path: PathBuf::from("."),
      songfile_path: None,
      strict: false,
      require_audio_files: false,
    }
  }
}

// id: pokemon_rby
// title: Pokemon Red/Blue
// platform: GB
// year: 1996
// series: Pokemon        # optional
// is_fanwork: false      # optional
// songs:
//  - id: trainer_battle
//    title: Trainer Battle
//    path: trainer.brstm
//    type: battle         # or `types: [battle, result]`
//    ends: "1:30"         # optional, number, list or "m:ss"
//    tags: [chill]        # optional, string or list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetadataFile {
  One(GameEntry),
  Many(Vec<GameEntry>),
}

#[derive(Debug, Deserialize)]
struct GameEntry {
  id: String,
  title: String,
  platform: serde_yaml::Value,
  year: i32,
  #[serde(default)]
  series: Option<String>,
  #[serde(default)]
  is_fanwork: bool,
  songs: Vec<SongEntry>,
}

#[derive(Debug, Deserialize)]
struct SongEntry {
  id: String,
  title: String,
  path: String,
  #[serde(rename = "type", default)]
  single_type: Option<String>,
  #[serde(default)]
  types: Option<Vec<String>>,
  #[serde(default)]
  ends: Option<EndsField>,
  #[serde(default)]
  tags: Option<TagsField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EndsField {
  Seconds(f64),
  List(Vec<f64>),
  Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagsField {
  One(String),
  Many(Vec<String>),
}

/// Load every metadata file under `options.library_path` into a catalog.
pub async fn load_catalog(options: &LoadOptions) -> Result<Catalog> {
  let options = options.clone();
  tokio::task::spawn_blocking(move || load_catalog_blocking(&options))
    .await
    .map_err(|e| anyhow!("catalog loader panicked: {}", e))?
}

pub fn load_catalog_blocking(options: &LoadOptions) -> Result<Catalog> {
  let library_path = std::fs::canonicalize(&options.library_path).with_context(|| {
    format!(
      "library path {} is not accessible",
      options.library_path.display()
    )
  })?;
  let songfile_path = match &options.songfile_path {
    Some(path) => std::fs::canonicalize(path)
      .with_context(|| format!("songfile path {} is not accessible", path.display()))?,
    None => library_path.clone(),
  };
  debug!("Loading metadata from {}", library_path.display());

  let mut catalog = Catalog::new();
  let walker = WalkDir::new(&library_path)
    .follow_links(true)
    .sort_by_file_name();
  for entry in walker {
    let entry = match entry {
      Ok(entry) => entry,
      Err(e) => {
        warn!("Cannot access entry: {}", e);
        continue;
      }
    };
    let path = entry.path();
    let is_yaml = path
      .extension()
      .and_then(|s| s.to_str())
      .map(|ext| ext.eq_ignore_ascii_case("yaml"))
      .unwrap_or(false);
    if !entry.file_type().is_file() || !is_yaml {
      continue;
    }
    let relative = path.strip_prefix(&library_path).unwrap_or(path);
    if let Err(e) = import_metadata(&mut catalog, path, relative, &songfile_path, options) {
      if options.strict {
        return Err(e.context(format!("while loading {}", relative.display())));
      }
      error!("{:#} while loading file {}", e, relative.display());
    }
  }

  if catalog.is_empty() {
    warn!(
      "No metadata found! MusicCat isn't going to do very much. (Current music library location: {})",
      library_path.display()
    );
  }
  Ok(catalog)
}

fn import_metadata(
  catalog: &mut Catalog,
  path: &Path,
  relative: &Path,
  songfile_path: &Path,
  options: &LoadOptions,
) -> Result<()> {
  let text = std::fs::read_to_string(path)?;
  let games = match serde_yaml::from_str::<MetadataFile>(&text)? {
    MetadataFile::One(game) => vec![game],
    MetadataFile::Many(games) => games,
  };
  let song_dir = songfile_path.join(relative.parent().unwrap_or_else(|| Path::new("")));

  for entry in games {
    let game = Arc::new(Game {
      id: entry.id,
      title: entry.title,
      platform: yaml_scalar_to_string(&entry.platform),
      year: entry.year,
      series: entry.series,
      is_fanwork: entry.is_fanwork,
    });
    for raw in entry.songs {
      let song_id = raw.id.clone();
      let result = build_song(raw, &game, &song_dir, options).and_then(|song| {
        catalog.insert(song).map_err(|e| {
          if let MusicCatError::SongIdConflict {
            song_id,
            first_game,
            second_game,
          } = &e
          {
            if first_game == second_game {
              error!(
                "Songid conflict! {} exists twice in the same game, {}.",
                song_id, first_game
              );
            } else {
              error!(
                "Songid conflict! {} exists twice, once in {} and once in {}!",
                song_id, first_game, second_game
              );
            }
          }
          anyhow::Error::new(e)
        })
      });
      if let Err(e) = result {
        if options.strict {
          return Err(e);
        }
        warn!("Skipping song {} of {}: {:#}", song_id, game.id, e);
      }
    }
  }
  Ok(())
}

fn build_song(
  raw: SongEntry,
  game: &Arc<Game>,
  song_dir: &Path,
  options: &LoadOptions,
) -> Result<Song> {
  let type_names = match (raw.single_type, raw.types) {
    (Some(t), None) => vec![t],
    (None, Some(ts)) => ts,
    (Some(t), Some(mut ts)) => {
      ts.push(t);
      ts
    }
    (None, None) => vec![],
  };
  let types = type_names
    .iter()
    .map(|t| t.parse::<Category>())
    .collect::<std::result::Result<BTreeSet<_>, _>>()?;
  if types.is_empty() {
    return Err(anyhow!("song {} has no type", raw.id));
  }

  let fullpath = song_dir.join(&raw.path);
  if !fullpath.is_file() {
    error!(
      "Songid {} doesn't have an audio file at {}!",
      raw.id,
      fullpath.display()
    );
    if options.require_audio_files {
      return Err(anyhow!("missing audio file {}", fullpath.display()));
    }
  }

  let ends = raw.ends.map(parse_ends).transpose()?;
  if let Some(ends) = &ends {
    for end in ends.iter().filter(|end| **end < 10.0) {
      warn!(
        "Songid {} has an end of {}, which seems fishy (end times are in seconds, not minutes; did you mean {}?)",
        raw.id,
        end,
        (end * 60.0) as i64
      );
    }
  }

  let tags = raw.tags.map(|tags| match tags {
    TagsField::One(tag) => [tag].into_iter().collect(),
    TagsField::Many(tags) => tags.into_iter().collect(),
  });

  Ok(Song {
    id: raw.id,
    title: raw.title,
    path: raw.path,
    fullpath: fullpath.to_string_lossy().into_owned(),
    types,
    game: game.clone(),
    last_played: None,
    ends,
    tags,
  })
}

fn parse_ends(ends: EndsField) -> Result<Vec<f64>> {
  match ends {
    EndsField::Seconds(s) => Ok(vec![s]),
    EndsField::List(list) => Ok(list),
    EndsField::Text(text) => {
      // "minute:second", e.g. "2:30"
      let (minutes, seconds) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("unparseable end time {:?}", text))?;
      let minutes = minutes
        .trim()
        .parse::<u32>()
        .with_context(|| format!("unparseable end time {:?}", text))?;
      let seconds = seconds
        .trim()
        .parse::<u32>()
        .with_context(|| format!("unparseable end time {:?}", text))?;
      let total = minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(seconds))
        .ok_or_else(|| anyhow!("end time {:?} is out of range", text))?;
      Ok(vec![total as f64])
    }
  }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> String {
  match value {
    serde_yaml::Value::String(s) => s.clone(),
    serde_yaml::Value::Number(n) => n.to_string(),
    serde_yaml::Value::Bool(b) => b.to_string(),
    serde_yaml::Value::Null => String::new(),
    other => format!("{:?}", other),
  }
}
