use clap::{Parser, Subcommand};
use log::{error, info, warn};
use musiccat::{
  errors::MusicCatError,
  types::{Category, Song},
  AppOpts, AppService, AppServiceImpl,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const SEARCH_RESULTS_SHOWN: usize = 5;

#[derive(Debug, Parser)]
#[clap(name = "musiccat", version)]
struct Cli {
  #[clap(flatten)]
  opts: AppOpts,
  #[clap(subcommand)]
  command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
  /// Number of songs, optionally only those playable in one category.
  Count { category: Option<Category> },
  /// Play a single song until interrupted.
  Play {
    id: String,
    /// Base volume for this song, 0.0 to 1.0.
    #[clap(long)]
    volume: Option<f64>,
  },
  Search {
    #[clap(required = true)]
    keywords: Vec<String>,
    #[clap(long)]
    tag: Option<String>,
    #[clap(long)]
    cutoff: Option<f64>,
  },
  Resolve { id: String },
  /// Read chat-style commands from stdin. Volume, pause and unpause live here,
  /// since they act on the player this process owns.
  Console,
}

#[tokio::main]
async fn main() -> musiccat::Result<()> {
  match dotenvy::dotenv() {
    Err(e) => warn!("dotenv(): failed to load .env file: {}", e),
    _ => {}
  }

  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let cli = Cli::parse();
  info!("MusicCat: starting, version {}", musiccat::my_git_hash());
  info!("library path: {}", cli.opts.library_path.display());

  let app = AppServiceImpl::new(cli.opts.clone()).await?;

  match cli.command {
    Command::Count { category } => {
      println!("{}", app.count(category).await);
    }
    Command::Play { id, volume } => {
      if let Some(level) = volume {
        app.set_base_volume(unit_to_device(level)?).await?;
      }
      let song = app.resolve(&id).await?;
      app.playback.play_now(&song).await?;
      println!("Playing {}, Ctrl-C to stop", song);
      tokio::signal::ctrl_c().await?;
    }
    Command::Search {
      keywords,
      tag,
      cutoff,
    } => print_search(&app, &keywords, cutoff, tag.as_deref()).await,
    Command::Resolve { id } => {
      let song = app.resolve(&id).await?;
      println!("{}: {}", song.id, song.fullpath);
    }
    Command::Console => console(app).await?,
  }
  Ok(())
}

fn unit_to_device(level: f64) -> Result<f64, MusicCatError> {
  if !(0.0..=1.0).contains(&level) {
    return Err(MusicCatError::InvalidVolume(level));
  }
  Ok(level * 255.0)
}

fn describe(song: &Song) -> String {
  format!("{} ({}): {}", song.id, song.game.title, song.title)
}

async fn print_search(app: &AppService, keywords: &[String], cutoff: Option<f64>, tag: Option<&str>) {
  let results = app.search(keywords, cutoff, tag).await;
  if results.is_empty() {
    println!("No songs found.");
    return;
  }
  for (song, score) in results.iter().take(SEARCH_RESULTS_SHOWN) {
    println!("{} [{:.0}%]", describe(song), score * 100.0);
  }
  if results.len() > SEARCH_RESULTS_SHOWN {
    println!("...and {} more", results.len() - SEARCH_RESULTS_SHOWN);
  }
}

async fn console(app: AppService) -> musiccat::Result<()> {
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  while let Some(line) = lines.next_line().await? {
    let words = line.split_whitespace().collect::<Vec<_>>();
    match words.as_slice() {
      [] => continue,
      ["quit"] | ["exit"] => break,
      [command, args @ ..] => {
        if let Err(e) = run_command(&app, command, args).await {
          report(&e);
        }
      }
    }
  }
  Ok(())
}

/// Ask-again failures are just told to the user; the rest are logged too.
fn report(e: &anyhow::Error) {
  if let Some(core) = e.downcast_ref::<MusicCatError>() {
    if !core.is_recoverable() {
      error!("{:?} error: {:#}", core.kind(), e);
    }
  }
  println!("{:#}", e);
}

async fn run_command(app: &AppService, command: &str, args: &[&str]) -> musiccat::Result<()> {
  match (command, args) {
    ("bid", [user, id, tokens]) => {
      let (category, entry) = app.bid(user, id, tokens.parse()?).await?;
      println!(
        "{} leads {} with {} tokens on {}",
        entry.username, category, entry.tokens, entry.song_id
      );
    }
    ("advance", rest) => {
      let use_bid = !rest.contains(&"nobid");
      let category = match rest.iter().find(|a| **a != "nobid") {
        Some(name) => name.parse::<Category>()?,
        None => app.playback.rotation().await.next_after_current(),
      };
      let song = app.advance(category, use_bid).await?;
      println!("Now playing {} [{}]", describe(&song), category);
    }
    ("rate", [user, id, rating]) => {
      let song = app.rate(user, id, rating.parse()?).await?;
      println!("{} rated {} {}", user, song.id, rating);
    }
    ("volume", [level]) => {
      app.set_base_volume(unit_to_device(level.parse()?)?).await?;
      println!("Volume set to {}", level);
    }
    ("songvolume", [id, multiplier]) => {
      let song = app.set_song_volume(id, multiplier.parse()?).await?;
      println!("Volume for {} set to {}", song.id, multiplier);
    }
    ("cooldown", [hours]) => {
      app.set_cooldown(hours).await?;
      println!("Cooldown set to {} hours", hours);
    }
    ("selector", []) => println!("Selector is {}", app.selector().await),
    ("selector", [name]) => println!("Selector set to {}", app.set_selector(name).await?),
    ("configure", args) if !args.is_empty() => {
      app.configure_selector(args).await?;
      println!("Selector {} configured", app.selector().await);
    }
    ("current", []) => println!("Current category: {}", app.current_category().await),
    ("bids", []) => {
      for (category, entry) in app.auction.snapshot().await {
        println!(
          "{}: {} bid {} on {}",
          category, entry.username, entry.tokens, entry.song_id
        );
      }
    }
    ("pause", []) => {
      app.pause().await?;
      println!("Paused");
    }
    ("unpause", []) => match app.unpause().await? {
      true => println!("Resumed"),
      false => println!("Not paused"),
    },
    ("search", keywords) if !keywords.is_empty() => {
      let keywords = keywords.iter().map(|k| k.to_string()).collect::<Vec<_>>();
      print_search(app, &keywords, None, None).await
    }
    ("resolve", [id]) => println!("{}", describe(&app.resolve(id).await?)),
    ("count", []) => println!("{}", app.count(None).await),
    ("count", [category]) => println!("{}", app.count(Some(category.parse()?)).await),
    ("reload", []) => {
      let new_ids = app.reload().await?;
      println!("Reloaded, {} new songs", new_ids.len());
    }
    _ => println!("Unknown command or wrong arguments: {} {}", command, args.join(" ")),
  }
  Ok(())
}
