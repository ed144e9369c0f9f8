use anyhow::anyhow;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::{process::Child, sync::Mutex};

use crate::Result;

/// The thing that actually makes noise.
#[async_trait]
pub trait PlaybackDevice: Send + Sync + std::fmt::Debug {
  async fn stop(&self) -> Result<()>;
  async fn clear_queue(&self) -> Result<()>;
  async fn play(&self, path: &str) -> Result<()>;
  /// `level` is the device scale, 0 to 255.
  async fn set_volume(&self, level: u8) -> Result<()>;

  async fn pause(&self) -> Result<()> {
    Err(anyhow!("this playback device can't pause"))
  }

  async fn resume(&self) -> Result<()> {
    Err(anyhow!("this playback device can't resume"))
  }
}

/// Plays each song by launching `<program> [args...]`, killing the previous process
/// on `stop`.
///
/// `args` are templates: `{file}` is replaced by the song path (appended at the end when
/// no argument mentions it), `{volume}` by the device volume (0 to 255) and
/// `{volume_pct}` by the same volume as a percentage. A volume change reaches the
/// player when the next song starts.
#[derive(Debug)]
pub struct ProcessPlayer {
  program: String,
  args: Vec<String>,
  child: Mutex<Option<Child>>,
  volume: Mutex<u8>,
}

impl ProcessPlayer {
  pub fn new(program: String, args: Vec<String>) -> Self {
    ProcessPlayer {
      program,
      args,
      child: Mutex::new(None),
      volume: Mutex::new(u8::MAX),
    }
  }

  pub async fn volume(&self) -> u8 {
    *self.volume.lock().await
  }

  /// The argument list for playing `path` at `volume`.
  pub fn command_args(&self, path: &str, volume: u8) -> Vec<String> {
    let pct = ((volume as f64) * 100.0 / 255.0).round() as u32;
    let mut args = self
      .args
      .iter()
      .map(|arg| {
        arg
          .replace("{file}", path)
          .replace("{volume_pct}", &pct.to_string())
          .replace("{volume}", &volume.to_string())
      })
      .collect::<Vec<_>>();
    if !self.args.iter().any(|arg| arg.contains("{file}")) {
      args.push(path.to_string());
    }
    args
  }

  #[cfg(unix)]
  async fn signal(&self, signal: libc::c_int) -> Result<()> {
    let child = self.child.lock().await;
    let pid = child
      .as_ref()
      .and_then(|c| c.id())
      .ok_or_else(|| anyhow!("nothing is playing"))?;
    // SAFETY: plain kill(2) on a pid we spawned and still hold.
    if unsafe { libc::kill(pid as libc::pid_t, signal) } != 0 {
      return Err(anyhow!(
        "failed to signal player process {}: {}",
        pid,
        std::io::Error::last_os_error()
      ));
    }
    Ok(())
  }
}

#[async_trait]
impl PlaybackDevice for ProcessPlayer {
  async fn stop(&self) -> Result<()> {
    let mut child = self.child.lock().await;
    if let Some(mut running) = child.take() {
      if let Err(e) = running.start_kill() {
        // already exited on its own
        debug!("stop: player process was gone: {}", e);
      }
      let _ = running.wait().await;
    }
    Ok(())
  }

  async fn clear_queue(&self) -> Result<()> {
    Ok(())
  }

  async fn play(&self, path: &str) -> Result<()> {
    let mut child = self.child.lock().await;
    let args = self.command_args(path, *self.volume.lock().await);
    let spawned = tokio::process::Command::new(&self.program)
      .args(&args)
      .kill_on_drop(true)
      .spawn()
      .map_err(|e| anyhow!("failed to launch {}: {}", self.program, e))?;
    info!("Launched {} {:?} (pid {:?})", self.program, args, spawned.id());
    if let Some(mut previous) = child.replace(spawned) {
      warn!("play: previous player process still attached, killing it");
      let _ = previous.start_kill();
    }
    Ok(())
  }

  async fn set_volume(&self, level: u8) -> Result<()> {
    *self.volume.lock().await = level;
    debug!("Player volume set to {}", level);
    Ok(())
  }

  #[cfg(unix)]
  async fn pause(&self) -> Result<()> {
    self.signal(libc::SIGSTOP).await
  }

  #[cfg(unix)]
  async fn resume(&self) -> Result<()> {
    self.signal(libc::SIGCONT).await
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
  Stop,
  ClearQueue,
  Play(String),
  SetVolume(u8),
  Pause,
  Resume,
}

/// Records every call instead of playing anything. Used for dry runs.
#[derive(Debug, Default)]
pub struct MemoryDevice {
  calls: Mutex<Vec<DeviceCall>>,
  fail_play: bool,
}

impl MemoryDevice {
  pub fn new() -> Self {
    Self::default()
  }

  /// A device whose `play` always errors.
  pub fn broken() -> Self {
    MemoryDevice {
      calls: Default::default(),
      fail_play: true,
    }
  }

  pub async fn calls(&self) -> Vec<DeviceCall> {
    self.calls.lock().await.clone()
  }

  pub async fn last_played(&self) -> Option<String> {
    self.calls.lock().await.iter().rev().find_map(|c| match c {
      DeviceCall::Play(path) => Some(path.clone()),
      _ => None,
    })
  }

  pub async fn last_volume(&self) -> Option<u8> {
    self.calls.lock().await.iter().rev().find_map(|c| match c {
      DeviceCall::SetVolume(level) => Some(*level),
      _ => None,
    })
  }

  async fn record(&self, call: DeviceCall) {
    self.calls.lock().await.push(call);
  }
}

#[async_trait]
impl PlaybackDevice for MemoryDevice {
  async fn stop(&self) -> Result<()> {
    self.record(DeviceCall::Stop).await;
    Ok(())
  }

  async fn clear_queue(&self) -> Result<()> {
    self.record(DeviceCall::ClearQueue).await;
    Ok(())
  }

  async fn play(&self, path: &str) -> Result<()> {
    if self.fail_play {
      return Err(anyhow!("device unavailable"));
    }
    self.record(DeviceCall::Play(path.to_string())).await;
    Ok(())
  }

  async fn set_volume(&self, level: u8) -> Result<()> {
    self.record(DeviceCall::SetVolume(level)).await;
    Ok(())
  }

  async fn pause(&self) -> Result<()> {
    self.record(DeviceCall::Pause).await;
    Ok(())
  }

  async fn resume(&self) -> Result<()> {
    self.record(DeviceCall::Resume).await;
    Ok(())
  }
}
