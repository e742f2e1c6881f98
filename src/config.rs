use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::{debug, info};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
    sync::mpsc::{Receiver, channel},
};

use crate::input::Handedness;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    #[serde(default)]
    pub allow_commands: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub dominant_hand: Handedness,
    pub screen_width: u32,
    pub screen_height: u32,
    pub camera_width: u32,
    pub camera_height: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dominant_hand: Handedness::Right,
            screen_width: 1920,
            screen_height: 1080,
            camera_width: 1280,
            camera_height: 720,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Controls {
    pub scroll_steps: i32,
    pub level_divisor: f32,
    pub initial_volume: f32,
    pub initial_brightness: f32,
    pub key_cooldown_ms: u64,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            scroll_steps: 1,
            level_divisor: 50.0,
            initial_volume: 0.5,
            initial_brightness: 0.5,
            key_cooldown_ms: 500,
        }
    }
}

/// External command templates; `{percent}` and `{level}` are substituted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Commands {
    pub volume: Option<String>,
    pub brightness: Option<String>,
}

impl Commands {
    fn templates(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [("volume", &self.volume), ("brightness", &self.brightness)]
            .into_iter()
            .filter_map(|(k, v)| v.as_deref().map(|t| (k, t)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub controls: Controls,
    #[serde(default)]
    pub commands: Commands,
}

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub fn home_dir() -> Result<PathBuf> {
    UserDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or_else(|| anyhow!("cannot determine home directory"))
}

fn config_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".config").join("handctl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir()?;
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;
        info!(
            "loaded profile '{active_name}' ({})",
            profile.meta.name.as_deref().unwrap_or("unnamed")
        );

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn active_path(&self) -> PathBuf {
        self.profiles_dir.join(format!("{}.toml", self.active_name))
    }

    /// Re-read the active profile; the previous one stays on error.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        let commands: serde_json::Map<String, serde_json::Value> = self
            .profile
            .commands
            .templates()
            .map(|(k, t)| {
                let program = t.split_whitespace().next().unwrap_or("");
                (
                    k.to_string(),
                    serde_json::json!({
                        "template": t,
                        "found_in_path": find_in_path(program).is_some(),
                    }),
                )
            })
            .collect();
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "config_dir": self.config_dir,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "commands": commands,
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
            }
        })
    }
}

/// Filesystem watch over the profiles directory, polled from the control loop.
pub struct ProfileWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
}

impl ProfileWatcher {
    pub fn new(dir: &Path) -> Result<Self> {
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(tx)?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        debug!("watching {}", dir.display());
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Drain pending events; true if any of them wrote to `file`.
    pub fn touched(&self, file: &Path) -> bool {
        let mut hit = false;
        while let Ok(res) = self.rx.try_recv() {
            let Ok(ev) = res else { continue };
            if matches!(ev.kind, EventKind::Access(_)) {
                continue;
            }
            if ev.paths.iter().any(|p| p.file_name() == file.file_name()) {
                hit = true;
            }
        }
        hit
    }
}

fn load_profile(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    parse_profile(&txt).map_err(|e| anyhow!("{}: {e}", path.display()))
}

pub fn parse_profile(txt: &str) -> Result<Profile> {
    let profile: Profile = toml::from_str(txt).map_err(|e| anyhow!("failed to parse: {e}"))?;
    validate_profile(&profile)?;
    Ok(profile)
}

/// The embedded default profile, parsed. Tests build engines from it.
#[cfg(test)]
pub fn default_profile() -> Result<Profile> {
    parse_profile(default_profile_text())
}

fn validate_profile(p: &Profile) -> Result<()> {
    let e = &p.engine;
    if e.screen_width == 0 || e.screen_height == 0 {
        return Err(anyhow!("engine.screen_width/height must be positive"));
    }
    if e.camera_width == 0 || e.camera_height == 0 {
        return Err(anyhow!("engine.camera_width/height must be positive"));
    }

    let c = &p.controls;
    if c.scroll_steps == 0 {
        return Err(anyhow!("controls.scroll_steps must be non-zero"));
    }
    if c.level_divisor <= 0.0 {
        return Err(anyhow!("controls.level_divisor must be positive"));
    }
    for (k, v) in [
        ("initial_volume", c.initial_volume),
        ("initial_brightness", c.initial_brightness),
    ] {
        if !(0.0..=1.0).contains(&v) {
            return Err(anyhow!("controls.{k} must be in [0,1], got {v}"));
        }
    }

    for (k, t) in p.commands.templates() {
        if t.trim().is_empty() {
            return Err(anyhow!("commands.{k} is empty"));
        }
        if !p.meta.allow_commands {
            return Err(anyhow!("commands.{k} is set but allow_commands=false"));
        }
    }
    Ok(())
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// Whether the current user is listed in the `input` group.
fn check_in_input_group() -> bool {
    let Ok(groups) = fs::read_to_string("/etc/group") else {
        return false;
    };
    let user = whoami::username();
    groups
        .lines()
        .filter(|l| l.starts_with("input:"))
        .filter_map(|l| l.split(':').nth(3))
        .any(|members| members.split(',').any(|u| u == user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_parses() {
        let p = default_profile().unwrap();
        assert_eq!(p.meta.name.as_deref(), Some("default"));
        assert_eq!(p.engine.dominant_hand, Handedness::Right);
        assert_eq!(p.controls.key_cooldown_ms, 500);
        assert!(p.commands.volume.is_some());
    }

    #[test]
    fn test_sections_are_optional() {
        let p = parse_profile("[meta]\nname = \"bare\"\n").unwrap();
        assert_eq!(p.engine.screen_width, 1920);
        assert_eq!(p.controls.scroll_steps, 1);
        assert!(p.commands.volume.is_none());
    }

    #[test]
    fn test_left_dominant() {
        let p = parse_profile("[meta]\n[engine]\ndominant_hand = \"left\"\n").unwrap();
        assert_eq!(p.engine.dominant_hand, Handedness::Left);
    }

    #[test]
    fn test_commands_need_permission() {
        let txt = "[meta]\nallow_commands = false\n[commands]\nvolume = \"amixer {percent}\"\n";
        let err = parse_profile(txt).unwrap_err();
        assert!(err.to_string().contains("allow_commands"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(parse_profile("[meta]\n[engine]\nscreen_width = 0\n").is_err());
        assert!(parse_profile("[meta]\n[controls]\ninitial_volume = 1.5\n").is_err());
        assert!(parse_profile("[meta]\n[controls]\nlevel_divisor = 0.0\n").is_err());
        assert!(parse_profile("[meta]\n[engine]\ndominant_hand = \"both\"\n").is_err());
    }
}
