use anyhow::Result;
use std::{fs, path::PathBuf};

use crate::config::home_dir;

pub fn runtime_dir() -> Result<PathBuf> {
    let dir = home_dir()?.join(".local").join("run");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn socket_path() -> Result<PathBuf> {
    Ok(runtime_dir()?.join("handctl.sock"))
}
