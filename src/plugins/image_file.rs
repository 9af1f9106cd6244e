/*
 *  plugins/image_file.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Show an image file, or a random pick from a folder of them
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use image::DynamicImage;
use log::debug;
use rand::Rng;
use std::path::{Path, PathBuf};

use crate::config::DeviceConfig;
use crate::plugins::{required_str, Plugin, PluginError, Settings};

const EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "gif", "webp"];

pub struct ImageFilePlugin;

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Image files directly inside `dir`, sorted by name
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_image(p))
        .collect();
    files.sort();
    Ok(files)
}

fn pick(path: &Path) -> Result<PathBuf, PluginError> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }
    let files = list_images(path)?;
    if files.is_empty() {
        return Err(PluginError::NoImages(path.to_path_buf()));
    }
    let idx = rand::rng().random_range(0..files.len());
    Ok(files[idx].clone())
}

impl Plugin for ImageFilePlugin {
    fn id(&self) -> &str {
        "image_file"
    }

    fn generate_image(&self, settings: &Settings, _config: &DeviceConfig) -> Result<DynamicImage, PluginError> {
        let path = pick(Path::new(required_str(settings, "path")?))?;
        debug!("image_file loading {}", path.display());
        Ok(image::open(&path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use image::{Rgb, RgbImage};
    use serde_json::json;

    fn settings(path: &Path) -> Settings {
        json!({ "path": path.to_string_lossy() }).as_object().cloned().unwrap()
    }

    fn config() -> DeviceConfig {
        DeviceConfig::new(Config::default(), None)
    }

    #[test]
    fn test_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        RgbImage::from_pixel(3, 2, Rgb([9, 9, 9])).save(&file).unwrap();

        let img = ImageFilePlugin.generate_image(&settings(&file), &config()).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
    }

    #[test]
    fn test_directory_pick_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(5, 5).save(dir.path().join("only.PNG")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(list_images(dir.path()).unwrap().len(), 1);
        let img = ImageFilePlugin.generate_image(&settings(dir.path()), &config()).unwrap();
        assert_eq!(img.width(), 5);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageFilePlugin.generate_image(&settings(dir.path()), &config()).err().unwrap();
        assert!(matches!(err, PluginError::NoImages(_)));
    }

    #[test]
    fn test_missing_path_setting() {
        let err = ImageFilePlugin.generate_image(&Settings::new(), &config()).err().unwrap();
        assert!(matches!(err, PluginError::MissingSetting(ref k) if k == "path"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageFilePlugin.generate_image(&settings(&dir.path().join("gone.png")), &config()).is_err());
    }
}
