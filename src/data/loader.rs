// ============================================================
// Layer 4 — Image Folder Loader
// ============================================================
// Discovers labelled images laid out one directory per class:
//
//   data/train/
//     daisy/      001.jpg 002.jpg ...
//     roses/      ...
//     tulips/     ...
//
// Class directories are sorted by name and numbered from 0, so
// the same folder tree always yields the same label indices.
// Only paths and image headers are read here; pixels are
// decoded lazily by ImageDataset when a batch asks for them.
// Files whose header cannot be read are skipped with a warning.
//
// The index → class-name mapping is written next to the
// checkpoint as class_indices.json so later runs can name
// predictions without the training folder.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::domain::sample::Sample;

/// File extensions recognised as images (compared lowercase)
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Samples discovered under one root plus the class names
/// indexed by label.
#[derive(Debug, Clone)]
pub struct LabelledImages {
    pub samples:     Vec<Sample>,
    pub class_names: Vec<String>,
}

impl LabelledImages {
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Number of samples per class, indexed by label.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.class_names.len()];
        for s in &self.samples {
            counts[s.label()] += 1;
        }
        counts
    }
}

pub struct ImageFolder {
    root: PathBuf,
}

impl ImageFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walk `root/<class>/` and collect every image file.
    pub fn load(&self) -> Result<LabelledImages> {
        let mut class_dirs: Vec<PathBuf> = fs::read_dir(&self.root)
            .with_context(|| format!("Cannot read image folder '{}'", self.root.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        class_dirs.sort();

        let mut samples     = Vec::new();
        let mut class_names = Vec::with_capacity(class_dirs.len());

        for (label, dir) in class_dirs.iter().enumerate() {
            let name = dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();

            let mut files: Vec<PathBuf> = fs::read_dir(dir)
                .with_context(|| format!("Cannot read class folder '{}'", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_image(p))
                .filter(|p| match image::image_dimensions(p) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable image '{}': {}", p.display(), e);
                        false
                    }
                })
                .collect();
            files.sort();

            if files.is_empty() {
                tracing::warn!("Class folder '{}' contains no images", dir.display());
            }
            tracing::debug!("Class {} '{}': {} images", label, name, files.len());

            samples.extend(files.into_iter().map(|f| Sample::new(f, label)));
            class_names.push(name);
        }

        tracing::info!(
            "Found {} images in {} classes under '{}'",
            samples.len(),
            class_names.len(),
            self.root.display()
        );

        Ok(LabelledImages { samples, class_names })
    }
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

// ─── class_indices.json ───────────────────────────────────────────────────────
/// Serialised as {"0": "daisy", "1": "roses", ...}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassIndex(BTreeMap<String, String>);

impl ClassIndex {
    pub fn from_names(names: &[String]) -> Self {
        Self(
            names
                .iter()
                .enumerate()
                .map(|(i, n)| (i.to_string(), n.clone()))
                .collect(),
        )
    }

    /// Class names ordered by index; missing indices become their number.
    pub fn names(&self) -> Vec<String> {
        let n = self
            .0
            .keys()
            .filter_map(|k| k.parse::<usize>().ok())
            .max()
            .map_or(0, |m| m + 1);
        (0..n)
            .map(|i| self.0.get(&i.to_string()).cloned().unwrap_or_else(|| i.to_string()))
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Cannot write class index to '{}'", path.display()))?;
        tracing::debug!("Saved class index to '{}'", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read class index '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }
}
