//! Media classification for mounted USB volumes.
//!
//! [`MediaClassifier`] lists the top level of a mounted volume and buckets its
//! files into a [`MediaSet`] by file-name suffix.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{MediaError, Result};

/// Image suffixes, matched case-sensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpeg", ".jpg", ".png", ".bmp", ".tiff", ".tif", ".webp", ".tga", ".pam", ".ppm", ".pgm",
    ".pbm", ".xcf", ".svg",
];

/// Audio suffixes, matched case-sensitively.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    ".mp3", ".aac", ".wav", ".flac", ".ogg", ".wma", ".m4a", ".opus", ".aiff", ".amr",
];

/// Video suffixes, matched case-sensitively.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".avi", ".mkv", ".mov", ".flv", ".webm", ".wmv", ".mpg", ".mpeg", ".m4v", ".3gp",
    ".ogv", ".divx", ".xvid",
];

/// The three media categories offered by the USB screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    /// Still images, shown as a slideshow.
    Photos,
    /// Music, played by the audio player.
    Audio,
    /// Videos, played by the video player.
    Video,
}

impl MediaCategory {
    /// All categories in menu order.
    pub const ALL: [Self; 3] = [Self::Photos, Self::Video, Self::Audio];

    /// Suffixes belonging to this category.
    #[must_use]
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Photos => IMAGE_EXTENSIONS,
            Self::Audio => AUDIO_EXTENSIONS,
            Self::Video => VIDEO_EXTENSIONS,
        }
    }

    /// Message shown when the category is opened without any files.
    #[must_use]
    pub const fn not_found_message(self) -> &'static str {
        match self {
            Self::Photos => "No images found.",
            Self::Audio => "No music files found.",
            Self::Video => "No video files found.",
        }
    }

    /// Determine the category of a file name, if any.
    ///
    /// Categories are tried in image, audio, video order so a name never
    /// lands in more than one bucket.
    #[must_use]
    pub fn of_file_name(name: &str) -> Option<Self> {
        [Self::Photos, Self::Audio, Self::Video]
            .into_iter()
            .find(|category| category.extensions().iter().any(|ext| name.ends_with(ext)))
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Photos => write!(f, "photos"),
            Self::Audio => write!(f, "music"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Media files found on a volume, grouped by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSet {
    /// Image files.
    pub images: Vec<PathBuf>,
    /// Audio files.
    pub audio: Vec<PathBuf>,
    /// Video files.
    pub video: Vec<PathBuf>,
}

impl MediaSet {
    /// Files of one category.
    #[must_use]
    pub fn items(&self, category: MediaCategory) -> &[PathBuf] {
        match category {
            MediaCategory::Photos => &self.images,
            MediaCategory::Audio => &self.audio,
            MediaCategory::Video => &self.video,
        }
    }

    /// True when no category holds a file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.audio.is_empty() && self.video.is_empty()
    }

    /// Total number of files across categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len() + self.audio.len() + self.video.len()
    }

    fn push(&mut self, category: MediaCategory, path: PathBuf) {
        match category {
            MediaCategory::Photos => self.images.push(path),
            MediaCategory::Audio => self.audio.push(path),
            MediaCategory::Video => self.video.push(path),
        }
    }
}

/// Classifies the top level of a directory into a [`MediaSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaClassifier;

impl MediaClassifier {
    /// Create a classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// List the direct children of `dir` and bucket them by suffix.
    ///
    /// Listing order is preserved within each bucket. Files whose name matches
    /// no known suffix are ignored, and so are sub-directories.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::Unreadable` if `dir` cannot be listed.
    pub fn classify(&self, dir: &Path) -> Result<MediaSet> {
        let mut media = MediaSet::default();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| MediaError::Unreadable {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

            if entry.file_type().is_dir() {
                continue;
            }

            let Some(name) = entry.file_name().to_str() else {
                debug!("Skipping non UTF-8 file name in {}", dir.display());
                continue;
            };

            if let Some(category) = MediaCategory::of_file_name(name) {
                media.push(category, entry.into_path());
            }
        }

        debug!(
            images = media.images.len(),
            audio = media.audio.len(),
            video = media.video.len(),
            "Classified {}",
            dir.display()
        );
        Ok(media)
    }

    /// Classify `dir`, treating an unreadable directory as holding no media.
    #[must_use]
    pub fn classify_or_empty(&self, dir: &Path) -> MediaSet {
        self.classify(dir).unwrap_or_else(|e| {
            warn!("{e}; treating volume as empty");
            MediaSet::default()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::error::Error;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").expect("write fixture");
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        let mut names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_classify_buckets_by_suffix() {
        let temp_dir = TempDir::new().expect("create temp dir");
        for name in ["a.jpg", "b.png", "song.mp3", "track.flac", "clip.mp4", "movie.mkv"] {
            touch(temp_dir.path(), name);
        }

        let media = MediaClassifier::new().classify(temp_dir.path()).unwrap();

        assert_eq!(names(&media.images), vec!["a.jpg", "b.png"]);
        assert_eq!(names(&media.audio), vec!["song.mp3", "track.flac"]);
        assert_eq!(names(&media.video), vec!["clip.mp4", "movie.mkv"]);
        assert_eq!(media.len(), 6);
    }

    #[test]
    fn test_classify_is_case_sensitive() {
        let temp_dir = TempDir::new().expect("create temp dir");
        touch(temp_dir.path(), "HOLIDAY.JPG");
        touch(temp_dir.path(), "Song.MP3");
        touch(temp_dir.path(), "ok.jpg");

        let media = MediaClassifier::new().classify(temp_dir.path()).unwrap();

        assert_eq!(names(&media.images), vec!["ok.jpg"]);
        assert!(media.audio.is_empty());
    }

    #[test]
    fn test_classify_ignores_unknown_files_and_subdirectories() {
        let temp_dir = TempDir::new().expect("create temp dir");
        touch(temp_dir.path(), "notes.txt");
        touch(temp_dir.path(), "README");
        fs::create_dir(temp_dir.path().join("album.jpg")).unwrap();
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        touch(&temp_dir.path().join("nested"), "deep.mp3");

        let media = MediaClassifier::new().classify(temp_dir.path()).unwrap();

        assert!(media.is_empty());
    }

    #[test]
    fn test_every_path_matches_its_bucket() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let listing = [
            "a.jpeg", "b.svg", "c.opus", "d.wma", "e.3gp", "f.xvid", "g.doc", "h.mp3.bak",
        ];
        for name in listing {
            touch(temp_dir.path(), name);
        }

        let media = MediaClassifier::new().classify(temp_dir.path()).unwrap();

        for category in MediaCategory::ALL {
            for path in media.items(category) {
                let name = path.file_name().unwrap().to_str().unwrap();
                assert!(
                    category.extensions().iter().any(|ext| name.ends_with(ext)),
                    "{name} is not a {category} file"
                );
            }
        }
        // Each listed file appears in at most one bucket.
        for name in listing {
            let hits = MediaCategory::ALL
                .iter()
                .flat_map(|c| media.items(*c))
                .filter(|p| p.file_name().unwrap() == name)
                .count();
            assert!(hits <= 1, "{name} appeared {hits} times");
        }
        assert_eq!(media.len(), 6);
    }

    #[test]
    fn test_classify_unreadable_directory() {
        let result = MediaClassifier::new().classify(Path::new("/nonexistent/usb/volume"));
        assert!(matches!(
            result,
            Err(Error::Media(MediaError::Unreadable { .. }))
        ));
    }

    #[test]
    fn test_classify_or_empty_recovers() {
        let media = MediaClassifier::new().classify_or_empty(Path::new("/nonexistent/usb/volume"));
        assert!(media.is_empty());
    }

    #[test]
    fn test_of_file_name() {
        assert_eq!(MediaCategory::of_file_name("x.tif"), Some(MediaCategory::Photos));
        assert_eq!(MediaCategory::of_file_name("x.amr"), Some(MediaCategory::Audio));
        assert_eq!(MediaCategory::of_file_name("x.divx"), Some(MediaCategory::Video));
        assert_eq!(MediaCategory::of_file_name("x.txt"), None);
    }

    #[test]
    fn test_media_set_serialization() {
        let media = MediaSet {
            images: vec![PathBuf::from("/m/a.jpg")],
            audio: vec![],
            video: vec![PathBuf::from("/m/v.mp4")],
        };
        let json = serde_json::to_string(&media).expect("serialize failed");
        let back: MediaSet = serde_json::from_str(&json).expect("deserialize failed");
        assert_eq!(media, back);
    }
}
