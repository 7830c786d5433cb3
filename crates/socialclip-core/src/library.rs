//! 唯讀影片素材庫
//!
//! 素材庫需明確傳入流程；
//! 核心不會自行尋找預設的素材位置。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::engine::MediaEngine;
use crate::error::PipelineError;
use crate::types::{Resolution, VideoClip};

/// 目錄掃描會收錄的副檔名
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "m4v", "avi"];

/// 畫面方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

impl Orientation {
    pub fn of(resolution: Resolution) -> Self {
        use std::cmp::Ordering;
        match resolution.height.cmp(&resolution.width) {
            Ordering::Greater => Orientation::Portrait,
            Ordering::Less => Orientation::Landscape,
            Ordering::Equal => Orientation::Square,
        }
    }
}

/// 一次執行對背景片段的需求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipCriteria {
    /// 片段要配對的旁白時長
    pub target_duration_seconds: f64,
    /// 只考慮此方向的片段
    pub orientation: Option<Orientation>,
}

/// 可用片段的唯讀介面
pub trait ClipLibrary: Send + Sync {
    /// 所有片段，依 id 排序
    fn clips(&self) -> &[VideoClip];

    /// 依 id 查詢片段
    fn get(&self, id: &str) -> Result<&VideoClip, PipelineError> {
        self.clips()
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| PipelineError::Asset(format!("unknown clip id: {}", id)))
    }

    /// 優先選擇不需循環即可涵蓋目標的最短片段，
    /// 否則選最長的片段。同長時取 id 較小者。
    fn select(&self, criteria: &ClipCriteria) -> Result<&VideoClip, PipelineError> {
        let candidates: Vec<&VideoClip> = self
            .clips()
            .iter()
            .filter(|c| {
                criteria
                    .orientation
                    .map_or(true, |o| Orientation::of(c.resolution) == o)
            })
            .collect();

        let covering = candidates
            .iter()
            .filter(|c| c.native_duration_seconds >= criteria.target_duration_seconds)
            .min_by(|a, b| {
                a.native_duration_seconds
                    .total_cmp(&b.native_duration_seconds)
                    .then_with(|| a.id.cmp(&b.id))
            });

        let chosen = covering.or_else(|| {
            candidates.iter().min_by(|a, b| {
                b.native_duration_seconds
                    .total_cmp(&a.native_duration_seconds)
                    .then_with(|| a.id.cmp(&b.id))
            })
        });

        chosen.copied().ok_or_else(|| {
            PipelineError::Asset("no clip in the library matches the request".to_string())
        })
    }
}

/// 目錄下找到的片段
#[derive(Debug, Clone, Default)]
pub struct DirectoryLibrary {
    root: PathBuf,
    clips: Vec<VideoClip>,
}

impl DirectoryLibrary {
    /// 走訪 `root` 並探測每個影片檔；無法讀取的檔案略過
    pub fn scan<P: AsRef<Path>>(root: P, engine: &dyn MediaEngine) -> Result<Self, PipelineError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(PipelineError::Asset(format!(
                "clip library {} is not a directory",
                root.display()
            )));
        }

        let mut clips = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable library entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !is_video(path) {
                continue;
            }

            let id = clip_id(root, path);
            let clip = match engine.probe(path) {
                Ok(probe) => probe.into_clip(id, path),
                Err(e) => Err(PipelineError::Asset(e.to_string())),
            };
            match clip {
                Ok(clip) if clip.native_duration_seconds > 0.0 => {
                    debug!("Found clip {} ({:.3}s)", clip.id, clip.native_duration_seconds);
                    clips.push(clip);
                }
                Ok(clip) => warn!("Skipping empty clip {}", clip.id),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        clips.sort_by(|a, b| a.id.cmp(&b.id));
        info!("Scanned {} clips under {}", clips.len(), root.display());
        Ok(Self {
            root: root.to_path_buf(),
            clips,
        })
    }

    /// 以已知片段建立素材庫
    pub fn from_clips(root: impl Into<PathBuf>, mut clips: Vec<VideoClip>) -> Self {
        clips.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            root: root.into(),
            clips,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ClipLibrary for DirectoryLibrary {
    fn clips(&self) -> &[VideoClip] {
        &self.clips
    }
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// 相對於素材庫根目錄、以 `/` 分隔的路徑
fn clip_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_format, FakeEngine};
    use std::fs;

    fn clip(id: &str, duration: f64, resolution: Resolution) -> VideoClip {
        VideoClip {
            id: id.to_string(),
            source_path: PathBuf::from(id),
            native_duration_seconds: duration,
            resolution,
            frame_rate: 30.0,
            audio: None,
        }
    }

    fn library() -> DirectoryLibrary {
        let portrait = Resolution::new(1080, 1920);
        DirectoryLibrary::from_clips(
            "/clips",
            vec![
                clip("c.mp4", 30.0, portrait),
                clip("a.mp4", 8.0, portrait),
                clip("b.mp4", 8.0, portrait),
                clip("wide.mp4", 60.0, Resolution::new(1920, 1080)),
            ],
        )
    }

    #[test]
    fn test_select_shortest_covering_clip() {
        let lib = library();
        let criteria = ClipCriteria {
            target_duration_seconds: 6.0,
            orientation: Some(Orientation::Portrait),
        };
        assert_eq!(lib.select(&criteria).unwrap().id, "a.mp4");

        let criteria = ClipCriteria {
            target_duration_seconds: 10.0,
            orientation: Some(Orientation::Portrait),
        };
        assert_eq!(lib.select(&criteria).unwrap().id, "c.mp4");
    }

    #[test]
    fn test_select_falls_back_to_longest() {
        let lib = library();
        let criteria = ClipCriteria {
            target_duration_seconds: 45.0,
            orientation: Some(Orientation::Portrait),
        };
        assert_eq!(lib.select(&criteria).unwrap().id, "c.mp4");

        let any = ClipCriteria {
            target_duration_seconds: 100.0,
            orientation: None,
        };
        assert_eq!(lib.select(&any).unwrap().id, "wide.mp4");
    }

    #[test]
    fn test_get_unknown_id_is_asset_error() {
        let lib = library();
        assert!(lib.get("a.mp4").is_ok());
        assert!(matches!(lib.get("nope.mp4"), Err(PipelineError::Asset(_))));
    }

    #[test]
    fn test_select_from_empty_library_fails() {
        let lib = DirectoryLibrary::from_clips("/clips", Vec::new());
        assert!(lib.select(&ClipCriteria::default()).is_err());
    }

    #[test]
    fn test_scan_skips_unprobeable_and_non_video_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nature")).unwrap();
        let engine = FakeEngine::default();
        engine.add_media(&dir.path().join("nature").join("forest.mp4"), 12.0, Some(sample_format()), true);
        engine.add_media(&dir.path().join("city.MOV"), 5.0, Some(sample_format()), false);
        fs::write(dir.path().join("broken.mp4"), b"not a video").unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let lib = DirectoryLibrary::scan(dir.path(), &engine).unwrap();
        let ids: Vec<&str> = lib.clips().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["city.MOV", "nature/forest.mp4"]);
        assert_eq!(lib.get("nature/forest.mp4").unwrap().native_duration_seconds, 12.0);
    }

    #[test]
    fn test_orientation() {
        assert_eq!(Orientation::of(Resolution::new(1080, 1920)), Orientation::Portrait);
        assert_eq!(Orientation::of(Resolution::new(1920, 1080)), Orientation::Landscape);
        assert_eq!(Orientation::of(Resolution::new(720, 720)), Orientation::Square);
    }
}
