//! Folder browsing for the `folder` and `folders` views

use crate::config::FolderConfig;
use crate::error::Result;
use crate::hass::HomeAssistant;
use crate::plugins::browse_media::{browse_media, BrowseMedia};
use crate::view::media::{MediaType, ViewFolder, ViewItem, ViewMedia};
use crate::view::FolderQuery;
use async_trait::async_trait;
use tracing::debug;

const DEFAULT_ROOT: &str = "media-source://";

/// Supplies the contents of configured folders
#[async_trait]
pub trait FoldersManager: Send + Sync {
    fn get_folder_ids(&self) -> Vec<String>;

    fn get_default_folder_id(&self) -> Option<String> {
        self.get_folder_ids().into_iter().next()
    }

    /// Items directly inside the folder at the end of `query.path`, or the
    /// folder root for an empty path.
    async fn expand_folder(&self, hass: &dyn HomeAssistant, query: &FolderQuery) -> Result<Vec<ViewItem>>;
}

struct MediaSourceFolder {
    id: String,
    root: String,
    icon: Option<String>,
}

/// Folders backed by Home Assistant media-source trees
pub struct MediaSourceFoldersManager {
    folders: Vec<MediaSourceFolder>,
}

impl MediaSourceFoldersManager {
    pub fn new(configs: &[FolderConfig]) -> Self {
        let folders = configs
            .iter()
            .enumerate()
            .map(|(index, config)| MediaSourceFolder {
                id: config.id.clone().unwrap_or_else(|| format!("folder-{}", index)),
                root: config.root.clone().unwrap_or_else(|| DEFAULT_ROOT.to_string()),
                icon: config.icon.clone(),
            })
            .collect();
        MediaSourceFoldersManager { folders }
    }

    fn folder(&self, folder_id: &str) -> Option<&MediaSourceFolder> {
        self.folders.iter().find(|f| f.id == folder_id)
    }

    fn to_item(folder: &MediaSourceFolder, path: &[String], child: &BrowseMedia) -> Option<ViewItem> {
        if child.can_expand {
            let mut child_path = path.to_vec();
            child_path.push(child.media_content_id.clone());
            return Some(ViewItem::Folder(ViewFolder {
                id: child.media_content_id.clone(),
                folder_id: folder.id.clone(),
                title: child.title.clone(),
                icon: folder.icon.clone(),
                thumbnail: child.thumbnail.clone(),
                path: child_path,
            }));
        }
        if !child.can_play {
            return None;
        }

        let media_type = match child.media_class.as_str() {
            "image" => MediaType::Snapshot,
            _ => MediaType::Clip,
        };
        // Folder media belong to no camera and carry the folder ID instead.
        Some(ViewItem::Event(
            ViewMedia::new(&child.media_content_id, &folder.id, media_type)
                .with_title(&child.title)
                .with_thumbnail(child.thumbnail.clone())
                .with_content_id(&child.media_content_id),
        ))
    }
}

#[async_trait]
impl FoldersManager for MediaSourceFoldersManager {
    fn get_folder_ids(&self) -> Vec<String> {
        self.folders.iter().map(|f| f.id.clone()).collect()
    }

    async fn expand_folder(&self, hass: &dyn HomeAssistant, query: &FolderQuery) -> Result<Vec<ViewItem>> {
        let Some(folder) = self.folder(&query.folder_id) else {
            debug!("[FoldersManager] Unknown folder: {}", query.folder_id);
            return Ok(Vec::new());
        };

        let content_id = query.path.last().unwrap_or(&folder.root);
        let browsed = browse_media(hass, content_id).await?;
        Ok(browsed
            .children
            .iter()
            .flatten()
            .filter_map(|child| Self::to_item(folder, &query.path, child))
            .collect())
    }
}
