//! Render-ready snapshot of the gallery, recomputed after each state change.

use crate::{
    gallery::{FetchPhase, GalleryStore},
    media_kind::{AssetKind, classify, format_label, size_label},
    preview::{LocalPreview, PreviewState},
    selection::SelectionSet,
    types::{PendingUpload, RemoteAsset, Theme},
    upload_queue::UploadQueue,
};

/// One grid tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetTile {
    pub asset: RemoteAsset,
    pub kind: AssetKind,
    pub format_label: String,
    pub size_label: String,
    pub is_selected: bool,
    pub menu_open: bool,
    /// Link was copied recently; the tile shows a check mark.
    pub copied: bool,
}

/// Full UI snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GallerySnapshot {
    pub open: bool,
    pub theme: Theme,
    pub tiles: Vec<AssetTile>,
    pub loading: bool,
    pub has_more: bool,
    pub degraded: bool,
    pub error_text: Option<String>,
    pub pending_uploads: Vec<PendingUpload>,
    pub upload_progress: u8,
    pub batch_active: bool,
    pub selected_count: usize,
    pub preview: Option<RemoteAsset>,
    pub local_preview: Option<LocalPreview>,
    pub can_upload: bool,
    pub can_delete: bool,
}

/// Borrowed widget state a snapshot is computed from.
pub struct SnapshotSource<'a> {
    pub open: bool,
    pub theme: Theme,
    pub allowed_exts: &'a [String],
    pub gallery: &'a GalleryStore,
    pub uploads: &'a UploadQueue,
    pub selection: &'a SelectionSet,
    pub preview: &'a PreviewState,
    pub local_preview: Option<&'a LocalPreview>,
    pub error_text: Option<&'a str>,
    pub active_menu: Option<&'a str>,
    pub copied: Option<&'a str>,
    pub can_upload: bool,
    pub can_delete: bool,
}

impl GallerySnapshot {
    pub fn build(source: SnapshotSource<'_>) -> Self {
        let tiles = source
            .gallery
            .assets()
            .iter()
            .map(|asset| AssetTile {
                kind: classify(asset, source.allowed_exts),
                format_label: format_label(asset),
                size_label: size_label(asset.size_bytes),
                is_selected: source.selection.contains(&asset.id),
                menu_open: source.active_menu == Some(asset.id.as_str()),
                copied: source.copied == Some(asset.id.as_str()),
                asset: asset.clone(),
            })
            .collect();

        Self {
            open: source.open,
            theme: source.theme,
            tiles,
            loading: source.gallery.phase() != FetchPhase::Idle,
            has_more: source.gallery.has_more(),
            degraded: source.gallery.is_degraded(),
            error_text: source.error_text.map(str::to_owned),
            pending_uploads: source.uploads.items().to_vec(),
            upload_progress: source.uploads.aggregate_progress(),
            batch_active: source.uploads.is_batch_active(),
            selected_count: source.selection.len(),
            preview: source.preview.current().cloned(),
            local_preview: source.local_preview.cloned(),
            can_upload: source.can_upload,
            can_delete: source.can_delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload_queue::UploadLimits;

    fn asset(id: &str, name: &str) -> RemoteAsset {
        RemoteAsset {
            id: id.into(),
            display_name: name.into(),
            url: format!("https://ik.example/{name}"),
            thumbnail_url: String::new(),
            width: 1,
            height: 1,
            size_bytes: 2_048,
            created_at: String::new(),
        }
    }

    #[test]
    fn tiles_reflect_selection_menu_and_kind() {
        let mut gallery = GalleryStore::new(10, None);
        let ticket = gallery.begin_initial();
        gallery
            .apply(&ticket, Ok(vec![asset("a", "a.png"), asset("b", "b.mov")]))
            .expect("initial");

        let mut selection = SelectionSet::new(true);
        selection.toggle("b");
        let uploads = UploadQueue::new(UploadLimits {
            max_file_size: 10,
            allowed_types: vec![],
        });
        let preview = PreviewState::default();
        let exts = vec!["png".to_owned()];

        let snapshot = GallerySnapshot::build(SnapshotSource {
            open: true,
            theme: Theme::Dark,
            allowed_exts: &exts,
            gallery: &gallery,
            uploads: &uploads,
            selection: &selection,
            preview: &preview,
            local_preview: None,
            error_text: None,
            active_menu: Some("a"),
            copied: None,
            can_upload: true,
            can_delete: false,
        });

        assert_eq!(snapshot.tiles.len(), 2);
        assert_eq!(snapshot.tiles[0].kind, AssetKind::Image);
        assert!(snapshot.tiles[0].menu_open);
        assert_eq!(snapshot.tiles[1].kind, AssetKind::Video);
        assert!(snapshot.tiles[1].is_selected);
        assert_eq!(snapshot.tiles[1].size_label, "2KB");
        assert_eq!(snapshot.selected_count, 1);
        assert!(!snapshot.loading);
    }
}
