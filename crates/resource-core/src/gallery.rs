use chrono::{DateTime, SecondsFormat};
use tracing::{debug, trace, warn};

use crate::{
    error::ResourceError,
    types::{ListCursor, ListQuery, RemoteAsset},
};

/// Largest page the media API accepts for one list request.
pub const SERVER_PAGE_SIZE_CAP: usize = 1_000;

const HOUR_MS: i64 = 60 * 60 * 1_000;

/// Which kind of list request a ticket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Replace the sequence from offset zero.
    Initial,
    /// Append the next page to the sequence.
    Append,
}

/// Current fetch activity of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    FetchingInitial,
    FetchingAppend,
}

/// Handle for one issued list request.
///
/// Results are applied only while the ticket's generation is current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub kind: FetchKind,
    pub generation: u64,
    pub query: ListQuery,
}

/// Result of applying a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Response was merged; `added` assets were appended or loaded.
    Applied { added: usize },
    /// A newer request superseded this one; the response was dropped.
    Stale,
}

/// Ordered list of remote assets for one open session.
#[derive(Debug, Clone)]
pub struct GalleryStore {
    assets: Vec<RemoteAsset>,
    cursor: ListCursor,
    folder_filter: Option<String>,
    generation: u64,
    initial_in_flight: bool,
    append_in_flight: bool,
    degraded: bool,
}

impl GalleryStore {
    /// Create an empty store. `page_size` is clamped to `1..=SERVER_PAGE_SIZE_CAP`.
    pub fn new(page_size: usize, folder_filter: Option<String>) -> Self {
        let page_size = Self::bounded_page_size(page_size, SERVER_PAGE_SIZE_CAP);
        Self {
            assets: Vec::new(),
            cursor: ListCursor::reset(page_size),
            folder_filter: folder_filter.filter(|path| !path.trim().is_empty()),
            generation: 0,
            initial_in_flight: false,
            append_in_flight: false,
            degraded: false,
        }
    }

    /// Assets in display order.
    pub fn assets(&self) -> &[RemoteAsset] {
        &self.assets
    }

    pub fn cursor(&self) -> ListCursor {
        self.cursor
    }

    pub fn has_more(&self) -> bool {
        self.cursor.has_more
    }

    /// Whether the visible list is offline sample data.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn phase(&self) -> FetchPhase {
        if self.initial_in_flight {
            FetchPhase::FetchingInitial
        } else if self.append_in_flight {
            FetchPhase::FetchingAppend
        } else {
            FetchPhase::Idle
        }
    }

    pub fn find(&self, asset_id: &str) -> Option<&RemoteAsset> {
        self.assets.iter().find(|asset| asset.id == asset_id)
    }

    /// Drop all assets and reset the cursor, invalidating in-flight requests.
    pub fn reset(&mut self) {
        self.assets.clear();
        self.cursor = ListCursor::reset(self.cursor.page_size);
        self.generation = self.generation.wrapping_add(1);
        self.initial_in_flight = false;
        self.append_in_flight = false;
        self.degraded = false;
    }

    /// Start a fetch from offset zero.
    ///
    /// Always succeeds; any older initial or append request becomes stale.
    pub fn begin_initial(&mut self) -> FetchTicket {
        self.generation = self.generation.wrapping_add(1);
        self.initial_in_flight = true;
        self.append_in_flight = false;
        debug!(generation = self.generation, "initial list fetch issued");
        FetchTicket {
            kind: FetchKind::Initial,
            generation: self.generation,
            query: self.query_at(0),
        }
    }

    /// Start a fetch for the next page, or `None` when nothing more can be loaded
    /// or another fetch is running.
    pub fn begin_append(&mut self) -> Option<FetchTicket> {
        if !self.cursor.has_more || self.initial_in_flight || self.append_in_flight {
            return None;
        }
        self.append_in_flight = true;
        let skip = self.assets.len();
        debug!(generation = self.generation, skip, "append list fetch issued");
        Some(FetchTicket {
            kind: FetchKind::Append,
            generation: self.generation,
            query: self.query_at(skip),
        })
    }

    /// Apply the response for a ticket returned by `begin_initial`/`begin_append`.
    ///
    /// A failed initial fetch leaves the sequence empty; a failed append keeps it.
    pub fn apply(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Vec<RemoteAsset>, ResourceError>,
    ) -> Result<MergeOutcome, ResourceError> {
        if ticket.generation != self.generation {
            trace!(
                ticket_generation = ticket.generation,
                current_generation = self.generation,
                "dropping stale list response"
            );
            return Ok(MergeOutcome::Stale);
        }

        match ticket.kind {
            FetchKind::Initial => {
                self.initial_in_flight = false;
                match result {
                    Ok(page) => {
                        let added = page.len();
                        self.degraded = false;
                        self.assets = page;
                        self.cursor.offset = added;
                        self.cursor.has_more = added >= self.cursor.page_size;
                        Ok(MergeOutcome::Applied { added })
                    }
                    Err(err) => {
                        warn!(code = %err.code, "initial list fetch failed");
                        self.assets.clear();
                        self.cursor.offset = 0;
                        self.cursor.has_more = false;
                        self.degraded = false;
                        Err(err)
                    }
                }
            }
            FetchKind::Append => {
                self.append_in_flight = false;
                match result {
                    Ok(page) => {
                        let added = page.len();
                        self.assets.extend(page);
                        self.cursor.offset += added;
                        self.cursor.has_more = added >= self.cursor.page_size;
                        Ok(MergeOutcome::Applied { added })
                    }
                    Err(err) => {
                        warn!(code = %err.code, "append list fetch failed; keeping loaded assets");
                        Err(err)
                    }
                }
            }
        }
    }

    /// Replace the sequence with sample data after a failed initial fetch.
    pub fn enter_degraded(&mut self, now_ms: i64) {
        let mut samples = fallback_assets(now_ms);
        sort_newest_first(&mut samples);
        self.cursor.offset = samples.len();
        self.cursor.has_more = false;
        self.assets = samples;
        self.degraded = true;
        warn!("list store switched to offline sample data");
    }

    /// Remove one asset after a successful remote delete.
    ///
    /// The cursor offset is left alone; the next append uses the live length.
    pub fn remove(&mut self, asset_id: &str) -> Option<RemoteAsset> {
        let idx = self.assets.iter().position(|asset| asset.id == asset_id)?;
        Some(self.assets.remove(idx))
    }

    /// Clamp a requested page size against safety and server caps.
    ///
    /// The result is always in `1..=server_cap.max(1)`.
    pub fn bounded_page_size(requested: usize, server_cap: usize) -> usize {
        requested.max(1).min(server_cap.max(1))
    }

    fn query_at(&self, skip: usize) -> ListQuery {
        ListQuery {
            skip,
            limit: self.cursor.page_size,
            path: self.folder_filter.clone(),
        }
    }
}

/// Sort newest first by creation time, ties broken by ascending id.
pub fn sort_newest_first(assets: &mut [RemoteAsset]) {
    assets.sort_by(|a, b| {
        b.created_at_ms()
            .cmp(&a.created_at_ms())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Deterministic sample assets used in degraded mode.
pub fn fallback_assets(now_ms: i64) -> Vec<RemoteAsset> {
    let samples: [(&str, u32, u64, i64); 5] = [
        ("1", 400, 102_400, 4),
        ("2", 350, 89_600, 3),
        ("3", 450, 115_200, 2),
        ("4", 380, 97_200, 1),
        ("5", 420, 108_800, 0),
    ];

    samples
        .iter()
        .map(|(id, height, size_bytes, hours_ago)| {
            let url = format!("https://picsum.photos/300/{height}?random={id}");
            RemoteAsset {
                id: (*id).to_owned(),
                display_name: format!("demo{id}.jpg"),
                thumbnail_url: url.clone(),
                url,
                width: 300,
                height: *height,
                size_bytes: *size_bytes,
                created_at: iso_timestamp(now_ms - hours_ago * HOUR_MS),
            }
        })
        .collect()
}

fn iso_timestamp(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceErrorCategory;

    fn asset(id: &str) -> RemoteAsset {
        RemoteAsset {
            id: id.to_owned(),
            display_name: format!("{id}.png"),
            url: format!("https://ik.example/{id}.png"),
            thumbnail_url: String::new(),
            width: 10,
            height: 10,
            size_bytes: 1_024,
            created_at: "2024-01-01T00:00:00.000Z".to_owned(),
        }
    }

    fn page(prefix: &str, count: usize) -> Vec<RemoteAsset> {
        (0..count).map(|i| asset(&format!("{prefix}{i}"))).collect()
    }

    fn ids(store: &GalleryStore) -> Vec<&str> {
        store.assets().iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn initial_fetch_replaces_sequence_and_sets_has_more() {
        let mut store = GalleryStore::new(3, None);
        let ticket = store.begin_initial();
        assert_eq!(ticket.query.skip, 0);
        assert_eq!(ticket.query.limit, 3);
        assert_eq!(store.phase(), FetchPhase::FetchingInitial);

        let outcome = store.apply(&ticket, Ok(page("a", 3))).expect("apply");
        assert_eq!(outcome, MergeOutcome::Applied { added: 3 });
        assert!(store.has_more());
        assert_eq!(store.cursor().offset, 3);
        assert_eq!(store.phase(), FetchPhase::Idle);
    }

    #[test]
    fn appends_accumulate_without_duplicates() {
        let mut store = GalleryStore::new(2, None);
        let t = store.begin_initial();
        store.apply(&t, Ok(page("a", 2))).expect("initial");

        let t = store.begin_append().expect("append allowed");
        assert_eq!(t.query.skip, 2);
        store.apply(&t, Ok(page("b", 2))).expect("append 1");
        let t = store.begin_append().expect("append allowed");
        assert_eq!(t.query.skip, 4);
        store.apply(&t, Ok(page("c", 1))).expect("append 2");

        assert_eq!(store.assets().len(), 5);
        assert_eq!(ids(&store), vec!["a0", "a1", "b0", "b1", "c0"]);
        let unique: std::collections::HashSet<_> = ids(&store).into_iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn has_more_turns_false_exactly_on_short_page() {
        let mut store = GalleryStore::new(2, None);
        let t = store.begin_initial();
        store.apply(&t, Ok(page("a", 2))).expect("initial");
        assert!(store.has_more());

        let t = store.begin_append().expect("append");
        store.apply(&t, Ok(page("b", 2))).expect("full page");
        assert!(store.has_more());

        let t = store.begin_append().expect("append");
        store.apply(&t, Ok(page("c", 1))).expect("short page");
        assert!(!store.has_more());
        assert!(store.begin_append().is_none());
    }

    #[test]
    fn stale_initial_response_is_dropped() {
        let mut store = GalleryStore::new(10, None);
        let slow = store.begin_initial();
        let fast = store.begin_initial();

        store.apply(&fast, Ok(page("new", 2))).expect("newer applies");
        let outcome = store
            .apply(&slow, Ok(page("old", 5)))
            .expect("stale apply is not an error");

        assert_eq!(outcome, MergeOutcome::Stale);
        assert_eq!(ids(&store), vec!["new0", "new1"]);
    }

    #[test]
    fn append_is_refused_while_a_fetch_runs() {
        let mut store = GalleryStore::new(2, None);
        let t = store.begin_initial();
        assert!(store.begin_append().is_none());
        store.apply(&t, Ok(page("a", 2))).expect("initial");

        let _pending = store.begin_append().expect("first append");
        assert!(store.begin_append().is_none());
    }

    #[test]
    fn refresh_discards_in_flight_append() {
        let mut store = GalleryStore::new(2, None);
        let t = store.begin_initial();
        store.apply(&t, Ok(page("a", 2))).expect("initial");

        let append = store.begin_append().expect("append");
        let refresh = store.begin_initial();
        store.apply(&refresh, Ok(page("r", 2))).expect("refresh");

        let outcome = store.apply(&append, Ok(page("b", 2))).expect("stale append");
        assert_eq!(outcome, MergeOutcome::Stale);
        assert_eq!(ids(&store), vec!["r0", "r1"]);
    }

    #[test]
    fn failed_append_keeps_existing_sequence() {
        let mut store = GalleryStore::new(2, None);
        let t = store.begin_initial();
        store.apply(&t, Ok(page("a", 2))).expect("initial");

        let t = store.begin_append().expect("append");
        let err = store
            .apply(&t, Err(ResourceError::http_status(500, "boom")))
            .expect_err("append failure surfaces");
        assert_eq!(err.category, ResourceErrorCategory::Transport);
        assert_eq!(ids(&store), vec!["a0", "a1"]);
        assert!(store.has_more());
        assert!(store.begin_append().is_some(), "append can be retried");
    }

    #[test]
    fn failed_initial_leaves_sequence_empty() {
        let mut store = GalleryStore::new(2, None);
        let t = store.begin_initial();
        store.apply(&t, Ok(page("a", 2))).expect("initial");

        let t = store.begin_initial();
        store
            .apply(&t, Err(ResourceError::network("offline")))
            .expect_err("initial failure surfaces");
        assert!(store.assets().is_empty());
        assert!(!store.is_degraded());
    }

    #[test]
    fn remove_patches_exactly_one_asset() {
        let mut store = GalleryStore::new(5, None);
        let t = store.begin_initial();
        store.apply(&t, Ok(page("a", 3))).expect("initial");

        let removed = store.remove("a1").expect("asset present");
        assert_eq!(removed.id, "a1");
        assert_eq!(ids(&store), vec!["a0", "a2"]);
        assert!(store.remove("missing").is_none());
        assert_eq!(store.cursor().offset, 3);
    }

    #[test]
    fn append_after_remove_skips_from_held_length() {
        let mut store = GalleryStore::new(2, None);
        let t = store.begin_initial();
        store.apply(&t, Ok(page("a", 2))).expect("initial");
        store.remove("a0").expect("asset present");

        let t = store.begin_append().expect("more pages");
        assert_eq!(t.query.skip, 1);
        store.apply(&t, Ok(page("b", 2))).expect("append");
        assert_eq!(ids(&store), vec!["a1", "b0", "b1"]);
        assert_eq!(store.cursor().offset, 4, "counts every merged asset");
    }

    #[test]
    fn degraded_mode_sorts_samples_newest_first() {
        let mut store = GalleryStore::new(10, None);
        store.enter_degraded(1_714_557_600_000);
        assert!(store.is_degraded());
        assert!(!store.has_more());
        assert_eq!(ids(&store), vec!["5", "4", "3", "2", "1"]);
    }

    #[test]
    fn sort_breaks_timestamp_ties_by_ascending_id() {
        let mut assets = vec![asset("b"), asset("a"), asset("c")];
        assets[2].created_at = "2025-01-01T00:00:00Z".to_owned();
        sort_newest_first(&mut assets);
        let ordered: Vec<_> = assets.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ordered, vec!["c", "a", "b"]);
    }

    #[test]
    fn folder_filter_is_forwarded_in_queries() {
        let mut store = GalleryStore::new(5, Some("/assets".to_owned()));
        assert_eq!(store.begin_initial().query.path.as_deref(), Some("/assets"));

        let mut blank = GalleryStore::new(5, Some(" ".to_owned()));
        assert_eq!(blank.begin_initial().query.path, None);
    }

    #[test]
    fn bounds_page_size_for_safety() {
        assert_eq!(GalleryStore::bounded_page_size(0, 1_000), 1);
        assert_eq!(GalleryStore::bounded_page_size(25, 10), 10);
        assert_eq!(GalleryStore::bounded_page_size(5_000, 1_000), 1_000);
    }
}
