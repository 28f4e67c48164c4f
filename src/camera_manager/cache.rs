use super::types::{
    CameraQuery, EngineResult, EventPayload, MediaMetadata, Recording, RecordingSegment, Review,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Values the request cache can hold
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResult {
    Events(EngineResult<EventPayload>),
    Recordings(EngineResult<Vec<Recording>>),
    Reviews(EngineResult<Vec<Review>>),
    Segments(EngineResult<Vec<RecordingSegment>>),
    MediaMetadata(EngineResult<MediaMetadata>),
}

impl CachedResult {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        match self {
            CachedResult::Events(r) => r.expiry,
            CachedResult::Recordings(r) => r.expiry,
            CachedResult::Reviews(r) => r.expiry,
            CachedResult::Segments(r) => r.expiry,
            CachedResult::MediaMetadata(r) => r.expiry,
        }
    }
}

/// Conversion between typed results and the cache's storage enum
pub trait Cacheable: Sized {
    fn into_cached(self) -> CachedResult;
    fn from_cached(cached: CachedResult) -> Option<Self>;
}

macro_rules! cacheable {
    ($ty:ty, $variant:ident) => {
        impl Cacheable for EngineResult<$ty> {
            fn into_cached(self) -> CachedResult {
                CachedResult::$variant(self)
            }

            fn from_cached(cached: CachedResult) -> Option<Self> {
                match cached {
                    CachedResult::$variant(result) => Some(result),
                    _ => None,
                }
            }
        }
    };
}

cacheable!(EventPayload, Events);
cacheable!(Vec<Recording>, Recordings);
cacheable!(Vec<Review>, Reviews);
cacheable!(Vec<RecordingSegment>, Segments);
cacheable!(MediaMetadata, MediaMetadata);

/// Expiring query result cache shared by the engines of one camera manager
#[derive(Default)]
pub struct RequestCache {
    entries: Mutex<HashMap<CameraQuery, CachedResult>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh cached result, marked as `cached`. Expired entries are evicted.
    pub fn get<T>(&self, query: &CameraQuery) -> Option<EngineResult<T>>
    where
        EngineResult<T>: Cacheable,
    {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get(query)?.clone();
        if entry.expiry().is_some_and(|expiry| expiry <= Utc::now()) {
            entries.remove(query);
            return None;
        }
        let mut result = EngineResult::<T>::from_cached(entry)?;
        result.cached = true;
        Some(result)
    }

    pub fn set<T>(&self, query: CameraQuery, result: EngineResult<T>)
    where
        EngineResult<T>: Cacheable,
    {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(query, result.into_cached());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[derive(Default)]
struct CameraSegments {
    /// Sorted, non-overlapping time ranges that have been fetched
    coverage: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    segments: HashMap<String, RecordingSegment>,
}

impl CameraSegments {
    fn add_coverage(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.coverage.push((start, end));
        self.coverage.sort_by_key(|(start, _)| *start);

        let mut merged: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::new();
        for (start, end) in self.coverage.drain(..) {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        self.coverage = merged;
    }

    fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.coverage.iter().any(|(s, e)| *s <= start && end <= *e)
    }
}

/// Recording segments per camera plus the time ranges already fetched
#[derive(Default)]
pub struct RecordingSegmentsCache {
    cameras: Mutex<HashMap<String, CameraSegments>>,
}

impl RecordingSegmentsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_coverage(&self, camera_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.cameras
            .lock()
            .map(|cameras| cameras.get(camera_id).is_some_and(|c| c.covers(start, end)))
            .unwrap_or(false)
    }

    pub fn add(
        &self,
        camera_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        segments: Vec<RecordingSegment>,
    ) {
        if let Ok(mut cameras) = self.cameras.lock() {
            let camera = cameras.entry(camera_id.to_string()).or_default();
            for segment in segments {
                camera.segments.insert(segment.id.clone(), segment);
            }
            camera.add_coverage(start, end);
        }
    }

    /// Cached segments overlapping the range, sorted by start time. `None` if the
    /// range has not been fully fetched.
    pub fn get(
        &self,
        camera_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Vec<RecordingSegment>> {
        let cameras = self.cameras.lock().ok()?;
        let camera = cameras.get(camera_id)?;
        if !camera.covers(start, end) {
            return None;
        }
        let mut segments: Vec<RecordingSegment> = camera
            .segments
            .values()
            .filter(|s| s.start_time < end && s.end_time > start)
            .cloned()
            .collect();
        segments.sort_by_key(|s| s.start_time);
        Some(segments)
    }

    pub fn clear(&self) {
        if let Ok(mut cameras) = self.cameras.lock() {
            cameras.clear();
        }
    }
}
