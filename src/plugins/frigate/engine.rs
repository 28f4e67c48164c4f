use super::camera::{frigate_api_base, FrigateCamera};
use super::event_watcher::FrigateEventWatcher;
use super::types::{
    decode_json_payload, timestamp_to_datetime, FrigateEvent, FrigateEventSummary,
    FrigateRecordingDay, FrigateRecordingSegment, FrigateReview,
};
use crate::camera_manager::cache::{Cacheable, RecordingSegmentsCache, RequestCache};
use crate::camera_manager::camera::Camera;
use crate::camera_manager::engine::{camera_metadata_from_config, CameraManagerEngine};
use crate::camera_manager::factory::EngineCollaborators;
use crate::camera_manager::store::CameraManagerReadOnlyConfigStore;
use crate::camera_manager::types::{
    CameraEventCallback, CameraIds, CameraMetadata, CameraQuery, Engine, EngineOptions,
    EngineResult, EventPayload, EventQuery, MediaCapabilities, MediaMetadata, MediaMetadataQuery,
    QueryMaxAge, QueryReturn, Recording, RecordingQuery, RecordingSegment, RecordingSegmentsQuery,
    Review, ReviewQuery, ReviewSeverity,
};
use crate::error::{Error, Result};
use crate::fetch::{HttpEndpoint, HttpFetcher};
use crate::hass::{EntityRegistry, HomeAssistant};
use crate::models::CameraConfig;
use crate::view::media::{MediaType, ViewItem, ViewMedia};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

const RESULT_MAX_AGE: QueryMaxAge = QueryMaxAge::Seconds(60);
const ENGINE_ICON: &str = "frigate";

/// Identity of a physical recording: the same Frigate camera seen through
/// several (zone-scoped) card cameras yields the same ID.
pub fn get_recording_id(config: &CameraConfig, recording: &Recording) -> String {
    format!(
        "{}/{}/{}/{}",
        config.frigate.client_id,
        config.frigate.camera_name.as_deref().unwrap_or_default(),
        recording.start_time.timestamp(),
        recording.end_time.timestamp()
    )
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn event_title(event: &FrigateEvent) -> String {
    let label = capitalize(&event.label);
    match event.top_score {
        Some(score) => format!("{} {}%", label, (score * 100.0).round()),
        None => label,
    }
}

fn set_of(values: &[String]) -> Option<BTreeSet<String>> {
    (!values.is_empty()).then(|| values.iter().cloned().collect())
}

/// True if a camera's zone and label filters accept an object
fn filters_match(config: &CameraConfig, zones: &[String], label: Option<&str>) -> bool {
    let zone_ok = config.frigate.zones.is_empty()
        || config.frigate.zones.iter().any(|zone| zones.contains(zone));
    let label_ok = config.frigate.labels.is_empty()
        || label.is_some_and(|label| config.frigate.labels.iter().any(|l| l == label));
    zone_ok && label_ok
}

/// A card camera together with the Frigate camera behind it
struct FrigateTarget {
    camera_id: String,
    config: Arc<CameraConfig>,
    camera_name: String,
}

fn targets(store: &dyn CameraManagerReadOnlyConfigStore, camera_ids: &CameraIds) -> Vec<FrigateTarget> {
    camera_ids
        .iter()
        .filter_map(|id| {
            let config = store.get_camera_config(id)?;
            let camera_name = config.frigate.camera_name.clone()?;
            Some(FrigateTarget {
                camera_id: id.clone(),
                config,
                camera_name,
            })
        })
        .collect()
}

fn targets_by_instance(
    store: &dyn CameraManagerReadOnlyConfigStore,
    camera_ids: &CameraIds,
) -> BTreeMap<String, Vec<FrigateTarget>> {
    let mut instances: BTreeMap<String, Vec<FrigateTarget>> = BTreeMap::new();
    for target in targets(store, camera_ids) {
        instances
            .entry(target.config.frigate.client_id.clone())
            .or_default()
            .push(target);
    }
    instances
}

/// Cameras that can share one request: same instance and same filters.
fn filter_groups(
    store: &dyn CameraManagerReadOnlyConfigStore,
    camera_ids: &CameraIds,
) -> Vec<(CameraIds, Vec<String>, Vec<String>)> {
    let mut groups: BTreeMap<(String, Vec<String>, Vec<String>), CameraIds> = BTreeMap::new();
    for target in targets(store, camera_ids) {
        let mut zones = target.config.frigate.zones.clone();
        let mut labels = target.config.frigate.labels.clone();
        zones.sort();
        labels.sort();
        groups
            .entry((target.config.frigate.client_id.clone(), zones, labels))
            .or_default()
            .insert(target.camera_id);
    }
    groups
        .into_iter()
        .map(|((_, zones, labels), ids)| (ids, zones, labels))
        .collect()
}

/// Find the card camera an object belongs to, among the cameras of a query.
fn camera_for_object(
    store: &dyn CameraManagerReadOnlyConfigStore,
    camera_ids: &CameraIds,
    camera_name: &str,
    zones: &[String],
    label: Option<&str>,
) -> Option<String> {
    targets(store, camera_ids)
        .into_iter()
        .find(|target| target.camera_name == camera_name && filters_match(&target.config, zones, label))
        .map(|target| target.camera_id)
}

async fn request<T: DeserializeOwned>(hass: &dyn HomeAssistant, message: Value) -> Result<T> {
    let message_type = message["type"].as_str().unwrap_or_default().to_string();
    let response = hass.send_message(message).await?;
    let value = decode_json_payload(response)?;
    serde_json::from_value(value)
        .map_err(|e| Error::InvalidResponse(format!("{}: {}", message_type, e)))
}

/// Results from the instances that answered. Only when none did is the
/// last failure returned.
fn partial_output<Q, T>(output: QueryReturn<Q, T>, failure: Option<Error>) -> Result<Option<QueryReturn<Q, T>>> {
    match failure {
        Some(e) if output.is_empty() => Err(e),
        _ => Ok(Some(output)),
    }
}

fn events_request(instance_id: &str, camera_names: &[String], query: &EventQuery) -> Value {
    let mut message = json!({
        "type": "frigate/events/get",
        "instance_id": instance_id,
        "cameras": camera_names,
    });
    if let Some(limit) = query.limit {
        message["limit"] = json!(limit);
    }
    if let Some(has_clip) = query.has_clip {
        message["has_clip"] = json!(has_clip);
    }
    if let Some(has_snapshot) = query.has_snapshot {
        message["has_snapshot"] = json!(has_snapshot);
    }
    if let Some(favorite) = query.favorite {
        message["favorites"] = json!(favorite);
    }
    if let Some(start) = query.start {
        message["after"] = json!(start.timestamp());
    }
    if let Some(end) = query.end {
        message["before"] = json!(end.timestamp());
    }
    if let Some(what) = &query.what {
        message["labels"] = json!(what);
    }
    if let Some(zones) = &query.r#where {
        message["zones"] = json!(zones);
    }
    if let Some(tags) = &query.tags {
        message["sub_labels"] = json!(tags);
    }
    message
}

fn reviews_request(instance_id: &str, camera_names: &[String], query: &ReviewQuery) -> Value {
    let mut message = json!({
        "type": "frigate/reviews/get",
        "instance_id": instance_id,
        "cameras": camera_names,
    });
    if let Some(limit) = query.limit {
        message["limit"] = json!(limit);
    }
    if let Some(reviewed) = query.reviewed {
        message["reviewed"] = json!(reviewed);
    }
    if let Some(severity) = query.severity {
        message["severity"] = json!(severity);
    }
    if let Some(start) = query.start {
        message["after"] = json!(start.timestamp());
    }
    if let Some(end) = query.end {
        message["before"] = json!(end.timestamp());
    }
    if let Some(what) = &query.what {
        message["labels"] = json!(what);
    }
    if let Some(zones) = &query.r#where {
        message["zones"] = json!(zones);
    }
    message
}

fn to_review(review: FrigateReview) -> Option<Review> {
    let severity: ReviewSeverity = match serde_json::from_value(json!(review.severity)) {
        Ok(severity) => severity,
        Err(_) => {
            debug!("[FrigateEngine] Skipping review {} with severity '{}'", review.id, review.severity);
            return None;
        }
    };
    Some(Review {
        start_time: timestamp_to_datetime(review.start_time)?,
        end_time: review.end_time.and_then(timestamp_to_datetime),
        id: review.id,
        camera: review.camera,
        severity,
        reviewed: review.has_been_reviewed,
        thumb_path: review.thumb_path,
        labels: review.data.objects,
        zones: review.data.zones,
        sub_labels: review.data.sub_labels,
    })
}

/// Hour buckets of a recordings summary as recordings
fn recordings_from_summary(camera_id: &str, days: &[FrigateRecordingDay]) -> Vec<Recording> {
    days.iter()
        .filter_map(|day| {
            let date = NaiveDate::parse_from_str(&day.day, "%Y-%m-%d").ok()?;
            Some((date, day))
        })
        .flat_map(|(date, day)| {
            day.hours.iter().filter_map(move |bucket| {
                let hour: u32 = bucket.hour.parse().ok()?;
                let start = date.and_hms_opt(hour, 0, 0)?.and_utc();
                Some(Recording {
                    camera_id: camera_id.to_string(),
                    start_time: start,
                    end_time: start + Duration::hours(1),
                    events: bucket.events,
                })
            })
        })
        .collect()
}

fn in_range(start: DateTime<Utc>, end: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |from| end >= from) && to.map_or(true, |to| start <= to)
}

/// Seconds of recorded footage between `start` and `target`, skipping gaps.
pub fn seek_time_across_segments(
    segments: &[RecordingSegment],
    start: DateTime<Utc>,
    target: DateTime<Utc>,
) -> f64 {
    segments
        .iter()
        .map(|segment| {
            let from = segment.start_time.max(start);
            let to = segment.end_time.min(target);
            if to > from {
                (to - from).num_milliseconds() as f64 / 1000.0
            } else {
                0.0
            }
        })
        .sum()
}

/// Frigate: events, recordings, reviews, segments and metadata over the
/// Home Assistant WebSocket API.
pub struct FrigateCameraManagerEngine {
    registry: Arc<dyn EntityRegistry>,
    fetcher: Arc<HttpFetcher>,
    watcher: Arc<FrigateEventWatcher>,
    event_callback: Option<CameraEventCallback>,
    request_cache: Arc<RequestCache>,
    segments_cache: Arc<RecordingSegmentsCache>,
}

impl FrigateCameraManagerEngine {
    pub fn new(collaborators: &EngineCollaborators) -> Self {
        FrigateCameraManagerEngine {
            registry: collaborators.entity_registry.clone(),
            fetcher: collaborators.fetcher.clone(),
            watcher: collaborators.frigate_watcher.clone(),
            event_callback: collaborators.event_callback.clone(),
            request_cache: collaborators.request_cache.clone(),
            segments_cache: collaborators.segments_cache.clone(),
        }
    }

    fn cached<T>(&self, query: &CameraQuery, options: EngineOptions) -> Option<EngineResult<T>>
    where
        EngineResult<T>: Cacheable,
    {
        options
            .use_cache
            .then(|| self.request_cache.get::<T>(query))
            .flatten()
    }

    fn finish<T: Clone>(&self, query: CameraQuery, payload: T, options: EngineOptions) -> EngineResult<T>
    where
        EngineResult<T>: Cacheable,
    {
        let max_age = self.get_query_result_max_age(&query);
        let mut result = EngineResult::new(Engine::Frigate, payload);
        result.expiry = max_age.and_then(|age| age.expiry_from(Utc::now()));
        if options.use_cache && max_age.is_some() {
            self.request_cache.set(query, result.clone());
        }
        result
    }

    async fn fetch_segments(
        &self,
        hass: &dyn HomeAssistant,
        target: &FrigateTarget,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: EngineOptions,
    ) -> Result<Vec<RecordingSegment>> {
        if options.use_cache {
            if let Some(segments) = self.segments_cache.get(&target.camera_id, start, end) {
                return Ok(segments);
            }
        }

        let raw: Vec<FrigateRecordingSegment> = request(
            hass,
            json!({
                "type": "frigate/recordings/get",
                "instance_id": target.config.frigate.client_id,
                "camera": target.camera_name,
                "after": start.timestamp(),
                "before": end.timestamp(),
            }),
        )
        .await?;

        let mut segments: Vec<RecordingSegment> = raw
            .into_iter()
            .filter_map(|segment| {
                Some(RecordingSegment {
                    start_time: timestamp_to_datetime(segment.start_time)?,
                    end_time: timestamp_to_datetime(segment.end_time)?,
                    id: segment.id,
                })
            })
            .collect();
        segments.sort_by_key(|s| s.start_time);

        if options.use_cache {
            self.segments_cache
                .add(&target.camera_id, start, end, segments.clone());
        }
        Ok(segments)
    }
}

#[async_trait]
impl CameraManagerEngine for FrigateCameraManagerEngine {
    fn engine_type(&self) -> Engine {
        Engine::Frigate
    }

    async fn create_camera(&self, hass: &dyn HomeAssistant, config: CameraConfig) -> Result<Arc<dyn Camera>> {
        let camera = FrigateCamera::new(
            config,
            self.registry.clone(),
            self.fetcher.clone(),
            self.watcher.clone(),
            self.event_callback.clone(),
        )?;
        camera.initialize(hass).await?;
        Ok(Arc::new(camera))
    }

    fn generate_default_event_query(
        &self,
        store: &dyn CameraManagerReadOnlyConfigStore,
        camera_ids: &CameraIds,
        query: &EventQuery,
    ) -> Option<Vec<EventQuery>> {
        let groups = filter_groups(store, camera_ids);
        if groups.is_empty() {
            return None;
        }
        Some(
            groups
                .into_iter()
                .map(|(ids, zones, labels)| EventQuery {
                    camera_ids: ids,
                    what: query.what.clone().or_else(|| set_of(&labels)),
                    r#where: query.r#where.clone().or_else(|| set_of(&zones)),
                    ..query.clone()
                })
                .collect(),
        )
    }

    fn generate_default_recording_query(
        &self,
        store: &dyn CameraManagerReadOnlyConfigStore,
        camera_ids: &CameraIds,
        query: &RecordingQuery,
    ) -> Option<Vec<RecordingQuery>> {
        let queries: Vec<RecordingQuery> = targets(store, camera_ids)
            .into_iter()
            .map(|target| RecordingQuery {
                camera_ids: [target.camera_id].into(),
                ..query.clone()
            })
            .collect();
        (!queries.is_empty()).then_some(queries)
    }

    fn generate_default_review_query(
        &self,
        store: &dyn CameraManagerReadOnlyConfigStore,
        camera_ids: &CameraIds,
        query: &ReviewQuery,
    ) -> Option<Vec<ReviewQuery>> {
        let groups = filter_groups(store, camera_ids);
        if groups.is_empty() {
            return None;
        }
        Some(
            groups
                .into_iter()
                .map(|(ids, zones, labels)| ReviewQuery {
                    camera_ids: ids,
                    what: query.what.clone().or_else(|| set_of(&labels)),
                    r#where: query.r#where.clone().or_else(|| set_of(&zones)),
                    ..query.clone()
                })
                .collect(),
        )
    }

    fn generate_default_recording_segments_query(
        &self,
        store: &dyn CameraManagerReadOnlyConfigStore,
        camera_ids: &CameraIds,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Vec<RecordingSegmentsQuery>> {
        let queries: Vec<RecordingSegmentsQuery> = targets(store, camera_ids)
            .into_iter()
            .map(|target| RecordingSegmentsQuery {
                camera_ids: [target.camera_id].into(),
                start,
                end,
            })
            .collect();
        (!queries.is_empty()).then_some(queries)
    }

    async fn get_events(
        &self,
        hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        query: &EventQuery,
        options: EngineOptions,
    ) -> Result<Option<QueryReturn<EventQuery, EventPayload>>> {
        let mut output = Vec::new();
        let mut failure = None;

        for (instance_id, targets) in targets_by_instance(store, &query.camera_ids) {
            let instance_query = EventQuery {
                camera_ids: targets.iter().map(|t| t.camera_id.clone()).collect(),
                ..query.clone()
            };
            let key = CameraQuery::Event(instance_query.clone());
            if let Some(cached) = self.cached::<EventPayload>(&key, options) {
                output.push((instance_query, cached));
                continue;
            }

            let camera_names: Vec<String> = targets
                .iter()
                .map(|t| t.camera_name.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            debug!(
                "[FrigateEngine] Fetching events from {} for {:?}",
                instance_id, camera_names
            );
            let mut events: Vec<FrigateEvent> =
                match request(hass, events_request(&instance_id, &camera_names, &instance_query)).await {
                    Ok(events) => events,
                    Err(e) => {
                        warn!("[FrigateEngine] Events from {} unavailable: {}", instance_id, e);
                        failure = Some(e);
                        continue;
                    }
                };
            events.sort_by(|a, b| b.start_time.total_cmp(&a.start_time));

            let result = self.finish(key, EventPayload::Frigate(events), options);
            output.push((instance_query, result));
        }

        partial_output(output, failure)
    }

    async fn get_recordings(
        &self,
        hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        query: &RecordingQuery,
        options: EngineOptions,
    ) -> Result<Option<QueryReturn<RecordingQuery, Vec<Recording>>>> {
        let key = CameraQuery::Recording(query.clone());
        if let Some(cached) = self.cached::<Vec<Recording>>(&key, options) {
            return Ok(Some(vec![(query.clone(), cached)]));
        }

        let mut recordings = Vec::new();
        let mut fetched = false;
        let mut failure = None;
        for target in targets(store, &query.camera_ids) {
            let days: Vec<FrigateRecordingDay> = match request(
                hass,
                json!({
                    "type": "frigate/recordings/summary",
                    "instance_id": target.config.frigate.client_id,
                    "camera": target.camera_name,
                    "timezone": "UTC",
                }),
            )
            .await
            {
                Ok(days) => days,
                Err(e) => {
                    warn!(
                        "[FrigateEngine] Recordings for {} unavailable: {}",
                        target.camera_id, e
                    );
                    failure = Some(e);
                    continue;
                }
            };
            fetched = true;
            recordings.extend(
                recordings_from_summary(&target.camera_id, &days)
                    .into_iter()
                    .filter(|r| in_range(r.start_time, r.end_time, query.start, query.end)),
            );
        }

        if let (false, Some(e)) = (fetched, failure) {
            return Err(e);
        }

        recordings.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        if let Some(limit) = query.limit {
            recordings.truncate(limit);
        }

        let result = self.finish(key, recordings, options);
        Ok(Some(vec![(query.clone(), result)]))
    }

    async fn get_reviews(
        &self,
        hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        query: &ReviewQuery,
        options: EngineOptions,
    ) -> Result<Option<QueryReturn<ReviewQuery, Vec<Review>>>> {
        let mut output = Vec::new();
        let mut failure = None;

        for (instance_id, targets) in targets_by_instance(store, &query.camera_ids) {
            let instance_query = ReviewQuery {
                camera_ids: targets.iter().map(|t| t.camera_id.clone()).collect(),
                ..query.clone()
            };
            let key = CameraQuery::Review(instance_query.clone());
            if let Some(cached) = self.cached::<Vec<Review>>(&key, options) {
                output.push((instance_query, cached));
                continue;
            }

            let camera_names: Vec<String> = targets
                .iter()
                .map(|t| t.camera_name.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let raw: Vec<FrigateReview> =
                match request(hass, reviews_request(&instance_id, &camera_names, &instance_query)).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("[FrigateEngine] Reviews from {} unavailable: {}", instance_id, e);
                        failure = Some(e);
                        continue;
                    }
                };
            let mut reviews: Vec<Review> = raw.into_iter().filter_map(to_review).collect();
            reviews.sort_by(|a, b| b.start_time.cmp(&a.start_time));

            let result = self.finish(key, reviews, options);
            output.push((instance_query, result));
        }

        partial_output(output, failure)
    }

    async fn get_recording_segments(
        &self,
        hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        query: &RecordingSegmentsQuery,
        options: EngineOptions,
    ) -> Result<Option<QueryReturn<RecordingSegmentsQuery, Vec<RecordingSegment>>>> {
        let mut output = Vec::new();
        let mut failure = None;
        for target in targets(store, &query.camera_ids) {
            let segments = match self
                .fetch_segments(hass, &target, query.start, query.end, options)
                .await
            {
                Ok(segments) => segments,
                Err(e) => {
                    warn!(
                        "[FrigateEngine] Recording segments for {} unavailable: {}",
                        target.camera_id, e
                    );
                    failure = Some(e);
                    continue;
                }
            };
            let camera_query = RecordingSegmentsQuery {
                camera_ids: [target.camera_id.clone()].into(),
                start: query.start,
                end: query.end,
            };
            let mut result = EngineResult::new(Engine::Frigate, segments);
            result.expiry = RESULT_MAX_AGE.expiry_from(Utc::now());
            output.push((camera_query, result));
        }
        partial_output(output, failure)
    }

    fn generate_media_from_events(
        &self,
        _hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        query: &EventQuery,
        results: &EngineResult<EventPayload>,
    ) -> Option<Vec<ViewItem>> {
        let EventPayload::Frigate(events) = &results.payload else {
            return None;
        };

        let mut items = Vec::new();
        for event in events {
            let Some(camera_id) =
                camera_for_object(store, &query.camera_ids, &event.camera, &event.zones, Some(event.label.as_str()))
            else {
                continue;
            };
            let Some(config) = store.get_camera_config(&camera_id) else {
                continue;
            };

            let media_type = if query.has_clip == Some(true) {
                if !event.has_clip {
                    continue;
                }
                MediaType::Clip
            } else if query.has_snapshot == Some(true) || !event.has_clip {
                MediaType::Snapshot
            } else {
                MediaType::Clip
            };

            let client_id = &config.frigate.client_id;
            let folder = if media_type == MediaType::Clip { "clips" } else { "snapshots" };

            let mut media = ViewMedia::new(event.id.clone(), camera_id, media_type)
                .with_times(
                    timestamp_to_datetime(event.start_time),
                    event.end_time.and_then(timestamp_to_datetime),
                )
                .with_title(event_title(event))
                .with_thumbnail(Some(format!("{}/thumbnail/{}", frigate_api_base(client_id), event.id)))
                .with_content_id(format!(
                    "media-source://frigate/{}/event/{}/{}/{}",
                    client_id, folder, event.camera, event.id
                ));
            media.favorite = Some(event.retain_indefinitely);
            media.what = vec![event.label.clone()];
            media.r#where = event.zones.clone();
            media.tags = event.sub_label.iter().cloned().collect();
            media.score = event.top_score;
            items.push(ViewItem::Event(media));
        }
        Some(items)
    }

    fn generate_media_from_recordings(
        &self,
        hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        _query: &RecordingQuery,
        results: &EngineResult<Vec<Recording>>,
    ) -> Option<Vec<ViewItem>> {
        Some(
            results
                .payload
                .iter()
                .filter_map(|recording| {
                    let config = store.get_camera_config(&recording.camera_id)?;
                    let camera_name = config.frigate.camera_name.as_deref()?;
                    let title = camera_metadata_from_config(hass, &config, None).title;

                    let media = ViewMedia::new(
                        get_recording_id(&config, recording),
                        recording.camera_id.clone(),
                        MediaType::Recording,
                    )
                    .with_times(Some(recording.start_time), Some(recording.end_time))
                    .with_title(format!("{} {}", title, recording.start_time.format("%Y-%m-%d %H:%M")))
                    .with_content_id(format!(
                        "media-source://frigate/{}/recordings/{}/{}/{}",
                        config.frigate.client_id,
                        camera_name,
                        recording.start_time.format("%Y-%m-%d"),
                        recording.start_time.format("%H"),
                    ));
                    Some(ViewItem::Recording(media))
                })
                .collect(),
        )
    }

    fn generate_media_from_reviews(
        &self,
        _hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        query: &ReviewQuery,
        results: &EngineResult<Vec<Review>>,
    ) -> Option<Vec<ViewItem>> {
        let mut items = Vec::new();
        for review in &results.payload {
            let label = review.labels.first().map(String::as_str);
            let Some(camera_id) =
                camera_for_object(store, &query.camera_ids, &review.camera, &review.zones, label)
            else {
                continue;
            };
            let Some(config) = store.get_camera_config(&camera_id) else {
                continue;
            };

            let severity = json!(review.severity).as_str().unwrap_or_default().to_string();
            let objects: Vec<String> = review.labels.iter().map(|l| capitalize(l)).collect();
            let thumbnail = review
                .thumb_path
                .as_deref()
                .and_then(|path| path.rsplit('/').next())
                .map(|file| format!("{}/clips/review/{}", frigate_api_base(&config.frigate.client_id), file));

            let mut media = ViewMedia::new(review.id.clone(), camera_id, MediaType::Review)
                .with_times(Some(review.start_time), review.end_time)
                .with_title(format!("{}: {}", capitalize(&severity.replace('_', " ")), objects.join(", ")))
                .with_thumbnail(thumbnail);
            media.reviewed = Some(review.reviewed);
            media.severity = Some(severity);
            media.what = review.labels.clone();
            media.r#where = review.zones.clone();
            media.tags = review.sub_labels.clone();
            items.push(ViewItem::Review(media));
        }
        Some(items)
    }

    async fn get_media_download_path(
        &self,
        _hass: &dyn HomeAssistant,
        camera: &CameraConfig,
        media: &ViewMedia,
    ) -> Result<Option<HttpEndpoint>> {
        let base = frigate_api_base(&camera.frigate.client_id);
        let path = match media.media_type {
            MediaType::Clip => format!("{}/notifications/{}/clip.mp4", base, media.id),
            MediaType::Snapshot => format!("{}/notifications/{}/snapshot.jpg", base, media.id),
            MediaType::Recording | MediaType::Review => {
                let (Some(camera_name), Some(start)) = (camera.frigate.camera_name.as_deref(), media.start_time)
                else {
                    return Ok(None);
                };
                let end = media.end_time.unwrap_or_else(Utc::now);
                format!(
                    "{}/recording/{}/start/{}/end/{}",
                    base,
                    camera_name,
                    start.timestamp(),
                    end.timestamp()
                )
            }
        };
        Ok(Some(HttpEndpoint::signed(path)))
    }

    async fn favorite_media(
        &self,
        hass: &dyn HomeAssistant,
        camera: &CameraConfig,
        media: &ViewMedia,
        favorite: bool,
    ) -> Result<()> {
        if !matches!(media.media_type, MediaType::Clip | MediaType::Snapshot) {
            return Ok(());
        }
        hass.send_message(json!({
            "type": "frigate/event/retain",
            "instance_id": camera.frigate.client_id,
            "event_id": media.id,
            "retain": favorite,
        }))
        .await?;
        self.request_cache.clear();
        Ok(())
    }

    async fn review_media(
        &self,
        hass: &dyn HomeAssistant,
        camera: &CameraConfig,
        media: &ViewMedia,
        reviewed: bool,
    ) -> Result<()> {
        if media.media_type != MediaType::Review {
            return Ok(());
        }
        hass.send_message(json!({
            "type": "frigate/reviews/set",
            "instance_id": camera.frigate.client_id,
            "review_ids": [media.id],
            "reviewed": reviewed,
        }))
        .await?;
        self.request_cache.clear();
        Ok(())
    }

    async fn get_media_seek_time(
        &self,
        hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        media: &ViewMedia,
        target: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let Some(start) = media.start_time else {
            return Ok(None);
        };
        if !media.includes_time(target) {
            return Ok(None);
        }

        let camera_ids: CameraIds = [media.camera_id.clone()].into();
        let Some(target_camera) = targets(store, &camera_ids).into_iter().next() else {
            return Ok(None);
        };
        let end = media.end_time.unwrap_or(target);
        let segments = self
            .fetch_segments(hass, &target_camera, start, end, EngineOptions::default())
            .await?;
        Ok(Some(seek_time_across_segments(&segments, start, target)))
    }

    async fn get_media_metadata(
        &self,
        hass: &dyn HomeAssistant,
        store: &dyn CameraManagerReadOnlyConfigStore,
        query: &MediaMetadataQuery,
        _options: EngineOptions,
    ) -> Result<Option<QueryReturn<MediaMetadataQuery, MediaMetadata>>> {
        let mut metadata = MediaMetadata::default();

        for (instance_id, targets) in targets_by_instance(store, &query.camera_ids) {
            let camera_names: BTreeSet<&str> = targets.iter().map(|t| t.camera_name.as_str()).collect();
            let summary: Vec<FrigateEventSummary> = request(
                hass,
                json!({ "type": "frigate/events/summary", "instance_id": instance_id }),
            )
            .await?;

            for entry in summary.iter().filter(|e| camera_names.contains(e.camera.as_str())) {
                metadata.what.insert(entry.label.clone());
                metadata.r#where.extend(entry.zones.iter().cloned());
                metadata.tags.extend(entry.sub_label.iter().cloned());
                if let Ok(day) = NaiveDate::parse_from_str(&entry.day, "%Y-%m-%d") {
                    metadata.days.insert(day);
                }
            }

            for target in &targets {
                let days: Vec<FrigateRecordingDay> = match request(
                    hass,
                    json!({
                        "type": "frigate/recordings/summary",
                        "instance_id": instance_id,
                        "camera": target.camera_name,
                        "timezone": "UTC",
                    }),
                )
                .await
                {
                    Ok(days) => days,
                    Err(e) => {
                        warn!("[FrigateEngine] Recordings summary for {} failed: {}", target.camera_id, e);
                        continue;
                    }
                };
                metadata.days.extend(
                    days.iter()
                        .filter_map(|d| NaiveDate::parse_from_str(&d.day, "%Y-%m-%d").ok()),
                );
            }
        }

        let result = EngineResult::new(Engine::Frigate, metadata);
        Ok(Some(vec![(query.clone(), result)]))
    }

    fn get_camera_metadata(&self, hass: &dyn HomeAssistant, config: &CameraConfig) -> CameraMetadata {
        camera_metadata_from_config(hass, config, Some(ENGINE_ICON))
    }

    fn get_media_capabilities(&self, media: &ViewMedia) -> Option<MediaCapabilities> {
        Some(match media.media_type {
            MediaType::Clip | MediaType::Snapshot => MediaCapabilities {
                can_favorite: true,
                can_download: true,
            },
            MediaType::Recording | MediaType::Review => MediaCapabilities {
                can_favorite: false,
                can_download: true,
            },
        })
    }

    fn get_query_result_max_age(&self, query: &CameraQuery) -> Option<QueryMaxAge> {
        match query {
            CameraQuery::Event(event) if event.favorite == Some(true) => Some(QueryMaxAge::Unbounded),
            CameraQuery::Event(_)
            | CameraQuery::Recording(_)
            | CameraQuery::Review(_)
            | CameraQuery::RecordingSegments(_) => Some(RESULT_MAX_AGE),
            CameraQuery::MediaMetadata(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_manager::camera::CameraBase;
    use crate::camera_manager::store::CameraManagerStore;
    use crate::hass::EntityRegistryManager;
    use crate::testing::MockHomeAssistant;
    use chrono::TimeZone;

    struct StubCamera {
        base: CameraBase,
    }

    #[async_trait]
    impl Camera for StubCamera {
        fn base(&self) -> &CameraBase {
            &self.base
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        async fn initialize(&self, _hass: &dyn HomeAssistant) -> Result<()> {
            Ok(())
        }
    }

    fn frigate_config(id: &str, camera_name: &str, zones: &[&str]) -> CameraConfig {
        let mut config = CameraConfig {
            id: Some(id.to_string()),
            ..Default::default()
        };
        config.frigate.camera_name = Some(camera_name.to_string());
        config.frigate.zones = zones.iter().map(|z| z.to_string()).collect();
        config
    }

    fn store(configs: Vec<CameraConfig>) -> CameraManagerStore {
        let mut store = CameraManagerStore::new();
        for config in configs {
            store
                .add_camera(Arc::new(StubCamera {
                    base: CameraBase::new(config, Engine::Frigate).unwrap(),
                }))
                .unwrap();
        }
        store
    }

    fn engine() -> FrigateCameraManagerEngine {
        let collaborators = EngineCollaborators::new(Arc::new(EntityRegistryManager::new()));
        FrigateCameraManagerEngine::new(&collaborators)
    }

    fn time(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0).unwrap()
    }

    fn recording(camera_id: &str, start: DateTime<Utc>) -> Recording {
        Recording {
            camera_id: camera_id.to_string(),
            start_time: start,
            end_time: start + Duration::hours(1),
            events: 0,
        }
    }

    #[test]
    fn test_recording_id_ignores_card_camera() {
        let door = frigate_config("door", "front", &[]);
        let porch = frigate_config("porch", "front", &["porch"]);

        assert_eq!(
            get_recording_id(&door, &recording("door", time(10, 0))),
            get_recording_id(&porch, &recording("porch", time(10, 0)))
        );
        assert_ne!(
            get_recording_id(&door, &recording("door", time(10, 0))),
            get_recording_id(&door, &recording("door", time(11, 0)))
        );
    }

    #[test]
    fn test_seek_time_skips_gaps() {
        let segments = vec![
            RecordingSegment {
                id: "a".to_string(),
                start_time: time(10, 0),
                end_time: time(10, 10),
            },
            RecordingSegment {
                id: "b".to_string(),
                start_time: time(10, 20),
                end_time: time(10, 30),
            },
        ];
        assert_eq!(seek_time_across_segments(&segments, time(10, 5), time(10, 25)), 600.0);
    }

    #[test]
    fn test_default_event_queries_group_by_filters() {
        let store = store(vec![
            frigate_config("door", "front", &[]),
            frigate_config("yard", "back", &[]),
            frigate_config("porch", "front", &["porch"]),
        ]);
        let ids: CameraIds = ["door", "yard", "porch"].iter().map(|s| s.to_string()).collect();

        let queries = engine()
            .generate_default_event_query(&store, &ids, &EventQuery::default())
            .unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].camera_ids.len(), 2);
        assert_eq!(queries[1].r#where, Some(["porch".to_string()].into()));
    }

    #[test]
    fn test_max_age_by_query() {
        let engine = engine();
        let favorites = EventQuery {
            favorite: Some(true),
            ..Default::default()
        };
        assert_eq!(
            engine.get_query_result_max_age(&CameraQuery::Event(favorites)),
            Some(QueryMaxAge::Unbounded)
        );
        assert_eq!(
            engine.get_query_result_max_age(&CameraQuery::Event(EventQuery::default())),
            Some(QueryMaxAge::Seconds(60))
        );
        assert_eq!(
            engine.get_query_result_max_age(&CameraQuery::MediaMetadata(MediaMetadataQuery::default())),
            None
        );
    }

    #[tokio::test]
    async fn test_events_become_media_for_matching_zone_camera() {
        let hass = MockHomeAssistant::new().with_response(
            "frigate/events/get",
            json!(json!([
                {
                    "id": "1705312800.1-a", "camera": "front", "label": "person",
                    "start_time": 1705312800.1, "end_time": 1705312830.0,
                    "has_clip": true, "has_snapshot": true, "top_score": 0.84,
                    "zones": ["porch"], "retain_indefinitely": true
                },
                {
                    "id": "1705312700.1-b", "camera": "front", "label": "car",
                    "start_time": 1705312700.1, "end_time": 1705312730.0,
                    "has_clip": false, "has_snapshot": true, "zones": []
                }
            ])
            .to_string()),
        );
        let store = store(vec![frigate_config("porch", "front", &["porch"])]);
        let engine = engine();
        let query = EventQuery {
            camera_ids: ["porch".to_string()].into(),
            ..Default::default()
        };

        let results = engine
            .get_events(&hass, &store, &query, EngineOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(results.len(), 1);

        let items = engine
            .generate_media_from_events(&hass, &store, &results[0].0, &results[0].1)
            .unwrap();
        assert_eq!(items.len(), 1);
        let media = items[0].media().unwrap();
        assert_eq!(media.media_type, MediaType::Clip);
        assert_eq!(media.title.as_deref(), Some("Person 84%"));
        assert_eq!(media.favorite, Some(true));
        assert_eq!(
            media.content_id.as_deref(),
            Some("media-source://frigate/frigate/event/clips/front/1705312800.1-a")
        );

        // Second call is served from the request cache
        let again = engine
            .get_events(&hass, &store, &query, EngineOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(again[0].1.cached);
        assert_eq!(hass.sent_messages_of_type("frigate/events/get").len(), 1);
    }

    #[tokio::test]
    async fn test_failing_instance_does_not_hide_others() {
        let hass = MockHomeAssistant::new();
        hass.respond_with("frigate/events/get", |message| {
            if message["instance_id"] == "garage" {
                return Err(crate::error::HassError::Request {
                    code: "frigate_unavailable".to_string(),
                    message: "instance offline".to_string(),
                });
            }
            Ok(json!(json!([{
                "id": "1705312800.1-a", "camera": "front", "label": "person",
                "start_time": 1705312800.1, "end_time": 1705312830.0,
                "has_clip": true, "has_snapshot": true, "zones": []
            }])
            .to_string()))
        });

        let mut workshop = frigate_config("workshop", "bench", &[]);
        workshop.frigate.client_id = "garage".to_string();
        let store = store(vec![frigate_config("door", "front", &[]), workshop]);
        let engine = engine();

        let results = engine
            .get_events(
                &hass,
                &store,
                &EventQuery {
                    camera_ids: ["door".to_string(), "workshop".to_string()].into(),
                    ..Default::default()
                },
                EngineOptions::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.camera_ids, ["door".to_string()].into());
        assert_eq!(hass.sent_messages_of_type("frigate/events/get").len(), 2);

        // With every instance failing there is nothing to show but the error.
        let only_workshop = EventQuery {
            camera_ids: ["workshop".to_string()].into(),
            ..Default::default()
        };
        assert!(engine
            .get_events(&hass, &store, &only_workshop, EngineOptions::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_recordings_from_summary() {
        let hass = MockHomeAssistant::new().with_response(
            "frigate/recordings/summary",
            json!([{
                "day": "2024-01-15",
                "events": 3,
                "hours": [
                    {"hour": "10", "duration": 3600, "events": 2},
                    {"hour": "11", "duration": 1200, "events": 1}
                ]
            }]),
        );
        let store = store(vec![frigate_config("door", "front", &[])]);
        let engine = engine();
        let query = RecordingQuery {
            camera_ids: ["door".to_string()].into(),
            limit: Some(1),
            ..Default::default()
        };

        let results = engine
            .get_recordings(&hass, &store, &query, EngineOptions::default())
            .await
            .unwrap()
            .unwrap();
        let recordings = &results[0].1.payload;
        assert_eq!(recordings.len(), 1);
        assert_eq!(recordings[0].start_time, time(11, 0));
        assert_eq!(recordings[0].events, 1);

        let items = engine
            .generate_media_from_recordings(&hass, &store, &query, &results[0].1)
            .unwrap();
        assert_eq!(items[0].id(), format!("frigate/front/{}/{}", time(11, 0).timestamp(), time(12, 0).timestamp()));
    }

    #[tokio::test]
    async fn test_seek_time_uses_segments() {
        let hass = MockHomeAssistant::new().with_response(
            "frigate/recordings/get",
            json!([
                {"id": "a", "start_time": time(10, 0).timestamp() as f64, "end_time": time(10, 10).timestamp() as f64},
                {"id": "b", "start_time": time(10, 20).timestamp() as f64, "end_time": time(10, 40).timestamp() as f64}
            ]),
        );
        let store = store(vec![frigate_config("door", "front", &[])]);
        let engine = engine();
        let media = ViewMedia::new("rec", "door", MediaType::Recording)
            .with_times(Some(time(10, 0)), Some(time(11, 0)));

        let seek = engine
            .get_media_seek_time(&hass, &store, &media, time(10, 30))
            .await
            .unwrap();
        assert_eq!(seek, Some(1200.0));
        assert_eq!(
            engine
                .get_media_seek_time(&hass, &store, &media, time(12, 0))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_favorite_sends_retain() {
        let hass = MockHomeAssistant::new().with_response("frigate/event/retain", json!({}));
        let config = frigate_config("door", "front", &[]);
        let media = ViewMedia::new("1705312800.1-a", "door", MediaType::Clip);

        engine().favorite_media(&hass, &config, &media, true).await.unwrap();
        let sent = hass.sent_messages_of_type("frigate/event/retain");
        assert_eq!(sent[0]["event_id"], "1705312800.1-a");
        assert_eq!(sent[0]["retain"], true);
    }

    #[tokio::test]
    async fn test_download_path_is_signed() {
        let hass = MockHomeAssistant::new();
        let config = frigate_config("door", "front", &[]);
        let media = ViewMedia::new("abc", "door", MediaType::Snapshot);

        let endpoint = engine()
            .get_media_download_path(&hass, &config, &media)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(endpoint.endpoint, "/api/frigate/frigate/notifications/abc/snapshot.jpg");
        assert!(endpoint.sign);
    }
}
