use crate::fetch::{HttpEndpoint, HttpFetcher};
use crate::hass::HomeAssistant;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct StreamInfo {
    #[serde(default)]
    producers: Vec<Producer>,
}

#[derive(Debug, Deserialize)]
struct Producer {
    #[serde(default)]
    medias: Vec<String>,
}

/// Stream metadata endpoint for a go2rtc server reachable through Home Assistant
pub fn streams_endpoint(base_url: &str, stream: &str) -> HttpEndpoint {
    HttpEndpoint::signed(format!(
        "{}/api/streams?src={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(stream)
    ))
}

/// True if go2rtc reports an audio backchannel for the stream. Any failure
/// means "not supported".
pub async fn detect_two_way_audio(
    hass: &dyn HomeAssistant,
    fetcher: &HttpFetcher,
    base_url: &str,
    stream: &str,
) -> bool {
    let endpoint = streams_endpoint(base_url, stream);
    match fetcher.fetch_json::<StreamInfo>(hass, &endpoint).await {
        Ok(info) => supports_two_way_audio(&info),
        Err(e) => {
            debug!("[go2rtc] 2-way audio check for {} failed: {}", stream, e);
            false
        }
    }
}

fn supports_two_way_audio(info: &StreamInfo) -> bool {
    info.producers.iter().any(|producer| {
        producer
            .medias
            .iter()
            .any(|media| media.contains("audio") && media.contains("sendonly"))
    })
}
