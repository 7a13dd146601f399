//! Deployment descriptor overlay
//!
//! The descriptor is the JSON file a deployment drops next to the tool:
//!
//! ```json
//! {"analytics":{"plugins":{"awsClickstreamPlugin":{
//!     "appId":"...","endpoint":"...","isCompressEvents":true}}}}
//! ```
//!
//! The overlay is best-effort: a missing file, malformed JSON, or missing
//! keys are logged and the profile proceeds with its defaults. Resolution
//! never blocks a run.

use super::Profile;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Relative path probed when no descriptor path is given
pub const DESCRIPTOR_DEFAULT_PATH: &str = "amplifyconfiguration.json";

#[derive(Debug, Deserialize)]
struct Descriptor {
    analytics: Analytics,
}

#[derive(Debug, Deserialize)]
struct Analytics {
    plugins: Plugins,
}

#[derive(Debug, Deserialize)]
struct Plugins {
    #[serde(rename = "awsClickstreamPlugin")]
    clickstream: PluginSettings,
}

#[derive(Debug, Deserialize)]
struct PluginSettings {
    #[serde(rename = "appId")]
    app_id: String,
    endpoint: String,
    #[serde(rename = "isCompressEvents")]
    is_compress_events: bool,
}

/// Overlay descriptor values onto `profile`
///
/// Applies `appId`, `endpoint`, and `isCompressEvents`. When compression is
/// disabled the upload side is derated: uncompressed payloads are larger and
/// costlier for the endpoint to accept at volume, so the batch size drops to
/// 500 events, the pool shrinks to a single upload worker, and dispatch
/// pacing tightens to 100ms. That trade-off is deliberate, not incidental.
pub fn resolve(mut profile: Profile, descriptor_path: &Path) -> Profile {
    let text = match std::fs::read_to_string(descriptor_path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(
                path = %descriptor_path.display(),
                error = %e,
                "descriptor not readable, using profile defaults"
            );
            return profile;
        }
    };

    let descriptor: Descriptor = match serde_json::from_str(&text) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            tracing::warn!(
                path = %descriptor_path.display(),
                error = %e,
                "descriptor malformed, using profile defaults"
            );
            return profile;
        }
    };

    let settings = descriptor.analytics.plugins.clickstream;
    profile.app_id = settings.app_id;
    profile.endpoint = settings.endpoint;
    profile.is_gzip = settings.is_compress_events;

    if !profile.is_gzip {
        profile.request_sleep_time = Duration::from_millis(100);
        profile.max_upload_workers = 1;
        profile.events_per_request = 500;
    }

    tracing::info!(
        app_id = %profile.app_id,
        endpoint = %profile.endpoint,
        is_gzip = profile.is_gzip,
        "descriptor applied"
    );

    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppKind;
    use std::io::Write;

    fn write_descriptor(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    const COMPRESSED: &str = r#"{"analytics":{"plugins":{"awsClickstreamPlugin":{
        "appId":"shop-app","endpoint":"https://ingest.example.com/collect",
        "isCompressEvents":true}}}}"#;

    const UNCOMPRESSED: &str = r#"{"analytics":{"plugins":{"awsClickstreamPlugin":{
        "appId":"shop-app","endpoint":"https://ingest.example.com/collect",
        "isCompressEvents":false}}}}"#;

    #[test]
    fn test_resolve_applies_descriptor() {
        let file = write_descriptor(COMPRESSED);
        let profile = resolve(Profile::standalone(AppKind::Shopping), file.path());

        assert_eq!(profile.app_id, "shop-app");
        assert_eq!(profile.endpoint, "https://ingest.example.com/collect");
        assert!(profile.is_gzip);
        assert_eq!(profile.events_per_request, 10_000);
    }

    #[test]
    fn test_resolve_compression_off_derates_uploads() {
        let file = write_descriptor(UNCOMPRESSED);
        let profile = resolve(Profile::standalone(AppKind::Shopping), file.path());

        assert!(!profile.is_gzip);
        assert_eq!(profile.max_upload_workers, 1);
        assert_eq!(profile.request_sleep_time, Duration::from_millis(100));
        assert_eq!(profile.events_per_request, 500);
    }

    #[test]
    fn test_resolve_missing_file_keeps_defaults() {
        let defaults = Profile::standalone(AppKind::Notepad);
        let resolved = resolve(
            defaults.clone(),
            Path::new("/definitely/not/here/amplifyconfiguration.json"),
        );

        assert_eq!(resolved.app_id, defaults.app_id);
        assert_eq!(resolved.endpoint, defaults.endpoint);
        assert_eq!(resolved.is_gzip, defaults.is_gzip);
    }

    #[test]
    fn test_resolve_malformed_json_keeps_defaults() {
        let file = write_descriptor("{not json");
        let defaults = Profile::standalone(AppKind::Notepad);
        let resolved = resolve(defaults.clone(), file.path());

        assert_eq!(resolved.app_id, defaults.app_id);
        assert_eq!(resolved.events_per_request, defaults.events_per_request);
    }

    #[test]
    fn test_resolve_missing_keys_keeps_defaults() {
        let file = write_descriptor(r#"{"analytics":{"plugins":{}}}"#);
        let defaults = Profile::standalone(AppKind::Notepad);
        let resolved = resolve(defaults.clone(), file.path());

        assert_eq!(resolved.app_id, defaults.app_id);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let file = write_descriptor(UNCOMPRESSED);
        let once = resolve(Profile::standalone(AppKind::Shopping), file.path());
        let twice = resolve(once.clone(), file.path());

        assert_eq!(serde_json::to_value(&once).unwrap(), serde_json::to_value(&twice).unwrap());
    }
}
