//! Registry v2 schema-2 manifest synthesis.
//!
//! A pure function of a config descriptor and an ordered layer list. Uses
//! `serde_json::Map` (insertion-ordered) rather than a `HashMap` so the
//! emitted descriptor objects have a stable key order.

use serde_json::{Map, Value, json};

pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";
pub const LAYER_MEDIA_TYPE_TAR: &str = "application/vnd.docker.image.rootfs.diff.tar";
pub const LAYER_MEDIA_TYPE_TAR_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

#[derive(Debug, Clone)]
pub struct ConfigDescriptor {
    pub digest: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct LayerDescriptor {
    pub digest: String,
    pub size: u64,
    pub media_type: &'static str,
}

impl LayerDescriptor {
    /// `mediaType` is the gzip variant when the layer file ends in `.gz`/`.gzip`.
    pub fn media_type_for_path(path: &str) -> &'static str {
        if path.ends_with(".gz") || path.ends_with(".gzip") {
            LAYER_MEDIA_TYPE_TAR_GZIP
        } else {
            LAYER_MEDIA_TYPE_TAR
        }
    }
}

/// Builds the schema-2 manifest body for one `repo:tag` push.
pub fn build_manifest(config: &ConfigDescriptor, layers: &[LayerDescriptor]) -> Vec<u8> {
    let mut config_obj = Map::new();
    config_obj.insert("mediaType".into(), Value::String(CONFIG_MEDIA_TYPE.into()));
    config_obj.insert("size".into(), json!(config.size));
    config_obj.insert("digest".into(), Value::String(config.digest.clone()));

    let layer_values: Vec<Value> = layers
        .iter()
        .map(|l| {
            let mut obj = Map::new();
            obj.insert("mediaType".into(), Value::String(l.media_type.into()));
            obj.insert("size".into(), json!(l.size));
            obj.insert("digest".into(), Value::String(l.digest.clone()));
            Value::Object(obj)
        })
        .collect();

    let mut manifest = Map::new();
    manifest.insert("schemaVersion".into(), json!(2));
    manifest.insert("mediaType".into(), Value::String(MANIFEST_MEDIA_TYPE.into()));
    manifest.insert("config".into(), Value::Object(config_obj));
    manifest.insert("layers".into(), Value::Array(layer_values));

    // serde_json::Map preserves insertion order, so the body below has a
    // stable, predictable key order regardless of hashing.
    serde_json::to_vec(&Value::Object(manifest)).expect("manifest JSON is always serializable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_manifest_preserves_layer_order_and_key_order() {
        let config = ConfigDescriptor {
            digest: "sha256:aaa".into(),
            size: 42,
        };
        let layers = vec![
            LayerDescriptor {
                digest: "sha256:111".into(),
                size: 10,
                media_type: LAYER_MEDIA_TYPE_TAR,
            },
            LayerDescriptor {
                digest: "sha256:222".into(),
                size: 20,
                media_type: LAYER_MEDIA_TYPE_TAR_GZIP,
            },
        ];

        let body = build_manifest(&config, &layers);
        let text = String::from_utf8(body.clone()).unwrap();

        // Stable key order: schemaVersion, mediaType, config, layers.
        let schema_pos = text.find("\"schemaVersion\"").unwrap();
        let media_pos = text.find("\"mediaType\"").unwrap();
        let config_pos = text.find("\"config\"").unwrap();
        let layers_pos = text.find("\"layers\"").unwrap();
        assert!(schema_pos < media_pos);
        assert!(media_pos < config_pos);
        assert!(config_pos < layers_pos);

        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["schemaVersion"], 2);
        assert_eq!(parsed["config"]["digest"], "sha256:aaa");
        assert_eq!(parsed["layers"][0]["digest"], "sha256:111");
        assert_eq!(parsed["layers"][1]["digest"], "sha256:222");
        assert_eq!(parsed["layers"][1]["mediaType"], LAYER_MEDIA_TYPE_TAR_GZIP);
    }

    #[test]
    fn media_type_detection_by_extension() {
        assert_eq!(
            LayerDescriptor::media_type_for_path("abc/layer.tar"),
            LAYER_MEDIA_TYPE_TAR
        );
        assert_eq!(
            LayerDescriptor::media_type_for_path("abc/layer.tar.gz"),
            LAYER_MEDIA_TYPE_TAR_GZIP
        );
        assert_eq!(
            LayerDescriptor::media_type_for_path("abc/layer.tar.gzip"),
            LAYER_MEDIA_TYPE_TAR_GZIP
        );
    }
}
