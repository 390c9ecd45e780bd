use crate::core::bulk::DEFAULT_BATCH_SIZE;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const DEFAULT_ES_URL: &str = "http://localhost:9200";
const DEFAULT_INDEX_PREFIX: &str = "geo";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_BUCKET: &str = "geo-boundaries";
const DEFAULT_CACHE_CAPACITY: usize = 4096;
const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Checked in order; the first one set wins.
const ES_URL_VARS: &[&str] = &["ELASTICSEARCH_URL", "ES_URL", "BONSAI_URL"];

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static env var regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexNames {
    pub area: String,
    pub entity: String,
    pub postcode: String,
    pub placename: String,
}

impl IndexNames {
    pub fn from_prefix(prefix: &str) -> Self {
        Self {
            area: format!("{}_area", prefix),
            entity: format!("{}_entity", prefix),
            postcode: format!("{}_postcode", prefix),
            placename: format!("{}_placename", prefix),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobSettings {
    pub backend: BlobBackend,
    pub local_path: PathBuf,
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_id: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub es_url: String,
    pub index_prefix: String,
    pub bind_addr: String,
    pub batch_size: usize,
    pub cache_capacity: usize,
    pub cache_ttl_seconds: u64,
    pub blobs: BlobSettings,
}

/// Shape of the optional TOML settings file. Every key is optional and
/// overrides the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    store: StoreSection,
    server: ServerSection,
    import: ImportSection,
    cache: CacheSection,
    blobs: BlobSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StoreSection {
    url: Option<String>,
    index_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerSection {
    bind_addr: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ImportSection {
    batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CacheSection {
    capacity: Option<usize>,
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BlobSection {
    backend: Option<BlobBackend>,
    path: Option<PathBuf>,
    bucket: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parse_num = |key: &str, default: u64| -> Result<u64> {
            match var(key) {
                Some(v) => v.trim().parse().map_err(|_| EtlError::InvalidConfigValueError {
                    field: key.to_string(),
                    value: v.clone(),
                    reason: "must be a whole number".to_string(),
                }),
                None => Ok(default),
            }
        };

        let es_url = ES_URL_VARS
            .iter()
            .copied()
            .find_map(|key| var(key))
            .unwrap_or_else(|| DEFAULT_ES_URL.to_string());
        let backend = match var("BLOB_BACKEND").as_deref() {
            Some("s3") => BlobBackend::S3,
            Some("local") | None => BlobBackend::Local,
            Some(other) => {
                return Err(EtlError::InvalidConfigValueError {
                    field: "BLOB_BACKEND".to_string(),
                    value: other.to_string(),
                    reason: "expected local or s3".to_string(),
                })
            }
        };

        Ok(Self {
            es_url,
            index_prefix: var("ES_INDEX_PREFIX").unwrap_or_else(|| DEFAULT_INDEX_PREFIX.into()),
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            batch_size: parse_num("IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE as u64)? as usize,
            cache_capacity: parse_num("AREA_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY as u64)?
                as usize,
            cache_ttl_seconds: parse_num("AREA_CACHE_TTL", DEFAULT_CACHE_TTL_SECONDS)?,
            blobs: BlobSettings {
                backend,
                local_path: var("BOUNDARY_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./boundaries")),
                bucket: var("S3_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.into()),
                region: var("S3_REGION"),
                endpoint: var("S3_ENDPOINT"),
                access_id: var("S3_ACCESS_ID"),
                secret_key: var("S3_SECRET_KEY"),
            },
        })
    }

    /// Environment settings, overridden by `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = Self::from_env()?;
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                base.with_toml_str(&content)
            }
            None => Ok(base),
        }
    }

    pub fn with_toml_str(mut self, content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content);
        let file: SettingsFile =
            toml::from_str(&processed).map_err(|e| EtlError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;

        if let Some(url) = file.store.url {
            self.es_url = url;
        }
        if let Some(prefix) = file.store.index_prefix {
            self.index_prefix = prefix;
        }
        if let Some(addr) = file.server.bind_addr {
            self.bind_addr = addr;
        }
        if let Some(size) = file.import.batch_size {
            self.batch_size = size;
        }
        if let Some(capacity) = file.cache.capacity {
            self.cache_capacity = capacity;
        }
        if let Some(ttl) = file.cache.ttl_seconds {
            self.cache_ttl_seconds = ttl;
        }
        if let Some(backend) = file.blobs.backend {
            self.blobs.backend = backend;
        }
        if let Some(path) = file.blobs.path {
            self.blobs.local_path = path;
        }
        if let Some(bucket) = file.blobs.bucket {
            self.blobs.bucket = bucket;
        }
        self.blobs.region = file.blobs.region.or(self.blobs.region);
        self.blobs.endpoint = file.blobs.endpoint.or(self.blobs.endpoint);
        Ok(self)
    }

    pub fn indices(&self) -> IndexNames {
        IndexNames::from_prefix(&self.index_prefix)
    }
}

/// Replace `${VAR}` with the variable's value; unknown variables are left as is.
fn substitute_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |caps: &regex::Captures| {
            let name = &caps[1];
            std::env::var(name).unwrap_or_else(|_| format!("${{{}}}", name))
        })
        .into_owned()
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validation::validate_url("store.url", &self.es_url)?;
        validation::validate_index_prefix("store.index_prefix", &self.index_prefix)?;
        validation::validate_socket_addr("server.bind_addr", &self.bind_addr)?;
        validation::validate_positive_number("import.batch_size", self.batch_size, 1)?;
        validation::validate_range("cache.capacity", self.cache_capacity, 1, 1_000_000)?;
        validation::validate_positive_number(
            "cache.ttl_seconds",
            self.cache_ttl_seconds as usize,
            1,
        )?;
        match self.blobs.backend {
            BlobBackend::Local => validation::validate_path(
                "blobs.path",
                &self.blobs.local_path.to_string_lossy(),
            )?,
            BlobBackend::S3 => {
                validation::validate_s3_bucket_name("blobs.bucket", &self.blobs.bucket)?;
                if let Some(endpoint) = &self.blobs.endpoint {
                    validation::validate_url("blobs.endpoint", endpoint)?;
                }
            }
        }
        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}
