use serde::Deserialize;

/// Main configuration structure for Lex-Harvest
///
/// Every section is optional; a missing section falls back to the defaults
/// that point at the Dutch SRU service, EUR-Lex and the public dataset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub documents: DocumentsConfig,
    pub http: HttpConfig,
    pub batch: BatchConfig,
    pub state: StateConfig,
    pub publish: PublishConfig,
}

/// SRU search endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Base URL of the SRU `searchRetrieve` endpoint
    pub endpoint: String,

    /// Value of the `x-connection` parameter (collection to search)
    pub connection: String,

    /// CQL query selecting the records to harvest
    pub query: String,

    /// Number of records requested per page
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Pause between consecutive page requests (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://zoekservice.overheid.nl/sru/Search".to_string(),
            connection: "eur".to_string(),
            query: "cql.allRecords=1".to_string(),
            page_size: 100,
            request_delay_ms: 1000,
        }
    }
}

/// Full-text document source configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Base URL of the EUR-Lex site
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Two-letter language code of the rendition to fetch
    pub language: String,

    /// Abort the run after this many outage failures in a row (0 disables)
    #[serde(rename = "max-consecutive-failures")]
    pub max_consecutive_failures: u32,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://eur-lex.europa.eu".to_string(),
            language: "NL".to_string(),
            max_consecutive_failures: 10,
        }
    }
}

/// HTTP client behavior shared by every outbound request
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base delay of the exponential backoff (milliseconds)
    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 3,
            backoff_base_ms: 500,
            user_agent: format!("lex-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Batch sizing and deferred-document policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of resolved entries published per run
    #[serde(rename = "max-entries")]
    pub max_entries: usize,

    /// Re-attempt documents that failed to fetch in earlier runs
    #[serde(rename = "retry-deferred")]
    pub retry_deferred: bool,

    /// Give up on a deferred document after this many failed attempts
    #[serde(rename = "max-deferred-attempts")]
    pub max_deferred_attempts: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_entries: 250,
            retry_deferred: true,
            max_deferred_attempts: 3,
        }
    }
}

/// Local state files
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Plain-text file holding the next offset to harvest
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,

    /// SQLite run ledger
    #[serde(rename = "ledger-path")]
    pub ledger_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: "state/checkpoint.txt".to_string(),
            ledger_path: "state/ledger.db".to_string(),
        }
    }
}

/// Where published batches go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishTarget {
    /// Hugging Face dataset repository
    #[default]
    Hub,
    /// JSONL file on the local filesystem
    Local,
}

/// Dataset publishing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub target: PublishTarget,

    /// Base URL of the dataset hub
    #[serde(rename = "hub-url")]
    pub hub_url: String,

    /// Dataset repository, `owner/name`
    #[serde(rename = "repo-id")]
    pub repo_id: String,

    /// Branch the commits land on
    pub revision: String,

    /// Path of the JSONL data file inside the repository
    #[serde(rename = "data-path")]
    pub data_path: String,

    /// Path of the JSONL data file for the `local` target
    #[serde(rename = "local-path")]
    pub local_path: String,

    /// Value written into the `source` column of every row
    #[serde(rename = "source-label")]
    pub source_label: String,

    /// Data files of at least this size go through LFS instead of inline
    #[serde(rename = "lfs-threshold-bytes")]
    pub lfs_threshold_bytes: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            target: PublishTarget::Hub,
            hub_url: "https://huggingface.co".to_string(),
            repo_id: "vGassen/Dutch-European-Directives".to_string(),
            revision: "main".to_string(),
            data_path: "data/train.jsonl".to_string(),
            local_path: "dataset/train.jsonl".to_string(),
            source_label: "EU richtlijnen".to_string(),
            lfs_threshold_bytes: 5 * 1024 * 1024,
        }
    }
}
