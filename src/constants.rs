//! Page and storage constants shared by the binaries and pipelines.

// Source pages
pub const EVENTS_URL: &str = "https://www.sandiego.org/explore/events.aspx";
pub const MAJOR_EVENTS_URL: &str =
    "https://www.sandiego.org/articles/events/major-events-in-san-diego.aspx";

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DETAIL_PAGE_DELAY_MS: u64 = 1_000;

// Local artifacts written by the events run
pub const EVENTS_CSV_FILE: &str = "events.csv";
pub const EVENTS_HTML_SNAPSHOT: &str = "events.html";

// Object key stems: `{prefix}date=YYYY-MM-DD/{stem}_YYYYmmdd_HHMMSS.csv`
pub const EVENTS_OBJECT_STEM: &str = "events";
pub const MAJOR_EVENTS_OBJECT_STEM: &str = "major_events";
pub const LAYER_KEY_PREFIX: &str = "layers/";

// Remote run on the compute instance
pub const REMOTE_SCRIPT: &str = "/home/ubuntu/event-fetcher/event_fetcher";
pub const REMOTE_DOCUMENT: &str = "AWS-RunShellScript";
pub const INSTANCE_POLL_SECS: u64 = 15;
pub const INSTANCE_WAIT_TIMEOUT_SECS: u64 = 600;
pub const INSTANCE_WARMUP_SECS: u64 = 15;
pub const COMMAND_POLL_SECS: u64 = 20;

// Environment variable names
pub const ENV_EC2_INSTANCE_ID: &str = "EC2_INSTANCE_ID";
pub const ENV_BUCKET_NAME: &str = "BUCKET_NAME";
pub const ENV_BUCKET_PATH: &str = "BUCKET_PATH";
pub const ENV_MAJOR_EVENTS_BUCKET: &str = "MAJOR_EVENTS_S3_BUCKET_NAME";
pub const ENV_MAJOR_EVENTS_CSV_PATH: &str = "MAJOR_EVENTS_CSV_FILE_PATH";
pub const ENV_LAYER_BUCKET: &str = "S3_BUCKET";
pub const ENV_LAYER_LIBRARY: &str = "LIBRARY";
pub const ENV_CONFIG_FILE: &str = "EVENT_FETCHER_CONFIG";

pub const DEFAULT_CONFIG_FILE: &str = "fetcher.toml";

// Date/time renderings
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
pub const LOAD_TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
