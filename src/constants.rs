pub const DEFAULT_CONFIG_FILE: &str = "proxy_config.json";
pub const CONFIG_DOCUMENT_VERSION: u32 = 1;

pub const DEFAULT_PROXY_PORT: u16 = 5000;
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.deepseek.com";

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const AZURE_API_VERSION: &str = "2024-02-15-preview";

// Overall upstream timeout in seconds, overridable via THINKGATE_REQUEST_TIMEOUT.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;
pub const UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 20;

pub const THINKING_BUS_CAPACITY: usize = 256;
pub const THINKING_KEEPALIVE_SECS: u64 = 15;
