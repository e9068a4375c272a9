use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use campus_store::{DEFAULT_SCHEMA, StatsMode, StoreOptions};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_url: String,
    pub db_max_connections: u32,
    pub schema_path: Option<String>,
    pub static_dir: String,
    pub upload_dir: String,
    pub stats_mode: StatsMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl ServerConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("CAMPUS_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("CAMPUS_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            "CAMPUS_BIND_ADDR",
        )?;

        let db_url = nonempty_or(kv, "CAMPUS_DB_URL", "sqlite://database/campus.db");
        if !db_url.starts_with("sqlite:") {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "CAMPUS_DB_URL must be a sqlite: URL".to_string(),
            });
        }

        let db_max_connections = parse_u32(
            kv.get("CAMPUS_DB_MAX_CONNECTIONS"),
            5,
            "CAMPUS_DB_MAX_CONNECTIONS",
        )?;
        if db_max_connections == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "CAMPUS_DB_MAX_CONNECTIONS must be > 0".to_string(),
            });
        }

        let schema_path = kv
            .get("CAMPUS_SCHEMA_PATH")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string());

        let static_dir = nonempty_or(kv, "CAMPUS_STATIC_DIR", ".");
        let upload_dir = nonempty_or(kv, "CAMPUS_UPLOAD_DIR", "uploads");
        let stats_mode = parse_stats_mode(kv.get("CAMPUS_STATS_MODE"))?;

        Ok(Self {
            bind_addr,
            db_url,
            db_max_connections,
            schema_path,
            static_dir,
            upload_dir,
            stats_mode,
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_connections: self.db_max_connections,
            stats_mode: self.stats_mode,
        }
    }

    pub fn load_schema(&self) -> Result<String, StartupError> {
        let Some(path) = self.schema_path.as_deref() else {
            return Ok(DEFAULT_SCHEMA.to_string());
        };

        std::fs::read_to_string(path).map_err(|err| StartupError {
            code: "ERR_SCHEMA_READ",
            message: format!("failed to read schema file at {}: {}", path, err),
        })
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    parse_env_lines(&contents)
}

fn parse_env_lines(contents: &str) -> Result<HashMap<String, String>, StartupError> {
    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn nonempty_or(kv: &HashMap<String, String>, key: &str, default: &str) -> String {
    kv.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v.parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_u32(value: Option<&String>, default: u32, key: &'static str) -> Result<u32, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u32>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_stats_mode(value: Option<&String>) -> Result<StatsMode, StartupError> {
    match value.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None | Some("stored") => Ok(StatsMode::Stored),
        Some("live") => Ok(StatsMode::Live),
        Some(_) => Err(StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "CAMPUS_STATS_MODE must be stored|live".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_env() {
        let cfg = ServerConfig::from_kv(&HashMap::new()).expect("config should load");
        assert_eq!(cfg.bind_addr, "127.0.0.1:8080".parse().expect("addr"));
        assert_eq!(cfg.db_url, "sqlite://database/campus.db");
        assert_eq!(cfg.db_max_connections, 5);
        assert_eq!(cfg.schema_path, None);
        assert_eq!(cfg.static_dir, ".");
        assert_eq!(cfg.upload_dir, "uploads");
        assert_eq!(cfg.stats_mode, StatsMode::Stored);
    }

    #[test]
    fn overrides_parse_from_env() {
        let env = HashMap::from([
            ("CAMPUS_BIND_ADDR".to_string(), "0.0.0.0:9000".to_string()),
            ("CAMPUS_DB_URL".to_string(), "sqlite::memory:".to_string()),
            ("CAMPUS_DB_MAX_CONNECTIONS".to_string(), "2".to_string()),
            ("CAMPUS_SCHEMA_PATH".to_string(), " db/schema.sql ".to_string()),
            ("CAMPUS_STATIC_DIR".to_string(), "public".to_string()),
            ("CAMPUS_UPLOAD_DIR".to_string(), "/tmp/uploads".to_string()),
            ("CAMPUS_STATS_MODE".to_string(), "live".to_string()),
        ]);

        let cfg = ServerConfig::from_kv(&env).expect("config should load");
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.db_url, "sqlite::memory:");
        assert_eq!(cfg.db_max_connections, 2);
        assert_eq!(cfg.schema_path.as_deref(), Some("db/schema.sql"));
        assert_eq!(cfg.static_dir, "public");
        assert_eq!(cfg.upload_dir, "/tmp/uploads");
        assert_eq!(cfg.stats_mode, StatsMode::Live);
        assert_eq!(cfg.store_options().max_connections, 2);
    }

    #[test]
    fn invalid_values_fail() {
        for (key, value) in [
            ("CAMPUS_BIND_ADDR", "not-an-addr"),
            ("CAMPUS_DB_URL", "postgres://localhost/campus"),
            ("CAMPUS_DB_MAX_CONNECTIONS", "0"),
            ("CAMPUS_DB_MAX_CONNECTIONS", "many"),
            ("CAMPUS_STATS_MODE", "cached"),
        ] {
            let env = HashMap::from([(key.to_string(), value.to_string())]);
            let err = ServerConfig::from_kv(&env).unwrap_err();
            assert_eq!(err.code, "ERR_INVALID_CONFIG", "{key}={value}");
        }
    }

    #[test]
    fn env_file_lines_parse_with_comments_and_quotes() {
        let kv = parse_env_lines(
            "# campus\n\nCAMPUS_BIND_ADDR = \"127.0.0.1:8181\"\nCAMPUS_STATS_MODE='live'\n",
        )
        .expect("lines should parse");
        assert_eq!(kv.get("CAMPUS_BIND_ADDR").map(String::as_str), Some("127.0.0.1:8181"));
        assert_eq!(kv.get("CAMPUS_STATS_MODE").map(String::as_str), Some("live"));
    }

    #[test]
    fn env_file_rejects_malformed_lines() {
        let err = parse_env_lines("CAMPUS_BIND_ADDR\n").unwrap_err();
        assert_eq!(err.code, "ERR_CONFIG_FILE_PARSE");

        let err = parse_env_lines("=value\n").unwrap_err();
        assert_eq!(err.code, "ERR_CONFIG_FILE_PARSE");
    }

    #[test]
    fn embedded_schema_is_used_without_path() {
        let cfg = ServerConfig::from_kv(&HashMap::new()).expect("config should load");
        let schema = cfg.load_schema().expect("schema should load");
        assert!(schema.contains("CREATE TABLE IF NOT EXISTS reports"));
    }

    #[test]
    fn missing_schema_file_fails() {
        let env = HashMap::from([(
            "CAMPUS_SCHEMA_PATH".to_string(),
            "/nonexistent/campus/schema.sql".to_string(),
        )]);
        let cfg = ServerConfig::from_kv(&env).expect("config should load");
        let err = cfg.load_schema().unwrap_err();
        assert_eq!(err.code, "ERR_SCHEMA_READ");
    }
}
