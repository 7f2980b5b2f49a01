use std::time::Duration;

/// Runtime configuration, built once at startup and moved into `AppState`.
#[derive(Debug, Clone)]
pub struct ServerSection {
    /// Address to listen on.
    pub listen: String,

    /// Root directory; each archive identifier names a subdirectory.
    pub photos_dir: String,

    /// When false, no diagnostic events are emitted at all.
    pub enable_logging: bool,

    /// Pause after every data-bearing chunk, in seconds.
    pub response_delay_secs: f64,

    /// Upper bound on bytes read from the producer per relay iteration.
    pub chunk_size: usize,

    /// HTML document served at `/`.
    pub index_path: String,

    /// Executable that writes a zip of its working directory to stdout.
    pub zip_program: String,

    /// Arguments passed to `zip_program`.
    pub producer_args: Vec<String>,

    /// Log output format: "json" or "pretty".
    pub log_format: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            photos_dir: default_photos_dir(),
            enable_logging: true,
            response_delay_secs: DEFAULT_RESPONSE_DELAY_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            index_path: default_index_path(),
            zip_program: default_zip_program(),
            producer_args: default_producer_args(),
            log_format: default_log_format(),
        }
    }
}

impl ServerSection {
    pub fn response_delay(&self) -> Duration {
        Duration::from_secs_f64(self.response_delay_secs)
    }
}

pub const DEFAULT_RESPONSE_DELAY_SECS: f64 = 9.0;
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_photos_dir() -> String {
    "test_photos".to_string()
}

fn default_index_path() -> String {
    "index.html".to_string()
}

fn default_zip_program() -> String {
    "zip".to_string()
}

/// Recurse into the working directory and write the archive to stdout.
pub fn default_producer_args() -> Vec<String> {
    vec!["-r".into(), "-".into(), ".".into()]
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Parse a byte size such as "1M", "256K" or "4096".
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }

    let (num_str, multiplier) = match s.as_bytes().last() {
        Some(b'K' | b'k') => (&s[..s.len() - 1], 1024usize),
        Some(b'M' | b'm') => (&s[..s.len() - 1], 1024 * 1024),
        _ => (s, 1usize),
    };

    let num: usize = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid size: '{s}'"))?;
    let size = num
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: '{s}'"))?;
    if size == 0 {
        return Err("size must be at least 1 byte".into());
    }
    Ok(size)
}

/// Parse a pacing delay in (fractional) seconds.
pub fn parse_delay(s: &str) -> Result<f64, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|e| format!("invalid delay '{s}': {e}"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err("delay must be a non-negative number of seconds".into());
    }
    Ok(secs)
}
