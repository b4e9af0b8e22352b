use std::env;

/// Process configuration, gathered once at startup.
///
/// Mirrors the donor's inline `env::var(...).unwrap_or_else(...)` /
/// `.expect()` parsing in `main.rs`, generalized into one struct so the
/// rest of the binary doesn't touch `std::env` directly.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub log_level: String,
    pub database_url: String,
    pub outbound_queue_capacity: usize,
    pub cors_allowed_origins: Vec<String>,
    pub cors_allowed_headers: Vec<String>,
    pub cors_allow_credentials: bool,
    pub voice: VoiceConfig,
}

/// Voice-service credentials and endpoint. Required only for the Voice
/// topic's handlers; absence is not a hard startup failure since a hub with
/// no voice traffic is still a valid deployment.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub issuer: String,
    pub domain: String,
    pub server: String,
    pub secret: String,
    pub base_url: String,
    pub admin_user: String,
    pub admin_pass: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| {
                let host = env::var("DB_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
                let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_owned());
                let user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_owned());
                let pass = env::var("DB_PASS").unwrap_or_else(|_| "postgres".to_owned());
                let name = env::var("DB_NAME").unwrap_or_else(|_| "veverse".to_owned());
                format!("postgres://{user}:{pass}@{host}:{port}/{name}")
            }),
            outbound_queue_capacity: env::var("OUTBOUND_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(256),
            cors_allowed_origins: split_csv_or_star(env::var("CORS_ALLOWED_ORIGINS").ok()),
            cors_allowed_headers: split_csv_or_star(env::var("CORS_ALLOWED_HEADERS").ok()),
            cors_allow_credentials: env::var("CORS_ALLOW_CREDENTIALS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            voice: VoiceConfig {
                issuer: env::var("VOICE_ISSUER").unwrap_or_default(),
                domain: env::var("VOICE_DOMAIN").unwrap_or_default(),
                server: env::var("VOICE_SERVER").unwrap_or_default(),
                secret: env::var("VOICE_SECRET").unwrap_or_default(),
                base_url: env::var("VOICE_BASE_URL").unwrap_or_default(),
                admin_user: env::var("VOICE_ADMIN_USER").unwrap_or_default(),
                admin_pass: env::var("VOICE_ADMIN_PASS").unwrap_or_default(),
            },
        }
    }
}

fn split_csv_or_star(value: Option<String>) -> Vec<String> {
    match value {
        Some(v) if v != "*" => v.split(',').map(|s| s.trim().to_owned()).collect(),
        _ => vec!["*".to_owned()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_or_star_defaults_to_wildcard() {
        assert_eq!(split_csv_or_star(None), vec!["*".to_owned()]);
    }

    #[test]
    fn split_csv_or_star_splits_comma_list() {
        assert_eq!(
            split_csv_or_star(Some("https://a.example, https://b.example".to_owned())),
            vec!["https://a.example".to_owned(), "https://b.example".to_owned()]
        );
    }
}
