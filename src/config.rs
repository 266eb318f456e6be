use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// When absent, outgoing mail is written to the log instead of SMTP.
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Base URL used when building links sent to users (reset emails).
    pub public_base_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub reset_token_ttl_minutes: i64,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "wayfarer".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "wayfarer-users".into()),
            ttl_minutes: env_i64("JWT_TTL_MINUTES", 60),
        };
        let mail = MailConfig {
            smtp_host: std::env::var("SMTP_HOST").ok(),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            from_address: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "Wayfarer <no-reply@wayfarer.local>".into()),
        };
        Ok(Self {
            database_url,
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            jwt,
            mail,
            reset_token_ttl_minutes: env_i64("RESET_TOKEN_TTL_MINUTES", 10),
            default_page_size: env_i64("DEFAULT_PAGE_SIZE", 100),
            max_page_size: env_i64("MAX_PAGE_SIZE", 1000),
        })
    }
}
