use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use log::warn;
use std::env;
use std::path::PathBuf;

// Type aliases
pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

// Database initialization SQL. Executed as one idempotent batch at startup.
// issues.created_by_* is a snapshot of the reporter at creation time, so there
// are deliberately no foreign keys into users: deleting a user must not take
// their issues or chat history with them.
pub const DB_INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255) UNIQUE NOT NULL,
    password VARCHAR(255) NOT NULL,
    salt VARCHAR(64) NOT NULL,
    role VARCHAR(50) NOT NULL,
    office VARCHAR(255) NOT NULL,
    workstation VARCHAR(100) NOT NULL DEFAULT '',
    country VARCHAR(100) NOT NULL DEFAULT '',
    phone_number VARCHAR(50) NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS issues (
    id UUID PRIMARY KEY,
    description TEXT NOT NULL,
    image_url VARCHAR(512),
    status VARCHAR(20) NOT NULL DEFAULT 'open',
    priority VARCHAR(20) NOT NULL DEFAULT 'medium',
    created_by_id UUID NOT NULL,
    created_by_name VARCHAR(255) NOT NULL,
    created_by_email VARCHAR(255) NOT NULL,
    assigned_to UUID,
    location JSONB,
    ai_metadata JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS offices (
    id UUID PRIMARY KEY,
    name VARCHAR(255) UNIQUE NOT NULL,
    country VARCHAR(100) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS chat_messages (
    id UUID PRIMARY KEY,
    conversation_id UUID NOT NULL,
    sender_id UUID NOT NULL,
    sender_name VARCHAR(255) NOT NULL,
    sender_role VARCHAR(50) NOT NULL,
    message TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    read BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_issues_created_at ON issues (created_at DESC);
CREATE INDEX IF NOT EXISTS idx_chat_messages_conversation
    ON chat_messages (conversation_id, created_at);
"#;

// Config
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth_secret: String,
    pub upload_dir: PathBuf,
    /// Path to a JSON file holding `{"api_key": "..."}` for the external
    /// vision service. Absent or unreadable means AI enrichment is disabled.
    pub vision_credentials: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|e| {
            warn!("Failed to load DATABASE_URL: {}", e);
            "postgres://localhost/fixdesk".to_string()
        });

        let auth_secret = match env::var("AUTH_SECRET") {
            Ok(val) => val,
            Err(e) => {
                warn!("Failed to load AUTH_SECRET: {}", e);
                warn!("Using default auth secret - THIS IS NOT SECURE FOR PRODUCTION!");
                "your_auth_secret_key_here".to_string()
            }
        };

        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));

        let vision_credentials = env::var("VISION_CREDENTIALS").ok().map(PathBuf::from);

        Self {
            host,
            port,
            database_url,
            auth_secret,
            upload_dir,
            vision_credentials,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.auth_secret == "your_auth_secret_key_here" {
            warn!("Using default auth secret is not secure for production!");
        }

        if self.auth_secret.is_empty() {
            return Err("AUTH_SECRET must not be empty".to_string());
        }

        if self.database_url.is_empty() {
            return Err("DATABASE_URL must not be empty".to_string());
        }

        Ok(())
    }
}
