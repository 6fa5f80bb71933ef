use serde::Deserialize;

use crate::store::DEFAULT_MAX_RETRIES;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Knobs for the meal calendar and the ledger store.
#[derive(Debug, Clone, Deserialize)]
pub struct MealConfig {
    /// Offset of the hall's local time from UTC, in minutes.
    pub utc_offset_minutes: i32,
    pub store_max_retries: u32,
    /// Registering with this e-mail yields an admin account.
    pub bootstrap_admin_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// No database URL means the in-memory store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub meals: MealConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "mealmate".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "mealmate-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 14),
        };
        let meals = MealConfig {
            utc_offset_minutes: env_parse("MEAL_UTC_OFFSET_MINUTES").unwrap_or(6 * 60),
            store_max_retries: env_parse("STORE_MAX_RETRIES").unwrap_or(DEFAULT_MAX_RETRIES),
            bootstrap_admin_email: std::env::var("BOOTSTRAP_ADMIN_EMAIL")
                .ok()
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty()),
        };
        anyhow::ensure!(
            (-18 * 60..=18 * 60).contains(&meals.utc_offset_minutes),
            "MEAL_UTC_OFFSET_MINUTES out of range"
        );
        Ok(Self {
            database_url,
            jwt,
            meals,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
