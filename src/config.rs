use anyhow::{bail, Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

/// Credentials for the Amadeus self-service API
#[derive(Debug, Clone)]
pub struct AmadeusSettings {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Credentials for the Duffel API
#[derive(Debug, Clone)]
pub struct DuffelSettings {
    pub api_url: String,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Session cookie
    pub session_secret: String,
    pub session_cookie_name: String,
    pub session_ttl_hours: i64,
    pub ticket_signing_secret: String,
    pub admin_emails: Vec<String>,

    // Flight search providers (disabled when credentials are missing)
    pub default_currency: String,
    pub amadeus: Option<AmadeusSettings>,
    pub duffel: Option<DuffelSettings>,

    // Airline/airport lookup and flight tracking
    pub aviationstack_api_url: String,
    pub aviationstack_access_key: Option<String>,

    // Payment gateway
    pub stripe_api_url: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,

    pub external_api_timeout_seconds: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10);

        // Redis
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://redis:6379/0".to_string());
        let redis_cache_ttl_seconds = parse_or("REDIS_CACHE_TTL_SECONDS", 900); // 15 minutes

        // CORS
        let cors_allow_origins = split_list(
            &env::var("CORS_ALLOW_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        );

        // Session
        let session_secret = env::var("SESSION_SECRET").context("SESSION_SECRET must be set")?;
        if session_secret.len() < 32 {
            bail!("SESSION_SECRET must be at least 32 bytes");
        }
        let session_cookie_name =
            env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "session".to_string());
        let session_ttl_hours = parse_or("SESSION_TTL_HOURS", 24);
        let ticket_signing_secret =
            env::var("TICKET_SIGNING_SECRET").unwrap_or_else(|_| session_secret.clone());
        let admin_emails = split_list(&env::var("ADMIN_EMAILS").unwrap_or_default())
            .into_iter()
            .map(|e| e.to_lowercase())
            .collect();

        // Flight providers
        let default_currency = env::var("DEFAULT_CURRENCY")
            .unwrap_or_else(|_| "USD".to_string())
            .to_uppercase();

        let amadeus = match (
            env::var("AMADEUS_CLIENT_ID").ok(),
            env::var("AMADEUS_CLIENT_SECRET").ok(),
        ) {
            (Some(client_id), Some(client_secret)) => Some(AmadeusSettings {
                api_url: validated_url(
                    "AMADEUS_API_URL",
                    env::var("AMADEUS_API_URL")
                        .unwrap_or_else(|_| "https://test.api.amadeus.com".to_string()),
                )?,
                client_id,
                client_secret,
            }),
            _ => None,
        };

        let duffel = match env::var("DUFFEL_ACCESS_TOKEN").ok() {
            Some(access_token) => Some(DuffelSettings {
                api_url: validated_url(
                    "DUFFEL_API_URL",
                    env::var("DUFFEL_API_URL")
                        .unwrap_or_else(|_| "https://api.duffel.com".to_string()),
                )?,
                access_token,
            }),
            None => None,
        };

        // Aviation data
        let aviationstack_api_url = validated_url(
            "AVIATIONSTACK_API_URL",
            env::var("AVIATIONSTACK_API_URL")
                .unwrap_or_else(|_| "http://api.aviationstack.com/v1".to_string()),
        )?;
        let aviationstack_access_key = env::var("AVIATIONSTACK_ACCESS_KEY").ok();

        // Payments
        let stripe_api_url = validated_url(
            "STRIPE_API_URL",
            env::var("STRIPE_API_URL").unwrap_or_else(|_| "https://api.stripe.com".to_string()),
        )?;
        let stripe_secret_key =
            env::var("STRIPE_SECRET_KEY").context("STRIPE_SECRET_KEY must be set")?;
        let stripe_webhook_secret =
            env::var("STRIPE_WEBHOOK_SECRET").context("STRIPE_WEBHOOK_SECRET must be set")?;

        let external_api_timeout_seconds = parse_or("EXTERNAL_API_TIMEOUT_SECONDS", 20);

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            redis_url,
            redis_cache_ttl_seconds,
            cors_allow_origins,
            session_secret,
            session_cookie_name,
            session_ttl_hours,
            ticket_signing_secret,
            admin_emails,
            default_currency,
            amadeus,
            duffel,
            aviationstack_api_url,
            aviationstack_access_key,
            stripe_api_url,
            stripe_secret_key,
            stripe_webhook_secret,
            external_api_timeout_seconds,
        })
    }

    /// Whether a newly registered email should be granted the admin role
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn validated_url(key: &str, value: String) -> Result<String> {
    url::Url::parse(&value).with_context(|| format!("{} is not a valid URL", key))?;
    Ok(value.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_defaults_to_dev() {
        assert_eq!(Environment::from_str("production"), Environment::Prod);
        assert_eq!(Environment::from_str("PROD"), Environment::Prod);
        assert_eq!(Environment::from_str("staging"), Environment::Staging);
        assert_eq!(Environment::from_str("anything"), Environment::Dev);
        assert!(Environment::Dev.is_dev());
        assert!(!Environment::Dev.is_prod());
    }

    #[test]
    fn list_values_are_trimmed_and_filtered() {
        assert_eq!(
            split_list(" http://a.test , ,http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn urls_are_validated_and_normalised() {
        assert_eq!(
            validated_url("X", "https://api.stripe.com/".to_string()).unwrap(),
            "https://api.stripe.com"
        );
        assert!(validated_url("X", "not a url".to_string()).is_err());
    }
}
