use std::time::Duration;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct ImageHostConfig {
    pub url: String,
    pub api_key: String,
}

/// Process configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_ttl: Duration,
    pub jwt_refresh_ttl: Duration,
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub front_end_origin: String,
    pub image_host: Option<ImageHostConfig>,
    pub google_client_id: Option<String>,
    pub smtp: Option<SmtpConfig>,
    pub enable_hsts: bool,
    pub bcrypt_cost: u32,
}

const MIN_SECRET_LEN: usize = 32;

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        fn parse<T: std::str::FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
        where
            T::Err: std::fmt::Display,
        {
            match raw {
                None => Ok(default),
                Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid { var, reason: e.to_string() }),
            }
        }

        fn secret(var: &'static str, raw: Option<String>) -> Result<String, ConfigError> {
            let s = raw.ok_or(ConfigError::Missing(var))?;
            if s.len() < MIN_SECRET_LEN {
                return Err(ConfigError::Invalid {
                    var,
                    reason: format!("must be at least {MIN_SECRET_LEN} characters"),
                });
            }
            Ok(s)
        }

        fn flag(raw: Option<String>) -> bool {
            raw.map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
        }

        let jwt_secret = secret("JWT_SECRET", get("JWT_SECRET"))?;
        let jwt_refresh_secret = secret("JWT_REFRESH_SECRET", get("JWT_REFRESH_SECRET"))?;
        if jwt_secret == jwt_refresh_secret {
            return Err(ConfigError::Invalid {
                var: "JWT_REFRESH_SECRET",
                reason: "must differ from JWT_SECRET".into(),
            });
        }

        let image_host = match (get("UPLOAD_FREE_HOST_URL"), get("UPLOAD_FREE_HOST_API_KEY")) {
            (Some(url), Some(api_key)) => Some(ImageHostConfig { url, api_key }),
            _ => None,
        };

        let smtp = match (get("SMTP_HOST"), get("SMTP_USERNAME"), get("SMTP_PASSWORD")) {
            (Some(host), Some(username), Some(password)) => Some(SmtpConfig {
                host,
                port: parse("SMTP_PORT", get("SMTP_PORT"), 465u16)?,
                from: get("AUTH_EMAIL").unwrap_or_else(|| username.clone()),
                username,
                password,
            }),
            _ => None,
        };

        let bcrypt_cost = parse("BCRYPT_COST", get("BCRYPT_COST"), 10u32)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid { var: "BCRYPT_COST", reason: "must be between 4 and 31".into() });
        }

        Ok(Self {
            jwt_secret,
            jwt_refresh_secret,
            jwt_ttl: Duration::from_secs(parse("JWT_EXPIRES_IN_SECS", get("JWT_EXPIRES_IN_SECS"), 3600u64)?),
            jwt_refresh_ttl: Duration::from_secs(parse(
                "JWT_REFRESH_EXPIRES_IN_SECS",
                get("JWT_REFRESH_EXPIRES_IN_SECS"),
                604_800u64,
            )?),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            database_url: get("DATABASE_URL"),
            db_max_connections: parse("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), 5u32)?,
            run_migrations: flag(get("RUN_MIGRATIONS")),
            front_end_origin: get("FRONT_END_IP").unwrap_or_else(|| "http://localhost:5173".into()),
            image_host,
            google_client_id: get("GOOGLE_CLIENT_ID"),
            smtp,
            enable_hsts: flag(get("ENABLE_HSTS")),
            bcrypt_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    const A: &str = "a-secret-that-is-long-enough-0123456789";
    const B: &str = "b-secret-that-is-long-enough-0123456789";

    #[test]
    fn defaults_apply() {
        let c = cfg(&[("JWT_SECRET", A), ("JWT_REFRESH_SECRET", B)]).unwrap();
        assert_eq!(c.jwt_ttl, Duration::from_secs(3600));
        assert_eq!(c.bind_addr, "0.0.0.0:3000");
        assert!(c.database_url.is_none());
        assert!(c.smtp.is_none());
        assert!(c.image_host.is_none());
        assert_eq!(c.bcrypt_cost, 10);
    }

    #[test]
    fn secrets_are_validated() {
        assert_eq!(cfg(&[]).unwrap_err(), ConfigError::Missing("JWT_SECRET"));
        assert!(matches!(
            cfg(&[("JWT_SECRET", "short"), ("JWT_REFRESH_SECRET", B)]),
            Err(ConfigError::Invalid { var: "JWT_SECRET", .. })
        ));
        assert!(cfg(&[("JWT_SECRET", A), ("JWT_REFRESH_SECRET", A)]).is_err());
    }

    #[test]
    fn smtp_needs_all_credentials() {
        let c = cfg(&[
            ("JWT_SECRET", A),
            ("JWT_REFRESH_SECRET", B),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "bot@example.com"),
            ("SMTP_PASSWORD", "pw"),
            ("SMTP_PORT", "587"),
        ])
        .unwrap();
        let smtp = c.smtp.unwrap();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from, "bot@example.com");

        let bad = cfg(&[("JWT_SECRET", A), ("JWT_REFRESH_SECRET", B), ("DB_MAX_CONNECTIONS", "many")]);
        assert!(matches!(bad, Err(ConfigError::Invalid { var: "DB_MAX_CONNECTIONS", .. })));
    }
}
