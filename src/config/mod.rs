use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    pub server: String,
    pub port: u32,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl AppConfig {
    /// Environment-driven configuration. `.env` is loaded by the caller
    /// before this runs; every value has a development default.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("SERVER_HOST", "0.0.0.0"),
                port: env_or("SERVER_PORT", "8080").parse().unwrap_or(8080),
            },
            database: DatabaseConfig {
                username: env_or("DB_USER", "leaduser"),
                password: env_or("DB_PASSWORD", ""),
                server: env_or("DB_HOST", "localhost"),
                port: env_or("DB_PORT", "5432").parse().unwrap_or(5432),
                database: env_or("DB_NAME", "leadserver"),
            },
            auth: AuthConfig {
                jwt_secret: env_or("JWT_SECRET", "dev-secret-change-me"),
            },
        }
    }

    /// `DATABASE_URL` wins over the assembled per-field configuration.
    pub fn database_url(&self) -> String {
        if let Ok(url) = env::var("DATABASE_URL") {
            return url;
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.server,
            self.database.port,
            self.database.database
        )
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
